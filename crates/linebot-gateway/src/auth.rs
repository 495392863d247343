//! Short-lived WS handshake tokens (§4.9: "a short-lived token is
//! presented as a query parameter at handshake; verified once").
//!
//! The distilled spec leaves the token scheme open (§9 Open Question);
//! this follows the same HMAC-SHA256 shape C1 already uses for webhook
//! signatures rather than inventing a second mechanism. A token is
//! `base64url(scope:id:expiry_unix).hex(hmac)`; the gateway mints these
//! wherever operators authenticate (out of scope here) and this module
//! only verifies them.
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    Bot,
    Dashboard,
}

impl TokenScope {
    fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Bot => "bot",
            TokenScope::Dashboard => "dashboard",
        }
    }
}

/// Mint a token for `scope`/`id`, valid for `ttl_secs` from now.
pub fn mint(secret: &str, scope: TokenScope, id: &str, ttl_secs: u64) -> String {
    let expiry = Utc::now().timestamp() + ttl_secs as i64;
    let payload = format!("{}:{}:{}", scope.as_str(), id, expiry);
    let sig = sign(secret, &payload);
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());
    format!("{encoded}.{sig}")
}

/// Verify a token against the expected scope and id. Rejects expired,
/// malformed, or mismatched-signature tokens.
pub fn verify(secret: &str, token: &str, scope: TokenScope, id: &str) -> bool {
    let Some((encoded, sig)) = token.split_once('.') else {
        return false;
    };
    let Ok(payload_bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(encoded) else {
        return false;
    };
    let Ok(payload) = String::from_utf8(payload_bytes) else {
        return false;
    };

    if sign(secret, &payload) != sig {
        return false;
    }

    let mut parts = payload.splitn(3, ':');
    let (Some(tok_scope), Some(tok_id), Some(tok_expiry)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if tok_scope != scope.as_str() || tok_id != id {
        return false;
    }
    tok_expiry.parse::<i64>().map(|exp| exp >= Utc::now().timestamp()).unwrap_or(false)
}

fn sign(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_minted_token_verifies() {
        let token = mint("s3cret", TokenScope::Bot, "bot-1", 60);
        assert!(verify("s3cret", &token, TokenScope::Bot, "bot-1"));
    }

    #[test]
    fn wrong_scope_or_id_fails() {
        let token = mint("s3cret", TokenScope::Bot, "bot-1", 60);
        assert!(!verify("s3cret", &token, TokenScope::Dashboard, "bot-1"));
        assert!(!verify("s3cret", &token, TokenScope::Bot, "bot-2"));
    }

    #[test]
    fn expired_token_fails() {
        let token = mint("s3cret", TokenScope::Bot, "bot-1", 0);
        std::thread::sleep(std::time::Duration::from_secs(1));
        assert!(!verify("s3cret", &token, TokenScope::Bot, "bot-1"));
    }

    #[test]
    fn tampered_payload_fails() {
        let token = mint("s3cret", TokenScope::Bot, "bot-1", 60);
        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"bot:bot-2:9999999999");
        let forged = format!("{forged_payload}.{sig}");
        assert!(!verify("s3cret", &forged, TokenScope::Bot, "bot-2"));
    }
}

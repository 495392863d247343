use serde::{Deserialize, Serialize};

/// Query parameters accepted on both WS endpoints
/// (`/ws/bot/{bot_id}`, `/ws/dashboard/{user_id}`).
///
/// The token is short-lived and verified exactly once, at handshake time —
/// there is no re-auth over the life of the connection.
#[derive(Debug, Clone, Deserialize)]
pub struct WsHandshakeQuery {
    pub token: String,
}

/// Payload of the `connected` envelope sent immediately after a
/// successful handshake.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedPayload {
    pub node_id: String,
    pub scope: ConnectionScope,
}

/// Which of the two endpoint shapes a socket was opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionScope {
    Bot,
    Dashboard,
}

/// Payload of the `initial_data` envelope returned for `get_initial_data`.
#[derive(Debug, Clone, Serialize)]
pub struct InitialDataPayload {
    pub bot_id: String,
    pub is_configured: bool,
}

/// Payload of a `subscribed` acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribedPayload {
    pub channel: String,
}

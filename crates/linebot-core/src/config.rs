use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const MAX_PAYLOAD_BYTES: usize = 2 * 1024 * 1024; // LINE webhook bodies can carry several events
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Top-level config (linebot.toml + LINEBOT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinebotConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Default for LinebotConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            object_store: ObjectStoreConfig::default(),
            llm: LlmConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            reranker: RerankerConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_heartbeat_secs")]
    pub ws_heartbeat_secs: u64,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Process identity used in `meta.source` on cross-process WS broadcasts (§9, S7).
    #[serde(default = "default_process_id")]
    pub process_id: String,
    /// When true, events within a single webhook body are processed concurrently
    /// (`tokio::spawn` per event) instead of sequentially. Sequential preserves
    /// the §5 ordering guarantee and is the default.
    #[serde(default)]
    pub concurrent_event_processing: bool,
    /// Name of the env var holding the HMAC key used to sign/verify the
    /// short-lived WS handshake tokens (§4.9).
    #[serde(default = "default_ws_token_secret_env")]
    pub ws_token_secret_env: String,
    /// How long a WS handshake token remains valid after it was issued.
    #[serde(default = "default_ws_token_ttl_secs")]
    pub ws_token_ttl_secs: u64,
    /// Externally reachable base URL, used to build the `webhook_url`
    /// reported by `GET /api/v1/webhooks/{bot_id}/status` (§6).
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            ws_heartbeat_secs: default_heartbeat_secs(),
            max_payload_bytes: default_max_payload_bytes(),
            process_id: default_process_id(),
            concurrent_event_processing: false,
            ws_token_secret_env: default_ws_token_secret_env(),
            ws_token_ttl_secs: default_ws_token_ttl_secs(),
            public_base_url: default_public_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the per-concern SQLite files (bots.db,
    /// conversations.db, knowledge.db) unless overridden individually.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DatabaseConfig {
    pub fn path_for(&self, name: &str) -> String {
        format!("{}/{}.db", self.data_dir.trim_end_matches('/'), name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Public base URL used to build `media_url` once an object is stored.
    #[serde(default = "default_object_store_base_url")]
    pub base_url: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_object_store_base_url(),
            bucket: default_bucket(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Name of the env var holding the API key (never the key itself).
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Consecutive failures before the breaker opens (C6).
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    /// How long the breaker stays open before allowing a half-open probe.
    #[serde(default = "default_breaker_cooldown_secs")]
    pub circuit_breaker_cooldown_secs: u64,
    #[serde(default = "default_llm_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            api_key_env: default_llm_api_key_env(),
            model: default_llm_model(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            circuit_breaker_threshold: default_breaker_threshold(),
            circuit_breaker_cooldown_secs: default_breaker_cooldown_secs(),
            request_timeout_ms: default_llm_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embeddings_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embeddings_model")]
    pub model: String,
    #[serde(default = "default_embedding_dim")]
    pub dimensions: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: default_embeddings_base_url(),
            api_key_env: default_llm_api_key_env(),
            model: default_embeddings_model(),
            dimensions: default_embedding_dim(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: default_reranker_base_url(),
            api_key_env: default_llm_api_key_env(),
            model: default_reranker_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Blend weight for hybrid-rerank mode: `final = alpha*rerank + (1-alpha)*vector`.
    /// Not named in the distilled spec; carried over from the original's
    /// `rag_service.py` default.
    #[serde(default = "default_rerank_blend_alpha")]
    pub rerank_blend_alpha: f32,
    /// RRF constant `k` for hybrid vector+lexical fusion.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rerank_blend_alpha: default_rerank_blend_alpha(),
            rrf_k: default_rrf_k(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_heartbeat_secs() -> u64 {
    HEARTBEAT_INTERVAL_SECS
}
fn default_max_payload_bytes() -> usize {
    MAX_PAYLOAD_BYTES
}
fn default_process_id() -> String {
    format!("proc-{}", uuid::Uuid::new_v4())
}
fn default_data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.linebot/data", home)
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_object_store_base_url() -> String {
    "http://localhost:9000".to_string()
}
fn default_bucket() -> String {
    "linebot-media".to_string()
}
fn default_llm_provider() -> String {
    "openai-compat".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_llm_api_key_env() -> String {
    "LINEBOT_LLM_API_KEY".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_cooldown_secs() -> u64 {
    30
}
fn default_llm_timeout_ms() -> u64 {
    30_000
}
fn default_embeddings_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embeddings_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dim() -> usize {
    DEFAULT_EMBEDDING_DIM
}
fn default_reranker_base_url() -> String {
    "https://api.cohere.com".to_string()
}
fn default_reranker_model() -> String {
    "rerank-v3.5".to_string()
}
fn default_rerank_blend_alpha() -> f32 {
    0.5
}
fn default_rrf_k() -> f32 {
    60.0
}
fn default_ws_token_secret_env() -> String {
    "LINEBOT_WS_TOKEN_SECRET".to_string()
}
fn default_ws_token_ttl_secs() -> u64 {
    300
}
fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl LinebotConfig {
    /// Load config from a TOML file with LINEBOT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. LINEBOT_CONFIG env var
    ///   3. ~/.linebot/linebot.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: LinebotConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("LINEBOT_").split("_"))
            .extract()
            .map_err(|e| crate::error::LinebotError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.linebot/linebot.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = LinebotConfig::default();
        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert_eq!(cfg.embeddings.dimensions, DEFAULT_EMBEDDING_DIM);
        assert!(cfg.retrieval.rerank_blend_alpha > 0.0 && cfg.retrieval.rerank_blend_alpha < 1.0);
    }

    #[test]
    fn database_path_for_joins_data_dir() {
        let cfg = DatabaseConfig {
            data_dir: "/tmp/linebot".to_string(),
        };
        assert_eq!(cfg.path_for("bots"), "/tmp/linebot/bots.db");
    }
}

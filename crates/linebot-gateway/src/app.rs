use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use rusqlite::Connection;
use tracing::warn;

use linebot_bots::BotStore;
use linebot_conversations::ConversationStore;
use linebot_core::config::LinebotConfig;
use linebot_knowledge::KnowledgeStore;
use linebot_line::LineClient;
use linebot_llm::anthropic::AnthropicProvider;
use linebot_llm::openai::OpenAiProvider;
use linebot_llm::{EmbeddingClient, LlmClient, LlmProvider, RerankerClient};
use linebot_retrieval::RetrievalPipeline;

use crate::object_store::LocalObjectStore;
use crate::templates::{FlexMessageStore, TemplateStore};
use crate::ws::{Broadcaster, WsRegistry};

/// Everything an axum handler needs, shared behind `Arc<AppState>`.
pub struct AppState {
    pub config: LinebotConfig,
    pub node_id: String,

    pub bots: BotStore,
    pub conversations: Arc<ConversationStore>,
    pub knowledge: Arc<KnowledgeStore>,
    pub templates: TemplateStore,
    pub flex_messages: Arc<FlexMessageStore>,

    pub llm: Arc<LlmClient>,
    pub retrieval: Arc<RetrievalPipeline>,

    pub object_store: Arc<dyn linebot_line::ObjectStore>,
    pub media_bucket: String,

    pub ws_registry: Arc<WsRegistry>,
    pub broadcaster: Arc<Broadcaster>,

    /// One `LineClient` per bot, built lazily from that bot's channel
    /// token and kept for the life of the process (§9 "global client
    /// singletons" replacement — scoped per tenant here, not global).
    line_clients: DashMap<String, Arc<LineClient>>,
}

impl AppState {
    pub fn line_client_for(&self, bot: &linebot_bots::Bot) -> Arc<LineClient> {
        if let Some(existing) = self.line_clients.get(&bot.id) {
            return existing.clone();
        }
        let token = bot.channel_token.clone().unwrap_or_default();
        let client = Arc::new(LineClient::new(token));
        self.line_clients.insert(bot.id.clone(), client.clone());
        client
    }
}

/// Open (or create) one SQLite file under `data_dir` and hand back a
/// shared, mutex-guarded connection — the pattern every per-concern store
/// in this workspace expects.
fn open_db(
    config: &LinebotConfig,
    name: &str,
    init: impl FnOnce(&Connection) -> rusqlite::Result<()>,
) -> anyhow::Result<Arc<std::sync::Mutex<Connection>>> {
    std::fs::create_dir_all(&config.database.data_dir)?;
    let path = config.database.path_for(name);
    let conn = Connection::open(&path)?;
    init(&conn)?;
    Ok(Arc::new(std::sync::Mutex::new(conn)))
}

fn env_or_empty(var: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| {
        warn!(var, "environment variable not set, using empty credential");
        String::new()
    })
}

pub async fn build_state(config: LinebotConfig) -> anyhow::Result<Arc<AppState>> {
    let bots_db = open_db(&config, "bots", linebot_bots::db::init_db)?;
    let conversations_db = open_db(&config, "conversations", linebot_conversations::db::init_db)?;
    let knowledge_db = open_db(&config, "knowledge", linebot_knowledge::db::init_db)?;
    let gateway_db = open_db(&config, "gateway", |conn| crate::templates::init_db(conn))?;

    let bots = BotStore::new(bots_db);
    let conversations = Arc::new(ConversationStore::new(conversations_db));
    let knowledge = Arc::new(KnowledgeStore::new(knowledge_db));
    let templates = TemplateStore::new(gateway_db.clone());
    let flex_messages = Arc::new(FlexMessageStore::new(gateway_db));

    let llm_timeout = Duration::from_millis(config.llm.request_timeout_ms);
    let llm_api_key = env_or_empty(&config.llm.api_key_env);
    let openai: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(
        config.llm.base_url.clone(),
        llm_api_key.clone(),
        llm_timeout,
    ));
    let anthropic: Arc<dyn LlmProvider> = Arc::new(AnthropicProvider::new(
        config.llm.base_url.clone(),
        llm_api_key,
        llm_timeout,
    ));
    let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
    providers.insert("openai".to_string(), openai.clone());
    providers.insert("openai-compat".to_string(), openai);
    providers.insert("anthropic".to_string(), anthropic);
    let default_provider = if config.llm.provider.contains("anthropic") {
        "anthropic"
    } else {
        "openai-compat"
    };

    let llm = Arc::new(LlmClient::new(
        providers,
        default_provider,
        config.llm.circuit_breaker_threshold,
        config.llm.circuit_breaker_cooldown_secs,
        config.llm.max_attempts,
        config.llm.retry_base_ms,
    ));

    let embeddings = Arc::new(EmbeddingClient::new(
        config.embeddings.base_url.clone(),
        env_or_empty(&config.embeddings.api_key_env),
        config.embeddings.model.clone(),
        config.embeddings.dimensions,
    ));
    let reranker = Arc::new(RerankerClient::new(
        config.reranker.base_url.clone(),
        env_or_empty(&config.reranker.api_key_env),
        config.reranker.model.clone(),
    ));

    let retrieval = Arc::new(RetrievalPipeline::new(
        knowledge.clone(),
        conversations.clone(),
        embeddings,
        Some(reranker),
    ));

    let media_root = format!("{}/media", config.database.data_dir.trim_end_matches('/'));
    let object_store: Arc<dyn linebot_line::ObjectStore> =
        Arc::new(LocalObjectStore::new(media_root, config.object_store.base_url.clone()));
    let media_bucket = config.object_store.bucket.clone();

    let ws_registry = Arc::new(WsRegistry::new());
    let redis_client = redis::Client::open(config.redis.url.clone())?;
    let publish_conn = ConnectionManager::new(redis_client).await?;
    let node_id = config.server.process_id.clone();
    let broadcaster = Arc::new(Broadcaster::new(ws_registry.clone(), publish_conn, node_id.clone()));

    tokio::spawn(crate::ws::bridge::run_subscriber(
        config.redis.url.clone(),
        ws_registry.clone(),
        node_id.clone(),
    ));

    let state = AppState {
        config,
        node_id,
        bots,
        conversations,
        knowledge,
        templates,
        flex_messages,
        llm,
        retrieval,
        object_store,
        media_bucket,
        ws_registry,
        broadcaster,
        line_clients: DashMap::new(),
    };

    Ok(Arc::new(state))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/v1/webhooks/{bot_id}",
            post(crate::http::webhooks::webhook_handler),
        )
        .route(
            "/api/v1/webhooks/{bot_id}/status",
            get(crate::http::status::status_handler),
        )
        .route(
            "/api/v1/webhooks/{bot_id}/ping",
            get(crate::http::status::ping_handler),
        )
        .route(
            "/api/v1/webhooks/{bot_id}/connections",
            get(crate::http::status::connections_handler),
        )
        .route("/ws/bot/{bot_id}", get(crate::ws::connection::bot_ws_handler))
        .route(
            "/ws/dashboard/{user_id}",
            get(crate::ws::connection::dashboard_ws_handler),
        )
        .route("/media/{bucket}/{*path}", get(crate::http::media::media_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::types::{Bot, NewBot};

/// Maximum number of bot rows kept in the in-process cache. Simple
/// eviction: when full, drop the oldest half.
const CACHE_MAX: usize = 256;

/// Front for the `bots` table. Every inbound webhook looks up its bot
/// exactly once before C1 can run, so the lookup is cached in memory —
/// credentials rarely change and a cache miss only costs a single indexed
/// SELECT.
pub struct BotStore {
    db: Arc<Mutex<Connection>>,
    cache: Mutex<HashMap<String, Bot>>,
    /// Insertion-order key list for eviction — parallel to the HashMap.
    cache_order: Mutex<Vec<String>>,
}

impl BotStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(Vec::new()),
        }
    }

    pub fn create(&self, new: NewBot) -> Result<Bot> {
        let conn = self.db.lock().unwrap();
        let bot = crate::crud::create_bot(&conn, new)?;
        self.cache_insert(bot.clone());
        Ok(bot)
    }

    /// Look up a bot by id. Used on the webhook hot path — a cache hit
    /// avoids taking the DB lock entirely.
    pub fn get(&self, bot_id: &str) -> Result<Option<Bot>> {
        if let Some(bot) = self.cache_lookup(bot_id) {
            debug!(bot_id, "bot cache hit");
            return Ok(Some(bot));
        }

        let conn = self.db.lock().unwrap();
        let bot = crate::crud::get_bot(&conn, bot_id)?;
        if let Some(ref b) = bot {
            self.cache_insert(b.clone());
        }
        Ok(bot)
    }

    pub fn rotate_credentials(
        &self,
        bot_id: &str,
        channel_token: &str,
        channel_secret: &str,
    ) -> Result<()> {
        let conn = self.db.lock().unwrap();
        crate::crud::rotate_credentials(&conn, bot_id, channel_token, channel_secret)?;
        drop(conn);
        self.invalidate(bot_id);
        Ok(())
    }

    pub fn update_ai_settings(&self, bot: &Bot) -> Result<()> {
        let conn = self.db.lock().unwrap();
        crate::crud::update_ai_settings(&conn, bot)?;
        drop(conn);
        self.invalidate(&bot.id);
        Ok(())
    }

    /// List every bot a tenant owns. Not cached — used on the dashboard
    /// WebSocket connect path, which is far rarer than the webhook hot path.
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Bot>> {
        let conn = self.db.lock().unwrap();
        crate::crud::list_bots_by_owner(&conn, owner_id)
    }

    /// Drop a bot's cached row. Call after any write so the next read sees
    /// fresh credentials/settings.
    pub fn invalidate(&self, bot_id: &str) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        cache.remove(bot_id);
        order.retain(|k| k != bot_id);
    }

    // ── cache helpers ────────────────────────────────────────────────────

    fn cache_lookup(&self, bot_id: &str) -> Option<Bot> {
        self.cache.lock().unwrap().get(bot_id).cloned()
    }

    fn cache_insert(&self, bot: Bot) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();

        if cache.contains_key(&bot.id) {
            cache.insert(bot.id.clone(), bot);
            return;
        }

        if cache.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            let to_remove: Vec<_> = order.drain(..evict_count).collect();
            for k in to_remove {
                cache.remove(&k);
            }
        }

        order.push(bot.id.clone());
        cache.insert(bot.id.clone(), bot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> BotStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        BotStore::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        let bot = store
            .create(NewBot {
                owner_id: "owner-1".to_string(),
                channel_token: Some("tok".to_string()),
                channel_secret: Some("sec".to_string()),
                ai_takeover_enabled: false,
                ai_provider: None,
                ai_model: None,
                ai_system_prompt: None,
                ai_rag_threshold: 0.7,
                ai_rag_top_k: 5,
                ai_history_messages: 0,
                ai_retrieval_mode: "vector_only".to_string(),
            })
            .unwrap();

        let fetched = store.get(&bot.id).unwrap().unwrap();
        assert_eq!(fetched.owner_id, "owner-1");
        assert!(fetched.is_configured());
    }

    #[test]
    fn unknown_bot_returns_none() {
        let store = store();
        assert!(store.get("does-not-exist").unwrap().is_none());
    }

    #[test]
    fn rotate_credentials_invalidates_cache() {
        let store = store();
        let bot = store
            .create(NewBot {
                owner_id: "owner-1".to_string(),
                channel_token: Some("old-tok".to_string()),
                channel_secret: Some("old-sec".to_string()),
                ai_takeover_enabled: false,
                ai_provider: None,
                ai_model: None,
                ai_system_prompt: None,
                ai_rag_threshold: 0.7,
                ai_rag_top_k: 5,
                ai_history_messages: 0,
                ai_retrieval_mode: "vector_only".to_string(),
            })
            .unwrap();

        store
            .rotate_credentials(&bot.id, "new-tok", "new-sec")
            .unwrap();
        let fetched = store.get(&bot.id).unwrap().unwrap();
        assert_eq!(fetched.channel_token.as_deref(), Some("new-tok"));
    }

    #[test]
    fn list_by_owner_returns_only_that_owners_bots() {
        let store = store();
        store
            .create(NewBot {
                owner_id: "owner-1".to_string(),
                channel_token: None,
                channel_secret: None,
                ai_takeover_enabled: false,
                ai_provider: None,
                ai_model: None,
                ai_system_prompt: None,
                ai_rag_threshold: 0.7,
                ai_rag_top_k: 5,
                ai_history_messages: 0,
                ai_retrieval_mode: "vector_only".to_string(),
            })
            .unwrap();
        store
            .create(NewBot {
                owner_id: "owner-2".to_string(),
                channel_token: None,
                channel_secret: None,
                ai_takeover_enabled: false,
                ai_provider: None,
                ai_model: None,
                ai_system_prompt: None,
                ai_rag_threshold: 0.7,
                ai_rag_top_k: 5,
                ai_history_messages: 0,
                ai_retrieval_mode: "vector_only".to_string(),
            })
            .unwrap();

        let owned = store.list_by_owner("owner-1").unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].owner_id, "owner-1");
    }

    #[test]
    fn missing_credentials_means_not_configured() {
        let store = store();
        let bot = store
            .create(NewBot {
                owner_id: "owner-1".to_string(),
                channel_token: None,
                channel_secret: None,
                ai_takeover_enabled: false,
                ai_provider: None,
                ai_model: None,
                ai_system_prompt: None,
                ai_rag_threshold: 0.7,
                ai_rag_top_k: 5,
                ai_history_messages: 0,
                ai_retrieval_mode: "vector_only".to_string(),
            })
            .unwrap();
        assert!(!bot.is_configured());
    }
}

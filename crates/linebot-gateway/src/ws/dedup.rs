//! Per-bot LRU of recently broadcast `line_message_id`s (§4.9 "dedup for
//! chat_message"). `new_user_message` envelopes carry the LINE message id;
//! this suppresses a duplicate fan-out if the same id is published twice
//! (e.g. two processes both handling a retried webhook).

use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;

const LRU_CAPACITY: usize = 1000;

#[derive(Default)]
struct BotLru {
    order: VecDeque<String>,
    seen: std::collections::HashSet<String>,
}

impl BotLru {
    fn insert_if_new(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() >= LRU_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }
}

#[derive(Default)]
pub struct ChatDedup {
    by_bot: DashMap<String, Mutex<BotLru>>,
}

impl ChatDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `line_message_id` is seen for this
    /// bot, `false` on every subsequent call — the caller should suppress
    /// fan-out on `false`.
    pub fn admit(&self, bot_id: &str, line_message_id: &str) -> bool {
        let entry = self.by_bot.entry(bot_id.to_string()).or_default();
        entry.lock().unwrap().insert_if_new(line_message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_admits_repeat_suppressed() {
        let dedup = ChatDedup::new();
        assert!(dedup.admit("b1", "m-1"));
        assert!(!dedup.admit("b1", "m-1"));
    }

    #[test]
    fn distinct_bots_have_independent_windows() {
        let dedup = ChatDedup::new();
        assert!(dedup.admit("b1", "m-1"));
        assert!(dedup.admit("b2", "m-1"));
    }
}

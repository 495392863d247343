pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::ConversationError;
pub use store::ConversationStore;
pub use types::{AdminIdentity, Conversation, InboundEvent, Message, SenderFilter, SenderType};

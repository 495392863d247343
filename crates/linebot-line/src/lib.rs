//! LINE Messaging API edge: inbound signature verification and event
//! decoding (C1), media ingestion (C3), and outbound reply/push dispatch
//! (C8). Everything here is pure protocol/IO plumbing against LINE's
//! actual API — persistence is delegated to `linebot-conversations`.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod media;
pub mod signature;

pub use client::LineClient;
pub use dispatch::{DispatchNotifier, NoopNotifier, ReplyDispatcher};
pub use error::{LineError, Result};
pub use events::{parse_webhook_body, LineEvent};
pub use media::{fetch_and_store, run_detached as run_media_fetch_detached, MediaFetchJob, ObjectStore};
pub use signature::{is_verification_probe, verify_signature};

pub mod channels;
pub mod frames;
pub mod handshake;

pub use channels::{RedisTopic, SubscriptionChannel};
pub use frames::{ControlFrame, EnvelopeKind, WsEnvelope};

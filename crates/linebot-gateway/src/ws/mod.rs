//! WebSocket Fabric (C9): process-local connection registry, the Redis
//! cross-process bridge, and the axum upgrade handlers.

pub mod bridge;
pub mod connection;
pub mod dedup;
pub mod registry;

pub use bridge::Broadcaster;
pub use registry::WsRegistry;

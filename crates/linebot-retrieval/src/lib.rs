pub mod error;
pub mod intent;
pub mod pipeline;
pub mod types;

pub use error::{RetrievalError, Result};
pub use intent::classify;
pub use pipeline::{format_context, RetrievalPipeline};
pub use types::{Intent, RetrievalMode, RetrievalSettings, RetrievedChunk};

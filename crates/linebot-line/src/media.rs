use async_trait::async_trait;
use tracing::{error, info};

use linebot_core::types::{media_object_path, BotId};

use crate::client::LineClient;
use crate::error::{LineError, Result};

/// Object-store interface C3 depends on (§6 "Object Store"). The actual
/// MinIO/S3 wiring is out of scope (§1 Non-goals); the gateway supplies a
/// concrete implementation at startup.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> std::result::Result<(), String>;

    /// Presigned or proxy URL LINE (and the operator dashboard) will see
    /// in place of the raw bucket location.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Everything C3 needs to fetch one media message and patch it back onto
/// its already-persisted user Message (§4.3).
pub struct MediaFetchJob {
    pub bot_id: Option<String>,
    /// The store-assigned `Message.id` to patch, not the LINE message id.
    pub message_id: String,
    pub line_message_id: String,
    /// One of "image", "video", "audio".
    pub message_type: String,
}

fn kind_and_ext(message_type: &str, content_type: Option<&str>) -> (&'static str, &'static str) {
    match message_type {
        "image" => (
            "img",
            match content_type {
                Some(ct) if ct.contains("png") => "png",
                _ => "jpg",
            },
        ),
        "video" => ("video", "mp4"),
        "audio" => ("audio", "m4a"),
        _ => ("misc", "bin"),
    }
}

/// Fetch the binary, upload it, and patch the message — §4.3's full
/// contract. Never re-uploads if `patch_media` reports the fields were
/// already set (another worker, or a retried job, won; this one no-ops).
pub async fn fetch_and_store(
    job: MediaFetchJob,
    line_client: &LineClient,
    object_store: &dyn ObjectStore,
    bucket: &str,
    conversations: &linebot_conversations::ConversationStore,
) -> Result<()> {
    let (bytes, content_type) = line_client
        .fetch_content(&job.line_message_id)
        .await
        .map_err(|e| LineError::MediaFetchFailed(e.to_string()))?;

    let (kind, ext) = kind_and_ext(&job.message_type, content_type.as_deref());
    let bot_id = job.bot_id.as_deref().map(BotId::from);
    let path = media_object_path(bot_id.as_ref(), kind, ext);

    object_store
        .put(bucket, &path, bytes, content_type)
        .await
        .map_err(LineError::MediaFetchFailed)?;

    let url = object_store.public_url(bucket, &path);

    let patched = conversations
        .patch_media(&job.message_id, &url, &path)
        .map_err(|e| LineError::MediaFetchFailed(e.to_string()))?;

    if patched {
        info!(message_id = %job.message_id, %path, "media ingested");
    }
    Ok(())
}

/// Fire-and-forget wrapper for the orchestrator: spawn this, never await
/// it. Failures are logged and leave the message's media fields null,
/// per §4.3's failure policy — there is no error to propagate to the
/// webhook ACK because the ACK has already happened by the time this runs.
pub async fn run_detached(
    job: MediaFetchJob,
    line_client: LineClient,
    object_store: std::sync::Arc<dyn ObjectStore>,
    bucket: String,
    conversations: std::sync::Arc<linebot_conversations::ConversationStore>,
) {
    let message_id = job.message_id.clone();
    if let Err(e) = fetch_and_store(job, &line_client, object_store.as_ref(), &bucket, &conversations).await
    {
        error!(message_id = %message_id, error = %e, "media fetch failed, message remains without media");
    }
}

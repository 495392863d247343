//! Concrete `ObjectStore` for C3 (§6 "Object Store"). MinIO/S3 wiring is
//! out of scope (§1 Non-goals); this is a local-disk implementation that
//! serves the same contract — `put` writes under a root directory, and
//! `public_url` points at this process's own `/media` proxy route so LINE
//! and the dashboard never see a raw filesystem path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::instrument;

use linebot_line::ObjectStore;

pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn resolve(&self, bucket: &str, path: &str) -> PathBuf {
        self.root.join(bucket).join(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(skip(self, bytes))]
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<(), String> {
        let full = self.resolve(bucket, path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("mkdir failed: {e}"))?;
        }
        fs::write(&full, bytes)
            .await
            .map_err(|e| format!("write failed: {e}"))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/media/{}/{}",
            self.base_url.trim_end_matches('/'),
            bucket,
            path
        )
    }
}

/// Reject any resolved path that escapes `root` — defends the `/media`
/// proxy route against a `..`-laden `path` segment.
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    let Ok(root) = root.canonicalize() else {
        return false;
    };
    match candidate.canonicalize() {
        Ok(resolved) => resolved.starts_with(root),
        Err(_) => false,
    }
}

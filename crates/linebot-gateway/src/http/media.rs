//! `GET /media/{bucket}/{*path}` — the public side of C3's object store
//! (§6 "Object Store"). `LocalObjectStore::public_url` points back at
//! this route, so whatever C3 writes is servable without exposing the
//! filesystem layout to LINE or the dashboard.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::app::AppState;
use crate::object_store::is_contained;

pub async fn media_handler(
    State(state): State<Arc<AppState>>,
    Path((bucket, path)): Path<(String, String)>,
) -> impl IntoResponse {
    let media_root = format!("{}/media", state.config.database.data_dir.trim_end_matches('/'));
    let root = std::path::PathBuf::from(&media_root);
    let full = root.join(&bucket).join(&path);

    if !is_contained(&root, &full) {
        return (StatusCode::FORBIDDEN, "invalid path").into_response();
    }

    let file = match fs::File::open(&full).await {
        Ok(file) => file,
        Err(e) => {
            warn!(bucket = %bucket, path = %path, error = %e, "media file not found");
            return (StatusCode::NOT_FOUND, "not found").into_response();
        }
    };

    let content_type = mime_guess::from_path(&full).first_or_octet_stream();
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    ([(header::CONTENT_TYPE, content_type.to_string())], body).into_response()
}

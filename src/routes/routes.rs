//! Defines routes for the file storage API.
//!
//! - `POST   /api/files`: multipart upload into one owner slot
//! - `GET    /api/files?ownerType=&item=&linkID=`: list a slot
//! - `DELETE /api/files`: remove entries from a slot
//! - `GET    /api/files/{digest}`: download content
//! - `HEAD   /api/files/{digest}`: content headers only
//! - `GET    /healthz`, `GET /readyz`

use crate::{
    handlers::{
        file_handlers::{delete_files, get_file, head_file, list_files, upload_files},
        health_handlers::{healthz, readyz},
    },
    services::storage_service::{ServiceSettings, StorageService},
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};

/// Build the router; handlers share the `StorageService` state.
///
/// Request bodies on `/api/files` are capped at `max_request_size`; the
/// upload handler checks the per-file limit while reading parts.
pub fn routes(settings: &ServiceSettings) -> Router<StorageService> {
    let body_limit = usize::try_from(settings.max_request_size).unwrap_or(usize::MAX);
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/files",
            get(list_files)
                .post(upload_files)
                .delete(delete_files)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/files/{digest}", get(get_file).head(head_file))
}

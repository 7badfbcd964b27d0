//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness ("ok")
//! - GET /readyz   -> readiness: schema reachable, storage dir writable

use crate::services::storage_service::StorageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// HTTP 200 when every check passes, 503 otherwise; the body lists each
/// check with its error, if any.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", CheckStatus::from(check_schema(&service).await));
    checks.insert("disk", CheckStatus::from(check_disk(&service).await));

    let ready = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if ready { "ok".into() } else { "error".into() },
        checks,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// The registry table answers a query.
async fn check_schema(service: &StorageService) -> Result<(), String> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blobs")
        .fetch_one(&*service.db)
        .await
        .map(|_| ())
        .map_err(|e| format!("error: {}", e))
}

/// A probe file can be written, read back and removed under `base_path`.
async fn check_disk(service: &StorageService) -> Result<(), String> {
    fs::create_dir_all(&service.base_path)
        .await
        .map_err(|e| format!("could not create storage dir: {}", e))?;

    let probe = service.base_path.join(format!(".tmp-readyz-{}", Uuid::new_v4()));
    fs::write(&probe, b"readyz")
        .await
        .map_err(|e| format!("could not write probe: {}", e))?;
    let read = fs::read(&probe).await;
    let removed = fs::remove_file(&probe).await;

    match read {
        Ok(bytes) if bytes == b"readyz" => {}
        Ok(_) => return Err("probe content mismatch".into()),
        Err(e) => return Err(format!("could not read probe: {}", e)),
    }
    removed.map_err(|e| format!("could not remove probe: {}", e))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(error) => Self {
                ok: false,
                error: Some(error),
            },
        }
    }
}

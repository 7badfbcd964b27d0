//! Represents the single physical copy of some content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered blob: the bytes for one digest, stored once.
///
/// The `Blob` row carries storage coordinates only; the bytes live on disk
/// under `path` and, optionally, in the database mirror.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Blob {
    /// Lowercase hex md5 of the content.
    pub digest: String,

    /// Full path of the primary copy on disk.
    pub path: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Row id in `blob_mirror` when a secondary copy exists.
    pub secondary_handle: Option<i64>,

    pub created_at: DateTime<Utc>,
}

//! Ownership index: binds digests to logical addresses.
//!
//! An address holds at most one record. Uploading the same bytes to the
//! same address again is a no-op that returns the existing record; this is
//! the idempotence contract the upload pipeline relies on to treat repeated
//! uploads as success.

use crate::models::{
    digest::ContentDigest,
    file_record::{FileRecord, LogicalAddress},
};
use crate::services::error::{StorageError, StorageResult};
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};

const RECORD_COLUMNS: &str =
    "id, digest, owner_type, item, link_id, name, original_name, size_bytes, created_at";

/// Result of [`upsert`].
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: FileRecord,
    /// The digest had no blob before this upload.
    pub is_new_blob: bool,
    /// A record was created; false for an idempotent repeat.
    pub is_new_address: bool,
}

pub async fn find(
    conn: &mut SqliteConnection,
    address: &LogicalAddress,
) -> StorageResult<Option<FileRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM file_records
         WHERE owner_type = ? AND item = ? AND link_id = ? AND name = ?"
    );
    let record = sqlx::query_as::<_, FileRecord>(&sql)
        .bind(&address.owner_type)
        .bind(&address.item)
        .bind(address.link_id)
        .bind(&address.name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record)
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> StorageResult<Option<FileRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM file_records WHERE id = ?");
    let record = sqlx::query_as::<_, FileRecord>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record)
}

/// Delete a record by id and return it, or `None` if there was none.
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> StorageResult<Option<FileRecord>> {
    let sql = format!("DELETE FROM file_records WHERE id = ? RETURNING {RECORD_COLUMNS}");
    let record = sqlx::query_as::<_, FileRecord>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record)
}

/// Name to present for a digest: that of its oldest record.
pub async fn first_name_for(
    conn: &mut SqliteConnection,
    digest: &ContentDigest,
) -> StorageResult<Option<String>> {
    let name: Option<String> = sqlx::query_scalar(
        "SELECT name FROM file_records WHERE digest = ? ORDER BY id ASC LIMIT 1",
    )
    .bind(digest.to_hex())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(name)
}

/// Bind `digest` to `address`.
///
/// `blob_existed` says whether the digest was registered before the current
/// upload. When the address is already bound to different content, the file
/// is stored under `<digest>_<name>` in the same slot instead.
pub async fn upsert(
    conn: &mut SqliteConnection,
    address: &LogicalAddress,
    digest: &ContentDigest,
    size_bytes: i64,
    blob_existed: bool,
) -> StorageResult<UpsertOutcome> {
    let hex = digest.to_hex();
    let mut target = address.clone();

    if let Some(existing) = find(conn, &target).await? {
        ensure_backed(conn, &existing).await?;
        if existing.digest == hex {
            info!("repeated upload of {} to {}", hex, target);
            return Ok(UpsertOutcome {
                record: existing,
                is_new_blob: false,
                is_new_address: false,
            });
        }

        target = address.with_name(format!("{}_{}", hex, address.name));
        debug!(
            "{} holds {}, storing {} as {}",
            address, existing.digest, hex, target.name
        );

        if let Some(renamed) = find(conn, &target).await? {
            if renamed.digest != hex {
                return Err(StorageError::Conflict(format!(
                    "{} is bound to {} instead of {}",
                    target, renamed.digest, hex
                )));
            }
            ensure_backed(conn, &renamed).await?;
            return Ok(UpsertOutcome {
                record: renamed,
                is_new_blob: false,
                is_new_address: false,
            });
        }
    }

    let sql = format!(
        "INSERT INTO file_records
            (digest, owner_type, item, link_id, name, original_name, size_bytes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {RECORD_COLUMNS}"
    );
    let record = sqlx::query_as::<_, FileRecord>(&sql)
        .bind(&hex)
        .bind(&target.owner_type)
        .bind(&target.item)
        .bind(target.link_id)
        .bind(&target.name)
        .bind(&address.name)
        .bind(size_bytes)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
    info!("recorded {} as {} (id {})", hex, target, record.id);

    Ok(UpsertOutcome {
        record,
        is_new_blob: !blob_existed,
        is_new_address: true,
    })
}

/// An address whose record points at an unregistered digest cannot be
/// reasoned about; refuse to touch it.
async fn ensure_backed(conn: &mut SqliteConnection, record: &FileRecord) -> StorageResult<()> {
    let backed: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM blobs WHERE digest = ?)")
        .bind(&record.digest)
        .fetch_one(&mut *conn)
        .await?;
    if backed == 0 {
        return Err(StorageError::Conflict(format!(
            "{} references {} which has no stored content",
            record.address(),
            record.digest
        )));
    }
    Ok(())
}

//! Physical blob registry keyed by content digest.
//!
//! Primary copies live flat under `base_path/{digest}`. The optional
//! secondary copy is a row of `blob_mirror`, referenced by integer handle.
//! Registry operations take the caller's connection so they join whatever
//! transaction the caller holds; file operations never touch the database.

use crate::models::{blob::Blob, digest::ContentDigest};
use crate::services::error::{StorageError, StorageResult};
use chrono::Utc;
use sqlx::SqliteConnection;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct DigestStore {
    base_path: PathBuf,
}

impl DigestStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Where the primary copy of `digest` lives.
    pub fn blob_path(&self, digest: &ContentDigest) -> PathBuf {
        self.base_path.join(digest.to_hex())
    }

    pub async fn exists(
        &self,
        conn: &mut SqliteConnection,
        digest: &ContentDigest,
    ) -> StorageResult<bool> {
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM blobs WHERE digest = ?)")
            .bind(digest.to_hex())
            .fetch_one(&mut *conn)
            .await?;
        Ok(exists != 0)
    }

    pub async fn lookup(
        &self,
        conn: &mut SqliteConnection,
        digest: &ContentDigest,
    ) -> StorageResult<Option<Blob>> {
        let blob = sqlx::query_as::<_, Blob>(
            "SELECT digest, path, size_bytes, secondary_handle, created_at
             FROM blobs WHERE digest = ?",
        )
        .bind(digest.to_hex())
        .fetch_optional(&mut *conn)
        .await?;
        Ok(blob)
    }

    /// Record a blob whose primary copy has been written to `path`.
    pub async fn register(
        &self,
        conn: &mut SqliteConnection,
        digest: &ContentDigest,
        path: &Path,
        size_bytes: i64,
        secondary_handle: Option<i64>,
    ) -> StorageResult<Blob> {
        let blob = sqlx::query_as::<_, Blob>(
            "INSERT INTO blobs (digest, path, size_bytes, secondary_handle, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING digest, path, size_bytes, secondary_handle, created_at",
        )
        .bind(digest.to_hex())
        .bind(path.to_string_lossy().into_owned())
        .bind(size_bytes)
        .bind(secondary_handle)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
        debug!(digest = %digest, size_bytes, "registered blob");
        Ok(blob)
    }

    /// Number of ownership records referencing `digest`.
    pub async fn reference_count(
        &self,
        conn: &mut SqliteConnection,
        digest: &ContentDigest,
    ) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_records WHERE digest = ?")
            .bind(digest.to_hex())
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    /// Drop the registry row (and mirror row) of `digest` if no ownership
    /// record references it any more. Returns the dropped blob so the caller
    /// can unlink its file once the transaction has committed.
    pub async fn remove_if_orphaned(
        &self,
        conn: &mut SqliteConnection,
        digest: &ContentDigest,
    ) -> StorageResult<Option<Blob>> {
        let hex = digest.to_hex();
        let removed = sqlx::query_as::<_, Blob>(
            "DELETE FROM blobs
             WHERE digest = ?
               AND NOT EXISTS (SELECT 1 FROM file_records WHERE digest = ?)
             RETURNING digest, path, size_bytes, secondary_handle, created_at",
        )
        .bind(&hex)
        .bind(&hex)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(handle) = removed.as_ref().and_then(|b| b.secondary_handle) {
            sqlx::query("DELETE FROM blob_mirror WHERE id = ?")
                .bind(handle)
                .execute(&mut *conn)
                .await?;
        }
        Ok(removed)
    }

    /// Copy `data` into the secondary store and return its handle.
    pub async fn mirror(&self, conn: &mut SqliteConnection, data: &[u8]) -> StorageResult<i64> {
        let handle: i64 = sqlx::query_scalar(
            "INSERT INTO blob_mirror (data, created_at) VALUES (?, ?) RETURNING id",
        )
        .bind(data)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
        Ok(handle)
    }

    pub async fn read_mirror(
        &self,
        conn: &mut SqliteConnection,
        handle: i64,
    ) -> StorageResult<Option<Vec<u8>>> {
        let data: Option<Vec<u8>> = sqlx::query_scalar("SELECT data FROM blob_mirror WHERE id = ?")
            .bind(handle)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(data)
    }

    /// Write the primary copy for `digest` and return its path.
    ///
    /// The bytes go to a temp file that is fsynced and renamed into place,
    /// so a reader never sees a partial blob.
    pub async fn write_primary(
        &self,
        digest: &ContentDigest,
        name: &str,
        data: &[u8],
    ) -> StorageResult<PathBuf> {
        let path = self.blob_path(digest);
        write_atomically(&path, name, data).await?;
        Ok(path)
    }

    /// Recreate the primary copy of `blob` from bytes recovered elsewhere.
    pub async fn restore(&self, blob: &Blob, data: &[u8]) -> StorageResult<()> {
        write_atomically(Path::new(&blob.path), &blob.digest, data).await
    }

    /// Remove the primary copy. `Ok(false)` when it was already gone.
    pub async fn unlink(&self, blob: &Blob) -> StorageResult<bool> {
        match fs::remove_file(&blob.path).await {
            Ok(()) => {
                debug!("removed physical file {}", blob.path);
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

/// Name prefix of in-progress writes in the storage directory.
pub(crate) const TEMP_PREFIX: &str = ".tmp-";

async fn write_atomically(path: &Path, name: &str, data: &[u8]) -> StorageResult<()> {
    let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
        StorageError::Io(io::Error::new(
            ErrorKind::Other,
            "blob path missing parent directory",
        ))
    })?;
    fs::create_dir_all(&parent).await?;
    let tmp_path = parent.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));

    let result = async {
        let mut file = File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;

        let written = file.metadata().await?.len();
        let expected = data.len() as u64;
        if written != expected {
            return Err(StorageError::ShortWrite {
                name: name.to_string(),
                written,
                expected,
            });
        }
        drop(file);

        fs::rename(&tmp_path, path).await?;
        Ok::<(), StorageError>(())
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

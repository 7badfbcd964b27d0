//! Serving blob content by digest.

use crate::models::{blob::Blob, digest::ContentDigest};
use crate::services::{
    error::{StorageError, StorageResult},
    ownership,
    storage_service::StorageService,
};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::{io::ErrorKind, path::PathBuf};
use tokio::fs::File;
use tracing::{info, warn};

/// What a reader needs to present a blob.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub digest: ContentDigest,
    /// Name of the oldest record for the digest, or the digest itself.
    pub name: String,
    pub size_bytes: i64,
    #[serde(skip)]
    pub path: PathBuf,
}

impl StorageService {
    /// Open the primary copy of `digest` for streaming.
    ///
    /// A missing primary copy is rebuilt from the mirror when the blob has a
    /// secondary handle.
    pub async fn open_blob(&self, digest: &ContentDigest) -> StorageResult<(StoredFile, File)> {
        let mut conn = self.db.acquire().await?;
        let (blob, stored) = self.describe(&mut conn, digest).await?;

        match File::open(&stored.path).await {
            Ok(file) => return Ok((stored, file)),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::Io(err)),
        }

        let Some(handle) = blob.secondary_handle else {
            warn!("{} registered but {} is missing", blob.digest, blob.path);
            return Err(StorageError::not_found(format!(
                "content of {} is missing",
                blob.digest
            )));
        };
        let Some(data) = self.digests.read_mirror(&mut conn, handle).await? else {
            warn!("{} has neither a file nor mirror row {}", blob.digest, handle);
            return Err(StorageError::not_found(format!(
                "content of {} is missing",
                blob.digest
            )));
        };
        drop(conn);

        self.digests.restore(&blob, &data).await?;
        info!("restored {} from mirror row {}", blob.path, handle);

        let file = File::open(&stored.path).await?;
        Ok((stored, file))
    }

    /// Name and size of `digest` without touching its payload.
    pub async fn blob_metadata(&self, digest: &ContentDigest) -> StorageResult<StoredFile> {
        let mut conn = self.db.acquire().await?;
        let (_, stored) = self.describe(&mut conn, digest).await?;
        Ok(stored)
    }

    async fn describe(
        &self,
        conn: &mut SqliteConnection,
        digest: &ContentDigest,
    ) -> StorageResult<(Blob, StoredFile)> {
        let blob = self
            .digests
            .lookup(conn, digest)
            .await?
            .ok_or_else(|| StorageError::not_found(format!("no content for {}", digest)))?;
        let name = ownership::first_name_for(conn, digest)
            .await?
            .unwrap_or_else(|| digest.to_hex());

        let stored = StoredFile {
            digest: *digest,
            name,
            size_bytes: blob.size_bytes,
            path: PathBuf::from(&blob.path),
        };
        Ok((blob, stored))
    }
}

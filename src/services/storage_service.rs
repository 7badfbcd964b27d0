//! src/services/storage_service.rs
//!
//! StorageService: content-addressed file storage backed by SQLite for the
//! blob registry, ownership index and owner lists, and by a flat directory
//! of digest-named files for payloads.
//!
//! The pipelines live next door: `upload.rs`, `deletion.rs`, `retrieval.rs`.

use crate::models::{descriptor::FileDescriptor, digest::ContentDigest};
use crate::services::{
    digest_store::{DigestStore, TEMP_PREFIX},
    error::{StorageError, StorageResult},
    owner_registry::OwnerRegistry,
    write_gate::WriteGate,
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::fs;
use tracing::{info, warn};

/// Tunables for [`StorageService`].
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Largest accepted file, in bytes.
    pub max_upload_size: u64,
    /// Largest accepted upload request, all parts together, in bytes.
    pub max_request_size: u64,
    /// Also copy every new blob into the `blob_mirror` table.
    pub mirror_to_db: bool,
    /// Deadline for a single gated operation.
    pub operation_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_upload_size: 2 * 1024 * 1024,
            max_request_size: 32 * 1024 * 1024,
            mirror_to_db: false,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where blob payloads are stored.
    pub base_path: PathBuf,

    pub(crate) digests: DigestStore,
    pub(crate) registry: Arc<OwnerRegistry>,
    pub(crate) gate: WriteGate,
    pub(crate) settings: ServiceSettings,
}

impl StorageService {
    /// Service over the built-in owner registry.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, settings: ServiceSettings) -> Self {
        Self::with_registry(db, base_path, settings, OwnerRegistry::builtin())
    }

    pub fn with_registry(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        settings: ServiceSettings,
        registry: OwnerRegistry,
    ) -> Self {
        let base_path = base_path.into();
        Self {
            db,
            digests: DigestStore::new(base_path.clone()),
            base_path,
            registry: Arc::new(registry),
            gate: WriteGate::new(settings.operation_timeout),
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Current list of one owner slot.
    ///
    /// Read inside a transaction so the list is a consistent snapshot even
    /// while a mutation is in flight.
    pub async fn list_files(
        &self,
        owner_type: &str,
        item: &str,
        link_id: i64,
    ) -> StorageResult<Vec<FileDescriptor>> {
        let slot = self.registry.resolve(owner_type, item)?;
        let mut tx = self.db.begin().await?;
        let list = slot.load(&mut tx, link_id).await?;
        tx.commit().await?;
        Ok(list.into_entries())
    }

    /// Remove files in the storage directory whose digest is not registered.
    ///
    /// Failed batches can leave such files behind: their disk writes happen
    /// before the transaction that registers them commits. Temp files of
    /// writes cut short are removed too, once they are older than the
    /// operation deadline.
    pub async fn sweep_orphans(&self) -> StorageResult<Vec<ContentDigest>> {
        self.gate
            .run("sweep", async {
                let mut removed = Vec::new();
                let mut temps = 0usize;
                let mut entries = match fs::read_dir(&self.base_path).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
                    Err(err) => return Err(StorageError::Io(err)),
                };

                let mut conn = self.db.acquire().await?;
                while let Some(entry) = entries.next_entry().await? {
                    let metadata = entry.metadata().await?;
                    if !metadata.is_file() {
                        continue;
                    }
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else {
                        continue;
                    };

                    if name.starts_with(TEMP_PREFIX) {
                        // A write in another process may still own a fresh one.
                        let stale = metadata
                            .modified()
                            .ok()
                            .and_then(|at| at.elapsed().ok())
                            .is_some_and(|age| age > self.settings.operation_timeout);
                        if !stale {
                            continue;
                        }
                        match fs::remove_file(entry.path()).await {
                            Ok(()) => temps += 1,
                            Err(err) => warn!("could not remove temp file {}: {}", name, err),
                        }
                        continue;
                    }

                    let Ok(digest) = ContentDigest::from_hex(name) else {
                        continue;
                    };
                    if self.digests.exists(&mut conn, &digest).await? {
                        continue;
                    }
                    match fs::remove_file(entry.path()).await {
                        Ok(()) => removed.push(digest),
                        Err(err) => warn!("could not remove orphan {}: {}", digest, err),
                    }
                }

                info!(
                    "swept {} orphaned blob files and {} stale temp files",
                    removed.len(),
                    temps
                );
                Ok(removed)
            })
            .await
    }
}

/// Owner-slot fields every request must carry.
pub(crate) fn ensure_slot_fields(owner_type: &str, item: &str, link_id: i64) -> StorageResult<()> {
    if owner_type.trim().is_empty() {
        return Err(StorageError::validation("ownerType is required"));
    }
    if item.trim().is_empty() {
        return Err(StorageError::validation("item is required"));
    }
    if link_id == 0 {
        return Err(StorageError::validation("linkID is required"));
    }
    Ok(())
}

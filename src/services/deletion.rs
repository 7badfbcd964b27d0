//! Removing entries from an owner list and collecting unreferenced blobs.

use crate::models::{
    blob::Blob,
    descriptor::{DeleteRequest, FileDescriptor},
};
use crate::services::{
    error::{StorageError, StorageResult},
    file_list::DeleteSelector,
    ownership,
    storage_service::{StorageService, ensure_slot_fields},
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What a deletion did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// Owner rows whose list was rewritten.
    pub rows_affected: u64,
    /// Entries taken out of the list.
    pub removed: Vec<FileDescriptor>,
    /// Digests whose last reference went away and whose file was removed.
    pub purged: Vec<String>,
    /// Digests whose last reference went away but whose file was already
    /// missing or could not be removed.
    pub missing: Vec<String>,
}

impl StorageService {
    /// Delete the entries of one owner slot picked by `req`.
    ///
    /// Unless `req.reserved` is set, the records behind the removed entries
    /// are deleted too, and blobs left without any record are removed from
    /// the registry, the mirror and the disk.
    pub async fn delete_files(&self, req: &DeleteRequest) -> StorageResult<DeleteOutcome> {
        ensure_slot_fields(&req.owner_type, &req.item, req.link_id)?;
        let selector = DeleteSelector::from_request(req.sn, req.name.as_deref());

        let outcome = self
            .gate
            .run("delete", async {
                let (mut outcome, orphaned) = self.delete_entries(req, &selector).await?;
                // Unlink after commit but while still holding the gate.
                for blob in orphaned {
                    match self.digests.unlink(&blob).await {
                        Ok(true) => outcome.purged.push(blob.digest),
                        Ok(false) => {
                            warn!("{} inexistent, nothing to remove", blob.path);
                            outcome.missing.push(blob.digest);
                        }
                        Err(err) => {
                            warn!("could not remove {}: {}", blob.path, err);
                            outcome.missing.push(blob.digest);
                        }
                    }
                }
                Ok(outcome)
            })
            .await?;

        info!(
            "deleted {} entr(ies) from {}.{}.{}, purged {} blob(s)",
            outcome.removed.len(),
            req.owner_type,
            req.item,
            req.link_id,
            outcome.purged.len()
        );
        Ok(outcome)
    }

    async fn delete_entries(
        &self,
        req: &DeleteRequest,
        selector: &DeleteSelector,
    ) -> StorageResult<(DeleteOutcome, Vec<Blob>)> {
        let slot = self.registry.resolve(&req.owner_type, &req.item)?;
        let mut tx = self.db.begin().await?;

        let mut list = slot.load(&mut tx, req.link_id).await?;
        let removed = list.delete(selector)?;

        let rows_affected = slot.store(&mut tx, req.link_id, &list).await?;
        if rows_affected == 0 {
            return Err(StorageError::Integrity(format!(
                "updating {}.{}.{} touched no row",
                req.owner_type, req.item, req.link_id
            )));
        }

        let mut orphaned = Vec::new();
        if !req.reserved {
            for entry in &removed {
                if ownership::delete(&mut tx, entry.file_id).await?.is_none() {
                    warn!(
                        "entry {} of {}.{}.{} had no record (id {})",
                        entry.name, req.owner_type, req.item, req.link_id, entry.file_id
                    );
                }
                let remaining = self.digests.reference_count(&mut tx, &entry.digest).await?;
                if remaining > 0 {
                    debug!("{} still referenced {} time(s)", entry.digest, remaining);
                    continue;
                }
                if let Some(blob) = self
                    .digests
                    .remove_if_orphaned(&mut tx, &entry.digest)
                    .await?
                {
                    orphaned.push(blob);
                }
            }
        }

        tx.commit().await?;

        Ok((
            DeleteOutcome {
                rows_affected,
                removed,
                ..DeleteOutcome::default()
            },
            orphaned,
        ))
    }
}

//! Multi-file upload into one owner slot.
//!
//! A batch is validated, then every file is hashed, stored if its digest is
//! new, bound to its address and inserted into the slot's list. Registry,
//! index and list changes share one transaction; payload files written for
//! new digests stay on disk if the batch fails (see `sweep_orphans`).

use crate::models::{
    descriptor::{FileDescriptor, ListedFile, UploadTarget},
    digest::ContentDigest,
    file_record::LogicalAddress,
};
use crate::services::{
    error::{StorageError, StorageResult},
    ownership,
    storage_service::{StorageService, ensure_slot_fields},
};
use bytes::Bytes;
use std::collections::HashSet;
use tracing::{debug, info};

/// One file of an upload batch, fully received.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    pub name: String,
    pub data: Bytes,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl StorageService {
    /// Store `files` in the slot named by `target` and return the slot's
    /// whole list afterwards.
    ///
    /// Entries created by this call come back with `new: true`. A file whose
    /// bytes are already bound to the same address is accepted without
    /// changing anything and shows up as an ordinary entry.
    pub async fn upload(
        &self,
        target: &UploadTarget,
        files: Vec<IncomingFile>,
    ) -> StorageResult<Vec<ListedFile>> {
        ensure_slot_fields(&target.owner_type, &target.item, target.link_id)?;
        if files.is_empty() {
            return Err(StorageError::validation("no file in upload"));
        }
        for (i, file) in files.iter().enumerate() {
            self.validate_file(i, file)?;
        }

        self.gate
            .run("upload", self.upload_batch(target, &files))
            .await
    }

    fn validate_file(&self, index: usize, file: &IncomingFile) -> StorageResult<()> {
        if file.name.trim().is_empty() {
            return Err(StorageError::validation(format!(
                "file #{index} has an empty name"
            )));
        }
        if file.data.is_empty() {
            return Err(StorageError::validation(format!(
                "file #{index} ({}) is empty",
                file.name
            )));
        }
        let limit = self.settings.max_upload_size;
        if file.data.len() as u64 > limit {
            return Err(StorageError::validation(format!(
                "file {} is {:.2} MiB, over the {:.2} MiB limit",
                file.name,
                file.data.len() as f64 / (1024.0 * 1024.0),
                limit as f64 / (1024.0 * 1024.0)
            )));
        }
        Ok(())
    }

    async fn upload_batch(
        &self,
        target: &UploadTarget,
        files: &[IncomingFile],
    ) -> StorageResult<Vec<ListedFile>> {
        let slot = self.registry.resolve(&target.owner_type, &target.item)?;
        let mut tx = self.db.begin().await?;
        let mut list = slot.load(&mut tx, target.link_id).await?;

        let mut next_sn = target.sn;
        let mut fresh: HashSet<i64> = HashSet::new();

        for file in files {
            let digest = ContentDigest::compute(&file.data);
            let size_bytes = file.data.len() as i64;

            let known = self.digests.lookup(&mut tx, &digest).await?;
            let blob_existed = known.is_some();
            let blob = match known {
                Some(blob) => blob,
                None => {
                    let path = self
                        .digests
                        .write_primary(&digest, &file.name, &file.data)
                        .await?;
                    let handle = if self.settings.mirror_to_db {
                        Some(self.digests.mirror(&mut tx, &file.data).await?)
                    } else {
                        None
                    };
                    self.digests
                        .register(&mut tx, &digest, &path, size_bytes, handle)
                        .await?
                }
            };

            let address = LogicalAddress::new(
                &target.owner_type,
                &target.item,
                target.link_id,
                &file.name,
            );
            let outcome =
                ownership::upsert(&mut tx, &address, &digest, size_bytes, blob_existed).await?;
            let record = outcome.record;
            debug!(
                new_blob = outcome.is_new_blob,
                new_address = outcome.is_new_address,
                "{} bound as {}",
                digest,
                record.name
            );

            let listed = list.entries().iter().any(|e| e.file_id == record.id);
            if !outcome.is_new_address && listed {
                debug!("{} already listed in {}", file.name, address);
                continue;
            }

            let descriptor = FileDescriptor {
                sn: 0,
                name: record.name.clone(),
                label: target.label.clone(),
                digest,
                file_id: record.id,
                file_oid: blob.secondary_handle,
            };
            let at = list.insert(descriptor, next_sn);
            next_sn = next_sn.map(|_| at as i64 + 1);
            fresh.insert(record.id);
        }

        if !fresh.is_empty() {
            let affected = slot.store(&mut tx, target.link_id, &list).await?;
            if affected == 0 {
                return Err(StorageError::Integrity(format!(
                    "updating {}.{}.{} touched no row",
                    target.owner_type, target.item, target.link_id
                )));
            }
        }
        tx.commit().await?;

        info!(
            "uploaded {} file(s) to {}.{}.{}, {} new",
            files.len(),
            target.owner_type,
            target.item,
            target.link_id,
            fresh.len()
        );

        Ok(list
            .into_entries()
            .into_iter()
            .map(|d| {
                if fresh.contains(&d.file_id) {
                    ListedFile::fresh(d, target)
                } else {
                    ListedFile::existing(d)
                }
            })
            .collect())
    }
}

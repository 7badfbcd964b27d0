//! The ordered file list stored in an owner column.
//!
//! Every mutation ends with a renumbering pass so that the `SN` of each
//! entry equals its index. Callers persist the whole list in one statement;
//! nothing here touches storage.

use crate::models::descriptor::FileDescriptor;
use crate::services::error::{StorageError, StorageResult};

/// Which entries a deletion removes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteSelector {
    All,
    ByName(String),
    /// Position in the list; positions past the end select the last entry.
    BySn(usize),
}

impl DeleteSelector {
    /// Interpret the `SN`/`name` pair of a deletion request.
    pub fn from_request(sn: i64, name: Option<&str>) -> Self {
        if sn < 0 {
            return Self::All;
        }
        match name {
            Some(name) if !name.is_empty() => Self::ByName(name.to_string()),
            _ => Self::BySn(sn as usize),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileList {
    entries: Vec<FileDescriptor>,
}

impl FileList {
    pub fn new(entries: Vec<FileDescriptor>) -> Self {
        let mut list = Self { entries };
        list.renumber();
        list
    }

    /// Decode a column value. NULL, blank, `{}` and anything that is not a
    /// JSON array read as an empty list.
    pub fn decode(raw: Option<&str>) -> StorageResult<Self> {
        let raw = match raw.map(str::trim) {
            Some(s) if s.starts_with('[') => s,
            _ => return Ok(Self::default()),
        };
        let entries: Vec<FileDescriptor> = serde_json::from_str(raw)?;
        Ok(Self { entries })
    }

    pub fn encode(&self) -> StorageResult<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FileDescriptor] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FileDescriptor> {
        self.entries
    }

    /// Insert `descriptor` and return the index it landed at.
    ///
    /// `None` appends; a requested SN at or below zero goes to the head and
    /// one at or past the end appends.
    pub fn insert(&mut self, mut descriptor: FileDescriptor, requested_sn: Option<i64>) -> usize {
        let len = self.entries.len();
        let index = match requested_sn {
            None => len,
            Some(sn) if sn <= 0 => 0,
            Some(sn) if sn as usize >= len => len,
            Some(sn) => sn as usize,
        };
        descriptor.sn = index as i64;
        self.entries.insert(index, descriptor);
        self.renumber();
        index
    }

    /// Remove the entries picked by `selector` and return them.
    pub fn delete(&mut self, selector: &DeleteSelector) -> StorageResult<Vec<FileDescriptor>> {
        if self.entries.is_empty() {
            return Err(nothing_to_delete());
        }

        let removed = match selector {
            DeleteSelector::All => std::mem::take(&mut self.entries),
            DeleteSelector::ByName(name) => {
                let pos = self
                    .entries
                    .iter()
                    .position(|e| &e.name == name)
                    .ok_or_else(nothing_to_delete)?;
                vec![self.entries.remove(pos)]
            }
            DeleteSelector::BySn(sn) => {
                let pos = (*sn).min(self.entries.len() - 1);
                vec![self.entries.remove(pos)]
            }
        };

        self.renumber();
        Ok(removed)
    }

    fn renumber(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.sn = i as i64;
        }
    }
}

fn nothing_to_delete() -> StorageError {
    StorageError::not_found("nothing to delete")
}

//! Ownership records and the logical address they are keyed by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Identifies one usage slot for a file: which owner kind, which file item
/// of that owner, which owner row, and the file name within the slot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LogicalAddress {
    #[serde(rename = "ownerType")]
    pub owner_type: String,
    pub item: String,
    #[serde(rename = "linkID")]
    pub link_id: i64,
    pub name: String,
}

impl LogicalAddress {
    pub fn new(
        owner_type: impl Into<String>,
        item: impl Into<String>,
        link_id: i64,
        name: impl Into<String>,
    ) -> Self {
        Self {
            owner_type: owner_type.into(),
            item: item.into(),
            link_id,
            name: name.into(),
        }
    }

    /// Same slot, different file name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.owner_type, self.item, self.link_id, self.name
        )
    }
}

/// A row of `file_records`: one digest bound to one logical address.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,

    pub digest: String,

    pub owner_type: String,
    pub item: String,
    pub link_id: i64,

    /// Name the file is stored and listed under. Equals `original_name`
    /// unless it had to be disambiguated as `<digest>_<original_name>`.
    pub name: String,

    /// File name as uploaded.
    pub original_name: String,

    pub size_bytes: i64,

    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn address(&self) -> LogicalAddress {
        LogicalAddress::new(&self.owner_type, &self.item, self.link_id, &self.name)
    }
}

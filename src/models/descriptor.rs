//! Entries of the ordered file lists embedded in owner rows, and the request
//! shapes that address those lists.

use crate::models::digest::ContentDigest;
use serde::{Deserialize, Serialize};

/// One entry of an owner's ordered file list.
///
/// Serialized with the field names the owner columns have always used, e.g.
/// `{"SN":0,"name":"a.pdf","label":"invoice","digest":"…","fileID":7}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    #[serde(rename = "SN", default)]
    pub sn: i64,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub digest: ContentDigest,

    /// Id of the backing row in `file_records`.
    #[serde(rename = "fileID")]
    pub file_id: i64,

    /// Handle of the secondary copy, when one was written.
    #[serde(rename = "fileOID", default, skip_serializing_if = "Option::is_none")]
    pub file_oid: Option<i64>,
}

/// A list entry as returned from an upload: the stored descriptor plus,
/// for entries created by that upload, the `new` flag and the owner slot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ListedFile {
    #[serde(flatten)]
    pub descriptor: FileDescriptor,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new: bool,

    #[serde(rename = "ownerType", default, skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,

    #[serde(rename = "linkID", default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<i64>,
}

impl ListedFile {
    pub fn existing(descriptor: FileDescriptor) -> Self {
        Self {
            descriptor,
            new: false,
            owner_type: None,
            item: None,
            link_id: None,
        }
    }

    pub fn fresh(descriptor: FileDescriptor, target: &UploadTarget) -> Self {
        Self {
            descriptor,
            new: true,
            owner_type: Some(target.owner_type.clone()),
            item: Some(target.item.clone()),
            link_id: Some(target.link_id),
        }
    }
}

/// Where an upload batch goes: one owner slot, an optional starting SN and
/// a label shared by every file of the batch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    #[serde(rename = "ownerType")]
    pub owner_type: String,

    pub item: String,

    #[serde(rename = "linkID")]
    pub link_id: i64,

    #[serde(rename = "SN", default)]
    pub sn: Option<i64>,

    #[serde(default)]
    pub label: Option<String>,
}

impl UploadTarget {
    pub fn new(owner_type: impl Into<String>, item: impl Into<String>, link_id: i64) -> Self {
        Self {
            owner_type: owner_type.into(),
            item: item.into(),
            link_id,
            sn: None,
            label: None,
        }
    }

    pub fn at(mut self, sn: i64) -> Self {
        self.sn = Some(sn);
        self
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Body of a deletion request.
///
/// `SN < 0` deletes everything; otherwise a non-empty `name` selects by
/// name, and failing that `SN` selects by position.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeleteRequest {
    #[serde(rename = "ownerType")]
    pub owner_type: String,

    pub item: String,

    #[serde(rename = "linkID")]
    pub link_id: i64,

    #[serde(rename = "SN")]
    pub sn: i64,

    #[serde(default)]
    pub name: Option<String>,

    /// Keep records and physical files; only drop the list entries.
    #[serde(default)]
    pub reserved: bool,
}

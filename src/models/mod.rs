//! Core data models for the file store.
//!
//! `Blob` and `FileRecord` map to database rows via `sqlx::FromRow`;
//! `FileDescriptor` is the JSON shape embedded in owner columns.

pub mod blob;
pub mod descriptor;
pub mod digest;
pub mod file_record;

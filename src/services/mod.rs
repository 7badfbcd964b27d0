pub mod deletion;
pub mod digest_store;
pub mod error;
pub mod file_list;
pub mod owner_registry;
pub mod ownership;
pub mod retrieval;
pub mod storage_service;
pub mod upload;
pub mod write_gate;

//! File-backed persistence.

pub mod atomic_json;
pub mod json_file_store;

pub use atomic_json::AtomicJsonFile;
pub use json_file_store::JsonFileStore;

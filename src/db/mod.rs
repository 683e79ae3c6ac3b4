//! Persistence layer (JSON files on local disk).

pub mod file;
pub mod store;

pub use file::StoreError;
pub use store::{Store, StoreData};

pub mod blob;
pub mod file_store;
pub mod record;

pub use blob::BlobStore;
pub use file_store::FileStore;
pub use record::StorageRecord;

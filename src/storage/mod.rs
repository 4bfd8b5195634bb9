use bytes::Bytes;

use crate::error::StorageError;

mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Blob store holding partition bytes.
///
/// Implementations are shared between the partitioner and the outlier engine
/// behind an `Arc`, so they must tolerate concurrent callers.
pub trait StorageGateway: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value.
    fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()>;

    /// Fetch the bytes under `key`. Missing keys yield [`StorageError::NotFound`].
    fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Metadata-only existence check; never transfers the blob.
    fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// Storage key of partition `index` of a dataset.
pub fn partition_key(dataset_id: &str, index: usize) -> String {
    format!("{}/part{}", dataset_id, index)
}

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{StorageGateway, StorageResult};
use crate::error::StorageError;

/// In-process gateway. Counts writes so callers can observe skipped uploads.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Bytes>>,
    puts: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls since construction.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    pub fn keys(&self) -> Vec<String> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = objects.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl StorageGateway for MemoryStorage {
    fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        objects.insert(key.to_string(), bytes);
        self.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Bytes> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.get(key).cloned().ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects.contains_key(key))
    }
}

use bytes::Bytes;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{StorageGateway, StorageResult};
use crate::error::StorageError;

/// Directory-backed gateway. A key `a/part0` lives at `{root}/a/part0.parquet`.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.parquet", key))
    }
}

fn io_error(key: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        source,
    }
}

impl StorageGateway for LocalStorage {
    fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(key, e))?;
        }

        // Readers never observe a half-written blob: write aside, then rename.
        let tmp_path = path.with_extension("parquet.tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| io_error(key, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| io_error(key, e))?;
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Bytes> {
        match fs::read(self.object_path(key)) {
            Ok(contents) => Ok(Bytes::from(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(io_error(key, e)),
        }
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        match fs::metadata(self.object_path(key)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(key, e)),
        }
    }
}

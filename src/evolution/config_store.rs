//! [`ConfigStore`] implementations.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::config::DocumentFormat;
use crate::error::StorageError;
use crate::storage::{read_optional, write_atomic};
use crate::traits::ConfigStore;

/// Configuration document on disk. The format follows the file extension.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    format: DocumentFormat,
}

impl FileConfigStore {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DocumentFormat::from_path(&path);
        Self { path, format }
    }

    /// Document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    fn format(&self) -> DocumentFormat {
        self.format
    }

    async fn load(&self) -> Result<Vec<u8>, StorageError> {
        Ok(read_optional(&self.path).await?.unwrap_or_default())
    }

    async fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        write_atomic(&self.path, bytes).await
    }
}

/// In-memory configuration document, shared between clones.
#[derive(Debug, Clone)]
pub struct MemoryConfigStore {
    bytes: Arc<Mutex<Vec<u8>>>,
    format: DocumentFormat,
}

impl MemoryConfigStore {
    /// Store holding `initial` in the given format.
    #[must_use]
    pub fn new(format: DocumentFormat, initial: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(initial.into())),
            format,
        }
    }

    /// Copy of the current document.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    fn format(&self) -> DocumentFormat {
        self.format
    }

    async fn load(&self) -> Result<Vec<u8>, StorageError> {
        Ok(self.contents())
    }

    async fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut guard = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clear();
        guard.extend_from_slice(bytes);
        Ok(())
    }
}

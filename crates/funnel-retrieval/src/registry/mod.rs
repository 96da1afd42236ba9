//! File registry: the storage port
//!
//! A durable id → [`ParameterFile`] document store with an explicit
//! open/close lifecycle. The engine reads, merges and writes one document
//! at a time and assumes no cross-key transactions.
//!
//! # Implementations
//! - [`InMemoryFileRegistry`]: concurrent map, for tests and embedding
//! - [`FsFileRegistry`]: one JSON document per id under a directory
//! - [`CachedFileRegistry`]: read cache over any registry

mod cached;
mod fs;
mod memory;

pub use cached::CachedFileRegistry;
pub use fs::FsFileRegistry;
pub use memory::InMemoryFileRegistry;

use crate::error::RegistryError;
use async_trait::async_trait;
use funnel_cache::ParameterFile;
use std::sync::Arc;

/// Durable key → document store for parameter files
#[async_trait]
pub trait FileRegistry: Send + Sync {
    /// Make the registry usable
    async fn open(&self) -> Result<(), RegistryError>;

    /// Release resources; later calls fail with [`RegistryError::NotOpen`]
    async fn close(&self) -> Result<(), RegistryError>;

    /// Read a document, `None` if absent
    async fn get_file(&self, id: &str) -> Result<Option<ParameterFile>, RegistryError>;

    /// Overwrite an existing document
    ///
    /// Fails with [`RegistryError::NotFound`] if `id` was never registered.
    async fn update_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError>;

    /// Create a document, overwriting any existing one
    async fn register_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError>;
}

#[async_trait]
impl<R: FileRegistry + ?Sized> FileRegistry for Arc<R> {
    async fn open(&self) -> Result<(), RegistryError> {
        (**self).open().await
    }

    async fn close(&self) -> Result<(), RegistryError> {
        (**self).close().await
    }

    async fn get_file(&self, id: &str) -> Result<Option<ParameterFile>, RegistryError> {
        (**self).get_file(id).await
    }

    async fn update_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        (**self).update_file(id, file).await
    }

    async fn register_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        (**self).register_file(id, file).await
    }
}

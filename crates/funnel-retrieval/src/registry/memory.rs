//! In-memory file registry

use super::FileRegistry;
use crate::error::RegistryError;
use async_trait::async_trait;
use dashmap::DashMap;
use funnel_cache::ParameterFile;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Concurrent in-memory registry
///
/// Starts closed. Counts writes so tests can assert persistence happened
/// per gap.
#[derive(Debug, Default)]
pub struct InMemoryFileRegistry {
    files: DashMap<String, ParameterFile>,
    open: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryFileRegistry {
    /// Create empty, closed registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with files; seeding is not counted as a write
    #[must_use]
    pub fn with_files(self, files: impl IntoIterator<Item = ParameterFile>) -> Self {
        for file in files {
            self.files.insert(file.id.clone(), file);
        }
        self
    }

    /// Writes since creation
    #[inline]
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored files
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Stored file, bypassing the lifecycle check
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<ParameterFile> {
        self.files.get(id).map(|entry| entry.value().clone())
    }

    fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::NotOpen)
        }
    }
}

#[async_trait]
impl FileRegistry for InMemoryFileRegistry {
    async fn open(&self) -> Result<(), RegistryError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), RegistryError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_file(&self, id: &str) -> Result<Option<ParameterFile>, RegistryError> {
        self.ensure_open()?;
        Ok(self.snapshot(id))
    }

    async fn update_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        self.ensure_open()?;
        let mut entry = self
            .files
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        *entry = file.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn register_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        self.ensure_open()?;
        self.files.insert(id.to_string(), file.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! Read-through cache over any file registry using moka

use super::FileRegistry;
use crate::error::RegistryError;
use async_trait::async_trait;
use funnel_cache::ParameterFile;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Caches decoded documents; every write invalidates its id
#[derive(Debug)]
pub struct CachedFileRegistry<R> {
    inner: R,
    cache: Cache<String, Arc<ParameterFile>>,
}

impl<R: FileRegistry> CachedFileRegistry<R> {
    /// Wrap `inner` with a cache of at most `max_capacity` documents
    #[inline]
    #[must_use]
    pub fn new(inner: R, max_capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(max_capacity),
        }
    }

    /// Wrap with time-based expiration as well
    #[inline]
    #[must_use]
    pub fn with_ttl(inner: R, max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Wrapped registry
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Whether `id` is currently cached
    pub async fn is_cached(&self, id: &str) -> bool {
        self.cache.get(id).await.is_some()
    }
}

#[async_trait]
impl<R: FileRegistry> FileRegistry for CachedFileRegistry<R> {
    async fn open(&self) -> Result<(), RegistryError> {
        self.inner.open().await
    }

    async fn close(&self) -> Result<(), RegistryError> {
        self.cache.invalidate_all();
        self.inner.close().await
    }

    async fn get_file(&self, id: &str) -> Result<Option<ParameterFile>, RegistryError> {
        if let Some(cached) = self.cache.get(id).await {
            return Ok(Some((*cached).clone()));
        }
        let file = self.inner.get_file(id).await?;
        if let Some(file) = &file {
            self.cache
                .insert(id.to_string(), Arc::new(file.clone()))
                .await;
        }
        Ok(file)
    }

    async fn update_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        let result = self.inner.update_file(id, file).await;
        self.cache.invalidate(id).await;
        result
    }

    async fn register_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        let result = self.inner.register_file(id, file).await;
        self.cache.invalidate(id).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryFileRegistry;

    #[tokio::test]
    async fn writes_invalidate() {
        let inner = Arc::new(InMemoryFileRegistry::new().with_files([ParameterFile::new("p")]));
        let cached = CachedFileRegistry::new(Arc::clone(&inner), 16);
        cached.open().await.unwrap();

        assert!(cached.get_file("p").await.unwrap().is_some());
        assert!(cached.is_cached("p").await);

        let changed = ParameterFile::new("p").with_connection("amplitude");
        cached.update_file("p", &changed).await.unwrap();
        assert!(!cached.is_cached("p").await);
        assert_eq!(cached.get_file("p").await.unwrap(), Some(changed));
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let cached = CachedFileRegistry::new(InMemoryFileRegistry::new(), 16);
        cached.open().await.unwrap();
        assert!(cached.get_file("missing").await.unwrap().is_none());
        assert!(!cached.is_cached("missing").await);
    }
}

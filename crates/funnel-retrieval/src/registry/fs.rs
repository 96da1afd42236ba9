//! Filesystem file registry

use super::FileRegistry;
use crate::error::RegistryError;
use async_trait::async_trait;
use funnel_cache::ParameterFile;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use ulid::Ulid;

/// One pretty-printed JSON document per id under a root directory
///
/// Writes go to a temporary sibling unique to that write and are renamed
/// into place, so a reader never sees a half-written document and
/// concurrent writers of one id never share a temporary file. The last
/// rename wins.
#[derive(Debug)]
pub struct FsFileRegistry {
    root: PathBuf,
    open: AtomicBool,
}

impl FsFileRegistry {
    /// Create registry rooted at `root`; nothing touches disk until `open`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: AtomicBool::new(false),
        }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document path for `id`
    ///
    /// # Errors
    /// [`RegistryError::InvalidId`] for ids that would escape the root
    pub fn path_for(&self, id: &str) -> Result<PathBuf, RegistryError> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(RegistryError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::NotOpen)
        }
    }

    async fn write(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        let path = self.path_for(id)?;
        let body = serde_json::to_vec_pretty(file).map_err(|source| RegistryError::Malformed {
            id: id.to_string(),
            source,
        })?;

        let tmp = path.with_extension(format!("json.{}.tmp", Ulid::new()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|source| RegistryError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| RegistryError::Io { path, source })?;
        tracing::debug!(id, "Wrote parameter file");
        Ok(())
    }
}

#[async_trait]
impl FileRegistry for FsFileRegistry {
    async fn open(&self) -> Result<(), RegistryError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| RegistryError::Io {
                path: self.root.clone(),
                source,
            })?;
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), RegistryError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_file(&self, id: &str) -> Result<Option<ParameterFile>, RegistryError> {
        self.ensure_open()?;
        let path = self.path_for(id)?;
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(RegistryError::Io { path, source }),
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| RegistryError::Malformed {
                id: id.to_string(),
                source,
            })
    }

    async fn update_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        self.ensure_open()?;
        let path = self.path_for(id)?;
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
        if !exists {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        self.write(id, file).await
    }

    async fn register_file(&self, id: &str, file: &ParameterFile) -> Result<(), RegistryError> {
        self.ensure_open()?;
        self.write(id, file).await
    }
}

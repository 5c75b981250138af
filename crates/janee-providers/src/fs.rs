// SPDX-License-Identifier: MIT OR Apache-2.0
//! Filesystem provider: one file per secret under a private root.
//!
//! Files hold opaque (already sealed) blobs. The root is created `0700`,
//! files are written `0600`, and every resolved path is containment-checked
//! against the root after normalisation.

use crate::{ProviderError, SecretsProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// Config accepted by the `filesystem` factory.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesystemConfig {
    /// Directory all secrets live under.
    pub root: PathBuf,
}

/// One file per secret under `root`.
#[derive(Debug, Clone)]
pub struct FilesystemProvider {
    root: PathBuf,
}

impl FilesystemProvider {
    /// Provider rooted at `root` (created on [`initialize`](SecretsProvider::initialize)).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a secret path inside the root, rejecting any escape.
    fn resolve(&self, path: &str) -> Result<PathBuf, ProviderError> {
        let relative = Path::new(path);
        // URI validation already rejects absolute paths and `..`, but the
        // provider can be driven directly, so it re-checks containment.
        let mut clean = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(ProviderError::PathEscape {
                        path: path.to_string(),
                    });
                }
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(ProviderError::PathEscape {
                path: path.to_string(),
            });
        }

        let joined = self.root.join(&clean);
        if !joined.starts_with(&self.root) {
            return Err(ProviderError::PathEscape {
                path: path.to_string(),
            });
        }
        Ok(joined)
    }
}

#[async_trait]
impl SecretsProvider for FilesystemProvider {
    async fn initialize(&self) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.root).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700)).await?;
        }
        Ok(())
    }

    async fn get_secret(&self, path: &str) -> Result<Option<String>, ProviderError> {
        let file = self.resolve(path)?;
        match tokio::fs::read_to_string(&file).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set_secret(&self, path: &str, value: &str) -> Result<(), ProviderError> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, value).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }

    async fn delete_secret(&self, path: &str) -> Result<(), ProviderError> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ProviderError::NotFound {
                    path: path.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_secrets(&self) -> Result<Vec<String>, ProviderError> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    out.push(rel.to_string_lossy().into_owned());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(ProviderError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                "provider root is not a directory",
            )));
        }
        Ok(())
    }
}

//! On-disk response cache
//!
//! Entries are plain files named `<word>_<resource>.<ext>` under the cache
//! directory and expire by modification time.

use crate::types::Resource;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// File-per-response cache with mtime-based expiry
#[derive(Clone, Debug)]
pub struct ResponseCache {
    dir: PathBuf,
    expiry: Duration,
}

impl ResponseCache {
    /// Cache rooted at `dir`; entries older than `expiry` are ignored
    pub fn new(dir: impl Into<PathBuf>, expiry: Duration) -> Self {
        Self {
            dir: dir.into(),
            expiry,
        }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache entry for `key` and `resource`
    ///
    /// Only alphanumerics, `-` and `_` survive sanitizing; when nothing is
    /// left the md5 of the key is used instead.
    pub fn path_for(&self, key: &str, resource: &Resource) -> PathBuf {
        let safe: String = key
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        let stem = if safe.is_empty() {
            format!("{:x}", md5::compute(key.as_bytes()))
        } else {
            safe
        };
        self.dir.join(format!(
            "{}_{}.{}",
            stem,
            resource.label(),
            resource.extension()
        ))
    }

    /// Read a fresh, non-empty entry; any failure is a miss
    pub async fn load(&self, key: &str, resource: &Resource) -> Option<Vec<u8>> {
        let path = self.path_for(key, resource);
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        if age >= self.expiry {
            tracing::debug!(path = %path.display(), "cache entry expired");
            return None;
        }
        match tokio::fs::read(&path).await {
            Ok(data) if !data.is_empty() => Some(data),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a response; written to a temporary name and renamed into place
    pub async fn store(&self, key: &str, resource: &Resource, data: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key, resource);
        let tmp = path.with_extension(format!("{}.tmp", resource.extension()));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await
    }
}

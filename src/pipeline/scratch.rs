//! Run-scoped scratch storage

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Temporary directory holding a run's batch parts
///
/// Removed by [`cleanup`](Scratch::cleanup), or on drop if a run unwinds
/// without reaching it.
#[derive(Debug)]
pub struct Scratch {
    dir: tempfile::TempDir,
}

impl Scratch {
    /// Create a fresh directory under `parent`
    pub async fn create(parent: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(parent).await?;
        // Absolute so part paths stay valid from any working directory (ffmpeg list files)
        let parent = tokio::fs::canonicalize(parent).await?;
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("vocab-fetch-")
                .tempdir_in(&parent)
        })
        .await
        .map_err(|e| Error::Worker(format!("scratch creation failed: {e}")))??;
        tracing::debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of batch part `seq` with the given extension
    pub fn part_path(&self, seq: usize, extension: &str) -> PathBuf {
        self.dir.path().join(format!("part_{seq:04}.{extension}"))
    }

    /// Remove the directory and everything in it
    pub async fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => tracing::debug!(path = %path.display(), "removed scratch directory"),
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "scratch removal task failed");
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_removes_directory_and_contents() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = Scratch::create(&parent.path().join("tmp")).await.unwrap();
        let part = scratch.part_path(3, "wav");
        assert!(part.ends_with("part_0003.wav"));
        std::fs::write(&part, b"data").unwrap();

        let dir = scratch.path().to_path_buf();
        scratch.cleanup().await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn drop_also_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let dir = {
            let scratch = Scratch::create(parent.path()).await.unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!dir.exists());
    }
}

//! Final encoders for the audio flavor
//!
//! [`FfmpegEncoder`] runs the external `ffmpeg` binary to join WAV parts into
//! an MP3. When ffmpeg is unavailable, [`WavConcatEncoder`] joins the parts
//! into a single WAV with `hound` instead.
//!
//! Both encoders write into scratch storage first and move the result to
//! its final path only once it is complete.

use super::wav;
use crate::error::SinkError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Joins persisted parts into the final artifact
#[async_trait]
pub trait FinalEncoder: Send + Sync {
    /// Encode `parts`, in order, into `output`; returns the artifact path
    async fn encode(
        &self,
        scratch: &Path,
        parts: &[PathBuf],
        output: &Path,
    ) -> Result<PathBuf, SinkError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Encoder backed by the external ffmpeg binary
#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    binary_path: PathBuf,
}

impl FfmpegEncoder {
    /// Create an encoder with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Binary this encoder runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

/// Move a finished artifact from scratch to `target`
///
/// Falls back to copy-and-remove when scratch sits on another filesystem.
pub(crate) async fn publish(staged: &Path, target: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(staged, target).await.is_ok() {
        return Ok(());
    }
    if let Err(e) = tokio::fs::copy(staged, target).await {
        // A half-copied target is worse than none
        let _ = tokio::fs::remove_file(target).await;
        return Err(e);
    }
    tokio::fs::remove_file(staged).await
}

/// Scratch path for the artifact before it is published
fn staged_path(scratch: &Path, target: &Path) -> PathBuf {
    let extension = target.extension().and_then(|e| e.to_str()).unwrap_or("out");
    scratch.join(format!("combined.{extension}"))
}

/// Concat-demuxer list file contents for `parts`
pub(crate) fn concat_list(parts: &[PathBuf]) -> String {
    parts
        .iter()
        .map(|p| {
            let path = p.to_string_lossy().replace('\\', "/").replace('\'', r"'\''");
            format!("file '{path}'\n")
        })
        .collect()
}

#[async_trait]
impl FinalEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        scratch: &Path,
        parts: &[PathBuf],
        output: &Path,
    ) -> Result<PathBuf, SinkError> {
        let combine_err = |reason: String| SinkError::Combine {
            parts: parts.len(),
            output: output.to_path_buf(),
            reason,
        };

        let list_path = scratch.join("list.txt");
        tokio::fs::write(&list_path, concat_list(parts))
            .await
            .map_err(|e| combine_err(format!("failed to write concat list: {e}")))?;

        let staged = staged_path(scratch, output);
        tracing::info!(binary = %self.binary_path.display(), parts = parts.len(), "merging parts with ffmpeg");
        let result = Command::new(&self.binary_path)
            .args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-acodec", "libmp3lame", "-q:a", "2"])
            .arg(&staged)
            .output()
            .await
            .map_err(|e| combine_err(format!("failed to execute ffmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(combine_err(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                tail.join(" | ")
            )));
        }

        publish(&staged, output)
            .await
            .map_err(|e| combine_err(format!("failed to move encoded output into place: {e}")))?;
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Fallback encoder writing one WAV next to the requested output
#[derive(Clone, Copy, Debug, Default)]
pub struct WavConcatEncoder;

#[async_trait]
impl FinalEncoder for WavConcatEncoder {
    async fn encode(
        &self,
        scratch: &Path,
        parts: &[PathBuf],
        output: &Path,
    ) -> Result<PathBuf, SinkError> {
        let target = output.with_extension("wav");
        tracing::warn!(output = %target.display(), "ffmpeg not available, writing WAV instead");
        let combine_err = |reason: String| SinkError::Combine {
            parts: parts.len(),
            output: target.clone(),
            reason,
        };

        let staged = staged_path(scratch, &target);
        let parts_owned = parts.to_vec();
        let staged_clone = staged.clone();
        let written =
            tokio::task::spawn_blocking(move || wav::concat_wavs(&parts_owned, &staged_clone))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()))
                .map_err(combine_err)?;

        publish(&staged, &target)
            .await
            .map_err(|e| combine_err(format!("failed to move WAV into place: {e}")))?;
        tracing::debug!(samples = written, "concatenated WAV parts");
        Ok(target)
    }

    fn name(&self) -> &'static str {
        "wav-concat"
    }
}

/// Pick an encoder: explicit path, then PATH search, then the WAV fallback
pub fn select_encoder(
    ffmpeg_path: Option<&Path>,
    search_path: bool,
) -> std::sync::Arc<dyn FinalEncoder> {
    if let Some(path) = ffmpeg_path {
        return std::sync::Arc::new(FfmpegEncoder::new(path.to_path_buf()));
    }
    if search_path && let Some(encoder) = FfmpegEncoder::from_path() {
        return std::sync::Arc::new(encoder);
    }
    std::sync::Arc::new(WavConcatEncoder)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_list_quotes_paths() {
        let list = concat_list(&[
            PathBuf::from("/tmp/run/part_0000.wav"),
            PathBuf::from("/tmp/it's/part_0001.wav"),
        ]);
        assert_eq!(
            list,
            "file '/tmp/run/part_0000.wav'\nfile '/tmp/it'\\''s/part_0001.wav'\n"
        );
    }

    #[test]
    fn explicit_path_wins_and_no_search_falls_back() {
        let encoder = select_encoder(Some(Path::new("/opt/ffmpeg")), false);
        assert_eq!(encoder.name(), "ffmpeg");
        let encoder = select_encoder(None, false);
        assert_eq!(encoder.name(), "wav-concat");
    }

    #[test]
    fn from_path_consistent_with_which() {
        assert_eq!(
            which::which("ffmpeg").is_ok(),
            FfmpegEncoder::from_path().is_some()
        );
    }

    #[tokio::test]
    async fn wav_fallback_swaps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let part = scratch.path().join("part_0000.wav");
        wav::write_wav(&part, 8000, [1i16, 2]).unwrap();

        let artifact = WavConcatEncoder
            .encode(scratch.path(), &[part], &dir.path().join("out.mp3"))
            .await
            .unwrap();
        assert_eq!(artifact, dir.path().join("out.wav"));
        assert!(artifact.exists());
        assert!(!scratch.path().join("combined.wav").exists());
    }

    #[tokio::test]
    async fn unreadable_part_leaves_no_wav() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let good = scratch.path().join("part_0000.wav");
        wav::write_wav(&good, 8000, [1i16; 64]).unwrap();
        let bad = scratch.path().join("part_0001.wav");
        std::fs::write(&bad, b"RIFF but not really").unwrap();

        let output = dir.path().join("out.mp3");
        let err = WavConcatEncoder
            .encode(scratch.path(), &[good, bad], &output)
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Combine { .. }));
        assert!(!output.with_extension("wav").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_ffmpeg_leaves_no_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        // Writes its last argument like ffmpeg would, then fails
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\necho partial > \"$last\"\necho 'Conversion failed!' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let output = dir.path().join("out.mp3");
        let err = FfmpegEncoder::new(script)
            .encode(scratch.path(), &[], &output)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Conversion failed!"), "{err}");
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_ffmpeg_output_is_moved_into_place() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\necho encoded > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let output = dir.path().join("out.mp3");
        let artifact = FfmpegEncoder::new(script)
            .encode(scratch.path(), &[], &output)
            .await
            .unwrap();
        assert_eq!(artifact, output);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "encoded\n");
        assert!(!scratch.path().join("combined.mp3").exists());
    }

    #[tokio::test]
    async fn missing_binary_is_a_combine_error() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FfmpegEncoder::new(dir.path().join("no-such-ffmpeg"));
        let err = encoder
            .encode(dir.path(), &[], &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to execute ffmpeg"));
    }
}

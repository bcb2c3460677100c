//! Dictionary enrichment and pronunciation synthesis runs.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result, SinkError};
use crate::pipeline::ProgressReporter;
use crate::sink::{AudioSink, JsonSink};
use crate::types::{Resource, RunOutcome, WorkItem};
use crate::wordlist::WordList;

use super::VocabDownloader;

async fn load_list(path: &Path) -> Result<WordList> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || WordList::load(&path))
        .await
        .map_err(|e| Error::Worker(format!("loading word list failed: {e}")))?
}

impl VocabDownloader {
    /// Look up every word of `input` and write the enriched list to `output`
    ///
    /// `output` may equal `input` to enrich in place; the file is replaced
    /// atomically once the run completes. Words whose lookup failed are
    /// written unchanged under the skip policy.
    pub async fn enrich_word_list(
        &self,
        input: &Path,
        output: &Path,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<RunOutcome> {
        let list = load_list(input).await?;
        let label = list
            .name
            .clone()
            .unwrap_or_else(|| input.display().to_string());
        tracing::info!(input = %input.display(), words = list.len(), "enriching word list");

        let items = WorkItem::from_records(&list.word_list);
        let sink = Arc::new(JsonSink::new(&list, output));
        self.run_pipeline(label, vec![Resource::Dictionary], sink, items, progress)
            .await
    }

    /// Fetch pronunciations for every word of `input` and combine them into `output`
    ///
    /// Clips are ordered by word, then by the configured accents. When no
    /// ffmpeg binary is available the artifact is a WAV file next to
    /// `output`; the returned summary names the file actually written.
    pub async fn synthesize_audio(
        &self,
        input: &Path,
        output: &Path,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<RunOutcome> {
        let list = load_list(input).await?;
        if list.is_empty() {
            tracing::warn!(input = %input.display(), "word list has no words, nothing to synthesize");
            return Err(SinkError::Empty(format!("{} has no words", input.display())).into());
        }

        let accents = self.config.audio.effective_accents();
        tracing::info!(
            input = %input.display(),
            words = list.len(),
            accents = ?accents,
            "synthesizing pronunciations"
        );

        let resources = accents.into_iter().map(Resource::Pronunciation).collect();
        let items = WorkItem::from_records(&list.word_list);
        let sink = Arc::new(AudioSink::new(&self.config.audio, output));
        self.run_pipeline(output.display().to_string(), resources, sink, items, progress)
            .await
    }
}

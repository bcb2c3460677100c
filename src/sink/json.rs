//! Word list sink for the dictionary flavor

use super::BatchSink;
use crate::config::GapPolicy;
use crate::error::{Result, SinkError};
use crate::pipeline::{Batch, Fragment, Scratch};
use crate::types::{ItemOutcome, Payload};
use crate::wordlist::{WordList, WordRecord, write_json_pretty};
use std::path::PathBuf;

impl Fragment for WordRecord {
    fn size(&self) -> u64 {
        0
    }

    fn gap_after(&self, _policy: &GapPolicy) -> Option<Self> {
        None
    }
}

/// Writes enriched records as JSON parts and merges them into a word list
#[derive(Debug)]
pub struct JsonSink {
    template: WordList,
    output: PathBuf,
}

impl JsonSink {
    /// Sink producing `output`, carrying every non-record field of `source`
    pub fn new(source: &WordList, output: impl Into<PathBuf>) -> Self {
        let template = WordList {
            word_list: Vec::new(),
            ..source.clone()
        };
        Self {
            template,
            output: output.into(),
        }
    }
}

#[async_trait::async_trait]
impl BatchSink for JsonSink {
    type Fragment = WordRecord;

    fn fragments(&self, outcome: &ItemOutcome) -> Result<Vec<WordRecord>> {
        let mut record = outcome.item.record.clone();
        for (_, payload) in outcome.payloads() {
            if let Payload::Entry(entry) = payload {
                record.apply_entry(entry);
            }
        }
        Ok(vec![record])
    }

    async fn persist_batch(
        &self,
        scratch: &Scratch,
        batch: Batch<WordRecord>,
    ) -> std::result::Result<PathBuf, SinkError> {
        let path = scratch.part_path(batch.seq, "json");
        let persist_err = |reason: String| SinkError::Persist {
            seq: batch.seq,
            reason,
        };
        let bytes = serde_json::to_vec(&batch.fragments).map_err(|e| persist_err(e.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| persist_err(e.to_string()))?;
        Ok(path)
    }

    async fn combine(
        &self,
        _scratch: &Scratch,
        parts: Vec<PathBuf>,
    ) -> std::result::Result<PathBuf, SinkError> {
        let combine_err = |reason: String| SinkError::Combine {
            parts: parts.len(),
            output: self.output.clone(),
            reason,
        };

        let mut records = Vec::new();
        for part in &parts {
            let bytes = tokio::fs::read(part)
                .await
                .map_err(|e| combine_err(format!("{}: {}", part.display(), e)))?;
            let batch: Vec<WordRecord> =
                serde_json::from_slice(&bytes).map_err(|e| combine_err(e.to_string()))?;
            records.extend(batch);
        }

        let list = WordList {
            word_list: records,
            ..self.template.clone()
        };
        let words = list.len();
        let output = self.output.clone();
        tokio::task::spawn_blocking(move || write_json_pretty(&output, &list))
            .await
            .map_err(|e| combine_err(e.to_string()))?
            .map_err(|e| combine_err(e.to_string()))?;
        tracing::info!(
            output = %self.output.display(),
            words,
            parts = parts.len(),
            "wrote word list"
        );
        Ok(self.output.clone())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DictionaryEntry, FetchOutcome, Resource, WorkItem};

    fn record(value: &str) -> WordRecord {
        WordRecord {
            value: value.into(),
            definition: Some("old".into()),
            ..Default::default()
        }
    }

    #[test]
    fn successful_lookup_enriches_record() {
        let sink = JsonSink::new(&WordList::default(), "out.json");
        let outcome = ItemOutcome {
            item: WorkItem::from_records(&[record("apple")]).remove(0),
            parts: vec![(
                Resource::Dictionary,
                FetchOutcome::success(
                    Payload::Entry(DictionaryEntry {
                        usphone: Some("/ˈæpl/".into()),
                        ..Default::default()
                    }),
                    1,
                ),
            )],
        };
        let fragments = sink.fragments(&outcome).unwrap();
        assert_eq!(fragments[0].usphone.as_deref(), Some("/ˈæpl/"));
        assert_eq!(fragments[0].definition.as_deref(), Some(""));
    }

    #[test]
    fn failed_lookup_passes_record_through() {
        let sink = JsonSink::new(&WordList::default(), "out.json");
        let outcome = ItemOutcome {
            item: WorkItem::from_records(&[record("apple")]).remove(0),
            parts: vec![(Resource::Dictionary, FetchOutcome::fatal("HTTP 500", 3))],
        };
        assert_eq!(sink.fragments(&outcome).unwrap(), vec![record("apple")]);
    }

    #[tokio::test]
    async fn combine_merges_parts_in_order_with_template_fields() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::create(dir.path()).await.unwrap();
        let output = dir.path().join("out.json");
        let source = WordList {
            name: Some("Unit1".into()),
            size: Some(3),
            word_list: vec![record("a"), record("b"), record("c")],
            ..Default::default()
        };
        let sink = JsonSink::new(&source, &output);

        let first = sink
            .persist_batch(
                &scratch,
                Batch {
                    seq: 0,
                    items: 2,
                    fragments: vec![record("a"), record("b")],
                    size: 0,
                },
            )
            .await
            .unwrap();
        let second = sink
            .persist_batch(
                &scratch,
                Batch {
                    seq: 1,
                    items: 1,
                    fragments: vec![record("c")],
                    size: 0,
                },
            )
            .await
            .unwrap();

        let artifact = sink.combine(&scratch, vec![first, second]).await.unwrap();
        let list = WordList::load(&artifact).unwrap();
        assert_eq!(list.name.as_deref(), Some("Unit1"));
        let words: Vec<_> = list.word_list.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(words, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn combine_reports_missing_part() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::create(dir.path()).await.unwrap();
        let sink = JsonSink::new(&WordList::default(), dir.path().join("out.json"));
        let err = sink
            .combine(&scratch, vec![dir.path().join("nope.json")])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Combine { parts: 1, .. }));
    }
}

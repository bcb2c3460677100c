//! Catalog processing: enrich every pending word list under a data root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{Catalog, Category};
use crate::error::Result;
use crate::pipeline::ProgressReporter;
use crate::types::RunOutcome;

use super::VocabDownloader;

/// What a catalog pass did
#[derive(Clone, Debug, Default)]
pub struct CatalogReport {
    /// Files enriched and marked completed
    pub enriched: Vec<PathBuf>,
    /// Files whose run failed, with the error; left pending
    pub failed: Vec<(PathBuf, String)>,
    /// Category directories skipped because their config was unreadable
    pub skipped_categories: Vec<PathBuf>,
    /// Whether the pass stopped early on shutdown
    pub cancelled: bool,
}

impl VocabDownloader {
    /// Enrich, in place, every listed file not yet completed under `root`
    ///
    /// Categories are visited in root-config order. Each category's
    /// completed list is saved (sorted) after its files were processed,
    /// including when the pass is cancelled part way.
    pub async fn process_catalog(
        &self,
        root: &Path,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<CatalogReport> {
        let catalog = Catalog::open(root)?;
        let mut report = CatalogReport::default();

        for dir in catalog.category_dirs() {
            let mut category = match Category::load(&dir) {
                Ok(category) => category,
                Err(e) => {
                    tracing::error!(dir = %dir.display(), error = %e, "skipping category");
                    report.skipped_categories.push(dir);
                    continue;
                }
            };
            tracing::info!(category = %category.name(), "processing category");

            for (file, path) in category.pending() {
                match self
                    .enrich_word_list(&path, &path, Arc::clone(&progress))
                    .await
                {
                    Ok(RunOutcome::Completed(summary)) => {
                        tracing::info!(
                            file = %path.display(),
                            words = summary.processed,
                            failed = summary.failed.len(),
                            "file completed"
                        );
                        category.mark_completed(&file);
                        report.enriched.push(path);
                    }
                    Ok(RunOutcome::Cancelled { .. }) => {
                        report.cancelled = true;
                        break;
                    }
                    Err(e) => {
                        tracing::error!(file = %path.display(), error = %e, "file failed");
                        report.failed.push((path, e.to_string()));
                    }
                }
            }

            category.save()?;
            if report.cancelled {
                tracing::info!("catalog pass cancelled");
                break;
            }
        }

        Ok(report)
    }
}

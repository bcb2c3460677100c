//! Catalog bookkeeping for a data root of word-list categories
//!
//! Layout:
//! ```text
//! data/
//!   config.json            {"file": ["cet4", "ielts"]}
//!   cet4/
//!     config.json          {"name": "CET-4", "file": ["a.json", ...], "completed": [...]}
//!     a.json
//! ```

use crate::error::{Error, Result};
use crate::wordlist::write_json_pretty;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// File name of both the root and the category configs
pub const CONFIG_FILE: &str = "config.json";

/// Root config: the category directories to visit, in order
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RootConfig {
    /// Category directory names relative to the data root
    #[serde(default)]
    pub file: Vec<String>,

    /// Other fields, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-category config
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Display name; the directory name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Word-list files in this category
    #[serde(default)]
    pub file: Vec<String>,

    /// Files already enriched
    #[serde(default)]
    pub completed: Vec<String>,

    /// Other fields, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A data root with its root config
#[derive(Debug)]
pub struct Catalog {
    root: PathBuf,
    config: RootConfig,
}

impl Catalog {
    /// Read `<root>/config.json`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Err(Error::Catalog(format!(
                "root config not found: {}",
                path.display()
            )));
        }
        let config: RootConfig = read_json(&path)?;
        Ok(Self { root, config })
    }

    /// Data root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Category directories in config order
    pub fn category_dirs(&self) -> Vec<PathBuf> {
        self.config.file.iter().map(|c| self.root.join(c)).collect()
    }
}

/// One category directory and its config
#[derive(Debug)]
pub struct Category {
    dir: PathBuf,
    config: CategoryConfig,
    completed: BTreeSet<String>,
}

impl Category {
    /// Read `<dir>/config.json`
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Err(Error::Catalog(format!(
                "category config not found: {}",
                path.display()
            )));
        }
        let config: CategoryConfig = read_json(&path)?;
        let completed = config.completed.iter().cloned().collect();
        Ok(Self {
            dir,
            config,
            completed,
        })
    }

    /// Display name, falling back to the directory name
    pub fn name(&self) -> String {
        self.config.name.clone().unwrap_or_else(|| {
            self.dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Directory holding the category's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Listed files not yet completed, in config order
    ///
    /// Files that do not exist on disk are logged and left out.
    pub fn pending(&self) -> Vec<(String, PathBuf)> {
        self.config
            .file
            .iter()
            .filter(|f| !self.completed.contains(*f))
            .filter_map(|f| {
                let path = self.dir.join(f);
                if path.exists() {
                    Some((f.clone(), path))
                } else {
                    tracing::warn!(path = %path.display(), "file listed in config but not found");
                    None
                }
            })
            .collect()
    }

    /// Record `file` as done
    pub fn mark_completed(&mut self, file: &str) {
        self.completed.insert(file.to_string());
    }

    /// Whether `file` is done
    pub fn is_completed(&self, file: &str) -> bool {
        self.completed.contains(file)
    }

    /// Write the config back with the completed list sorted
    pub fn save(&mut self) -> Result<()> {
        self.config.completed = self.completed.iter().cloned().collect();
        write_json_pretty(&self.dir.join(CONFIG_FILE), &self.config)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| Error::Catalog(format!("{}: {}", path.display(), e)))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn category(dir: &Path, config: &str, files: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE), config).unwrap();
        for f in files {
            std::fs::write(dir.join(f), r#"{"wordList": []}"#).unwrap();
        }
    }

    #[test]
    fn root_lists_category_dirs_in_order() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join(CONFIG_FILE),
            r#"{"file": ["b", "a"], "note": 1}"#,
        )
        .unwrap();

        let catalog = Catalog::open(root.path()).unwrap();
        assert_eq!(
            catalog.category_dirs(),
            vec![root.path().join("b"), root.path().join("a")]
        );
    }

    #[test]
    fn missing_root_config_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            Catalog::open(root.path()),
            Err(Error::Catalog(_))
        ));
    }

    #[test]
    fn pending_skips_completed_and_missing_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("cet4");
        category(
            &dir,
            r#"{"name": "CET-4", "file": ["a.json", "b.json", "gone.json", "c.json"], "completed": ["b.json"]}"#,
            &["a.json", "b.json", "c.json"],
        );

        let cat = Category::load(&dir).unwrap();
        assert_eq!(cat.name(), "CET-4");
        let pending: Vec<_> = cat.pending().into_iter().map(|(f, _)| f).collect();
        assert_eq!(pending, ["a.json", "c.json"]);
    }

    #[test]
    fn name_falls_back_to_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ielts");
        category(&dir, r#"{"file": []}"#, &[]);
        assert_eq!(Category::load(&dir).unwrap().name(), "ielts");
    }

    #[test]
    fn save_writes_sorted_completed_and_keeps_extra_fields() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("cet4");
        category(
            &dir,
            r#"{"file": ["z.json", "a.json"], "completed": [], "order": 3}"#,
            &["z.json", "a.json"],
        );

        let mut cat = Category::load(&dir).unwrap();
        cat.mark_completed("z.json");
        cat.mark_completed("a.json");
        cat.save().unwrap();

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join(CONFIG_FILE)).unwrap())
                .unwrap();
        assert_eq!(saved["completed"], serde_json::json!(["a.json", "z.json"]));
        assert_eq!(saved["order"], 3);
        assert!(Category::load(&dir).unwrap().pending().is_empty());
    }
}

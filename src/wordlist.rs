//! Word list files
//!
//! A word list is a JSON object with a `wordList` array of records, each
//! carrying at least a `value` (the word). Fields this crate does not know
//! about are preserved on both the list and its records.
//!
//! Besides loading and saving, this module holds the small file tools that
//! operate on word lists: splitting into fixed-size parts, fixing the
//! `size` field and exporting to CSV. Splitting and size fixing work on the
//! raw JSON document, so key order and explicit nulls survive a rewrite.

use crate::error::{Error, Result};
use crate::types::DictionaryEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Words per part produced by [`split`]
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// One entry of a word list
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    /// The word itself
    #[serde(default)]
    pub value: String,

    /// US phonetic transcription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usphone: Option<String>,

    /// UK phonetic transcription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ukphone: Option<String>,

    /// Translation lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,

    /// Free-text definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    /// Part of speech
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,

    /// Any other fields, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WordRecord {
    /// Merge a dictionary entry into this record
    ///
    /// Present phonetics and translations overwrite the record's values;
    /// `definition` and `pos` are always cleared.
    pub fn apply_entry(&mut self, entry: &DictionaryEntry) {
        if let Some(usphone) = &entry.usphone {
            self.usphone = Some(usphone.clone());
        }
        if let Some(ukphone) = &entry.ukphone {
            self.ukphone = Some(ukphone.clone());
        }
        if let Some(translation) = &entry.translation {
            self.translation = Some(translation.clone());
        }
        self.definition = Some(String::new());
        self.pos = Some(String::new());
    }
}

/// A word list document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WordList {
    /// Display name of the list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Declared number of words
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    /// The words, in order
    #[serde(rename = "wordList", default)]
    pub word_list: Vec<WordRecord>,

    /// Any other fields, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WordList {
    /// Load a word list, requiring a `wordList` array
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|reason| Error::InvalidWordList {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn from_json_str(text: &str) -> std::result::Result<Self, String> {
        let doc = parse_document(text)?;
        serde_json::from_value(Value::Object(doc)).map_err(|e| e.to_string())
    }

    /// Write the list with 4-space indentation
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_pretty(path, self)
    }

    /// Number of words
    pub fn len(&self) -> usize {
        self.word_list.len()
    }

    /// True when the list holds no words
    pub fn is_empty(&self) -> bool {
        self.word_list.is_empty()
    }

    /// md5 of the canonical (sorted keys, compact) JSON form
    pub fn canonical_md5(&self) -> Result<String> {
        canonical_md5(&serde_json::to_value(self)?)
    }
}

/// Raw word list document: the top-level object, fields in file order
pub type Document = Map<String, Value>;

fn parse_document(text: &str) -> std::result::Result<Document, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let Value::Object(doc) = value else {
        return Err("top level is not an object".to_string());
    };
    match doc.get("wordList") {
        Some(Value::Array(_)) => Ok(doc),
        Some(_) => Err("'wordList' is not an array".to_string()),
        None => Err("'wordList' not found".to_string()),
    }
}

/// Load a word list file as a raw document
pub fn load_document(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path)?;
    parse_document(&text).map_err(|reason| Error::InvalidWordList {
        path: path.to_path_buf(),
        reason,
    })
}

fn word_entries(doc: &Document) -> &[Value] {
    match doc.get("wordList") {
        Some(Value::Array(words)) => words.as_slice(),
        _ => &[],
    }
}

/// md5 of `value` serialized compactly with every object's keys sorted
pub fn canonical_md5(value: &Value) -> Result<String> {
    let canonical = serde_json::to_string(&sorted_keys(value))?;
    Ok(format!("{:x}", md5::compute(canonical.as_bytes())))
}

fn sorted_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}

/// Serialize `value` as JSON with 4-space indentation and unescaped Unicode
///
/// The file is written under a temporary name and renamed into place.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &buf)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Split a document into parts of `chunk_size` words
///
/// Each part inherits the other fields, is named `<name>-<n>` (or `part-<n>`
/// when the list has no name) and gets `size` set to its own length. Fields
/// keep their position; `name` and `size` are appended when absent.
pub fn split(doc: &Document, chunk_size: usize) -> Vec<Document> {
    let chunk_size = chunk_size.max(1);
    let base_name = doc.get("name").and_then(Value::as_str).unwrap_or("");

    let mut template = doc.clone();
    template.insert("wordList".to_string(), Value::Array(Vec::new()));

    word_entries(doc)
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| {
            let n = i + 1;
            let name = if base_name.is_empty() {
                format!("part-{n}")
            } else {
                format!("{base_name}-{n}")
            };
            let mut part = template.clone();
            part.insert("name".to_string(), Value::String(name));
            part.insert("size".to_string(), Value::from(chunk.len()));
            part.insert("wordList".to_string(), Value::Array(chunk.to_vec()));
            part
        })
        .collect()
}

/// Split a word list file into `<base>-<n>-<md5>.part.json` files next to it
pub fn split_file(path: &Path, chunk_size: usize) -> Result<Vec<PathBuf>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        return Err(Error::InvalidWordList {
            path: path.to_path_buf(),
            reason: "expected a .json file".to_string(),
        });
    }

    let doc = load_document(path)?;
    let base = path.with_extension("");
    let base = base.to_string_lossy();

    let mut written = Vec::new();
    for (i, part) in split(&doc, chunk_size).into_iter().enumerate() {
        let part = Value::Object(part);
        let digest = canonical_md5(&part)?;
        let out = PathBuf::from(format!("{}-{}-{}.part.json", base, i + 1, digest));
        write_json_pretty(&out, &part)?;
        written.push(out);
    }

    tracing::info!(
        input = %path.display(),
        parts = written.len(),
        "split word list"
    );
    Ok(written)
}

/// Result of [`fix_size_file`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeFix {
    /// Previous declared size
    pub old: Option<usize>,
    /// Actual word count
    pub new: usize,
}

impl SizeFix {
    /// True when the file was rewritten
    pub fn changed(&self) -> bool {
        self.old != Some(self.new)
    }
}

/// Set `size` to the number of words; the file is only rewritten when it changes
///
/// Every other field is written back untouched and in place.
pub fn fix_size_file(path: &Path) -> Result<SizeFix> {
    let mut doc = load_document(path)?;
    let fix = SizeFix {
        old: doc
            .get("size")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok()),
        new: word_entries(&doc).len(),
    };
    if fix.changed() {
        doc.insert("size".to_string(), Value::from(fix.new));
        write_json_pretty(path, &doc)?;
        tracing::info!(path = %path.display(), old = ?fix.old, new = fix.new, "updated size");
    } else {
        tracing::info!(path = %path.display(), size = fix.new, "size already correct");
    }
    Ok(fix)
}

/// Export `value, usphone, ukphone, translation` rows to a `.csv` next to the input
///
/// Every field is quoted, there is no header row and embedded newlines are
/// kept. Returns None without writing when the list is empty.
pub fn export_csv(path: &Path) -> Result<Option<PathBuf>> {
    let list = WordList::load(path)?;
    if list.is_empty() {
        tracing::warn!(path = %path.display(), "no words to export");
        return Ok(None);
    }

    let mut out = String::new();
    for record in &list.word_list {
        let fields = [
            record.value.as_str(),
            record.usphone.as_deref().unwrap_or(""),
            record.ukphone.as_deref().unwrap_or(""),
            record.translation.as_deref().unwrap_or(""),
        ];
        let row: Vec<String> = fields.iter().map(|f| quote_csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }

    let csv_path = path.with_extension("csv");
    std::fs::write(&csv_path, out)?;
    tracing::info!(input = %path.display(), output = %csv_path.display(), "exported csv");
    Ok(Some(csv_path))
}

fn quote_csv_field(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

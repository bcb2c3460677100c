//! Dictionary response schema
//!
//! The lookup endpoint returns a large document; only the `ec` section is
//! read. Bodies are decoded once here into a [`DictionaryEntry`].

use crate::error::FetchError;
use crate::types::DictionaryEntry;
use serde::Deserialize;

/// `dicts` query parameter selecting the synonym and English-Chinese sections
pub(crate) const DICTS_PARAM: &str = r#"{"count":99,"dicts":[["syno","ec"]]}"#;

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ec: Option<EcSection>,
}

#[derive(Debug, Deserialize)]
struct EcSection {
    #[serde(default)]
    word: Vec<EcWord>,
}

#[derive(Debug, Deserialize)]
struct EcWord {
    usphone: Option<String>,
    ukphone: Option<String>,
    #[serde(default)]
    trs: Vec<TranslationGroup>,
}

#[derive(Debug, Deserialize)]
struct TranslationGroup {
    #[serde(default)]
    tr: Vec<TranslationLine>,
}

#[derive(Debug, Deserialize)]
struct TranslationLine {
    l: Option<TranslationText>,
}

#[derive(Debug, Deserialize)]
struct TranslationText {
    #[serde(default)]
    i: Vec<serde_json::Value>,
}

/// Decode a lookup body into a [`DictionaryEntry`]
///
/// A well-formed document without an `ec` section is a valid, empty entry
/// (the word is simply unknown). Anything that is not a JSON object is
/// malformed.
pub fn parse_entry(body: &[u8]) -> Result<DictionaryEntry, FetchError> {
    let response: LookupResponse = serde_json::from_slice(body)
        .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

    let Some(word) = response.ec.and_then(|ec| ec.word.into_iter().next()) else {
        return Ok(DictionaryEntry::default());
    };

    let translations: Vec<String> = word
        .trs
        .iter()
        .filter_map(|group| group.tr.first())
        .filter_map(|line| line.l.as_ref())
        .filter_map(|text| text.i.first())
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect();

    Ok(DictionaryEntry {
        usphone: word.usphone.map(|p| format!("/{p}/")),
        ukphone: word.ukphone.map(|p| format!("/{p}/")),
        translation: (!translations.is_empty()).then(|| translations.join("\n")),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_phonetics_and_first_translation_of_each_group() {
        let body = r#"{
            "ec": {"word": [{
                "usphone": "ˈæpl",
                "ukphone": "ˈæpl",
                "trs": [
                    {"tr": [{"l": {"i": ["n. 苹果"]}}]},
                    {"tr": [{"l": {"i": ["n. 苹果树", "ignored"]}}, {"l": {"i": ["ignored"]}}]},
                    {"tr": []}
                ]
            }]},
            "syno": {}
        }"#;
        let entry = parse_entry(body.as_bytes()).unwrap();
        assert_eq!(entry.usphone.as_deref(), Some("/ˈæpl/"));
        assert_eq!(entry.ukphone.as_deref(), Some("/ˈæpl/"));
        assert_eq!(entry.translation.as_deref(), Some("n. 苹果\nn. 苹果树"));
    }

    #[test]
    fn missing_ec_is_an_empty_entry() {
        let entry = parse_entry(br#"{"input": "qwzx"}"#).unwrap();
        assert_eq!(entry, DictionaryEntry::default());
    }

    #[test]
    fn missing_phone_stays_absent() {
        let entry = parse_entry(br#"{"ec": {"word": [{"trs": []}]}}"#).unwrap();
        assert!(entry.usphone.is_none());
        assert!(entry.translation.is_none());
    }

    #[test]
    fn non_string_translation_items_are_skipped() {
        let body = br##"{"ec": {"word": [{"trs": [{"tr": [{"l": {"i": [{"#text": "x"}]}}]}]}]}}"##;
        let entry = parse_entry(body).unwrap();
        assert!(entry.translation.is_none());
    }

    #[test]
    fn html_body_is_malformed() {
        let err = parse_entry(b"<html>busy</html>").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }
}

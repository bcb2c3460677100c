//! Mock dictionary responses, audio clips and word list files

use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use wiremock::{Request, Respond, ResponseTemplate};

/// Query value of `name` in a mock request
pub fn query_value(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Dictionary body for `word`: phonetics plus a single translation `t-<word>`
pub fn dictionary_body(word: &str) -> String {
    json!({
        "ec": {
            "word": [{
                "usphone": format!("us-{word}"),
                "ukphone": format!("uk-{word}"),
                "trs": [{"tr": [{"l": {"i": [format!("t-{word}")]}}]}]
            }]
        }
    })
    .to_string()
}

/// Answers `/jsonapi` with [`dictionary_body`] for the `q` word
///
/// Words in `throttle_once` get one 429 first; words in `always_fail`
/// always get a 500.
#[derive(Default)]
pub struct DictionaryResponder {
    throttle_once: Mutex<HashSet<String>>,
    always_fail: HashSet<String>,
}

impl DictionaryResponder {
    /// Throttle each of `words` on its first request
    pub fn throttling<I: IntoIterator<Item = String>>(words: I) -> Self {
        Self {
            throttle_once: Mutex::new(words.into_iter().collect()),
            always_fail: HashSet::new(),
        }
    }

    /// Fail every request for `words`
    pub fn failing<I: IntoIterator<Item = String>>(words: I) -> Self {
        Self {
            throttle_once: Mutex::default(),
            always_fail: words.into_iter().collect(),
        }
    }
}

impl Respond for DictionaryResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let word = query_value(request, "q").unwrap_or_default();
        if self.always_fail.contains(&word) {
            return ResponseTemplate::new(500);
        }
        if self.throttle_once.lock().unwrap().remove(&word) {
            return ResponseTemplate::new(429);
        }
        ResponseTemplate::new(200).set_body_string(dictionary_body(&word))
    }
}

/// Mono 16-bit WAV holding a `ms` long 440 Hz tone
pub fn tone_wav(ms: u32, sample_rate: u32) -> Vec<u8> {
    let len = (sample_rate * ms / 1000) as usize;
    let samples: Vec<i16> = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            ((t * 440.0 * std::f32::consts::TAU).sin() * 0.5 * f32::from(i16::MAX)) as i16
        })
        .collect();
    vocab_fetch::sink::wav::wav_bytes(&samples, sample_rate).unwrap()
}

/// Words `w0..w{n-1}`
pub fn words(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("w{i}")).collect()
}

/// Write a word list file named `file` under `dir`
pub fn write_word_list(dir: &Path, file: &str, name: &str, words: &[String]) -> PathBuf {
    let records: Vec<_> = words.iter().map(|w| json!({"value": w})).collect();
    let body = json!({
        "name": name,
        "size": words.len(),
        "wordList": records,
    });
    let path = dir.join(file);
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    path
}

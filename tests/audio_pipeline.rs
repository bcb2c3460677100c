//! End-to-end pronunciation synthesis with the WAV fallback encoder

mod common;

use common::*;
use std::sync::Arc;
use vocab_fetch::config::GapPolicy;
use vocab_fetch::{Accent, Error, NoProgress, SinkError, VocabDownloader};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RATE: u32 = 22050;

fn wav_samples(path: &std::path::Path) -> Vec<i16> {
    hound::WavReader::open(path)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect()
}

#[tokio::test]
async fn clips_are_joined_in_word_then_accent_order() {
    let server = MockServer::start().await;
    // UK clips last 200 ms, US clips 100 ms, so the order is visible in the output
    Mock::given(method("GET"))
        .and(path("/dictvoice"))
        .and(query_param("type", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tone_wav(200, RATE)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dictvoice"))
        .and(query_param("type", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tone_wav(100, RATE)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, dir.path());
    config.audio.accents = vec![Accent::Uk, Accent::Us];
    config.audio.sample_rate = RATE;
    config.assembly.gap = GapPolicy::Fixed { seconds: 0.5 };
    // Two words per part so the combine step joins several parts
    config.assembly.flush_count_threshold = 2;
    let downloader = VocabDownloader::new(config).await.unwrap();

    let input = write_word_list(dir.path(), "list.json", "Unit1", &words(3));
    let output = dir.path().join("list.mp3");
    let outcome = downloader
        .synthesize_audio(&input, &output, Arc::new(NoProgress))
        .await
        .unwrap();

    let summary = outcome.summary().unwrap();
    assert_eq!(summary.artifact, dir.path().join("list.wav"));
    assert_eq!(summary.batches, 2);

    let samples = wav_samples(&summary.artifact);
    let clip = |ms: usize| ms * RATE as usize / 1000;
    // 3 x (uk + gap + us) with a gap between words and none after the last clip
    let expected = 3 * (clip(200) + clip(100)) + 5 * clip(500);
    let tolerance = clip(10) * 6;
    assert!(
        samples.len().abs_diff(expected) <= tolerance,
        "got {} samples, expected about {}",
        samples.len(),
        expected
    );

    // The first gap starts right after the first UK clip
    let first_gap = &samples[clip(200) + clip(20)..clip(200) + clip(480)];
    assert!(first_gap.iter().all(|s| *s == 0));
    assert_eq!(leftover_scratch(dir.path()), 0);
}

#[tokio::test]
async fn undecodable_clips_are_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dictvoice"))
        .and(query_param("audio", "w1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not audio".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dictvoice"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tone_wav(100, RATE)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, dir.path());
    config.audio.accents = vec![Accent::Us];
    config.assembly.gap = GapPolicy::Fixed { seconds: 0.0 };
    let downloader = VocabDownloader::new(config).await.unwrap();

    let input = write_word_list(dir.path(), "list.json", "Unit2", &words(3));
    let outcome = downloader
        .synthesize_audio(&input, &dir.path().join("out.mp3"), Arc::new(NoProgress))
        .await
        .unwrap();

    let summary = outcome.summary().unwrap();
    assert!(summary.failed.is_empty());
    let samples = wav_samples(&summary.artifact);
    let clip = 100 * RATE as usize / 1000;
    assert!(samples.len().abs_diff(2 * clip) <= clip / 5);
}

#[tokio::test]
async fn run_without_any_audio_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dictvoice"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"garbage".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = test_downloader(&server, dir.path()).await;
    let input = write_word_list(dir.path(), "list.json", "Unit3", &words(2));
    let output = dir.path().join("out.mp3");

    let err = downloader
        .synthesize_audio(&input, &output, Arc::new(NoProgress))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Sink(SinkError::Empty(_))), "unexpected error: {err}");
    assert!(!output.with_extension("wav").exists());
    assert_eq!(leftover_scratch(dir.path()), 0);
}

use super::*;
use crate::error::SinkError;
use crate::pipeline::NoProgress;
use std::path::Path;

fn config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.temp_dir = dir.join("tmp");
    config.fetch.cache_dir = Some(dir.join("cache"));
    config
}

#[tokio::test]
async fn new_creates_scratch_and_cache_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let downloader = VocabDownloader::new(config(dir.path())).await.unwrap();

    assert!(dir.path().join("tmp").is_dir());
    assert!(dir.path().join("cache").is_dir());
    assert!(!downloader.is_shut_down());
}

#[tokio::test]
async fn new_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.concurrency.initial_concurrency = 20;

    match VocabDownloader::new(config).await {
        Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("initial_concurrency")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("config should have been rejected"),
    }
}

#[tokio::test]
async fn audio_for_empty_list_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.json");
    std::fs::write(&input, r#"{"name": "empty", "wordList": []}"#).unwrap();

    let downloader = VocabDownloader::new(config(dir.path())).await.unwrap();
    let err = downloader
        .synthesize_audio(&input, &dir.path().join("out.mp3"), Arc::new(NoProgress))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sink(SinkError::Empty(_))));
}

#[tokio::test]
async fn enriching_an_empty_list_writes_it_back() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.json");
    std::fs::write(&input, r#"{"name": "empty", "wordList": [], "size": 0}"#).unwrap();

    let downloader = VocabDownloader::new(config(dir.path())).await.unwrap();
    let mut events = downloader.subscribe();
    let outcome = downloader
        .enrich_word_list(&input, &input, Arc::new(NoProgress))
        .await
        .unwrap();

    assert_eq!(outcome.summary().unwrap().processed, 0);
    assert!(matches!(
        events.try_recv().unwrap(),
        Event::RunStarted { total: 0, .. }
    ));
}

#[tokio::test]
async fn shutdown_cancels_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("words.json");
    std::fs::write(&input, r#"{"wordList": [{"value": "apple"}]}"#).unwrap();
    let output = dir.path().join("out.json");

    let downloader = VocabDownloader::new(config(dir.path())).await.unwrap();
    downloader.shutdown();
    let outcome = downloader
        .enrich_word_list(&input, &output, Arc::new(NoProgress))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        RunOutcome::Cancelled {
            processed: 0,
            total: 1
        }
    ));
    assert!(!output.exists());
}

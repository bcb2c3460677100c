//! Pronunciation audio sink
//!
//! Each fetched clip is decoded with symphonia, downmixed to mono,
//! resampled with rubato to the configured rate and trimmed of leading and
//! trailing silence. Batches are written as 16-bit mono WAV parts and joined
//! by a [`FinalEncoder`].

use super::encoder::{FinalEncoder, select_encoder};
use super::{BatchSink, wav};
use crate::config::{AudioConfig, GapPolicy};
use crate::error::{Error, Result, SinkError};
use crate::pipeline::{Batch, Fragment, Scratch};
use crate::types::{ItemOutcome, Payload};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Silence analysis window
const FRAME_MS: u32 = 10;

/// Mono 16-bit PCM at a fixed sample rate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clip {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl Clip {
    /// Clip from raw samples
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// `ms` milliseconds of silence
    pub fn silence(ms: u64, sample_rate: u32) -> Self {
        let len = (ms * u64::from(sample_rate) / 1000) as usize;
        Self::new(vec![0; len], sample_rate)
    }

    /// Samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }
}

impl Fragment for Clip {
    fn size(&self) -> u64 {
        self.duration_ms()
    }

    fn gap_after(&self, policy: &GapPolicy) -> Option<Self> {
        Some(Clip::silence(
            policy.gap_ms(self.duration_ms()),
            self.sample_rate,
        ))
    }
}

/// Decode an encoded clip to mono f32 at its native rate
pub fn decode_mono(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Audio(format!("unrecognized audio format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Audio("no audio track".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Audio("sample rate not specified".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Audio(format!("no decoder: {e}")))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Audio(format!("failed to read packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped rather than failing the clip
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!(error = msg, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(Error::Audio(format!("decode failed: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        mono.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    Ok((mono, sample_rate))
}

/// Resample mono samples from `from` Hz to `to` Hz
pub fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples);
    }
    let mut resampler = FastFixedIn::<f32>::new(
        f64::from(to) / f64::from(from),
        1.0,
        PolynomialDegree::Septic,
        samples.len(),
        1,
    )
    .map_err(|e| Error::Audio(format!("failed to create resampler: {e}")))?;

    let input = vec![samples];
    let output = resampler
        .process(&input, None)
        .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
    Ok(output.into_iter().next().unwrap_or_default())
}

/// Drop leading and trailing 10 ms frames whose RMS is below `threshold_db` dBFS
///
/// Returns the input unchanged when no frame is above the threshold.
pub fn trim_silence(samples: &[f32], sample_rate: u32, threshold_db: f32) -> &[f32] {
    let frame_len = ((sample_rate * FRAME_MS / 1000) as usize).max(1);
    let loud = |frame: &[f32]| {
        let mean_square = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        let rms = mean_square.sqrt();
        rms > 0.0 && 20.0 * rms.log10() > threshold_db
    };

    let frames: Vec<&[f32]> = samples.chunks(frame_len).collect();
    let Some(first) = frames.iter().position(|f| loud(f)) else {
        return samples;
    };
    let last = frames.iter().rposition(|f| loud(f)).unwrap_or(first);

    let start = first * frame_len;
    let end = ((last + 1) * frame_len).min(samples.len());
    &samples[start..end]
}

fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
        .collect()
}

/// Sink assembling pronunciation clips into one audio file
pub struct AudioSink {
    config: AudioConfig,
    output: PathBuf,
    encoder: Arc<dyn FinalEncoder>,
}

impl std::fmt::Debug for AudioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSink")
            .field("output", &self.output)
            .field("encoder", &self.encoder.name())
            .finish()
    }
}

impl AudioSink {
    /// Sink writing to `output`, choosing ffmpeg when available
    pub fn new(config: &AudioConfig, output: impl Into<PathBuf>) -> Self {
        let encoder = select_encoder(config.ffmpeg_path.as_deref(), config.search_path);
        Self::with_encoder(config, output, encoder)
    }

    /// Sink with an explicit encoder
    pub fn with_encoder(
        config: &AudioConfig,
        output: impl Into<PathBuf>,
        encoder: Arc<dyn FinalEncoder>,
    ) -> Self {
        Self {
            config: config.clone(),
            output: output.into(),
            encoder,
        }
    }

    /// Decode, resample and trim one encoded clip
    pub fn prepare_clip(&self, bytes: &[u8]) -> Result<Clip> {
        let (mono, native_rate) = decode_mono(bytes)?;
        let resampled = resample(mono, native_rate, self.config.sample_rate)?;
        let kept = if self.config.trim_silence {
            trim_silence(
                &resampled,
                self.config.sample_rate,
                self.config.silence_threshold_db,
            )
        } else {
            &resampled
        };
        Ok(Clip::new(to_i16(kept), self.config.sample_rate))
    }
}

#[async_trait::async_trait]
impl BatchSink for AudioSink {
    type Fragment = Clip;

    fn fragments(&self, outcome: &ItemOutcome) -> Result<Vec<Clip>> {
        let mut clips = Vec::new();
        for (resource, payload) in outcome.payloads() {
            let Payload::Audio(bytes) = payload else {
                continue;
            };
            match self.prepare_clip(bytes) {
                Ok(clip) => clips.push(clip),
                Err(e) => tracing::warn!(
                    index = outcome.item.index,
                    key = %outcome.item.key,
                    resource = %resource.label(),
                    error = %e,
                    "dropping undecodable clip"
                ),
            }
        }
        Ok(clips)
    }

    async fn persist_batch(
        &self,
        scratch: &Scratch,
        batch: Batch<Clip>,
    ) -> std::result::Result<PathBuf, SinkError> {
        let seq = batch.seq;
        let path = scratch.part_path(seq, "wav");
        let target = path.clone();
        let sample_rate = self.config.sample_rate;

        tokio::task::spawn_blocking(move || {
            let samples = batch
                .fragments
                .iter()
                .flat_map(|clip| clip.samples().iter().copied());
            wav::write_wav(&target, sample_rate, samples)
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()))
        .map_err(|reason| SinkError::Encode { seq, reason })?;

        Ok(path)
    }

    async fn combine(
        &self,
        scratch: &Scratch,
        parts: Vec<PathBuf>,
    ) -> std::result::Result<PathBuf, SinkError> {
        let headers = parts.clone();
        let samples = tokio::task::spawn_blocking(move || wav::total_samples(&headers))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()))
            .map_err(|reason| SinkError::Combine {
                parts: parts.len(),
                output: self.output.clone(),
                reason,
            })?;
        if samples == 0 {
            return Err(SinkError::Empty("no audio was produced".to_string()));
        }

        // Artifacts a failed encoder may have started; pre-existing files are left alone
        let mut fresh = Vec::new();
        for candidate in [self.output.clone(), self.output.with_extension("wav")] {
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(true) {
                fresh.push(candidate);
            }
        }

        let artifact = match self
            .encoder
            .encode(scratch.path(), &parts, &self.output)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                for path in fresh {
                    if tokio::fs::remove_file(&path).await.is_ok() {
                        tracing::warn!(path = %path.display(), "removed partial artifact");
                    }
                }
                return Err(e);
            }
        };
        tracing::info!(
            output = %artifact.display(),
            encoder = self.encoder.name(),
            parts = parts.len(),
            seconds = samples / u64::from(self.config.sample_rate.max(1)),
            "wrote audio"
        );
        Ok(artifact)
    }
}

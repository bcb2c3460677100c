//! 16-bit mono WAV helpers

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Format of every part and fallback artifact
pub fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write samples to a new WAV file
pub fn write_wav<I>(path: &Path, sample_rate: u32, samples: I) -> Result<(), hound::Error>
where
    I: IntoIterator<Item = i16>,
{
    let mut writer = WavWriter::create(path, mono_spec(sample_rate))?;
    for sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Encode samples as in-memory WAV bytes
pub fn wav_bytes(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut buf = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut buf), mono_spec(sample_rate))?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(buf)
}

/// Total samples across `parts`, read from their headers
pub fn total_samples(parts: &[PathBuf]) -> Result<u64, hound::Error> {
    let mut total = 0u64;
    for part in parts {
        total += u64::from(WavReader::open(part)?.duration());
    }
    Ok(total)
}

/// Concatenate WAV parts into `output`; returns the number of samples written
///
/// The first part's format is used for the output.
pub fn concat_wavs(parts: &[PathBuf], output: &Path) -> Result<u64, hound::Error> {
    let Some(first) = parts.first() else {
        return Ok(0);
    };
    let spec = WavReader::open(first)?.spec();
    let mut writer = WavWriter::create(output, spec)?;
    let mut written = 0u64;
    for part in parts {
        let mut reader = WavReader::open(part)?;
        for sample in reader.samples::<i16>() {
            writer.write_sample(sample?)?;
            written += 1;
        }
    }
    writer.finalize()?;
    Ok(written)
}

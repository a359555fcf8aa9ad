use hound::{SampleFormat, WavReader};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;
use twotone_core::{SampleBuffer, ToneDecodeError};

#[derive(Debug, Error)]
pub enum WavError {
    #[error("Could not read WAV: {0}")]
    Hound(#[from] hound::Error),

    #[error("Unsupported WAV format: {bits}-bit {format:?}")]
    UnsupportedFormat { bits: u16, format: SampleFormat },

    #[error(transparent)]
    Decode(#[from] ToneDecodeError),
}

/// Read a WAV file into a mono buffer normalized to [-1.0, 1.0]
pub fn read_wav_file(path: &Path) -> Result<SampleBuffer, WavError> {
    let reader = WavReader::open(path)?;
    read_wav(reader)
}

/// Same as `read_wav_file` for an in-memory upload
pub fn read_wav_bytes(bytes: &[u8]) -> Result<SampleBuffer, WavError> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    read_wav(reader)
}

fn read_wav<R: Read>(mut reader: WavReader<R>) -> Result<SampleBuffer, WavError> {
    let spec = reader.spec();
    tracing::debug!(
        "WAV: {} Hz, {} channels, {}-bit {:?}, {} frames",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        spec.sample_format,
        reader.duration()
    );

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, 8) => int_samples::<i8, _>(&mut reader, 8)?,
        (SampleFormat::Int, 16) => int_samples::<i16, _>(&mut reader, 16)?,
        (SampleFormat::Int, 24) | (SampleFormat::Int, 32) => int_samples::<i32, _>(&mut reader, spec.bits_per_sample)?,
        (format, bits) => return Err(WavError::UnsupportedFormat { bits, format }),
    };

    Ok(SampleBuffer::from_interleaved(&interleaved, spec.channels, spec.sample_rate)?)
}

/// Scale signed integer samples of `bits` width to [-1.0, 1.0)
fn int_samples<S, R>(reader: &mut WavReader<R>, bits: u16) -> Result<Vec<f32>, WavError>
where
    S: hound::Sample + Into<i32>,
    R: Read,
{
    let scale = (1i64 << (bits - 1)) as f32;
    reader
        .samples::<S>()
        .map(|s| {
            let value: i32 = s?.into();
            Ok(value as f32 / scale)
        })
        .collect()
}

#[cfg(test)]
fn pcm16_spec(channels: u16, sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode mono f32 samples as an in-memory 16-bit WAV
#[cfg(test)]
pub(crate) fn encode_pcm16(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), pcm16_spec(1, sample_rate)).unwrap();
        for &sample in samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

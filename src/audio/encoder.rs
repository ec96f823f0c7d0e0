//! Encoding negotiation and artifact finalization

use super::types::{AudioArtifact, AudioChunk, CaptureError, EncodingFormat};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::info;

/// Negotiation preference order, most desirable first
const PREFERRED_FORMATS: [EncodingFormat; 2] = [EncodingFormat::OpusWebm, EncodingFormat::Wav];

/// Whether this build carries an encoder for the format. Opus would need a
/// native encoder; the WAV path is always available.
const fn can_encode(format: EncodingFormat) -> bool {
    matches!(format, EncodingFormat::Wav)
}

/// Pick the artifact encoding, once per device open.
///
/// Deterministic: the first entry of the preference order this build can
/// encode wins. Downstream services key their decode path on the resulting
/// MIME type, so the outcome is logged.
pub(crate) fn negotiate_encoding() -> Result<EncodingFormat, CaptureError> {
    for format in PREFERRED_FORMATS {
        if can_encode(format) {
            info!(format = %format, mime_type = format.mime_type(), "Negotiated artifact encoding");
            return Ok(format);
        }
    }
    Err(CaptureError::UnsupportedEncoding(
        "no artifact encoder available in this build".to_string(),
    ))
}

/// Concatenate buffered chunks into a single finalized artifact
pub(crate) fn finalize_chunks(
    chunks: &[AudioChunk],
    format: EncodingFormat,
) -> Result<AudioArtifact, CaptureError> {
    if chunks.is_empty() {
        return Err(CaptureError::NoAudioCaptured);
    }

    let sample_rate = chunks[0].sample_rate;
    let total_samples: usize = chunks.iter().map(|c| c.samples.len()).sum();

    let bytes = match format {
        EncodingFormat::Wav => encode_wav(chunks, sample_rate)?,
        EncodingFormat::OpusWebm => {
            return Err(CaptureError::UnsupportedEncoding(
                "opus encoder not available in this build".to_string(),
            ))
        }
    };

    Ok(AudioArtifact {
        bytes,
        mime_type: format.mime_type().to_string(),
        duration_secs: total_samples as f64 / sample_rate as f64,
        chunk_count: chunks.len(),
    })
}

fn encode_wav(chunks: &[AudioChunk], sample_rate: u32) -> Result<Vec<u8>, CaptureError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer =
        WavWriter::new(&mut cursor, spec).map_err(|e| CaptureError::Encode(e.to_string()))?;
    for chunk in chunks {
        for &sample in &chunk.samples {
            writer
                .write_sample(sample)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
    }
    writer
        .finalize()
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    Ok(cursor.into_inner())
}

//! Mono downmix, resampling, and chunk assembly for captured samples

use super::types::{AudioChunk, TARGET_SAMPLE_RATE};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Samples per emitted chunk (0.1 seconds of audio at 16kHz)
pub(crate) const CHUNK_SIZE: usize = 1600;

/// Accumulates raw callback samples and emits fixed-size mono chunks at the
/// target rate, resampling when the hardware rate differs.
///
/// Runs inside the audio callback, so `push` never blocks; chunks that
/// cannot be delivered are dropped with a warning.
pub(crate) struct ChunkAssembler {
    channels: usize,
    resampler: Option<SincFixedIn<f32>>,
    input_chunk_size: usize,
    input_buffer: Vec<i16>,
    output_buffer: Vec<i16>,
    sender: mpsc::Sender<AudioChunk>,
}

impl ChunkAssembler {
    pub(crate) fn new(sample_rate: u32, channels: usize, sender: mpsc::Sender<AudioChunk>) -> Self {
        let (resampler, input_chunk_size) = if sample_rate != TARGET_SAMPLE_RATE {
            info!(
                "Creating resampler: {} Hz -> {} Hz",
                sample_rate, TARGET_SAMPLE_RATE
            );
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            // Input chunk size that resamples down to CHUNK_SIZE output samples
            let input_frames = (CHUNK_SIZE as f64 * sample_rate as f64 / TARGET_SAMPLE_RATE as f64)
                .ceil() as usize;
            match SincFixedIn::<f32>::new(
                TARGET_SAMPLE_RATE as f64 / sample_rate as f64,
                2.0,
                params,
                input_frames,
                1, // mono
            ) {
                Ok(resampler) => (Some(resampler), input_frames),
                Err(e) => {
                    error!("Failed to create resampler: {}", e);
                    (None, CHUNK_SIZE)
                }
            }
        } else {
            (None, CHUNK_SIZE)
        };

        Self {
            channels,
            resampler,
            input_chunk_size,
            input_buffer: Vec::with_capacity(input_chunk_size * 2),
            output_buffer: Vec::with_capacity(CHUNK_SIZE * 2),
            sender,
        }
    }

    /// Feed interleaved samples from the audio callback
    pub(crate) fn push(&mut self, data: &[i16]) {
        let mono = downmix(data, self.channels);
        if self.resampler.is_some() {
            self.push_resampled(mono);
        } else {
            self.output_buffer.extend(mono);
        }
        self.flush_chunks();
    }

    fn push_resampled(&mut self, mono: Vec<i16>) {
        self.input_buffer.extend(mono);

        while self.input_buffer.len() >= self.input_chunk_size {
            let frame: Vec<f32> = self
                .input_buffer
                .drain(..self.input_chunk_size)
                .map(|s| s as f32 / 32768.0)
                .collect();

            let Some(resampler) = self.resampler.as_mut() else {
                return;
            };
            match resampler.process(&[frame], None) {
                Ok(resampled) => {
                    self.output_buffer.extend(
                        resampled[0]
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16),
                    );
                }
                Err(e) => {
                    error!("Resampling error: {}", e);
                }
            }
        }
    }

    fn flush_chunks(&mut self) {
        while self.output_buffer.len() >= CHUNK_SIZE {
            let samples: Vec<i16> = self.output_buffer.drain(..CHUNK_SIZE).collect();
            let chunk = AudioChunk {
                samples,
                sample_rate: TARGET_SAMPLE_RATE,
            };
            // try_send keeps the audio callback non-blocking
            if let Err(e) = self.sender.try_send(chunk) {
                warn!("Audio buffer overflow - chunk dropped: {}", e);
                return;
            }
        }
    }
}

/// Convert interleaved samples to mono by averaging channels
fn downmix(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let stereo = [100i16, 200, -50, 50];
        assert_eq!(downmix(&stereo, 2), vec![150, 0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let mono = [1i16, 2, 3];
        assert_eq!(downmix(&mono, 1), vec![1, 2, 3]);
    }

    #[test]
    fn test_chunks_emitted_at_fixed_size() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut assembler = ChunkAssembler::new(TARGET_SAMPLE_RATE, 1, tx);

        assembler.push(&vec![0i16; CHUNK_SIZE * 2 + 100]);

        let first = rx.try_recv().expect("Expected first chunk");
        let second = rx.try_recv().expect("Expected second chunk");
        assert_eq!(first.samples.len(), CHUNK_SIZE);
        assert_eq!(second.samples.len(), CHUNK_SIZE);
        assert_eq!(first.sample_rate, TARGET_SAMPLE_RATE);
        // the 100-sample remainder stays buffered
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stereo_input_halves_sample_count() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut assembler = ChunkAssembler::new(TARGET_SAMPLE_RATE, 2, tx);

        assembler.push(&vec![0i16; CHUNK_SIZE * 2]);

        let chunk = rx.try_recv().expect("Expected one chunk");
        assert_eq!(chunk.samples.len(), CHUNK_SIZE);
        assert!(rx.try_recv().is_err());
    }
}

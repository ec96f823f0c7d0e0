//! Audio capture module using cpal for cross-platform microphone access
//!
//! Captures mono audio from a selected (or default) input device at 16kHz,
//! buffers it as fixed-size PCM chunks, and finalizes the buffer into a
//! single encoded artifact when the recording stops. The hardware stream is
//! released on every exit path, including cancellation and errors.

mod encoder;
mod resampler;
mod types;

pub use types::{
    AudioArtifact, AudioChunk, CaptureError, CaptureHandle, EncodingFormat, TARGET_SAMPLE_RATE,
};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use resampler::ChunkAssembler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// How long to wait for the capture thread to report stream startup
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for a late capture thread before detaching it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A single-use audio input that buffers chunks and finalizes them into one
/// artifact.
///
/// Implemented by [`MicrophoneDevice`] for real hardware; tests substitute
/// scripted fakes.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Open the input stream and begin buffering chunks.
    ///
    /// `device_id` selects a named input; `None` uses the platform default.
    /// Returns the encoding negotiated for the finalized artifact. Fails
    /// with `PermissionDenied` or `DeviceUnavailable` without leaving a
    /// stream open.
    async fn open(&mut self, device_id: Option<&str>) -> Result<EncodingFormat, CaptureError>;

    /// Number of chunks buffered so far
    fn buffered_chunks(&self) -> usize;

    /// Stop the stream and concatenate buffered chunks into one artifact.
    ///
    /// The hardware stream is released unconditionally, on the error paths
    /// too.
    async fn finalize(&mut self) -> Result<AudioArtifact, CaptureError>;

    /// Stop the stream and discard buffered chunks without producing an
    /// artifact
    async fn cancel(&mut self);

    fn is_open(&self) -> bool;
}

/// cpal-backed microphone capture
pub struct MicrophoneDevice {
    open_capture: Option<OpenCapture>,
}

struct OpenCapture {
    handle: CaptureHandle,
    buffer: Arc<Mutex<Vec<AudioChunk>>>,
    drain_task: tokio::task::JoinHandle<()>,
    format: EncodingFormat,
}

impl MicrophoneDevice {
    pub fn new() -> Self {
        Self { open_capture: None }
    }
}

impl Default for MicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for MicrophoneDevice {
    async fn open(&mut self, device_id: Option<&str>) -> Result<EncodingFormat, CaptureError> {
        if self.open_capture.is_some() {
            return Err(CaptureError::ConfigError(
                "capture stream already open".to_string(),
            ));
        }

        let format = encoder::negotiate_encoding()?;
        let (handle, mut chunk_rx) = start_capture(device_id.map(str::to_owned))?;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let drain_buffer = buffer.clone();
        let drain_task = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                if let Ok(mut buf) = drain_buffer.lock() {
                    buf.push(chunk);
                }
            }
        });

        self.open_capture = Some(OpenCapture {
            handle,
            buffer,
            drain_task,
            format,
        });
        Ok(format)
    }

    fn buffered_chunks(&self) -> usize {
        self.open_capture
            .as_ref()
            .and_then(|open| open.buffer.lock().ok().map(|buf| buf.len()))
            .unwrap_or(0)
    }

    async fn finalize(&mut self) -> Result<AudioArtifact, CaptureError> {
        let mut open = self.open_capture.take().ok_or(CaptureError::NotOpen)?;

        // Release the hardware first; the channel closes when the capture
        // thread exits, which lets the drain task run to completion.
        open.handle.stop();
        let _ = open.drain_task.await;

        let chunks = open.buffer.lock().map(|buf| buf.clone()).unwrap_or_default();
        encoder::finalize_chunks(&chunks, open.format)
    }

    async fn cancel(&mut self) {
        if let Some(mut open) = self.open_capture.take() {
            open.handle.stop();
            open.drain_task.abort();
            let discarded = open.buffer.lock().map(|buf| buf.len()).unwrap_or(0);
            info!("Capture cancelled, {} buffered chunks discarded", discarded);
        }
    }

    fn is_open(&self) -> bool {
        self.open_capture.is_some()
    }
}

/// Start audio capture on a dedicated thread.
///
/// Blocks briefly until the capture thread reports that the stream started
/// (or failed to), so acquisition errors surface to the caller instead of
/// only landing in the log.
fn start_capture(
    device_id: Option<String>,
) -> Result<(CaptureHandle, mpsc::Receiver<AudioChunk>), CaptureError> {
    let is_capturing = Arc::new(AtomicBool::new(true));
    let flag = is_capturing.clone();

    let (chunk_tx, chunk_rx) = mpsc::channel(600);
    let (startup_tx, startup_rx) = std::sync::mpsc::channel();

    let thread_handle = thread::spawn(move || {
        run_capture(device_id, flag, chunk_tx, startup_tx);
    });

    match startup_rx.recv_timeout(STARTUP_TIMEOUT) {
        Ok(Ok(())) => Ok((
            CaptureHandle {
                is_capturing,
                thread_handle: Some(thread_handle),
            },
            chunk_rx,
        )),
        Ok(Err(e)) => {
            let _ = thread_handle.join();
            Err(e)
        }
        Err(_) => {
            is_capturing.store(false, Ordering::SeqCst);
            reap_capture_thread(thread_handle, &startup_rx);
            Err(CaptureError::DeviceUnavailable(
                "timed out waiting for the input stream to start".to_string(),
            ))
        }
    }
}

/// Join a capture thread that missed the startup deadline.
///
/// A slow thread still sends its startup result once `build_stream`
/// returns, and then exits promptly because the capture flag is already
/// false; joining it closes any stream it managed to open. A thread that
/// stays silent past the grace period is detached rather than hanging the
/// caller.
fn reap_capture_thread(
    handle: thread::JoinHandle<()>,
    startup_rx: &std::sync::mpsc::Receiver<Result<(), CaptureError>>,
) {
    if startup_rx.recv_timeout(SHUTDOWN_GRACE).is_ok() {
        let _ = handle.join();
    } else {
        warn!("Capture thread did not report startup, detaching");
    }
}

/// Run audio capture on the current thread (blocking)
fn run_capture(
    device_id: Option<String>,
    is_capturing: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
    startup_tx: std::sync::mpsc::Sender<Result<(), CaptureError>>,
) {
    match build_stream(device_id.as_deref(), is_capturing.clone(), chunk_tx) {
        Ok(stream) => {
            let _ = startup_tx.send(Ok(()));

            // Keep the stream alive until capture is stopped
            while is_capturing.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
            }
            drop(stream);
        }
        Err(e) => {
            error!("Audio capture error: {}", e);
            let _ = startup_tx.send(Err(e));
        }
    }
}

fn build_stream(
    device_id: Option<&str>,
    is_capturing: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
) -> Result<cpal::Stream, CaptureError> {
    let device = resolve_device(device_id)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio input device: {}", device_name);

    let supported_config = select_input_config(&device)?;
    let sample_format = supported_config.sample_format();
    let config: cpal::StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    info!("Audio config: {} channels, {} Hz", channels, sample_rate);

    let assembler = Arc::new(Mutex::new(ChunkAssembler::new(
        sample_rate,
        channels,
        chunk_tx,
    )));

    let err_callback = |err| {
        error!("Audio stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::I16 => {
            let flag = is_capturing.clone();
            let assembler = assembler.clone();
            device
                .build_input_stream(
                    &config,
                    move |data: &[i16], _| {
                        if !flag.load(Ordering::SeqCst) {
                            return;
                        }
                        if let Ok(mut assembler) = assembler.lock() {
                            assembler.push(data);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(map_build_error)?
        }
        SampleFormat::F32 => {
            let flag = is_capturing.clone();
            let assembler = assembler.clone();
            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        if !flag.load(Ordering::SeqCst) {
                            return;
                        }
                        let samples: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                            .collect();
                        if let Ok(mut assembler) = assembler.lock() {
                            assembler.push(&samples);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(map_build_error)?
        }
        other => {
            return Err(CaptureError::UnsupportedFormat(format!("{:?}", other)));
        }
    };

    stream.play()?;
    info!("Audio capture started");
    Ok(stream)
}

fn resolve_device(device_id: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match device_id {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable(format!("input device '{}' not found", name))
            }),
        None => host.default_input_device().ok_or_else(|| {
            CaptureError::DeviceUnavailable("no default input device".to_string())
        }),
    }
}

/// Find an input config at the target rate, or fall back to the closest
/// supported rate and resample
fn select_input_config(
    device: &cpal::Device,
) -> Result<cpal::SupportedStreamConfig, CaptureError> {
    let supported_configs = device
        .supported_input_configs()
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?;

    let mut best_config = None;
    let mut found_target_rate = false;

    for config in supported_configs {
        if config.channels() == 0 {
            continue;
        }
        if config.min_sample_rate().0 <= TARGET_SAMPLE_RATE
            && config.max_sample_rate().0 >= TARGET_SAMPLE_RATE
        {
            best_config = Some(config.with_sample_rate(cpal::SampleRate(TARGET_SAMPLE_RATE)));
            found_target_rate = true;
            break;
        } else if best_config.is_none() {
            best_config = Some(config.with_max_sample_rate());
        }
    }

    let config = best_config.ok_or(CaptureError::NoSupportedConfig)?;
    if !found_target_rate {
        warn!(
            "{}Hz not supported, capturing at {}Hz and resampling",
            TARGET_SAMPLE_RATE,
            config.sample_rate().0
        );
    }
    Ok(config)
}

fn map_build_error(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable(
            "device disappeared before the stream started".to_string(),
        ),
        cpal::BuildStreamError::BackendSpecific { err }
            if err.description.to_lowercase().contains("permission") =>
        {
            CaptureError::PermissionDenied
        }
        other => CaptureError::StreamError(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_capture_thread_is_joined() {
        let (startup_tx, startup_rx) = std::sync::mpsc::channel();
        let exited = Arc::new(AtomicBool::new(false));
        let exited_flag = exited.clone();
        let handle = thread::spawn(move || {
            // Startup report arrives after the caller has given up waiting
            thread::sleep(Duration::from_millis(20));
            let _ = startup_tx.send(Ok(()));
            exited_flag.store(true, Ordering::SeqCst);
        });

        reap_capture_thread(handle, &startup_rx);

        assert!(exited.load(Ordering::SeqCst));
    }
}

//! Audio types and error definitions

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::info;

/// Capture sample rate (Hz) expected by the transcription service
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// One buffered chunk of mono PCM audio
///
/// The capture device emits chunks periodically rather than only at stop,
/// which bounds callback-side memory and lets a UI show liveness.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// PCM 16-bit signed samples (mono)
    pub samples: Vec<i16>,
    /// Sample rate in Hz (typically 16000)
    pub sample_rate: u32,
}

/// The finalized audio payload of one recording
///
/// Produced exactly once per capture. Downstream services key their decode
/// path on the MIME type.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_secs: f64,
    pub chunk_count: usize,
}

/// Encoding negotiated once at device-open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    /// Opus in a WebM container (preferred, compressed)
    OpusWebm,
    /// Uncompressed 16-bit PCM WAV (fallback)
    Wav,
}

impl EncodingFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            EncodingFormat::OpusWebm => "audio/webm;codecs=opus",
            EncodingFormat::Wav => "audio/wav",
        }
    }
}

impl fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingFormat::OpusWebm => write!(f, "opus/webm"),
            EncodingFormat::Wav => write!(f, "wav"),
        }
    }
}

/// Handle for controlling the capture thread from outside
pub struct CaptureHandle {
    pub(crate) is_capturing: Arc<AtomicBool>,
    pub(crate) thread_handle: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Stop the hardware stream and wait for the capture thread to exit
    pub fn stop(&mut self) {
        self.is_capturing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            info!("Audio capture stopped");
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }
}

/// Releases the stream even when the handle is discarded without an
/// explicit `stop()`, so a dropped device never leaves the microphone open.
impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Errors that can occur during audio capture
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Microphone access denied")]
    PermissionDenied,

    #[error("Audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No supported audio configuration found")]
    NoSupportedConfig,

    #[error("No artifact encoding available: {0}")]
    UnsupportedEncoding(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio captured")]
    NoAudioCaptured,

    #[error("Capture device is not open")]
    NotOpen,

    #[error("Audio configuration error: {0}")]
    ConfigError(String),

    #[error("Audio stream error: {0}")]
    StreamError(#[from] cpal::BuildStreamError),

    #[error("Audio play error: {0}")]
    PlayError(#[from] cpal::PlayStreamError),

    #[error("Device enumeration error: {0}")]
    DeviceError(#[from] cpal::DevicesError),

    #[error("Artifact encoding failed: {0}")]
    Encode(String),
}

//! Capture session state machine.
//!
//! Enforces valid transitions for the capture lifecycle:
//! - Idle -> Armed (patient attached)
//! - Armed -> Recording (microphone acquired)
//! - Recording -> Transcribing (recording finalized)
//! - Transcribing -> Summarizing (non-empty transcript)
//! - Summarizing -> Ready (note published)
//! - Transcribing -> Armed (no speech detected)
//! - Recording -> Armed (capture cancelled)
//! - Recording/Transcribing/Summarizing -> Failed (attempt failed)
//! - Ready/Failed -> Idle (explicit reset only)

use std::fmt;

/// Lifecycle state of the single capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CaptureState {
    /// No patient attached. Nothing may start.
    #[default]
    Idle,
    /// Patient attached, ready to record.
    Armed,
    /// Microphone open, chunks being buffered.
    Recording,
    /// Artifact finalized, awaiting the transcription service.
    Transcribing,
    /// Transcript obtained, awaiting note generation.
    Summarizing,
    /// Completed note published.
    Ready,
    /// The attempt stopped on an error; see the session's failure reason.
    Failed,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Armed => write!(f, "Armed"),
            CaptureState::Recording => write!(f, "Recording"),
            CaptureState::Transcribing => write!(f, "Transcribing"),
            CaptureState::Summarizing => write!(f, "Summarizing"),
            CaptureState::Ready => write!(f, "Ready"),
            CaptureState::Failed => write!(f, "Failed"),
        }
    }
}

impl CaptureState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &CaptureState) -> bool {
        matches!(
            (self, target),
            (CaptureState::Idle, CaptureState::Armed)
                | (CaptureState::Armed, CaptureState::Recording)
                | (CaptureState::Recording, CaptureState::Transcribing)
                | (CaptureState::Transcribing, CaptureState::Summarizing)
                | (CaptureState::Summarizing, CaptureState::Ready)
                // Re-arm: cancelled capture, or a transcript with no speech
                | (CaptureState::Recording, CaptureState::Armed)
                | (CaptureState::Transcribing, CaptureState::Armed)
                // Failure paths
                | (CaptureState::Recording, CaptureState::Failed)
                | (CaptureState::Transcribing, CaptureState::Failed)
                | (CaptureState::Summarizing, CaptureState::Failed)
                // Explicit reset only
                | (CaptureState::Ready, CaptureState::Idle)
                | (CaptureState::Failed, CaptureState::Idle)
        )
    }
}

/// Why an attempt stopped making progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Microphone access refused. Fatal for the attempt; the user retries.
    PermissionDenied,
    /// Input device missing or busy. Transient, the session stays armed.
    DeviceUnavailable,
    /// Recording could not be finalized into an artifact.
    Capture,
    /// The transcription service failed.
    Transcription,
    /// The note generation service failed. The transcript is retained.
    Summarization,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PermissionDenied => write!(f, "microphone access denied"),
            FailureReason::DeviceUnavailable => write!(f, "audio input device unavailable"),
            FailureReason::Capture => write!(f, "recording failed"),
            FailureReason::Transcription => write!(f, "transcription failed"),
            FailureReason::Summarization => write!(f, "note generation failed"),
        }
    }
}

//! Capture session management
//!
//! One [`CaptureController`] owns the single live capture session and
//! sequences the capture device, the transcription service, and the note
//! generation service. All session mutations happen synchronously inside
//! the controller's transition handlers; suspension occurs only at the I/O
//! boundaries (device acquisition, network calls). The presentation layer
//! observes progress through a broadcast event channel and never mutates
//! session state itself.
//!
//! A host that shares a controller across tasks must serialize calls
//! (mutex or actor mailbox); the `&mut self` methods make that explicit.

mod state;

pub use state::{CaptureState, FailureReason};

use crate::audio::{AudioArtifact, CaptureDevice, CaptureError};
use crate::error::{SummarizeError, TranscribeError};
use crate::summarize::{NoteGenerator, NoteRequest, NoteResult};
use crate::transcribe::SpeechToText;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Patient identity attached to a capture session.
///
/// Supplied by the external patient lookup; immutable once attached and
/// cleared only by `reset()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRef {
    pub id: String,
    pub name: String,
}

/// Snapshot of the single live capture session.
///
/// Created once with the controller and never destroyed, only reset back
/// to `Idle`.
#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    pub state: CaptureState,
    pub patient: Option<PatientRef>,
    /// Named input device captures use (None = platform default).
    /// Configuration, not attempt state; `reset()` leaves it in place.
    pub device_id: Option<String>,
    pub artifact: Option<AudioArtifact>,
    pub transcript: Option<String>,
    pub note: Option<NoteResult>,
    pub failure: Option<FailureReason>,
}

/// Status updates consumed by the presentation layer
#[derive(Debug, Clone)]
pub enum StatusEvent {
    StateChanged {
        from: CaptureState,
        to: CaptureState,
    },
    /// A user-visible status line for the current state or failure
    Status {
        message: String,
    },
    /// A completed note was published
    NoteReady {
        note: NoteResult,
    },
    /// The current attempt failed or could not start
    AttemptFailed {
        reason: FailureReason,
        message: String,
    },
}

/// Errors from invalid controller operations or failed attempts
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Cannot attach a patient while the session is {0}")]
    NotIdle(CaptureState),

    #[error("No patient attached to the session")]
    NoPatient,

    #[error("Cannot begin recording from state {0}")]
    NotArmed(CaptureState),

    #[error("Cannot reset from state {0}")]
    NotResettable(CaptureState),

    #[error("Capture device failed: {0}")]
    Device(#[from] CaptureError),

    #[error("Transcription failed: {0}")]
    Transcription(#[from] TranscribeError),

    #[error("Note generation failed: {0}")]
    Summarization(#[from] SummarizeError),
}

/// Sequences one capture session end to end.
///
/// Enforces the single-active-capture invariant: `begin()` only succeeds
/// from `Armed`, so at most one device stream is ever open.
pub struct CaptureController {
    session: CaptureSession,
    device: Box<dyn CaptureDevice>,
    transcriber: Arc<dyn SpeechToText>,
    summarizer: Arc<dyn NoteGenerator>,
    template_id: String,
    events: broadcast::Sender<StatusEvent>,
}

impl CaptureController {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        transcriber: Arc<dyn SpeechToText>,
        summarizer: Arc<dyn NoteGenerator>,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            session: CaptureSession::default(),
            device,
            transcriber,
            summarizer,
            template_id: crate::summarize::DEFAULT_TEMPLATE_ID.to_string(),
            events,
        }
    }

    /// Use this template id for note generation
    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = template_id.into();
        self
    }

    /// Capture from this named input device instead of the default
    pub fn with_input_device(mut self, device_id: Option<String>) -> Self {
        self.session.device_id = device_id;
        self
    }

    /// Subscribe to status events
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Current session snapshot
    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn state(&self) -> CaptureState {
        self.session.state
    }

    /// Number of audio chunks buffered so far, for recording liveness
    /// display. Zero outside of `Recording`.
    pub fn buffered_chunks(&self) -> usize {
        if self.session.state == CaptureState::Recording {
            self.device.buffered_chunks()
        } else {
            0
        }
    }

    /// Attach a patient: `Idle -> Armed`.
    ///
    /// Rejected while any capture is underway or a result is pending; the
    /// rejection is surfaced as a status event for the UI.
    pub fn attach_patient(&mut self, patient: PatientRef) -> Result<(), ControllerError> {
        if self.session.state != CaptureState::Idle {
            self.status("Finish or reset the current capture before selecting a patient");
            return Err(ControllerError::NotIdle(self.session.state));
        }

        info!(patient_id = %patient.id, "Patient attached");
        self.status(format!("Ready to record for {}", patient.name));
        self.session.patient = Some(patient);
        self.transition(CaptureState::Armed);
        Ok(())
    }

    /// Start recording: `Armed -> Recording`.
    ///
    /// Opens the capture device. If acquisition fails, no irreversible work
    /// has happened, so the session stays `Armed` and the attempt may be
    /// retried; the failure is reported through an event and the returned
    /// error.
    pub async fn begin(&mut self) -> Result<(), ControllerError> {
        if self.session.state != CaptureState::Armed {
            return Err(ControllerError::NotArmed(self.session.state));
        }
        if self.session.patient.is_none() {
            return Err(ControllerError::NoPatient);
        }

        match self.device.open(self.session.device_id.as_deref()).await {
            Ok(format) => {
                info!(%format, "Recording started");
                self.transition(CaptureState::Recording);
                self.status("Recording in progress...");
                Ok(())
            }
            Err(e) => {
                let reason = match &e {
                    CaptureError::PermissionDenied => FailureReason::PermissionDenied,
                    _ => FailureReason::DeviceUnavailable,
                };
                warn!(error = %e, "Could not open capture device");
                let _ = self.events.send(StatusEvent::AttemptFailed {
                    reason,
                    message: e.to_string(),
                });
                self.status(match reason {
                    FailureReason::PermissionDenied => {
                        "Could not access microphone. Please allow permissions."
                    }
                    _ => "Audio input device unavailable. Check the selected microphone.",
                });
                Err(ControllerError::Device(e))
            }
        }
    }

    /// Stop recording and run the transcribe/summarize pipeline to
    /// completion: `Recording -> Transcribing -> Summarizing -> Ready`.
    ///
    /// A no-op from any state other than `Recording`. The microphone is
    /// released before the first network call, so audio hardware and
    /// network are never concurrently active.
    pub async fn end(&mut self) -> Result<(), ControllerError> {
        if self.session.state != CaptureState::Recording {
            return Ok(());
        }

        self.status("Processing audio...");
        let artifact = match self.device.finalize().await {
            Ok(artifact) => artifact,
            Err(CaptureError::NoAudioCaptured) => {
                // Nothing was buffered; re-arm instead of failing the
                // attempt. The device is already released.
                warn!("Recording produced no audio chunks");
                self.transition(CaptureState::Armed);
                self.status("No audio captured");
                return Ok(());
            }
            Err(e) => {
                self.fail(FailureReason::Capture, e.to_string());
                return Err(ControllerError::Device(e));
            }
        };

        info!(
            duration_secs = artifact.duration_secs,
            chunks = artifact.chunk_count,
            mime_type = %artifact.mime_type,
            "Recording finalized"
        );
        self.transition(CaptureState::Transcribing);
        self.session.artifact = Some(artifact.clone());
        self.status("Transcribing encounter audio...");

        let transcript = match self.transcriber.transcribe(&artifact).await {
            Ok(result) => result,
            Err(e) => {
                self.fail(FailureReason::Transcription, e.to_string());
                return Err(ControllerError::Transcription(e));
            }
        };

        if transcript.text.trim().is_empty() {
            // Note generation on silence is guaranteed to be meaningless;
            // skip the call and keep the patient selection.
            info!("Transcription returned no speech");
            self.session.artifact = None;
            self.transition(CaptureState::Armed);
            self.status("No speech detected");
            return Ok(());
        }

        self.session.transcript = Some(transcript.text.clone());
        self.transition(CaptureState::Summarizing);
        self.status("Generating clinical note...");

        let Some(patient) = self.session.patient.clone() else {
            return Err(ControllerError::NoPatient);
        };
        let request = NoteRequest {
            transcript: transcript.text,
            patient,
            template_id: Some(self.template_id.clone()),
        };

        match self.summarizer.summarize(&request).await {
            Ok(note) => {
                self.session.note = Some(note.clone());
                self.transition(CaptureState::Ready);
                self.status("Note generated successfully");
                let _ = self.events.send(StatusEvent::NoteReady { note });
                Ok(())
            }
            Err(e) => {
                // The transcript stays readable; only the note step failed.
                self.fail(FailureReason::Summarization, e.to_string());
                Err(ControllerError::Summarization(e))
            }
        }
    }

    /// Abandon a recording in progress: `Recording -> Armed`.
    ///
    /// Discards buffered chunks without producing an artifact. A no-op in
    /// any other state; once transcription starts the attempt runs to
    /// completion or failure.
    pub async fn cancel(&mut self) {
        if self.session.state != CaptureState::Recording {
            return;
        }
        self.device.cancel().await;
        self.transition(CaptureState::Armed);
        self.status("Recording cancelled");
    }

    /// Clear the session: `Ready | Failed -> Idle`.
    ///
    /// The only transition that returns to `Idle`. Clears the patient,
    /// artifact, transcript, note, and failure reason.
    pub fn reset(&mut self) -> Result<(), ControllerError> {
        match self.session.state {
            CaptureState::Ready | CaptureState::Failed => {
                self.transition(CaptureState::Idle);
                self.session.patient = None;
                self.session.artifact = None;
                self.session.transcript = None;
                self.session.note = None;
                self.session.failure = None;
                self.status("Session reset");
                Ok(())
            }
            other => Err(ControllerError::NotResettable(other)),
        }
    }

    fn transition(&mut self, to: CaptureState) {
        let from = self.session.state;
        debug_assert!(from.can_transition_to(&to), "{} -> {}", from, to);
        tracing::debug!("Capture state: {} -> {}", from, to);
        self.session.state = to;
        let _ = self.events.send(StatusEvent::StateChanged { from, to });
    }

    fn fail(&mut self, reason: FailureReason, message: String) {
        error!(reason = %reason, message = %message, "Capture attempt failed");
        self.session.artifact = None;
        self.session.failure = Some(reason);
        self.transition(CaptureState::Failed);
        let _ = self.events.send(StatusEvent::AttemptFailed {
            reason,
            message,
        });
        self.status(format!("Error: {}", reason));
    }

    fn status(&self, message: impl Into<String>) {
        let _ = self.events.send(StatusEvent::Status {
            message: message.into(),
        });
    }
}

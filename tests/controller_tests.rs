//! End-to-end capture controller scenarios using scripted device and
//! service fakes.

use async_trait::async_trait;
use clinscribe::audio::{AudioArtifact, CaptureDevice, CaptureError, EncodingFormat};
use clinscribe::error::{SummarizeError, TranscribeError};
use clinscribe::session::{CaptureController, CaptureState, FailureReason, PatientRef};
use clinscribe::summarize::{NoteGenerator, NoteRequest, NoteResult};
use clinscribe::transcribe::{SpeechToText, TranscriptResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy)]
enum OpenOutcome {
    Succeed,
    DeviceUnavailable,
    PermissionDenied,
}

/// Capture device fake that records stream lifecycle for assertions.
///
/// Panics if a second stream is opened while one is already live, which
/// turns the single-open-stream property into a hard test failure.
struct FakeDevice {
    outcome: OpenOutcome,
    chunks: usize,
    stream_open: Arc<AtomicBool>,
    opened_count: Arc<AtomicUsize>,
}

impl FakeDevice {
    fn new(chunks: usize) -> (Self, Arc<AtomicBool>, Arc<AtomicUsize>) {
        let stream_open = Arc::new(AtomicBool::new(false));
        let opened_count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                outcome: OpenOutcome::Succeed,
                chunks,
                stream_open: stream_open.clone(),
                opened_count: opened_count.clone(),
            },
            stream_open,
            opened_count,
        )
    }

    fn failing(outcome: OpenOutcome) -> Self {
        Self {
            outcome,
            chunks: 0,
            stream_open: Arc::new(AtomicBool::new(false)),
            opened_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl CaptureDevice for FakeDevice {
    async fn open(&mut self, _device_id: Option<&str>) -> Result<EncodingFormat, CaptureError> {
        match self.outcome {
            OpenOutcome::DeviceUnavailable => {
                Err(CaptureError::DeviceUnavailable("mic unplugged".to_string()))
            }
            OpenOutcome::PermissionDenied => Err(CaptureError::PermissionDenied),
            OpenOutcome::Succeed => {
                let was_open = self.stream_open.swap(true, Ordering::SeqCst);
                assert!(!was_open, "a second stream was opened while one was live");
                self.opened_count.fetch_add(1, Ordering::SeqCst);
                Ok(EncodingFormat::Wav)
            }
        }
    }

    fn buffered_chunks(&self) -> usize {
        if self.stream_open.load(Ordering::SeqCst) {
            self.chunks
        } else {
            0
        }
    }

    async fn finalize(&mut self) -> Result<AudioArtifact, CaptureError> {
        self.stream_open.store(false, Ordering::SeqCst);
        if self.chunks == 0 {
            return Err(CaptureError::NoAudioCaptured);
        }
        Ok(AudioArtifact {
            bytes: vec![0u8; 64 * self.chunks],
            mime_type: "audio/wav".to_string(),
            duration_secs: 0.1 * self.chunks as f64,
            chunk_count: self.chunks,
        })
    }

    async fn cancel(&mut self) {
        self.stream_open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.stream_open.load(Ordering::SeqCst)
    }
}

/// Transcriber fake: replies with a fixed transcript, or fails when `None`.
struct FakeTranscriber {
    reply: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FakeTranscriber {
    fn replying(text: &str) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                reply: Some(text.to_string()),
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl SpeechToText for FakeTranscriber {
    async fn transcribe(
        &self,
        _artifact: &AudioArtifact,
    ) -> Result<TranscriptResult, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(text) => Ok(TranscriptResult {
                text: text.clone(),
                confidence: Some(0.95),
            }),
            None => Err(TranscribeError::ServerError {
                status: 500,
                message: "decode failed".to_string(),
            }),
        }
    }
}

/// Summarizer fake: echoes the request into a note, recording what it saw.
struct FakeSummarizer {
    fail: bool,
    calls: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<NoteRequest>>>,
}

impl FakeSummarizer {
    fn succeeding() -> (Arc<Self>, Arc<AtomicUsize>, Arc<Mutex<Option<NoteRequest>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let last_request = Arc::new(Mutex::new(None));
        (
            Arc::new(Self {
                fail: false,
                calls: calls.clone(),
                last_request: last_request.clone(),
            }),
            calls,
            last_request,
        )
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl NoteGenerator for FakeSummarizer {
    async fn summarize(&self, request: &NoteRequest) -> Result<NoteResult, SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if self.fail {
            return Err(SummarizeError::ServerError {
                status: 500,
                message: "model unavailable".to_string(),
            });
        }
        Ok(NoteResult {
            note: format!("SUBJECTIVE:\n{}", request.transcript),
            template_id: request.effective_template_id().to_string(),
            template_used: Some("SOAP General".to_string()),
            note_id: Some("note-1".to_string()),
            generated_at: chrono::Utc::now(),
        })
    }
}

fn jane_doe() -> PatientRef {
    PatientRef {
        id: "p1".to_string(),
        name: "Jane Doe".to_string(),
    }
}

#[tokio::test]
async fn happy_path_generates_note() {
    let (device, stream_open, _) = FakeDevice::new(2);
    let (transcriber, _) = FakeTranscriber::replying("tooth pain upper left");
    let (summarizer, _, last_request) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    assert_eq!(controller.state(), CaptureState::Armed);

    controller.begin().await.unwrap();
    assert_eq!(controller.state(), CaptureState::Recording);
    assert_eq!(controller.buffered_chunks(), 2);

    controller.end().await.unwrap();
    assert_eq!(controller.state(), CaptureState::Ready);

    let session = controller.session();
    assert_eq!(session.transcript.as_deref(), Some("tooth pain upper left"));
    let note = session.note.as_ref().expect("note should be published");
    assert!(!note.note.is_empty());
    assert_eq!(note.template_id, "default_soap");
    assert!(session.artifact.is_some());
    assert!(!stream_open.load(Ordering::SeqCst), "stream must be released");

    let request = last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.patient, jane_doe());
    assert_eq!(request.effective_template_id(), "default_soap");
}

#[tokio::test]
async fn empty_transcript_rearms_without_summarizing() {
    let (device, _, _) = FakeDevice::new(2);
    let (transcriber, _) = FakeTranscriber::replying("   ");
    let (summarizer, summarize_calls, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    controller.end().await.unwrap();

    assert_eq!(controller.state(), CaptureState::Armed);
    assert_eq!(summarize_calls.load(Ordering::SeqCst), 0);

    let session = controller.session();
    assert!(session.note.is_none());
    assert!(session.artifact.is_none());
    assert_eq!(session.patient, Some(jane_doe()));
}

#[tokio::test]
async fn end_outside_recording_is_a_noop() {
    let (device, _, opened) = FakeDevice::new(2);
    let (transcriber, transcribe_calls) = FakeTranscriber::replying("hello");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    // Idle
    controller.end().await.unwrap();
    assert_eq!(controller.state(), CaptureState::Idle);

    // Armed
    controller.attach_patient(jane_doe()).unwrap();
    controller.end().await.unwrap();
    assert_eq!(controller.state(), CaptureState::Armed);

    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert_eq!(transcribe_calls.load(Ordering::SeqCst), 0);
    assert!(controller.session().transcript.is_none());
}

#[tokio::test]
async fn device_unavailable_keeps_session_armed() {
    let device = FakeDevice::failing(OpenOutcome::DeviceUnavailable);
    let (transcriber, _) = FakeTranscriber::replying("hello");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    let result = controller.begin().await;
    assert!(result.is_err());

    // Recoverable: nothing irreversible happened, so the session is not
    // Failed and the patient selection survives.
    assert_eq!(controller.state(), CaptureState::Armed);
    assert_eq!(controller.session().patient, Some(jane_doe()));
    assert!(controller.session().failure.is_none());
}

#[tokio::test]
async fn permission_denied_keeps_session_armed() {
    let device = FakeDevice::failing(OpenOutcome::PermissionDenied);
    let (transcriber, _) = FakeTranscriber::replying("hello");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    assert!(controller.begin().await.is_err());
    assert_eq!(controller.state(), CaptureState::Armed);
}

#[tokio::test]
async fn transcription_failure_fails_the_attempt() {
    let (device, stream_open, _) = FakeDevice::new(3);
    let transcriber = FakeTranscriber::failing();
    let (summarizer, summarize_calls, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    assert!(controller.end().await.is_err());

    assert_eq!(controller.state(), CaptureState::Failed);
    assert_eq!(
        controller.session().failure,
        Some(FailureReason::Transcription)
    );
    assert!(controller.session().artifact.is_none());
    assert!(!stream_open.load(Ordering::SeqCst), "stream must be released");
    assert_eq!(summarize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn summarization_failure_keeps_transcript() {
    let (device, _, _) = FakeDevice::new(2);
    let (transcriber, _) = FakeTranscriber::replying("tooth pain upper left");
    let summarizer = FakeSummarizer::failing();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    assert!(controller.end().await.is_err());

    assert_eq!(controller.state(), CaptureState::Failed);
    assert_eq!(
        controller.session().failure,
        Some(FailureReason::Summarization)
    );
    // The transcript survives a note generation failure
    assert_eq!(
        controller.session().transcript.as_deref(),
        Some("tooth pain upper left")
    );
    assert!(controller.session().note.is_none());
}

#[tokio::test]
async fn zero_chunk_recording_rearms() {
    let (device, _, _) = FakeDevice::new(0);
    let (transcriber, transcribe_calls) = FakeTranscriber::replying("hello");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    controller.end().await.unwrap();

    assert_eq!(controller.state(), CaptureState::Armed);
    assert_eq!(transcribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_discards_capture_and_rearms() {
    let (device, stream_open, _) = FakeDevice::new(2);
    let (transcriber, transcribe_calls) = FakeTranscriber::replying("hello");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    controller.cancel().await;

    assert_eq!(controller.state(), CaptureState::Armed);
    assert!(!stream_open.load(Ordering::SeqCst));

    // Stopping after a cancel does nothing
    controller.end().await.unwrap();
    assert_eq!(controller.state(), CaptureState::Armed);
    assert_eq!(transcribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reset_clears_session_from_ready() {
    let (device, _, _) = FakeDevice::new(2);
    let (transcriber, _) = FakeTranscriber::replying("tooth pain upper left");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    controller.end().await.unwrap();
    assert_eq!(controller.state(), CaptureState::Ready);

    controller.reset().unwrap();
    assert_eq!(controller.state(), CaptureState::Idle);

    let session = controller.session();
    assert!(session.patient.is_none());
    assert!(session.artifact.is_none());
    assert!(session.transcript.is_none());
    assert!(session.note.is_none());
    assert!(session.failure.is_none());
}

#[tokio::test]
async fn reset_is_rejected_mid_attempt() {
    let (device, _, _) = FakeDevice::new(2);
    let (transcriber, _) = FakeTranscriber::replying("hello");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    assert!(controller.reset().is_err());

    controller.attach_patient(jane_doe()).unwrap();
    assert!(controller.reset().is_err());

    controller.begin().await.unwrap();
    assert!(controller.reset().is_err());
    assert_eq!(controller.state(), CaptureState::Recording);
}

#[tokio::test]
async fn attach_patient_rejected_outside_idle() {
    let (device, _, _) = FakeDevice::new(2);
    let (transcriber, _) = FakeTranscriber::replying("hello");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    let second = PatientRef {
        id: "p2".to_string(),
        name: "John Roe".to_string(),
    };
    assert!(controller.attach_patient(second).is_err());
    assert_eq!(controller.session().patient, Some(jane_doe()));
}

#[tokio::test]
async fn repeated_captures_never_overlap_streams() {
    let (device, _, opened) = FakeDevice::new(2);
    let (transcriber, _) = FakeTranscriber::replying("tooth pain upper left");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer);

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();

    // A second begin while recording is rejected without touching the device
    assert!(controller.begin().await.is_err());
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    controller.end().await.unwrap();
    controller.reset().unwrap();

    // The FakeDevice would panic if streams ever overlapped
    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    controller.end().await.unwrap();
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert_eq!(controller.state(), CaptureState::Ready);
}

#[tokio::test]
async fn selected_input_device_is_visible_in_snapshot() {
    let (device, _, _) = FakeDevice::new(1);
    let (transcriber, _) = FakeTranscriber::replying("tooth pain upper left");
    let (summarizer, _, _) = FakeSummarizer::succeeding();

    let mut controller = CaptureController::new(Box::new(device), transcriber, summarizer)
        .with_input_device(Some("USB Microphone".to_string()));

    assert_eq!(
        controller.session().device_id.as_deref(),
        Some("USB Microphone")
    );

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    controller.end().await.unwrap();
    controller.reset().unwrap();

    // Device selection is configuration and survives a reset
    assert_eq!(
        controller.session().device_id.as_deref(),
        Some("USB Microphone")
    );
}

#[tokio::test]
async fn custom_template_is_forwarded() {
    let (device, _, _) = FakeDevice::new(1);
    let (transcriber, _) = FakeTranscriber::replying("routine prophylaxis");
    let (summarizer, _, last_request) = FakeSummarizer::succeeding();

    let mut controller =
        CaptureController::new(Box::new(device), transcriber, summarizer)
            .with_template("default_hygiene");

    controller.attach_patient(jane_doe()).unwrap();
    controller.begin().await.unwrap();
    controller.end().await.unwrap();

    let request = last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.effective_template_id(), "default_hygiene");
}

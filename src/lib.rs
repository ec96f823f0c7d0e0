//! Clinical encounter capture, transcription, and note generation client.
//!
//! The capture pipeline runs in four stages: a [`audio::CaptureDevice`]
//! buffers microphone audio into one finalized artifact, a
//! [`transcribe::SpeechToText`] client converts it to text, a
//! [`summarize::NoteGenerator`] turns the transcript into a structured
//! clinical note, and the [`session::CaptureController`] state machine
//! sequences the three while guaranteeing a single capture in flight and a
//! released microphone on every exit path.

pub mod audio;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;
pub mod summarize;
pub mod transcribe;

pub use session::{
    CaptureController, CaptureSession, CaptureState, FailureReason, PatientRef, StatusEvent,
};

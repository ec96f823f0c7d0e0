//! Remote note generation client.
//!
//! Sends a transcript plus patient and template context to the note
//! generation endpoint and returns the structured clinical note. Like
//! transcription, a failed attempt is terminal; the caller decides what to
//! retry.

use crate::auth::CredentialProvider;
use crate::error::SummarizeError;
use crate::session::PatientRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Template used when the caller does not select one
pub const DEFAULT_TEMPLATE_ID: &str = "default_soap";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Note generation service seam
#[async_trait]
pub trait NoteGenerator: Send + Sync {
    async fn summarize(&self, request: &NoteRequest) -> Result<NoteResult, SummarizeError>;
}

/// Input to note generation
#[derive(Debug, Clone)]
pub struct NoteRequest {
    pub transcript: String,
    pub patient: PatientRef,
    /// Template selector; `None` falls back to [`DEFAULT_TEMPLATE_ID`]
    pub template_id: Option<String>,
}

impl NoteRequest {
    pub fn effective_template_id(&self) -> &str {
        self.template_id.as_deref().unwrap_or(DEFAULT_TEMPLATE_ID)
    }
}

/// A generated clinical note plus service-side metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteResult {
    pub note: String,
    /// Template id the request was made with
    pub template_id: String,
    /// Display name of the template the service actually applied
    pub template_used: Option<String>,
    /// Identifier of the saved note, when the service persists it
    pub note_id: Option<String>,
    /// When this client received the note
    pub generated_at: DateTime<Utc>,
}

/// Request body for the note generation endpoint
#[derive(Debug, Serialize)]
struct GenerateNoteRequest<'a> {
    transcript: &'a str,
    patient_name: &'a str,
    patient_id: &'a str,
    template_id: &'a str,
}

/// Success response from the note generation endpoint
#[derive(Debug, Deserialize)]
struct GenerateNoteResponse {
    note: String,
    #[serde(default)]
    template_used: Option<String>,
    #[serde(default)]
    note_id: Option<String>,
}

/// Error response body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the remote note generation endpoint
pub struct HttpSummarizationClient {
    endpoint: Url,
    credentials: Arc<dyn CredentialProvider>,
    client: reqwest::Client,
}

impl HttpSummarizationClient {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SummarizeError> {
        let endpoint = Url::parse(&format!("{}/generate-note", base_url.trim_end_matches('/')))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            endpoint,
            credentials,
            client,
        })
    }
}

#[async_trait]
impl NoteGenerator for HttpSummarizationClient {
    #[instrument(skip(self, request), fields(transcript_len = request.transcript.len(), patient_id = %request.patient.id))]
    async fn summarize(&self, request: &NoteRequest) -> Result<NoteResult, SummarizeError> {
        let template_id = request.effective_template_id();
        let request_body = GenerateNoteRequest {
            transcript: &request.transcript,
            patient_name: &request.patient.name,
            patient_id: &request.patient.id,
            template_id,
        };

        let response = self
            .credentials
            .apply(self.client.post(self.endpoint.clone()))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => String::new(),
            };
            return Err(SummarizeError::ServerError { status, message });
        }

        let body: GenerateNoteResponse = response.json().await.map_err(|e| {
            SummarizeError::InvalidResponse(format!("Failed to parse note response: {}", e))
        })?;

        info!(
            chars = body.note.len(),
            template_id = template_id,
            note_id = ?body.note_id,
            "Note generated"
        );
        Ok(NoteResult {
            note: body.note,
            template_id: template_id.to_string(),
            template_used: body.template_used,
            note_id: body.note_id,
            generated_at: Utc::now(),
        })
    }
}

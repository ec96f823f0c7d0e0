//! Remote transcription client.
//!
//! Submits one finalized audio artifact to the speech-to-text endpoint as
//! base64 inside a JSON envelope and returns plain text. Retry policy
//! belongs to the caller; a failed attempt here is terminal.

use crate::audio::AudioArtifact;
use crate::auth::CredentialProvider;
use crate::error::TranscribeError;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Overall request timeout; long encounters upload slowly
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Speech-to-text service seam
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, artifact: &AudioArtifact)
        -> Result<TranscriptResult, TranscribeError>;
}

/// Transcription output
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    /// Confidence reported by the upstream STT model, when available
    pub confidence: Option<f64>,
}

/// Request body for the transcription endpoint
#[derive(Debug, Serialize)]
struct TranscribeRequest {
    audio: String,
}

/// Success response from the transcription endpoint
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    transcript: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Error response body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the remote transcription endpoint
pub struct HttpTranscriptionClient {
    endpoint: Url,
    credentials: Arc<dyn CredentialProvider>,
    client: reqwest::Client,
}

impl HttpTranscriptionClient {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, TranscribeError> {
        let endpoint = Url::parse(&format!("{}/transcribe", base_url.trim_end_matches('/')))?;
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
impl SpeechToText for HttpTranscriptionClient {
    #[instrument(skip(self, artifact), fields(bytes = artifact.bytes.len(), mime_type = %artifact.mime_type))]
    async fn transcribe(
        &self,
        artifact: &AudioArtifact,
    ) -> Result<TranscriptResult, TranscribeError> {
        let audio = base64::engine::general_purpose::STANDARD.encode(&artifact.bytes);
        let request_body = TranscribeRequest { audio };

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
            return Err(TranscribeError::ServerError { status, message });
        }

        let body: TranscribeResponse = response.json().await.map_err(|e| {
            TranscribeError::InvalidResponse(format!("Failed to parse transcript response: {}", e))
        })?;

        info!(
            chars = body.transcript.len(),
            confidence = ?body.confidence,
            "Transcription complete"
        );
        Ok(TranscriptResult {
            text: body.transcript,
            confidence: body.confidence,
        })
    }
}

use anyhow::Context;
use clap::Parser;
use clinscribe::audio::MicrophoneDevice;
use clinscribe::auth::{CredentialProvider, StaticBearer};
use clinscribe::config::AppConfig;
use clinscribe::session::{CaptureController, PatientRef, StatusEvent};
use clinscribe::summarize::HttpSummarizationClient;
use clinscribe::transcribe::HttpTranscriptionClient;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Record a patient encounter, transcribe it, and generate a clinical note
#[derive(Debug, Parser)]
#[command(name = "clinscribe", version, about)]
struct Args {
    /// Patient identifier from the patient registry
    #[arg(long)]
    patient_id: String,

    /// Patient display name
    #[arg(long)]
    patient_name: String,

    /// Note template id (overrides the configured default)
    #[arg(long)]
    template: Option<String>,

    /// Path to a config.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    let credentials: Arc<dyn CredentialProvider> = Arc::new(
        StaticBearer::from_env("CLINSCRIBE_API_TOKEN")
            .context("CLINSCRIBE_API_TOKEN is not set")?,
    );
    let transcriber = HttpTranscriptionClient::new(&config.api.base_url, credentials.clone())?;
    let summarizer = HttpSummarizationClient::new(&config.api.base_url, credentials)?;

    let template = args.template.unwrap_or(config.note.template_id);
    let mut controller = CaptureController::new(
        Box::new(MicrophoneDevice::new()),
        Arc::new(transcriber),
        Arc::new(summarizer),
    )
    .with_template(template)
    .with_input_device(config.audio.input_device);

    // Relay user-visible status lines to the terminal
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let StatusEvent::Status { message } = event {
                info!("{message}");
            }
        }
    });

    controller.attach_patient(PatientRef {
        id: args.patient_id,
        name: args.patient_name,
    })?;
    controller.begin().await?;

    println!("Recording... press Enter to stop.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    lines.next_line().await?;

    if let Err(e) = controller.end().await {
        error!("Capture attempt failed: {e}");
    }

    let session = controller.session();
    if let Some(note) = &session.note {
        println!("\n{}", note.note);
        if let Some(note_id) = &note.note_id {
            info!(note_id = %note_id, generated_at = %note.generated_at, "Note saved by the service");
        }
    } else if let Some(transcript) = &session.transcript {
        // Note generation failed; the transcript survives so the user does
        // not have to re-record.
        println!("\nTranscript (no note was generated):\n{transcript}");
    }

    Ok(())
}

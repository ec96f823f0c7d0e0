//! Application configuration
//!
//! Loaded from an optional TOML file, with environment variable overrides
//! applied on top. Environment variables are read after `dotenvy` has had a
//! chance to populate them from a `.env` file.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub audio: AudioConfig,
    pub note: NoteConfig,
}

/// Remote service endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the transcription/note-generation API
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Audio capture settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Named input device to capture from (None = platform default)
    pub input_device: Option<String>,
}

/// Note generation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoteConfig {
    /// Template id sent with every note generation request
    pub template_id: String,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            template_id: crate::summarize::DEFAULT_TEMPLATE_ID.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the given file, falling back to defaults
    /// when no path is supplied. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("CLINSCRIBE_API_BASE_URL") {
            self.api.base_url = base_url;
        }
        if let Ok(device) = std::env::var("CLINSCRIBE_INPUT_DEVICE") {
            self.audio.input_device = Some(device);
        }
        if let Ok(template) = std::env::var("CLINSCRIBE_TEMPLATE_ID") {
            self.note.template_id = template;
        }
    }
}

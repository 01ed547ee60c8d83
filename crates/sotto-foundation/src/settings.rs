//! Application settings loaded from a TOML file and environment overrides.
//!
//! Credentials are optional per provider; the provider registry decides
//! which providers are actually usable from what is configured here.

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;

use crate::error::SettingsError;

/// Default fallback wait after a stop command before giving up on the
/// VAD's speech-stopped confirmation.
pub const DEFAULT_FINALIZATION_TIMEOUT_SECS: f64 = 0.5;

/// Default window for late transcript fragments after speech stopped.
/// Restarts on every fragment, so this bounds the gap, not the total.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    // STT provider credentials (at least one required)
    pub deepgram_api_key: Option<String>,
    pub assemblyai_api_key: Option<String>,
    pub cartesia_api_key: Option<String>,
    pub speechmatics_api_key: Option<String>,
    pub azure_speech_key: Option<String>,
    pub azure_speech_region: Option<String>,
    pub groq_api_key: Option<String>,
    /// Local whisper needs no credentials, only an explicit opt-in.
    pub whisper_enabled: bool,

    // LLM provider credentials (at least one required)
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub cerebras_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub ollama_base_url: Option<String>,
    pub ollama_model: Option<String>,

    // Resolved when a client selects the "auto" provider
    pub auto_stt_provider: Option<String>,
    pub auto_llm_provider: Option<String>,

    // Server configuration for the outer transport layer
    pub host: String,
    pub port: u16,
    pub log_level: String,

    // Initial turn timeouts in seconds; runtime-adjustable per session
    pub finalization_timeout_secs: f64,
    pub drain_timeout_secs: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deepgram_api_key: None,
            assemblyai_api_key: None,
            cartesia_api_key: None,
            speechmatics_api_key: None,
            azure_speech_key: None,
            azure_speech_region: None,
            groq_api_key: None,
            whisper_enabled: false,
            openai_api_key: None,
            openai_base_url: None,
            anthropic_api_key: None,
            google_api_key: None,
            cerebras_api_key: None,
            openrouter_api_key: None,
            ollama_base_url: None,
            ollama_model: None,
            auto_stt_provider: None,
            auto_llm_provider: None,
            host: "127.0.0.1".to_string(),
            port: 8765,
            log_level: "info".to_string(),
            finalization_timeout_secs: DEFAULT_FINALIZATION_TIMEOUT_SECS,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply `SOTTO_*`
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let cfg = builder
            .add_source(Environment::with_prefix("SOTTO"))
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        info!(
            target: "settings",
            "Settings loaded (listen {}:{}, timeouts {}s/{}s)",
            settings.host,
            settings.port,
            settings.finalization_timeout_secs,
            settings.drain_timeout_secs
        );
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !(self.finalization_timeout_secs.is_finite() && self.finalization_timeout_secs > 0.0) {
            return Err(SettingsError::Invalid {
                field: "finalization_timeout_secs",
                reason: format!("must be a positive number, got {}", self.finalization_timeout_secs),
            });
        }
        if !(self.drain_timeout_secs.is_finite() && self.drain_timeout_secs > 0.0) {
            return Err(SettingsError::Invalid {
                field: "drain_timeout_secs",
                reason: format!("must be a positive number, got {}", self.drain_timeout_secs),
            });
        }
        Ok(())
    }
}

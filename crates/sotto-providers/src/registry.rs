//! Provider catalog: which STT/LLM providers exist, what credentials
//! each needs, and which are usable with the loaded settings.
//!
//! The registry is read-only configuration resolved at session start.
//! It never talks to the network; it maps configuration to handles the
//! pipeline legs consume.

use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use sotto_foundation::Settings;
use sotto_protocol::{LlmProviderId, SttProviderId};

#[derive(Error, Debug, PartialEq)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider '{0}' not available (no credentials configured)")]
    NotAvailable(String),

    #[error("No auto {kind} provider configured")]
    AutoNotConfigured { kind: &'static str },

    #[error("Invalid auto {kind} provider configured: {value}")]
    InvalidAuto { kind: &'static str, value: String },

    #[error("No {kind} provider configured. Configure credentials for at least one of: {names}")]
    NoneConfigured { kind: &'static str, names: String },
}

/// Credentials resolved for one provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    ApiKey(String),
    KeyAndRegion { key: String, region: String },
    BaseUrl { url: String, model: Option<String> },
    /// Local providers that need opt-in only.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SttHandle {
    pub id: SttProviderId,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmHandle {
    pub id: LlmProviderId,
    pub credentials: Credentials,
}

pub fn stt_display_name(id: SttProviderId) -> &'static str {
    match id {
        SttProviderId::Deepgram => "Deepgram",
        SttProviderId::Assemblyai => "AssemblyAI",
        SttProviderId::Cartesia => "Cartesia",
        SttProviderId::Speechmatics => "Speechmatics",
        SttProviderId::Azure => "Azure Speech",
        SttProviderId::Groq => "Groq",
        SttProviderId::Whisper => "Whisper (local)",
    }
}

pub fn llm_display_name(id: LlmProviderId) -> &'static str {
    match id {
        LlmProviderId::Openai => "OpenAI",
        LlmProviderId::Anthropic => "Anthropic",
        LlmProviderId::Google => "Google Gemini",
        LlmProviderId::Cerebras => "Cerebras",
        LlmProviderId::Openrouter => "OpenRouter",
        LlmProviderId::Ollama => "Ollama",
    }
}

pub struct ProviderRegistry {
    settings: Settings,
}

impl ProviderRegistry {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Credentials for an STT provider, or `None` when it is not
    /// configured.
    pub fn stt_credentials(&self, id: SttProviderId) -> Option<Credentials> {
        let s = &self.settings;
        match id {
            SttProviderId::Deepgram => s.deepgram_api_key.clone().map(Credentials::ApiKey),
            SttProviderId::Assemblyai => s.assemblyai_api_key.clone().map(Credentials::ApiKey),
            SttProviderId::Cartesia => s.cartesia_api_key.clone().map(Credentials::ApiKey),
            SttProviderId::Speechmatics => s.speechmatics_api_key.clone().map(Credentials::ApiKey),
            SttProviderId::Azure => match (&s.azure_speech_key, &s.azure_speech_region) {
                (Some(key), Some(region)) => Some(Credentials::KeyAndRegion {
                    key: key.clone(),
                    region: region.clone(),
                }),
                _ => None,
            },
            SttProviderId::Groq => s.groq_api_key.clone().map(Credentials::ApiKey),
            SttProviderId::Whisper => s.whisper_enabled.then_some(Credentials::None),
        }
    }

    /// Credentials for an LLM provider, or `None` when it is not
    /// configured.
    pub fn llm_credentials(&self, id: LlmProviderId) -> Option<Credentials> {
        let s = &self.settings;
        match id {
            LlmProviderId::Openai => s.openai_api_key.clone().map(Credentials::ApiKey),
            LlmProviderId::Anthropic => s.anthropic_api_key.clone().map(Credentials::ApiKey),
            LlmProviderId::Google => s.google_api_key.clone().map(Credentials::ApiKey),
            LlmProviderId::Cerebras => s.cerebras_api_key.clone().map(Credentials::ApiKey),
            LlmProviderId::Openrouter => s.openrouter_api_key.clone().map(Credentials::ApiKey),
            LlmProviderId::Ollama => s.ollama_model.as_ref().map(|model| Credentials::BaseUrl {
                url: s
                    .ollama_base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string()),
                model: Some(model.clone()),
            }),
        }
    }

    pub fn available_stt(&self) -> Vec<SttProviderId> {
        SttProviderId::ALL
            .iter()
            .copied()
            .filter(|id| self.stt_credentials(*id).is_some())
            .collect()
    }

    pub fn available_llm(&self) -> Vec<LlmProviderId> {
        LlmProviderId::ALL
            .iter()
            .copied()
            .filter(|id| self.llm_credentials(*id).is_some())
            .collect()
    }

    /// Resolve a client-supplied STT selection (`"auto"` or a provider
    /// id) to a configured handle.
    pub fn resolve_stt(&self, selection: &str) -> Result<SttHandle, ProviderError> {
        let id = match selection {
            "auto" => {
                let configured = self
                    .settings
                    .auto_stt_provider
                    .as_deref()
                    .ok_or(ProviderError::AutoNotConfigured { kind: "STT" })?;
                let id = SttProviderId::from_str(configured).map_err(|_| {
                    ProviderError::InvalidAuto {
                        kind: "STT",
                        value: configured.to_string(),
                    }
                })?;
                info!(target: "providers", "Auto mode for STT resolved to: {id}");
                id
            }
            other => SttProviderId::from_str(other)
                .map_err(|_| ProviderError::UnknownProvider(other.to_string()))?,
        };
        let credentials = self
            .stt_credentials(id)
            .ok_or_else(|| ProviderError::NotAvailable(id.to_string()))?;
        Ok(SttHandle { id, credentials })
    }

    /// Resolve a client-supplied LLM selection (`"auto"` or a provider
    /// id) to a configured handle.
    pub fn resolve_llm(&self, selection: &str) -> Result<LlmHandle, ProviderError> {
        let id = match selection {
            "auto" => {
                let configured = self
                    .settings
                    .auto_llm_provider
                    .as_deref()
                    .ok_or(ProviderError::AutoNotConfigured { kind: "LLM" })?;
                let id = LlmProviderId::from_str(configured).map_err(|_| {
                    ProviderError::InvalidAuto {
                        kind: "LLM",
                        value: configured.to_string(),
                    }
                })?;
                info!(target: "providers", "Auto mode for LLM resolved to: {id}");
                id
            }
            other => LlmProviderId::from_str(other)
                .map_err(|_| ProviderError::UnknownProvider(other.to_string()))?,
        };
        let credentials = self
            .llm_credentials(id)
            .ok_or_else(|| ProviderError::NotAvailable(id.to_string()))?;
        Ok(LlmHandle { id, credentials })
    }

    /// Startup validation: at least one provider of each kind must be
    /// usable.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.available_stt().is_empty() {
            return Err(ProviderError::NoneConfigured {
                kind: "STT",
                names: SttProviderId::ALL
                    .iter()
                    .map(|id| stt_display_name(*id))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        if self.available_llm().is_empty() {
            return Err(ProviderError::NoneConfigured {
                kind: "LLM",
                names: LlmProviderId::ALL
                    .iter()
                    .map(|id| llm_display_name(*id))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        Ok(())
    }
}

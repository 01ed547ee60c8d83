//! Client/server message schemas.
//!
//! Client messages are a discriminated union on the `type` field.
//! Unknown message shapes are preserved as [`ClientMessage::Unknown`]
//! rather than dropped, so newer clients keep working against older
//! servers without breaking parsing.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::ActiveAppContextSnapshot;

/// Setting names echoed in `config-updated` / `config-error` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingName {
    SttProvider,
    LlmProvider,
    FormatBypass,
    FinalizationTimeout,
    DrainTimeout,
    PromptSections,
}

/// Optional payload attached to `start-recording`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRecordingData {
    /// Malformed snapshots parse to `None`; they must never reject the
    /// enclosing start-recording message.
    #[serde(default, deserialize_with = "lenient_snapshot")]
    pub active_app_context: Option<ActiveAppContextSnapshot>,
}

fn lenient_snapshot<'de, D>(
    deserializer: D,
) -> Result<Option<ActiveAppContextSnapshot>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(ActiveAppContextSnapshot::from_value))
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatBypassData {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutData {
    pub seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderData {
    pub provider: String,
}

/// Prompt section overrides; `None` means "use the built-in default".
#[derive(Debug, Clone, Deserialize)]
pub struct PromptSectionsData {
    #[serde(default)]
    pub main_custom: Option<String>,
    #[serde(default = "default_true")]
    pub advanced_enabled: bool,
    #[serde(default)]
    pub advanced_custom: Option<String>,
    #[serde(default)]
    pub dictionary_enabled: bool,
    #[serde(default)]
    pub dictionary_custom: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Every client message type the server understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KnownClientMessage {
    StartRecording {
        #[serde(default)]
        data: Option<StartRecordingData>,
    },
    StopRecording,
    SetFormatBypass {
        data: FormatBypassData,
    },
    SetFinalizationTimeout {
        data: TimeoutData,
    },
    SetDrainTimeout {
        data: TimeoutData,
    },
    SetSttProvider {
        data: ProviderData,
    },
    SetLlmProvider {
        data: ProviderData,
    },
    SetPromptSections {
        data: PromptSectionsData,
    },
}

/// Parse result for an inbound client message.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Known(KnownClientMessage),
    /// Forward compatibility: unknown types keep their raw payload.
    Unknown { msg_type: String, raw: Value },
}

/// Parse a raw JSON message. Never fails: unknown or malformed shapes
/// come back as [`ClientMessage::Unknown`].
pub fn parse_client_message(raw: Value) -> ClientMessage {
    match serde_json::from_value::<KnownClientMessage>(raw.clone()) {
        Ok(message) => ClientMessage::Known(message),
        Err(err) => {
            let msg_type = raw
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            debug!(target: "protocol", "Unknown client message type {msg_type:?}: {err}");
            ClientMessage::Unknown { msg_type, raw }
        }
    }
}

/// Messages pushed to the client over the session's message channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    RawTranscription {
        text: String,
    },
    RecordingCompleteWithZeroWords,
    ConfigUpdated {
        setting: SettingName,
        value: Value,
    },
    ConfigError {
        setting: SettingName,
        error: String,
    },
}

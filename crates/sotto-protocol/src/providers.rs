//! Provider identifiers shared between the wire protocol and the registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Known speech-to-text providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProviderId {
    Deepgram,
    Assemblyai,
    Cartesia,
    Speechmatics,
    Azure,
    Groq,
    Whisper,
}

impl SttProviderId {
    pub const ALL: &'static [SttProviderId] = &[
        SttProviderId::Deepgram,
        SttProviderId::Assemblyai,
        SttProviderId::Cartesia,
        SttProviderId::Speechmatics,
        SttProviderId::Azure,
        SttProviderId::Groq,
        SttProviderId::Whisper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SttProviderId::Deepgram => "deepgram",
            SttProviderId::Assemblyai => "assemblyai",
            SttProviderId::Cartesia => "cartesia",
            SttProviderId::Speechmatics => "speechmatics",
            SttProviderId::Azure => "azure",
            SttProviderId::Groq => "groq",
            SttProviderId::Whisper => "whisper",
        }
    }
}

impl fmt::Display for SttProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SttProviderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or(())
    }
}

/// Known LLM formatting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderId {
    Openai,
    Anthropic,
    Google,
    Cerebras,
    Openrouter,
    Ollama,
}

impl LlmProviderId {
    pub const ALL: &'static [LlmProviderId] = &[
        LlmProviderId::Openai,
        LlmProviderId::Anthropic,
        LlmProviderId::Google,
        LlmProviderId::Cerebras,
        LlmProviderId::Openrouter,
        LlmProviderId::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProviderId::Openai => "openai",
            LlmProviderId::Anthropic => "anthropic",
            LlmProviderId::Google => "google",
            LlmProviderId::Cerebras => "cerebras",
            LlmProviderId::Openrouter => "openrouter",
            LlmProviderId::Ollama => "ollama",
        }
    }
}

impl fmt::Display for LlmProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProviderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or(())
    }
}

//! Format-bypass gate between the coordinator and the aggregator.
//!
//! When formatting is bypassed the aggregator must never see the turn:
//! its start signal is suppressed so it never begins accumulating, and
//! the gate assembles the raw transcript itself at turn end. The bypass
//! decision is captured at turn start; flipping the flag mid-turn only
//! affects the next turn, so one turn's output can never split across
//! the formatted and raw paths.

use tracing::{debug, info};

use sotto_protocol::ServerMessage;

use crate::context::ContextMessage;

/// Turn-boundary signals arriving from the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum GateSignal {
    TurnStarted { context: Vec<ContextMessage> },
    Transcript(String),
    TurnEnded,
    EmptyTurn,
}

/// Signals forwarded to the transcript aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorSignal {
    TurnStarted { context: Vec<ContextMessage> },
    Transcript(String),
    TurnEnded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateOutput {
    Forward(AggregatorSignal),
    Send(ServerMessage),
}

pub struct FormatGate {
    formatting_enabled: bool,
    /// Bypass decision for the open turn, captured at `TurnStarted`.
    /// `None` while no turn is open.
    turn_bypassed: Option<bool>,
    accumulated: Vec<String>,
}

impl FormatGate {
    pub fn new(formatting_enabled: bool) -> Self {
        Self {
            formatting_enabled,
            turn_bypassed: None,
            accumulated: Vec::new(),
        }
    }

    /// Settable at any time; takes effect at the next turn start.
    pub fn set_formatting_enabled(&mut self, enabled: bool) {
        self.formatting_enabled = enabled;
        if enabled {
            info!(target: "gate", "LLM formatting enabled");
        } else {
            info!(target: "gate", "LLM formatting disabled, turns will emit raw transcripts");
        }
    }

    pub fn formatting_enabled(&self) -> bool {
        self.formatting_enabled
    }

    pub fn on_signal(&mut self, signal: GateSignal) -> Vec<GateOutput> {
        match signal {
            GateSignal::TurnStarted { context } => {
                let bypassed = !self.formatting_enabled;
                self.turn_bypassed = Some(bypassed);
                self.accumulated.clear();
                if bypassed {
                    debug!(target: "gate", "Bypass turn: suppressing turn-start from aggregator");
                    vec![]
                } else {
                    vec![GateOutput::Forward(AggregatorSignal::TurnStarted {
                        context,
                    })]
                }
            }
            GateSignal::Transcript(text) => {
                if self.bypass_active() {
                    self.accumulated.push(text.clone());
                }
                // Transcripts always flow downstream so live-transcript
                // display keeps working in both modes.
                vec![GateOutput::Forward(AggregatorSignal::Transcript(text))]
            }
            GateSignal::TurnEnded => {
                let bypassed = self.bypass_active();
                self.turn_bypassed = None;
                if !bypassed {
                    return vec![GateOutput::Forward(AggregatorSignal::TurnEnded)];
                }
                // Fragments carry their own spacing ("hello ", "wor",
                // "ld" must come out as "hello world"), so they are
                // concatenated as-is.
                let combined = self.accumulated.drain(..).collect::<String>().trim().to_string();
                if combined.is_empty() {
                    info!(target: "gate", "Bypass turn ended with empty transcript");
                    vec![GateOutput::Send(
                        ServerMessage::RecordingCompleteWithZeroWords,
                    )]
                } else {
                    info!(target: "gate", "Emitting raw transcription: {:?}", combined);
                    vec![GateOutput::Send(ServerMessage::RawTranscription {
                        text: combined,
                    })]
                }
            }
            GateSignal::EmptyTurn => {
                self.turn_bypassed = None;
                self.accumulated.clear();
                vec![GateOutput::Send(
                    ServerMessage::RecordingCompleteWithZeroWords,
                )]
            }
        }
    }

    fn bypass_active(&self) -> bool {
        self.turn_bypassed.unwrap_or(!self.formatting_enabled)
    }
}

//! Transcript aggregation for the formatted path.
//!
//! Accumulates fragments between turn start and turn end and assembles
//! the request handed to the LLM formatting leg. Fragments arriving
//! while no turn is open are ignored, which is what lets the gate
//! suppress a bypassed turn simply by never forwarding its start.

use serde::Serialize;
use tracing::{debug, info};

use crate::context::ContextMessage;

/// Request handed to the downstream LLM formatting leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatRequest {
    /// System instructions installed at context reset (one or two).
    pub context: Vec<ContextMessage>,
    /// The consolidated transcript for this turn.
    pub text: String,
}

struct OpenTurn {
    context: Vec<ContextMessage>,
    fragments: Vec<String>,
}

#[derive(Default)]
pub struct TranscriptAggregator {
    open: Option<OpenTurn>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_turn_started(&mut self, context: Vec<ContextMessage>) {
        if self.open.is_some() {
            debug!(target: "aggregate", "Turn started while one was open; discarding previous buffer");
        }
        self.open = Some(OpenTurn {
            context,
            fragments: Vec::new(),
        });
    }

    pub fn on_transcript(&mut self, text: String) {
        match &mut self.open {
            Some(turn) => turn.fragments.push(text),
            None => {
                debug!(target: "aggregate", "Ignoring fragment outside a turn: {:?}", text)
            }
        }
    }

    /// Close the turn. Returns the format request, or `None` when no
    /// turn was open or the accumulated text is empty.
    pub fn on_turn_ended(&mut self) -> Option<FormatRequest> {
        let turn = self.open.take()?;
        let text = turn.fragments.concat().trim().to_string();
        if text.is_empty() {
            info!(target: "aggregate", "Turn ended with empty buffer, no format request");
            return None;
        }
        info!(target: "aggregate", "Turn ended, requesting formatting of {:?}", text);
        Some(FormatRequest {
            context: turn.context,
            text,
        })
    }
}

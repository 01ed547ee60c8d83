//! Session core: turn boundary coordination, format-bypass gating,
//! untrusted-context sanitization, and the per-session dispatch loop.

pub mod aggregate;
pub mod context;
pub mod dispatch;
pub mod gate;
pub mod metrics;
pub mod sanitize;
pub mod turn;

pub use aggregate::{FormatRequest, TranscriptAggregator};
pub use context::{ContextManager, ContextMessage, MessageRole};
pub use dispatch::{SessionConfig, SessionDispatcher, SessionIo, VadEvent};
pub use gate::{AggregatorSignal, FormatGate, GateOutput, GateSignal};
pub use metrics::SessionMetrics;
pub use sanitize::SanitizedText;
pub use turn::{TimerKind, TurnAction, TurnController, TurnEvent, TurnState};

//! Session counters, shared with the runtime through a lock.

use std::time::Instant;

/// Counters updated by the dispatch loop.
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    /// Turns started (including restarts that discarded a turn)
    pub turns_started: u64,
    /// Turns that ended with content
    pub turns_ended: u64,
    /// Turns that ended with zero words
    pub empty_turns: u64,
    /// Non-empty transcript fragments consumed
    pub fragments_in: u64,
    /// Empty fragments dropped at the boundary
    pub fragments_dropped: u64,
    /// Timer ticks rejected as stale
    pub stale_timer_fires: u64,
    /// Client messages that parsed to an unknown type
    pub unknown_messages: u64,
    /// Time of the last consumed event
    pub last_event_time: Option<Instant>,
}

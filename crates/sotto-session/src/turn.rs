//! Turn boundary coordinator for the recording lifecycle.
//!
//! The coordinator is a pure state machine: [`TurnController::handle`]
//! consumes one event and returns the actions the dispatch loop must
//! perform. Keeping effects out of the machine makes every transition
//! testable without a runtime.
//!
//! A stop command does not end the turn by itself: the STT stream may
//! still be delivering the final words of speech that ended before the
//! stop arrived. The coordinator waits for the VAD's explicit
//! speech-stopped confirmation (bounded by the finalization timeout)
//! and then drains late fragments with an adaptive timeout that
//! restarts on every new one.

use std::time::Duration;

use tracing::{debug, info, warn};

/// Recording lifecycle state. Exactly one is active at any time;
/// `has_content` is monotonic within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No recording in progress.
    Idle,
    /// Client signaled start; transcripts pass through.
    Recording { has_content: bool },
    /// Client signaled stop; waiting for the VAD to confirm speech has
    /// stopped, bounded by the finalization timeout.
    AwaitingFinalization { has_content: bool },
    /// Speech confirmed stopped; accepting straggler fragments until
    /// the drain window elapses with no new ones.
    Draining { has_content: bool },
}

/// Which timer the coordinator armed. At most one is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Finalization,
    Drain,
}

/// Events consumed by the coordinator, already serialized into one
/// linear order by the dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    StartCommand,
    StopCommand,
    SpeechStopped,
    TranscriptArrived(String),
    TimerFired { generation: u64 },
}

/// Effects the dispatch loop performs on the coordinator's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnAction {
    /// Schedule a tick after `after`; the tick must carry `generation`
    /// back so stale timers are rejected.
    ArmTimer {
        kind: TimerKind,
        generation: u64,
        after: Duration,
    },
    /// Ask the upstream STT leg to force-finalize pending speech.
    RequestFinalize,
    /// A new turn began: reset context and notify the gate.
    TurnStarted,
    /// Forward one transcript fragment downstream.
    ForwardTranscript(String),
    /// The turn produced content and is over.
    TurnEnded,
    /// The turn produced no content.
    EmptyTurn,
}

pub struct TurnController {
    state: TurnState,
    finalization_timeout: Duration,
    drain_timeout: Duration,
    /// Bumped whenever a timer is armed or invalidated. A tick whose
    /// generation does not match is a no-op; this is the stale-timer
    /// guard, since cancellation of a spawned sleep is best-effort.
    timer_generation: u64,
    armed: Option<TimerKind>,
}

impl TurnController {
    pub fn new(finalization_timeout: Duration, drain_timeout: Duration) -> Self {
        Self {
            state: TurnState::Idle,
            finalization_timeout,
            drain_timeout,
            timer_generation: 0,
            armed: None,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Takes effect the next time a finalization timer is armed.
    pub fn set_finalization_timeout(&mut self, timeout: Duration) {
        self.finalization_timeout = timeout;
        info!(target: "turn", "Finalization timeout set to {:?}", timeout);
    }

    /// Takes effect the next time a drain timer is armed.
    pub fn set_drain_timeout(&mut self, timeout: Duration) {
        self.drain_timeout = timeout;
        info!(target: "turn", "Drain timeout set to {:?}", timeout);
    }

    pub fn finalization_timeout(&self) -> Duration {
        self.finalization_timeout
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Apply one event. Every (state, event) pair maps to a defined
    /// transition; nothing here can fail or leave a partial state.
    pub fn handle(&mut self, event: TurnEvent) -> Vec<TurnAction> {
        match event {
            TurnEvent::StartCommand => self.on_start(),
            TurnEvent::StopCommand => self.on_stop(),
            TurnEvent::SpeechStopped => self.on_speech_stopped(),
            TurnEvent::TranscriptArrived(text) => self.on_transcript(text),
            TurnEvent::TimerFired { generation } => self.on_timer(generation),
        }
    }

    fn on_start(&mut self) -> Vec<TurnAction> {
        if self.state != TurnState::Idle {
            // Intentional interruption: the in-flight turn is discarded
            // with no output for it.
            warn!(
                target: "turn",
                "Start-recording received in {:?}; discarding in-flight turn",
                self.state
            );
        }
        self.invalidate_timer();
        self.state = TurnState::Recording { has_content: false };
        info!(target: "turn", "Start-recording received, entering Recording");
        vec![TurnAction::TurnStarted]
    }

    fn on_stop(&mut self) -> Vec<TurnAction> {
        match self.state {
            TurnState::Recording { has_content } => {
                info!(
                    target: "turn",
                    "Stop-recording received, awaiting STT finalization (has_content: {})",
                    has_content
                );
                self.state = TurnState::AwaitingFinalization { has_content };
                let arm = self.arm_timer(TimerKind::Finalization);
                vec![TurnAction::RequestFinalize, arm]
            }
            TurnState::AwaitingFinalization { .. } => {
                warn!(target: "turn", "Stop-recording received while awaiting finalization");
                vec![]
            }
            TurnState::Draining { .. } => {
                warn!(target: "turn", "Stop-recording received while draining");
                vec![]
            }
            TurnState::Idle => {
                warn!(target: "turn", "Stop-recording received while idle");
                vec![TurnAction::EmptyTurn]
            }
        }
    }

    fn on_speech_stopped(&mut self) -> Vec<TurnAction> {
        match self.state {
            TurnState::AwaitingFinalization { has_content } => {
                info!(
                    target: "turn",
                    "Speech stopped, entering Draining (has_content: {})",
                    has_content
                );
                self.state = TurnState::Draining { has_content };
                vec![self.arm_timer(TimerKind::Drain)]
            }
            // Speech can stop and resume any number of times during a
            // recording; only the post-stop confirmation matters.
            TurnState::Recording { .. } | TurnState::Draining { .. } | TurnState::Idle => vec![],
        }
    }

    fn on_transcript(&mut self, text: String) -> Vec<TurnAction> {
        let non_empty = !text.is_empty();
        match self.state {
            TurnState::Recording { has_content } => {
                self.state = TurnState::Recording {
                    has_content: has_content || non_empty,
                };
                debug!(target: "turn", "Transcript while recording: {:?}", text);
                vec![TurnAction::ForwardTranscript(text)]
            }
            TurnState::AwaitingFinalization { has_content } => {
                self.state = TurnState::AwaitingFinalization {
                    has_content: has_content || non_empty,
                };
                info!(target: "turn", "Transcript while awaiting finalization: {:?}", text);
                vec![TurnAction::ForwardTranscript(text)]
            }
            TurnState::Draining { has_content } => {
                self.state = TurnState::Draining {
                    has_content: has_content || non_empty,
                };
                info!(target: "turn", "Late transcript during draining: {:?}", text);
                // Adaptive drain: every fragment restarts the window.
                let arm = self.arm_timer(TimerKind::Drain);
                debug!(target: "turn", "Drain timer restarted");
                vec![TurnAction::ForwardTranscript(text), arm]
            }
            TurnState::Idle => {
                warn!(target: "turn", "Transcript while idle: {:?}", text);
                vec![]
            }
        }
    }

    fn on_timer(&mut self, generation: u64) -> Vec<TurnAction> {
        if generation != self.timer_generation {
            debug!(
                target: "turn",
                "Stale timer fired (generation {} != {}), ignoring",
                generation,
                self.timer_generation
            );
            return vec![];
        }
        match (self.armed, self.state) {
            (Some(TimerKind::Finalization), TurnState::AwaitingFinalization { has_content }) => {
                warn!(
                    target: "turn",
                    "Timed out waiting for speech-stopped after {:?}",
                    self.finalization_timeout
                );
                self.finish_turn(has_content)
            }
            (Some(TimerKind::Drain), TurnState::Draining { has_content }) => {
                info!(target: "turn", "Draining complete (has_content: {})", has_content);
                self.finish_turn(has_content)
            }
            (armed, state) => {
                // State moved on between arming and firing.
                debug!(
                    target: "turn",
                    "Timer fired for {:?} but state is {:?}, ignoring",
                    armed,
                    state
                );
                vec![]
            }
        }
    }

    fn finish_turn(&mut self, has_content: bool) -> Vec<TurnAction> {
        self.state = TurnState::Idle;
        self.armed = None;
        if has_content {
            vec![TurnAction::TurnEnded]
        } else {
            vec![TurnAction::EmptyTurn]
        }
    }

    fn arm_timer(&mut self, kind: TimerKind) -> TurnAction {
        self.timer_generation += 1;
        self.armed = Some(kind);
        let after = match kind {
            TimerKind::Finalization => self.finalization_timeout,
            TimerKind::Drain => self.drain_timeout,
        };
        TurnAction::ArmTimer {
            kind,
            generation: self.timer_generation,
            after,
        }
    }

    fn invalidate_timer(&mut self) {
        self.timer_generation += 1;
        self.armed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> TurnController {
        TurnController::new(Duration::from_millis(500), Duration::from_millis(500))
    }

    fn armed_generation(actions: &[TurnAction]) -> u64 {
        actions
            .iter()
            .find_map(|a| match a {
                TurnAction::ArmTimer { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("expected an ArmTimer action")
    }

    #[test]
    fn start_always_enters_recording_without_content() {
        let mut c = controller();
        for _ in 0..3 {
            let actions = c.handle(TurnEvent::StartCommand);
            assert_eq!(actions, vec![TurnAction::TurnStarted]);
            assert_eq!(c.state(), TurnState::Recording { has_content: false });
        }
    }

    #[test]
    fn transcript_sets_content_monotonically() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);

        c.handle(TurnEvent::TranscriptArrived("".into()));
        assert_eq!(c.state(), TurnState::Recording { has_content: false });

        c.handle(TurnEvent::TranscriptArrived("hello".into()));
        assert_eq!(c.state(), TurnState::Recording { has_content: true });

        c.handle(TurnEvent::TranscriptArrived("".into()));
        assert_eq!(c.state(), TurnState::Recording { has_content: true });
    }

    #[test]
    fn stop_requests_finalize_and_arms_timer() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        c.handle(TurnEvent::TranscriptArrived("hi".into()));
        let actions = c.handle(TurnEvent::StopCommand);

        assert_eq!(actions[0], TurnAction::RequestFinalize);
        assert!(matches!(
            actions[1],
            TurnAction::ArmTimer {
                kind: TimerKind::Finalization,
                ..
            }
        ));
        assert_eq!(
            c.state(),
            TurnState::AwaitingFinalization { has_content: true }
        );
    }

    #[test]
    fn full_turn_ends_exactly_once() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        c.handle(TurnEvent::TranscriptArrived("hello ".into()));
        c.handle(TurnEvent::TranscriptArrived("wor".into()));
        c.handle(TurnEvent::TranscriptArrived("ld".into()));
        c.handle(TurnEvent::StopCommand);
        let actions = c.handle(TurnEvent::SpeechStopped);
        let generation = armed_generation(&actions);

        let actions = c.handle(TurnEvent::TimerFired { generation });
        assert_eq!(actions, vec![TurnAction::TurnEnded]);
        assert_eq!(c.state(), TurnState::Idle);

        // A second fire of the same generation must do nothing: the
        // machine already moved to Idle.
        let actions = c.handle(TurnEvent::TimerFired { generation });
        assert!(actions.is_empty());
    }

    #[test]
    fn empty_turn_on_finalization_timeout() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        let actions = c.handle(TurnEvent::StopCommand);
        let generation = armed_generation(&actions);

        let actions = c.handle(TurnEvent::TimerFired { generation });
        assert_eq!(actions, vec![TurnAction::EmptyTurn]);
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn speech_stopped_cancels_finalization_and_arms_drain() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        let stop_actions = c.handle(TurnEvent::StopCommand);
        let finalization_gen = armed_generation(&stop_actions);

        let drain_actions = c.handle(TurnEvent::SpeechStopped);
        assert!(matches!(
            drain_actions[0],
            TurnAction::ArmTimer {
                kind: TimerKind::Drain,
                ..
            }
        ));
        assert_eq!(c.state(), TurnState::Draining { has_content: false });

        // The finalization timer is now stale and must not fire the turn.
        let actions = c.handle(TurnEvent::TimerFired {
            generation: finalization_gen,
        });
        assert!(actions.is_empty());
        assert_eq!(c.state(), TurnState::Draining { has_content: false });
    }

    #[test]
    fn drain_timer_restarts_on_late_transcript() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        c.handle(TurnEvent::StopCommand);
        let drain_actions = c.handle(TurnEvent::SpeechStopped);
        let first_gen = armed_generation(&drain_actions);

        let late = c.handle(TurnEvent::TranscriptArrived("straggler".into()));
        assert_eq!(late[0], TurnAction::ForwardTranscript("straggler".into()));
        let second_gen = armed_generation(&late);
        assert!(second_gen > first_gen);
        assert_eq!(c.state(), TurnState::Draining { has_content: true });

        // The superseded drain timer is a no-op.
        assert!(c
            .handle(TurnEvent::TimerFired {
                generation: first_gen
            })
            .is_empty());

        let actions = c.handle(TurnEvent::TimerFired {
            generation: second_gen,
        });
        assert_eq!(actions, vec![TurnAction::TurnEnded]);
    }

    #[test]
    fn duplicate_stop_is_ignored() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        c.handle(TurnEvent::StopCommand);
        assert!(c.handle(TurnEvent::StopCommand).is_empty());
        c.handle(TurnEvent::SpeechStopped);
        assert!(c.handle(TurnEvent::StopCommand).is_empty());
    }

    #[test]
    fn stop_while_idle_emits_empty_turn_immediately() {
        let mut c = controller();
        let actions = c.handle(TurnEvent::StopCommand);
        assert_eq!(actions, vec![TurnAction::EmptyTurn]);
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn events_while_idle_are_defensive_no_ops() {
        let mut c = controller();
        assert!(c.handle(TurnEvent::SpeechStopped).is_empty());
        assert!(c
            .handle(TurnEvent::TranscriptArrived("orphan".into()))
            .is_empty());
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn restart_mid_turn_discards_and_invalidates_timers() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        c.handle(TurnEvent::TranscriptArrived("first turn".into()));
        let actions = c.handle(TurnEvent::StopCommand);
        let generation = armed_generation(&actions);

        // New start discards the in-flight turn; its timer must not
        // produce any output for the new one.
        let actions = c.handle(TurnEvent::StartCommand);
        assert_eq!(actions, vec![TurnAction::TurnStarted]);
        assert_eq!(c.state(), TurnState::Recording { has_content: false });
        assert!(c.handle(TurnEvent::TimerFired { generation }).is_empty());
        assert_eq!(c.state(), TurnState::Recording { has_content: false });
    }

    #[test]
    fn speech_stopped_during_recording_is_ignored() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        assert!(c.handle(TurnEvent::SpeechStopped).is_empty());
        assert_eq!(c.state(), TurnState::Recording { has_content: false });
    }

    #[test]
    fn timeout_updates_apply_to_next_arming() {
        let mut c = controller();
        c.set_finalization_timeout(Duration::from_secs(2));
        c.handle(TurnEvent::StartCommand);
        let actions = c.handle(TurnEvent::StopCommand);
        let after = actions
            .iter()
            .find_map(|a| match a {
                TurnAction::ArmTimer { after, .. } => Some(*after),
                _ => None,
            })
            .unwrap();
        assert_eq!(after, Duration::from_secs(2));
    }

    #[test]
    fn transcript_during_finalization_wait_is_forwarded() {
        let mut c = controller();
        c.handle(TurnEvent::StartCommand);
        let actions = c.handle(TurnEvent::StopCommand);
        let generation = armed_generation(&actions);

        let actions = c.handle(TurnEvent::TranscriptArrived("tail".into()));
        assert_eq!(actions, vec![TurnAction::ForwardTranscript("tail".into())]);
        assert_eq!(
            c.state(),
            TurnState::AwaitingFinalization { has_content: true }
        );

        // Content arrived, so the timeout path ends the turn instead of
        // reporting it empty.
        let actions = c.handle(TurnEvent::TimerFired { generation });
        assert_eq!(actions, vec![TurnAction::TurnEnded]);
    }
}

//! Per-session event dispatch.
//!
//! Client commands, VAD events, and STT fragments arrive on independent
//! channels; this loop serializes them into one linear order before any
//! of them touch the turn state machine. Nothing else ever mutates
//! session state, so no locking is needed around it.
//!
//! Timers are spawned sleeps that post their generation back into the
//! loop; the coordinator rejects generations it has since invalidated,
//! so a sleep that cannot be cancelled in time is harmless.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sotto_foundation::Settings;
use sotto_protocol::messages::{
    parse_client_message, ClientMessage, KnownClientMessage, ServerMessage, SettingName,
};
use sotto_providers::{LlmHandle, ProviderRegistry, SttHandle};

use crate::aggregate::{FormatRequest, TranscriptAggregator};
use crate::context::ContextManager;
use crate::gate::{AggregatorSignal, FormatGate, GateOutput, GateSignal};
use crate::metrics::SessionMetrics;
use crate::turn::{TurnAction, TurnController, TurnEvent};

/// Events from the voice-activity detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStarted,
    SpeechStopped,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub finalization_timeout: Duration,
    pub drain_timeout: Duration,
    pub formatting_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            finalization_timeout: Duration::from_millis(500),
            drain_timeout: Duration::from_millis(500),
            formatting_enabled: true,
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            finalization_timeout: Duration::from_secs_f64(settings.finalization_timeout_secs),
            drain_timeout: Duration::from_secs_f64(settings.drain_timeout_secs),
            formatting_enabled: true,
        }
    }
}

/// Channel endpoints wiring one session to its collaborators.
pub struct SessionIo {
    /// Raw JSON client messages from the transport.
    pub client_rx: mpsc::Receiver<Value>,
    /// Speech boundary events from the VAD.
    pub vad_rx: mpsc::Receiver<VadEvent>,
    /// Transcript fragments from the STT stream.
    pub transcript_rx: mpsc::Receiver<String>,
    /// Force-finalize requests to the upstream STT leg.
    pub finalize_tx: mpsc::Sender<()>,
    /// Messages pushed to the client.
    pub server_tx: mpsc::Sender<ServerMessage>,
    /// Formatting requests to the LLM leg.
    pub format_tx: mpsc::Sender<FormatRequest>,
}

pub struct SessionDispatcher {
    controller: TurnController,
    gate: FormatGate,
    context: ContextManager,
    aggregator: TranscriptAggregator,
    registry: Arc<ProviderRegistry>,
    active_stt: Option<SttHandle>,
    active_llm: Option<LlmHandle>,
    metrics: Arc<RwLock<SessionMetrics>>,
    io: SessionIo,
    timer_tx: mpsc::Sender<u64>,
    timer_rx: mpsc::Receiver<u64>,
}

impl SessionDispatcher {
    pub fn new(config: SessionConfig, registry: Arc<ProviderRegistry>, io: SessionIo) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(8);
        Self {
            controller: TurnController::new(config.finalization_timeout, config.drain_timeout),
            gate: FormatGate::new(config.formatting_enabled),
            context: ContextManager::new(),
            aggregator: TranscriptAggregator::new(),
            registry,
            active_stt: None,
            active_llm: None,
            metrics: Arc::new(RwLock::new(SessionMetrics::default())),
            io,
            timer_tx,
            timer_rx,
        }
    }

    pub fn metrics_handle(&self) -> Arc<RwLock<SessionMetrics>> {
        self.metrics.clone()
    }

    pub fn active_stt(&self) -> Option<&SttHandle> {
        self.active_stt.as_ref()
    }

    pub fn active_llm(&self) -> Option<&LlmHandle> {
        self.active_llm.as_ref()
    }

    /// Run the session until the client channel closes.
    pub async fn run(mut self) {
        info!(target: "dispatch", "Session dispatch loop started");
        loop {
            tokio::select! {
                maybe = self.io.client_rx.recv() => {
                    match maybe {
                        Some(raw) => self.on_client_message(raw).await,
                        None => {
                            info!(target: "dispatch", "Client channel closed, ending session");
                            break;
                        }
                    }
                }
                Some(event) = self.io.vad_rx.recv() => {
                    self.on_vad_event(event).await;
                }
                Some(text) = self.io.transcript_rx.recv() => {
                    self.on_transcript_fragment(text).await;
                }
                Some(generation) = self.timer_rx.recv() => {
                    self.on_turn_event(TurnEvent::TimerFired { generation }).await;
                }
            }
        }

        let metrics = self.metrics.read();
        info!(
            target: "dispatch",
            "Session finished - turns: {} started, {} ended, {} empty; fragments: {} in, {} dropped; {} stale timers, {} unknown messages",
            metrics.turns_started,
            metrics.turns_ended,
            metrics.empty_turns,
            metrics.fragments_in,
            metrics.fragments_dropped,
            metrics.stale_timer_fires,
            metrics.unknown_messages,
        );
    }

    async fn on_client_message(&mut self, raw: Value) {
        self.touch();
        match parse_client_message(raw) {
            ClientMessage::Known(message) => self.on_known_message(message).await,
            ClientMessage::Unknown { msg_type, .. } => {
                // Never fatal: unknown types are logged and skipped so
                // newer clients keep working.
                self.metrics.write().unknown_messages += 1;
                warn!(target: "dispatch", "Ignoring unknown client message type {msg_type:?}");
            }
        }
    }

    async fn on_known_message(&mut self, message: KnownClientMessage) {
        match message {
            KnownClientMessage::StartRecording { data } => {
                let snapshot = data.and_then(|d| d.active_app_context);
                self.context.set_snapshot(snapshot);
                self.on_turn_event(TurnEvent::StartCommand).await;
            }
            KnownClientMessage::StopRecording => {
                self.on_turn_event(TurnEvent::StopCommand).await;
            }
            KnownClientMessage::SetFormatBypass { data } => {
                self.gate.set_formatting_enabled(!data.enabled);
                self.send_config_updated(SettingName::FormatBypass, json!(data.enabled))
                    .await;
            }
            KnownClientMessage::SetFinalizationTimeout { data } => {
                match parse_timeout_secs(data.seconds) {
                    Ok(timeout) => {
                        self.controller.set_finalization_timeout(timeout);
                        self.send_config_updated(
                            SettingName::FinalizationTimeout,
                            json!(data.seconds),
                        )
                        .await;
                    }
                    Err(error) => {
                        self.send_config_error(SettingName::FinalizationTimeout, error)
                            .await;
                    }
                }
            }
            KnownClientMessage::SetDrainTimeout { data } => {
                match parse_timeout_secs(data.seconds) {
                    Ok(timeout) => {
                        self.controller.set_drain_timeout(timeout);
                        self.send_config_updated(SettingName::DrainTimeout, json!(data.seconds))
                            .await;
                    }
                    Err(error) => {
                        self.send_config_error(SettingName::DrainTimeout, error).await;
                    }
                }
            }
            KnownClientMessage::SetSttProvider { data } => {
                match self.registry.resolve_stt(&data.provider) {
                    Ok(handle) => {
                        info!(target: "dispatch", "Switched STT provider to: {}", handle.id);
                        self.send_config_updated(
                            SettingName::SttProvider,
                            json!(handle.id.as_str()),
                        )
                        .await;
                        self.active_stt = Some(handle);
                    }
                    Err(err) => {
                        warn!(target: "dispatch", "STT provider switch failed: {err}");
                        self.send_config_error(SettingName::SttProvider, err.to_string())
                            .await;
                    }
                }
            }
            KnownClientMessage::SetLlmProvider { data } => {
                match self.registry.resolve_llm(&data.provider) {
                    Ok(handle) => {
                        info!(target: "dispatch", "Switched LLM provider to: {}", handle.id);
                        self.send_config_updated(
                            SettingName::LlmProvider,
                            json!(handle.id.as_str()),
                        )
                        .await;
                        self.active_llm = Some(handle);
                    }
                    Err(err) => {
                        warn!(target: "dispatch", "LLM provider switch failed: {err}");
                        self.send_config_error(SettingName::LlmProvider, err.to_string())
                            .await;
                    }
                }
            }
            KnownClientMessage::SetPromptSections { data } => {
                let summary = json!({
                    "advanced_enabled": data.advanced_enabled,
                    "dictionary_enabled": data.dictionary_enabled,
                });
                self.context.set_prompt_sections(data);
                self.send_config_updated(SettingName::PromptSections, summary)
                    .await;
            }
        }
    }

    async fn on_vad_event(&mut self, event: VadEvent) {
        self.touch();
        match event {
            VadEvent::SpeechStarted => {
                // Speech may start and stop repeatedly within one
                // recording; only the stop confirmation matters here.
                debug!(target: "dispatch", "Speech started");
            }
            VadEvent::SpeechStopped => {
                debug!(target: "dispatch", "Speech stopped");
                self.on_turn_event(TurnEvent::SpeechStopped).await;
            }
        }
    }

    async fn on_transcript_fragment(&mut self, text: String) {
        self.touch();
        if text.is_empty() {
            self.metrics.write().fragments_dropped += 1;
            debug!(target: "dispatch", "Dropping empty transcript fragment");
            return;
        }
        self.metrics.write().fragments_in += 1;
        self.on_turn_event(TurnEvent::TranscriptArrived(text)).await;
    }

    async fn on_turn_event(&mut self, event: TurnEvent) {
        let was_timer = matches!(event, TurnEvent::TimerFired { .. });
        let actions = self.controller.handle(event);
        if was_timer && actions.is_empty() {
            self.metrics.write().stale_timer_fires += 1;
        }
        for action in actions {
            self.perform(action).await;
        }
    }

    async fn perform(&mut self, action: TurnAction) {
        match action {
            TurnAction::ArmTimer {
                kind,
                generation,
                after,
            } => {
                debug!(
                    target: "dispatch",
                    "Arming {:?} timer for {:?} (generation {})",
                    kind,
                    after,
                    generation
                );
                let tx = self.timer_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    // Dispatcher gone means the tick has nowhere to go.
                    let _ = tx.send(generation).await;
                });
            }
            TurnAction::RequestFinalize => {
                if self.io.finalize_tx.send(()).await.is_err() {
                    debug!(target: "dispatch", "Upstream finalize channel closed");
                }
            }
            TurnAction::TurnStarted => {
                self.metrics.write().turns_started += 1;
                let context = self.context.reset_for_new_recording();
                self.on_gate_signal(GateSignal::TurnStarted { context }).await;
            }
            TurnAction::ForwardTranscript(text) => {
                self.on_gate_signal(GateSignal::Transcript(text)).await;
            }
            TurnAction::TurnEnded => {
                self.metrics.write().turns_ended += 1;
                self.on_gate_signal(GateSignal::TurnEnded).await;
            }
            TurnAction::EmptyTurn => {
                self.metrics.write().empty_turns += 1;
                self.on_gate_signal(GateSignal::EmptyTurn).await;
            }
        }
    }

    async fn on_gate_signal(&mut self, signal: GateSignal) {
        for output in self.gate.on_signal(signal) {
            match output {
                GateOutput::Forward(signal) => match signal {
                    AggregatorSignal::TurnStarted { context } => {
                        self.aggregator.on_turn_started(context);
                    }
                    AggregatorSignal::Transcript(text) => {
                        self.aggregator.on_transcript(text);
                    }
                    AggregatorSignal::TurnEnded => {
                        if let Some(request) = self.aggregator.on_turn_ended() {
                            if self.io.format_tx.send(request).await.is_err() {
                                warn!(target: "dispatch", "Formatting leg closed, dropping request");
                            }
                        }
                    }
                },
                GateOutput::Send(message) => {
                    if self.io.server_tx.send(message).await.is_err() {
                        debug!(target: "dispatch", "Client message channel closed");
                    }
                }
            }
        }
    }

    async fn send_config_updated(&mut self, setting: SettingName, value: Value) {
        let message = ServerMessage::ConfigUpdated { setting, value };
        if self.io.server_tx.send(message).await.is_err() {
            debug!(target: "dispatch", "Client message channel closed");
        }
    }

    async fn send_config_error(&mut self, setting: SettingName, error: String) {
        let message = ServerMessage::ConfigError { setting, error };
        if self.io.server_tx.send(message).await.is_err() {
            debug!(target: "dispatch", "Client message channel closed");
        }
    }

    fn touch(&self) {
        self.metrics.write().last_event_time = Some(std::time::Instant::now());
    }
}

/// Validate a client-supplied timeout. Accepts finite values in
/// (0, 60] seconds; anything slower would freeze turn completion.
fn parse_timeout_secs(seconds: f64) -> Result<Duration, String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("must be a positive number of seconds, got {seconds}"));
    }
    if seconds > 60.0 {
        return Err(format!("must be at most 60 seconds, got {seconds}"));
    }
    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    struct Harness {
        client_tx: mpsc::Sender<Value>,
        vad_tx: mpsc::Sender<VadEvent>,
        transcript_tx: mpsc::Sender<String>,
        finalize_rx: mpsc::Receiver<()>,
        server_rx: mpsc::Receiver<ServerMessage>,
        format_rx: mpsc::Receiver<FormatRequest>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_session(config: SessionConfig) -> Harness {
        let (client_tx, client_rx) = mpsc::channel(16);
        let (vad_tx, vad_rx) = mpsc::channel(16);
        let (transcript_tx, transcript_rx) = mpsc::channel(16);
        let (finalize_tx, finalize_rx) = mpsc::channel(16);
        let (server_tx, server_rx) = mpsc::channel(16);
        let (format_tx, format_rx) = mpsc::channel(16);

        let settings = Settings {
            deepgram_api_key: Some("key".into()),
            anthropic_api_key: Some("key".into()),
            ..Default::default()
        };
        let registry = Arc::new(ProviderRegistry::new(settings));
        let dispatcher = SessionDispatcher::new(
            config,
            registry,
            SessionIo {
                client_rx,
                vad_rx,
                transcript_rx,
                finalize_tx,
                server_tx,
                format_tx,
            },
        );
        let task = tokio::spawn(dispatcher.run());
        Harness {
            client_tx,
            vad_tx,
            transcript_tx,
            finalize_rx,
            server_rx,
            format_rx,
            task,
        }
    }

    fn fast_config(formatting_enabled: bool) -> SessionConfig {
        SessionConfig {
            finalization_timeout: Duration::from_millis(40),
            drain_timeout: Duration::from_millis(40),
            formatting_enabled,
        }
    }

    async fn recv_server(h: &mut Harness) -> ServerMessage {
        timeout(Duration::from_secs(2), h.server_rx.recv())
            .await
            .expect("timed out waiting for server message")
            .expect("server channel closed")
    }

    // Client commands and transcript fragments travel on separate
    // channels; a pause between sends keeps their processing order
    // deterministic in tests.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn bypass_turn_emits_raw_transcription() {
        let mut h = spawn_session(fast_config(false));

        h.client_tx
            .send(json!({"type": "start-recording"}))
            .await
            .unwrap();
        settle().await;
        for fragment in ["hello ", "wor", "ld"] {
            h.transcript_tx.send(fragment.into()).await.unwrap();
        }
        settle().await;
        h.client_tx
            .send(json!({"type": "stop-recording"}))
            .await
            .unwrap();

        // Stop must request upstream finalization.
        timeout(Duration::from_secs(2), h.finalize_rx.recv())
            .await
            .expect("no finalize request")
            .unwrap();

        h.vad_tx.send(VadEvent::SpeechStopped).await.unwrap();

        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::RawTranscription {
                text: "hello world".into()
            }
        );
        h.task.abort();
    }

    #[tokio::test]
    async fn formatted_turn_sends_format_request() {
        let mut h = spawn_session(fast_config(true));

        h.client_tx
            .send(json!({"type": "start-recording"}))
            .await
            .unwrap();
        settle().await;
        h.transcript_tx.send("dictated text".into()).await.unwrap();
        settle().await;
        h.client_tx
            .send(json!({"type": "stop-recording"}))
            .await
            .unwrap();
        h.vad_tx.send(VadEvent::SpeechStopped).await.unwrap();

        let request = timeout(Duration::from_secs(2), h.format_rx.recv())
            .await
            .expect("no format request")
            .unwrap();
        assert_eq!(request.text, "dictated text");
        assert_eq!(request.context.len(), 1);
        h.task.abort();
    }

    #[tokio::test]
    async fn finalization_timeout_yields_zero_words() {
        let mut h = spawn_session(fast_config(false));

        h.client_tx
            .send(json!({"type": "start-recording"}))
            .await
            .unwrap();
        h.client_tx
            .send(json!({"type": "stop-recording"}))
            .await
            .unwrap();
        // No transcripts and no speech-stopped: the fallback timer must
        // end the turn as empty.
        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::RecordingCompleteWithZeroWords
        );
        h.task.abort();
    }

    #[tokio::test]
    async fn late_fragments_during_drain_are_included() {
        let mut h = spawn_session(fast_config(false));

        h.client_tx
            .send(json!({"type": "start-recording"}))
            .await
            .unwrap();
        settle().await;
        h.transcript_tx.send("early".into()).await.unwrap();
        settle().await;
        h.client_tx
            .send(json!({"type": "stop-recording"}))
            .await
            .unwrap();
        h.vad_tx.send(VadEvent::SpeechStopped).await.unwrap();
        h.transcript_tx.send(" late".into()).await.unwrap();

        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::RawTranscription {
                text: "early late".into()
            }
        );
        h.task.abort();
    }

    #[tokio::test]
    async fn config_messages_are_acknowledged() {
        let mut h = spawn_session(fast_config(true));

        h.client_tx
            .send(json!({"type": "set-finalization-timeout", "data": {"seconds": 1.5}}))
            .await
            .unwrap();
        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::ConfigUpdated {
                setting: SettingName::FinalizationTimeout,
                value: json!(1.5),
            }
        );

        h.client_tx
            .send(json!({"type": "set-drain-timeout", "data": {"seconds": -1.0}}))
            .await
            .unwrap();
        match recv_server(&mut h).await {
            ServerMessage::ConfigError { setting, .. } => {
                assert_eq!(setting, SettingName::DrainTimeout);
            }
            other => panic!("expected config-error, got {other:?}"),
        }

        h.client_tx
            .send(json!({"type": "set-stt-provider", "data": {"provider": "deepgram"}}))
            .await
            .unwrap();
        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::ConfigUpdated {
                setting: SettingName::SttProvider,
                value: json!("deepgram"),
            }
        );

        h.client_tx
            .send(json!({"type": "set-llm-provider", "data": {"provider": "nope"}}))
            .await
            .unwrap();
        match recv_server(&mut h).await {
            ServerMessage::ConfigError { setting, error } => {
                assert_eq!(setting, SettingName::LlmProvider);
                assert!(error.contains("nope"));
            }
            other => panic!("expected config-error, got {other:?}"),
        }
        h.task.abort();
    }

    #[tokio::test]
    async fn bypass_and_prompt_section_changes_are_acknowledged() {
        let mut h = spawn_session(fast_config(true));

        h.client_tx
            .send(json!({"type": "set-format-bypass", "data": {"enabled": true}}))
            .await
            .unwrap();
        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::ConfigUpdated {
                setting: SettingName::FormatBypass,
                value: json!(true),
            }
        );

        h.client_tx
            .send(json!({
                "type": "set-prompt-sections",
                "data": {"advanced_enabled": false, "dictionary_enabled": true}
            }))
            .await
            .unwrap();
        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::ConfigUpdated {
                setting: SettingName::PromptSections,
                value: json!({"advanced_enabled": false, "dictionary_enabled": true}),
            }
        );
        h.task.abort();
    }

    #[tokio::test]
    async fn unknown_messages_do_not_disturb_the_session() {
        let mut h = spawn_session(fast_config(false));

        h.client_tx
            .send(json!({"type": "set-theme", "data": {"theme": "dark"}}))
            .await
            .unwrap();
        h.client_tx
            .send(json!({"type": "stop-recording"}))
            .await
            .unwrap();

        // Stop while idle answers zero-words immediately; the unknown
        // message before it must not have broken anything.
        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::RecordingCompleteWithZeroWords
        );
        h.task.abort();
    }

    #[tokio::test]
    async fn stop_while_idle_is_answered_immediately() {
        let mut h = spawn_session(fast_config(true));
        h.client_tx
            .send(json!({"type": "stop-recording"}))
            .await
            .unwrap();
        assert_eq!(
            recv_server(&mut h).await,
            ServerMessage::RecordingCompleteWithZeroWords
        );
        h.task.abort();
    }
}

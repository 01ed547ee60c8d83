//! Session runtime: spawns the dispatch loop and hands the embedding
//! layer the channel endpoints it plugs the transport, VAD, STT, and
//! LLM legs into.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use sotto_protocol::ServerMessage;
use sotto_providers::ProviderRegistry;
use sotto_session::aggregate::FormatRequest;
use sotto_session::{SessionConfig, SessionDispatcher, SessionIo, SessionMetrics, VadEvent};

/// Handle to a running session.
///
/// Senders feed the dispatch loop; receivers surface its outputs.
/// Dropping or closing `client_tx` ends the session.
pub struct SessionHandle {
    /// Raw JSON client messages into the session.
    pub client_tx: mpsc::Sender<Value>,
    /// Speech boundary events from the VAD leg.
    pub vad_tx: mpsc::Sender<VadEvent>,
    /// Transcript fragments from the STT leg.
    pub transcript_tx: mpsc::Sender<String>,
    /// Force-finalize requests the STT leg must honor. Takeable so the
    /// leg can own its receiver.
    pub finalize_rx: Option<mpsc::Receiver<()>>,
    /// Messages for the client.
    pub server_rx: Option<mpsc::Receiver<ServerMessage>>,
    /// Formatting requests for the LLM leg.
    pub format_rx: Option<mpsc::Receiver<FormatRequest>>,
    pub metrics: Arc<RwLock<SessionMetrics>>,
    dispatch_handle: JoinHandle<()>,
}

impl SessionHandle {
    /// Close the client channel and wait for the dispatch loop to end.
    pub async fn shutdown(self) {
        info!("Shutting down session runtime...");
        drop(self.client_tx);
        let _ = self.dispatch_handle.await;
        info!("Session runtime shutdown complete");
    }

    /// Wait for SIGINT.
    pub async fn wait_for_shutdown_signal() {
        info!("Waiting for shutdown signal (Ctrl+C)...");
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
            Err(err) => {
                error!("Failed to listen for SIGINT: {}", err);
            }
        }
    }
}

/// Spawn one session's dispatch loop and return its handle.
pub fn start_session(config: SessionConfig, registry: Arc<ProviderRegistry>) -> SessionHandle {
    let (client_tx, client_rx) = mpsc::channel(64);
    let (vad_tx, vad_rx) = mpsc::channel(64);
    let (transcript_tx, transcript_rx) = mpsc::channel(64);
    let (finalize_tx, finalize_rx) = mpsc::channel(16);
    let (server_tx, server_rx) = mpsc::channel(64);
    let (format_tx, format_rx) = mpsc::channel(16);

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
    let metrics = dispatcher.metrics_handle();
    let dispatch_handle = tokio::spawn(dispatcher.run());
    info!("Session dispatch task started");

    SessionHandle {
        client_tx,
        vad_tx,
        transcript_tx,
        finalize_rx: Some(finalize_rx),
        server_rx: Some(server_rx),
        format_rx: Some(format_rx),
        metrics,
        dispatch_handle,
    }
}

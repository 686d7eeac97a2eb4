//! Per-tab relay between the isolated page context and the dispatcher.
//!
//! Page traffic arrives as JSON text and is parsed once here; everything sent
//! on to the dispatcher is typed. Dialogs requested by the dispatcher are
//! rendered inline by this relay, and prompt validation is routed back into
//! the page that owns the validator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::bridge::{
    Ack, CorrelationTable, DialogRequest, PageEnvelope, RuntimeEnvelope,
    RuntimeMessage, TabEnvelope, TabId, TabMessage, WindowEnvelope,
};
use crate::dialog::{DialogRenderer, DialogSession, InputValidator};
use crate::error::{BridgeError, Result};

type ValidationTable = Arc<Mutex<CorrelationTable<Option<String>>>>;

pub struct Relay {
    tab: TabId,
    window_tx: mpsc::UnboundedSender<String>,
    runtime_tx: mpsc::UnboundedSender<RuntimeMessage>,
    renderer: Arc<dyn DialogRenderer>,
    validations: ValidationTable,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(
        tab: TabId,
        window_tx: mpsc::UnboundedSender<String>,
        runtime_tx: mpsc::UnboundedSender<RuntimeMessage>,
        renderer: Arc<dyn DialogRenderer>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tab,
            window_tx,
            runtime_tx,
            renderer,
            validations: Arc::new(Mutex::new(CorrelationTable::new())),
            shutdown,
        }
    }

    /// Serve the tab until it is closed.
    pub async fn run(
        self,
        mut page_rx: mpsc::UnboundedReceiver<String>,
        mut tab_rx: mpsc::UnboundedReceiver<TabMessage>,
    ) {
        tracing::debug!("Relay for {} started", self.tab);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                message = page_rx.recv() => match message {
                    Some(text) => self.on_page_message(&text).await,
                    None => break,
                },
                message = tab_rx.recv() => match message {
                    Some(message) => self.on_tab_message(message),
                    None => break,
                },
            }
        }
        tracing::debug!("Relay for {} stopped", self.tab);
    }

    async fn on_page_message(&self, text: &str) {
        let envelope = match serde_json::from_str::<PageEnvelope>(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("{}: ignoring malformed page message: {}", self.tab, e);
                return;
            }
        };

        match envelope {
            PageEnvelope::Call(call) => {
                tracing::debug!("{}: forwarding {} to dispatcher", self.tab, call.method);
                let method = call.method.clone();
                let Some(ack) = self.forward(RuntimeEnvelope::Call(call), true) else {
                    return;
                };
                tokio::spawn(async move {
                    match ack.await {
                        Ok(ack) if !ack.success => tracing::error!(
                            "Bridge call {} failed: {}",
                            method,
                            ack.message.unwrap_or_default()
                        ),
                        Ok(_) => {}
                        Err(_) => tracing::error!("Bridge call {} was never acknowledged", method),
                    }
                });
            }
            PageEnvelope::ValidationResult {
                correlation_id,
                error,
            } => {
                if !self.validations.lock().await.resolve(&correlation_id, error) {
                    tracing::warn!(
                        "{}: validation result for unknown request {}",
                        self.tab,
                        correlation_id
                    );
                }
            }
            PageEnvelope::ExecutionStatus(status) => {
                self.forward(RuntimeEnvelope::ExecutionStatus(status), false);
            }
        }
    }

    fn on_tab_message(&self, message: TabMessage) {
        let TabMessage { envelope, ack } = message;
        let reply = match envelope {
            TabEnvelope::ShowDialog(request) => {
                self.spawn_dialog(request);
                Ack::ok()
            }
            TabEnvelope::Resolve(result) => {
                let id = result.correlation_id.clone();
                match post(&self.window_tx, &WindowEnvelope::Resolve(result)) {
                    Ok(()) => Ack::ok(),
                    Err(e) => {
                        tracing::warn!("{}: could not deliver result {}: {}", self.tab, id, e);
                        Ack::failure(e.to_string())
                    }
                }
            }
            TabEnvelope::RunScript { script } => {
                match post(&self.window_tx, &WindowEnvelope::RunScript { script: script.clone() }) {
                    Ok(()) => Ack::ok_with(format!("Script '{}' started in {}", script, self.tab)),
                    Err(e) => Ack::failure(format!("Could not send command to the page: {}", e)),
                }
            }
        };

        if let Some(ack) = ack {
            let _ = ack.send(reply);
        }
    }

    fn spawn_dialog(&self, request: DialogRequest) {
        let tab = self.tab;
        let renderer = Arc::clone(&self.renderer);
        let runtime_tx = self.runtime_tx.clone();
        let shutdown = self.shutdown.clone();
        let validator = PageValidator {
            window_tx: self.window_tx.clone(),
            validations: Arc::clone(&self.validations),
        };

        tracing::info!(
            "{}: showing {} dialog {}",
            tab,
            request.dialog_type.as_str(),
            request.correlation_id
        );
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!("{}: tab closed while a dialog was open", tab);
                    return;
                }
                result = DialogSession::open_and_run(renderer.as_ref(), &validator, request) => result,
            };

            let (ack_tx, ack_rx) = oneshot::channel();
            let message = RuntimeMessage {
                tab,
                envelope: RuntimeEnvelope::DialogResult(result),
                ack: Some(ack_tx),
            };
            if runtime_tx.send(message).is_err() {
                tracing::error!("{}: dispatcher is gone, dropping dialog result", tab);
                return;
            }
            match ack_rx.await {
                Ok(ack) if !ack.success => tracing::error!(
                    "{}: dialog result was not delivered: {}",
                    tab,
                    ack.message.unwrap_or_default()
                ),
                _ => {}
            }
        });
    }

    fn forward(&self, envelope: RuntimeEnvelope, want_ack: bool) -> Option<oneshot::Receiver<Ack>> {
        let (ack, ack_rx) = if want_ack {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let message = RuntimeMessage {
            tab: self.tab,
            envelope,
            ack,
        };
        if self.runtime_tx.send(message).is_err() {
            tracing::error!("{}: dispatcher is gone, dropping page message", self.tab);
            return None;
        }
        ack_rx
    }
}

/// Runs named prompt validators inside the page and waits for the verdict.
struct PageValidator {
    window_tx: mpsc::UnboundedSender<String>,
    validations: ValidationTable,
}

#[async_trait]
impl InputValidator for PageValidator {
    async fn validate(&self, validator: &str, input: &str) -> Result<Option<String>> {
        let (correlation_id, verdict) = self.validations.lock().await.register();

        let request = WindowEnvelope::ValidateInput {
            correlation_id: correlation_id.clone(),
            validator: validator.to_string(),
            input: input.to_string(),
        };
        if let Err(e) = post(&self.window_tx, &request) {
            self.validations.lock().await.cancel(&correlation_id);
            return Err(e);
        }

        verdict.await.map_err(|_| {
            BridgeError::Transport(format!("validation {} was abandoned", correlation_id))
        })
    }
}

fn post(window_tx: &mpsc::UnboundedSender<String>, envelope: &WindowEnvelope) -> Result<()> {
    let text = serde_json::to_string(envelope)?;
    window_tx
        .send(text)
        .map_err(|_| BridgeError::Transport("page is no longer listening".to_string()))
}

//! Page-context side of the bridge: the API page code calls, and the loop that
//! settles its promises when results come back through the window channel.

mod demo;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::bridge::{
    validate_payload, BridgeMethod, CallRequest, CallResult, CorrelationId, CorrelationTable,
    ExecutionStatus, PageEnvelope, PayloadKind, WindowEnvelope,
};
use crate::error::{BridgeError, Result};

pub use demo::DemoScript;

/// Validation error reported when a prompt names a validator the page lacks.
pub const MISSING_VALIDATOR_ERROR: &str = "internal error: validator function not found";

/// A named prompt validator: `Some(message)` rejects the input.
pub type Validator = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Page code that exercises the bridge, started by the "start test" trigger.
#[async_trait]
pub trait PageScript: Send + Sync {
    /// Run against the page's bridge. The returned text is reported as the
    /// execution status message.
    async fn run(&self, page: PageBridge) -> Result<String>;
}

#[derive(Debug)]
enum CallOutcome {
    Resolved(Value),
    Rejected(String),
}

struct PageShared {
    window_tx: mpsc::UnboundedSender<String>,
    pending: Mutex<CorrelationTable<CallOutcome>>,
    validators: Mutex<HashMap<String, Validator>>,
    scripts: Mutex<HashMap<String, Arc<dyn PageScript>>>,
}

/// The bridge objects a page sees (`AndroidBridge` / `AndroidBridgePromise`).
#[derive(Clone)]
pub struct PageBridge {
    shared: Arc<PageShared>,
}

/// Receiving half of the page context; settles pending calls.
pub struct PageContext {
    shared: Arc<PageShared>,
}

impl PageBridge {
    /// Create a page whose outbound window messages go to `window_tx`.
    pub fn connect(window_tx: mpsc::UnboundedSender<String>) -> (PageBridge, PageContext) {
        let shared = Arc::new(PageShared {
            window_tx,
            pending: Mutex::new(CorrelationTable::new()),
            validators: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
        });
        (
            PageBridge {
                shared: Arc::clone(&shared),
            },
            PageContext { shared },
        )
    }

    /// Fire-and-forget toast. Never waits and registers nothing.
    pub fn show_toast(&self, message: &str) {
        tracing::info!("[toast] {}", message);
        let envelope = PageEnvelope::Call(CallRequest {
            method: BridgeMethod::ShowToast.as_str().to_string(),
            arguments: vec![Value::String(message.to_string())],
            correlation_id: None,
        });
        if let Err(e) = self.post(&envelope) {
            tracing::error!("Failed to post toast: {}", e);
        }
    }

    /// Resolves to `true` once confirmed, `null` if the dialog went away.
    pub async fn show_alert(&self, title: &str, body: &str, confirm_label: &str) -> Result<Value> {
        self.call(
            BridgeMethod::ShowAlert,
            vec![title.into(), body.into(), confirm_label.into()],
        )
        .await
    }

    /// Resolves to the entered text, or `null` when cancelled.
    pub async fn show_prompt(
        &self,
        title: &str,
        body: &str,
        default_value: &str,
        validator: Option<&str>,
    ) -> Result<Value> {
        self.call(
            BridgeMethod::ShowPrompt,
            vec![
                title.into(),
                body.into(),
                default_value.into(),
                validator.map(Value::from).unwrap_or(Value::Null),
            ],
        )
        .await
    }

    /// Resolves to the chosen index, or `null` when cancelled or nothing was
    /// selected. Options travel as a JSON string, like on the real host.
    pub async fn show_single_selection(
        &self,
        title: &str,
        options: &[&str],
        default_index: Option<usize>,
    ) -> Result<Value> {
        let options = serde_json::to_string(options)?;
        self.call(
            BridgeMethod::ShowSingleSelection,
            vec![
                title.into(),
                options.into(),
                default_index.map(Value::from).unwrap_or(Value::Null),
            ],
        )
        .await
    }

    pub async fn save_imported_courses(&self, courses_json: &str) -> Result<Value> {
        self.save(BridgeMethod::SaveImportedCourses, PayloadKind::Courses, courses_json)
            .await
    }

    pub async fn save_preset_time_slots(&self, time_slots_json: &str) -> Result<Value> {
        self.save(BridgeMethod::SavePresetTimeSlots, PayloadKind::TimeSlots, time_slots_json)
            .await
    }

    pub async fn notify_task_completion(&self) -> Result<Value> {
        self.call(BridgeMethod::NotifyTaskCompletion, Vec::new()).await
    }

    /// Call any method by name with raw arguments, skipping local checks.
    pub async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value> {
        self.call_named(method.to_string(), arguments).await
    }

    pub async fn register_validator<F>(&self, name: &str, validator: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.shared
            .validators
            .lock()
            .await
            .insert(name.to_string(), Arc::new(validator));
    }

    pub async fn register_script(&self, name: &str, script: impl PageScript + 'static) {
        self.shared
            .scripts
            .lock()
            .await
            .insert(name.to_string(), Arc::new(script));
    }

    /// Calls still waiting for a result.
    pub async fn pending_count(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    async fn save(&self, method: BridgeMethod, kind: PayloadKind, json: &str) -> Result<Value> {
        if let Err(e) = validate_payload(kind, json) {
            tracing::error!("{} rejected locally: {}", method, e);
            return Err(e);
        }
        self.call(method, vec![Value::String(json.to_string())]).await
    }

    async fn call(&self, method: BridgeMethod, arguments: Vec<Value>) -> Result<Value> {
        self.call_named(method.as_str().to_string(), arguments).await
    }

    async fn call_named(&self, method: String, arguments: Vec<Value>) -> Result<Value> {
        let (correlation_id, result_rx) = self.shared.pending.lock().await.register();
        tracing::debug!("Page call {} ({})", method, correlation_id);

        let envelope = PageEnvelope::Call(CallRequest {
            method,
            arguments,
            correlation_id: Some(correlation_id.clone()),
        });
        if let Err(e) = self.post(&envelope) {
            self.shared.pending.lock().await.cancel(&correlation_id);
            return Err(e);
        }

        match result_rx.await {
            Ok(CallOutcome::Resolved(value)) => Ok(value),
            Ok(CallOutcome::Rejected(message)) => Err(BridgeError::Rejected(message)),
            Err(_) => Err(BridgeError::Transport(format!(
                "call {} was dropped before it settled",
                correlation_id
            ))),
        }
    }

    fn post(&self, envelope: &PageEnvelope) -> Result<()> {
        let text = serde_json::to_string(envelope)?;
        self.shared
            .window_tx
            .send(text)
            .map_err(|_| BridgeError::Transport("window channel closed".to_string()))
    }
}

impl PageContext {
    /// Drain window messages until shutdown or until the relay goes away.
    pub async fn run(self, mut inbound: mpsc::UnboundedReceiver<String>, shutdown: CancellationToken) {
        loop {
            let text = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(text) => text,
                    None => break,
                },
            };

            match serde_json::from_str::<WindowEnvelope>(&text) {
                Ok(envelope) => self.handle(envelope).await,
                Err(e) => tracing::warn!("Page ignored malformed window message: {}", e),
            }
        }
        tracing::debug!("Page context stopped");
    }

    async fn handle(&self, envelope: WindowEnvelope) {
        match envelope {
            WindowEnvelope::Resolve(result) => self.settle(result).await,
            WindowEnvelope::ValidateInput {
                correlation_id,
                validator,
                input,
            } => self.validate(correlation_id, &validator, &input).await,
            WindowEnvelope::RunScript { script } => self.run_script(script).await,
        }
    }

    async fn settle(&self, result: CallResult) {
        let CallResult {
            correlation_id,
            value,
            is_error,
        } = result;

        let outcome = if is_error {
            let message = match value {
                Value::String(message) => message,
                other => other.to_string(),
            };
            tracing::error!("Rejecting page call {}: {}", correlation_id, message);
            CallOutcome::Rejected(message)
        } else {
            tracing::debug!("Resolving page call {} with {}", correlation_id, value);
            CallOutcome::Resolved(value)
        };

        if !self.shared.pending.lock().await.resolve(&correlation_id, outcome) {
            tracing::warn!(
                "Result for unknown or already settled call: {}",
                correlation_id
            );
        }
    }

    async fn validate(&self, correlation_id: CorrelationId, name: &str, input: &str) {
        let validator = self.shared.validators.lock().await.get(name).cloned();
        let error = match validator {
            Some(validator) => validator(input),
            None => {
                tracing::warn!("Validator '{}' is not registered in the page", name);
                Some(MISSING_VALIDATOR_ERROR.to_string())
            }
        };

        let reply = PageEnvelope::ValidationResult {
            correlation_id,
            error,
        };
        if let Err(e) = self.bridge().post(&reply) {
            tracing::error!("Failed to post validation result: {}", e);
        }
    }

    async fn run_script(&self, name: String) {
        let script = self.shared.scripts.lock().await.get(&name).cloned();
        let bridge = self.bridge();

        let Some(script) = script else {
            tracing::warn!("Page has no script named '{}'", name);
            let status = ExecutionStatus {
                success: false,
                message: format!("Script '{}' is not available in this page", name),
            };
            if let Err(e) = bridge.post(&PageEnvelope::ExecutionStatus(status)) {
                tracing::error!("Failed to post execution status: {}", e);
            }
            return;
        };

        tracing::info!("Running page script '{}'", name);
        // Scripts await their own bridge calls, which this loop settles.
        tokio::spawn(async move {
            let status = match script.run(bridge.clone()).await {
                Ok(message) => ExecutionStatus {
                    success: true,
                    message,
                },
                Err(e) => ExecutionStatus {
                    success: false,
                    message: format!("Script '{}' failed: {}", name, e),
                },
            };
            if let Err(e) = bridge.post(&PageEnvelope::ExecutionStatus(status)) {
                tracing::error!("Failed to post execution status: {}", e);
            }
        });
    }

    fn bridge(&self) -> PageBridge {
        PageBridge {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn page() -> (PageBridge, PageContext, mpsc::UnboundedReceiver<String>) {
        let (window_tx, window_rx) = mpsc::unbounded_channel();
        let (bridge, context) = PageBridge::connect(window_tx);
        (bridge, context, window_rx)
    }

    async fn next_call(window_rx: &mut mpsc::UnboundedReceiver<String>) -> CallRequest {
        let text = tokio::time::timeout(Duration::from_secs(1), window_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match serde_json::from_str::<PageEnvelope>(&text).unwrap() {
            PageEnvelope::Call(call) => call,
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn toast_posts_without_registering() {
        let (bridge, _context, mut window_rx) = page();
        bridge.show_toast("hello");

        let call = next_call(&mut window_rx).await;
        assert_eq!(call.method, "showToast");
        assert_eq!(call.arguments, vec![json!("hello")]);
        assert!(call.correlation_id.is_none());
        assert_eq!(bridge.pending_count().await, 0);
    }

    #[tokio::test]
    async fn invalid_save_rejects_without_posting() {
        let (bridge, _context, mut window_rx) = page();

        let result = bridge
            .save_imported_courses(r#"[{"name":"Math"}]"#)
            .await;

        assert!(matches!(result, Err(BridgeError::Validation(_))));
        assert!(window_rx.try_recv().is_err());
        assert_eq!(bridge.pending_count().await, 0);
    }

    #[tokio::test]
    async fn resolve_settles_matching_call() {
        let (bridge, context, mut window_rx) = page();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(context.run(inbound_rx, shutdown.clone()));

        let caller = bridge.clone();
        let call = tokio::spawn(async move { caller.show_alert("T", "B", "OK").await });

        let request = next_call(&mut window_rx).await;
        assert_eq!(request.method, "showAlert");
        let id = request.correlation_id.unwrap();

        let stray = WindowEnvelope::Resolve(CallResult::success(CorrelationId::from("other"), json!(1)));
        inbound_tx.send(serde_json::to_string(&stray).unwrap()).unwrap();
        let reply = WindowEnvelope::Resolve(CallResult::success(id, json!(true)));
        inbound_tx.send(serde_json::to_string(&reply).unwrap()).unwrap();

        assert_eq!(call.await.unwrap().unwrap(), json!(true));
        assert_eq!(bridge.pending_count().await, 0);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn error_result_rejects_with_message() {
        let (bridge, context, mut window_rx) = page();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(context.run(inbound_rx, shutdown.clone()));

        let caller = bridge.clone();
        let call = tokio::spawn(async move { caller.notify_task_completion().await });

        let id = next_call(&mut window_rx).await.correlation_id.unwrap();
        let reply = WindowEnvelope::Resolve(CallResult::failure(id, "disk full"));
        inbound_tx.send(serde_json::to_string(&reply).unwrap()).unwrap();

        match call.await.unwrap() {
            Err(BridgeError::Rejected(message)) => assert_eq!(message, "disk full"),
            other => panic!("expected rejection, got {:?}", other),
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn validate_input_runs_registered_validator() {
        let (bridge, context, mut window_rx) = page();
        bridge
            .register_validator("short", |input| {
                (input.len() < 2).then(|| "too short".to_string())
            })
            .await;

        context
            .handle(WindowEnvelope::ValidateInput {
                correlation_id: CorrelationId::from("v1"),
                validator: "short".to_string(),
                input: "a".to_string(),
            })
            .await;
        context
            .handle(WindowEnvelope::ValidateInput {
                correlation_id: CorrelationId::from("v2"),
                validator: "missing".to_string(),
                input: "abc".to_string(),
            })
            .await;

        let first: PageEnvelope = serde_json::from_str(&window_rx.recv().await.unwrap()).unwrap();
        assert_eq!(
            first,
            PageEnvelope::ValidationResult {
                correlation_id: CorrelationId::from("v1"),
                error: Some("too short".to_string()),
            }
        );
        let second: PageEnvelope = serde_json::from_str(&window_rx.recv().await.unwrap()).unwrap();
        assert_eq!(
            second,
            PageEnvelope::ValidationResult {
                correlation_id: CorrelationId::from("v2"),
                error: Some(MISSING_VALIDATOR_ERROR.to_string()),
            }
        );
    }

    #[tokio::test]
    async fn unknown_script_reports_failure() {
        let (_bridge, context, mut window_rx) = page();
        context
            .handle(WindowEnvelope::RunScript {
                script: "nope".to_string(),
            })
            .await;

        let status: PageEnvelope = serde_json::from_str(&window_rx.recv().await.unwrap()).unwrap();
        assert!(matches!(
            status,
            PageEnvelope::ExecutionStatus(ExecutionStatus { success: false, .. })
        ));
    }

    #[tokio::test]
    async fn closed_window_fails_call_without_leaking() {
        let (bridge, _context, window_rx) = page();
        drop(window_rx);

        let result = bridge.show_alert("T", "B", "OK").await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
        assert_eq!(bridge.pending_count().await, 0);
    }
}

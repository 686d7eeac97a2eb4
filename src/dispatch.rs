//! The dispatcher: the single authority that decides how every bridge call is
//! serviced and routes each result back to the tab that asked for it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::bridge::{
    coerce_dialog_value, Ack, BridgeMethod, CallRequest, CallResult, CorrelationId, DialogRequest,
    DialogResult, ExecutionStatus, RuntimeEnvelope, RuntimeMessage, TabEnvelope, TabId, TabMessage,
};
use crate::config::{Config, SavePolicy};
use crate::host::{ArtifactSink, Notifier};

/// Failure text a simulated save resolves with.
pub const SAVE_FAILED_MESSAGE: &str = "Save failed, please retry!";

const INTERNAL_URL_PREFIXES: [&str; 4] = ["chrome://", "about:", "edge://", "chrome-extension://"];

/// Session-level commands that do not come from a page.
#[derive(Debug)]
pub enum Control {
    Attach {
        tab: TabId,
        url: String,
        sender: mpsc::UnboundedSender<TabMessage>,
    },
    Detach {
        tab: TabId,
    },
    Focus {
        tab: TabId,
    },
    StartTest {
        script: String,
        reply: oneshot::Sender<Ack>,
    },
}

/// Payloads staged by save calls until task completion exports them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PayloadCache {
    pub courses: Option<Value>,
    pub time_slots: Option<Value>,
}

impl PayloadCache {
    /// The export document; absent slots are `null`. Resets the cache.
    pub fn take_export(&mut self) -> Value {
        let cache = std::mem::take(self);
        json!({
            "courses": cache.courses,
            "timeSlots": cache.time_slots,
        })
    }
}

struct TabEntry {
    url: String,
    sender: mpsc::UnboundedSender<TabMessage>,
}

pub struct Dispatcher {
    config: Config,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn ArtifactSink>,
    cache: PayloadCache,
    tabs: HashMap<TabId, TabEntry>,
    active: Option<TabId>,
    status_tx: broadcast::Sender<ExecutionStatus>,
    rng: StdRng,
}

impl Dispatcher {
    pub fn new(
        config: Config,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn ArtifactSink>,
        status_tx: broadcast::Sender<ExecutionStatus>,
    ) -> Self {
        let rng = match config.dispatch.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            notifier,
            sink,
            cache: PayloadCache::default(),
            tabs: HashMap::new(),
            active: None,
            status_tx,
            rng,
        }
    }

    /// Process messages one at a time until shutdown.
    pub async fn run(
        mut self,
        mut runtime_rx: mpsc::UnboundedReceiver<RuntimeMessage>,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("Dispatcher started");
        loop {
            // Control first, so a tab is attached before its traffic is served.
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(control) = control_rx.recv() => self.handle_control(control),
                Some(message) = runtime_rx.recv() => self.handle_runtime(message).await,
                else => break,
            }
        }
        tracing::info!("Dispatcher stopped");
    }

    pub fn cache(&self) -> &PayloadCache {
        &self.cache
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.active
    }

    pub fn handle_control(&mut self, control: Control) {
        match control {
            Control::Attach { tab, url, sender } => {
                tracing::info!("Attached {} ({})", tab, url);
                self.tabs.insert(tab, TabEntry { url, sender });
                self.active = Some(tab);
            }
            Control::Detach { tab } => {
                tracing::info!("Detached {}", tab);
                self.tabs.remove(&tab);
                if self.active == Some(tab) {
                    self.active = self.tabs.keys().max().copied();
                }
            }
            Control::Focus { tab } => {
                if self.tabs.contains_key(&tab) {
                    self.active = Some(tab);
                } else {
                    tracing::warn!("Cannot focus unknown {}", tab);
                }
            }
            Control::StartTest { script, reply } => self.start_test(script, reply),
        }
    }

    pub async fn handle_runtime(&mut self, message: RuntimeMessage) {
        let RuntimeMessage { tab, envelope, ack } = message;
        match envelope {
            RuntimeEnvelope::Call(call) => self.handle_call(tab, call, ack).await,
            RuntimeEnvelope::DialogResult(result) => {
                let reply = self.handle_dialog_result(tab, result);
                send_ack(ack, reply);
            }
            RuntimeEnvelope::ExecutionStatus(status) => {
                if status.success {
                    tracing::info!("{} script finished: {}", tab, status.message);
                } else {
                    tracing::warn!("{} script failed: {}", tab, status.message);
                }
                // Nobody listening is fine.
                let _ = self.status_tx.send(status);
                send_ack(ack, Ack::ok());
            }
        }
    }

    async fn handle_call(&mut self, tab: TabId, call: CallRequest, ack: Option<oneshot::Sender<Ack>>) {
        tracing::debug!("{} called {}", tab, call.method);

        let method = match call.method.parse::<BridgeMethod>() {
            Ok(method) => method,
            Err(e) => {
                tracing::warn!("{}: {}", tab, e);
                send_ack(ack, Ack::failure("Unknown AndroidBridge method"));
                return;
            }
        };

        if method == BridgeMethod::ShowToast {
            let message = match call.arguments.first() {
                Some(Value::String(message)) => message.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            self.notifier.notify(&self.config.notify.toast_title, &message);
            send_ack(ack, Ack::ok());
            return;
        }

        let Some(correlation_id) = call.correlation_id else {
            tracing::warn!("{}: {} call without a correlation id", tab, method);
            send_ack(ack, Ack::failure(format!("{} requires a correlation id", method)));
            return;
        };

        if let Some(dialog_type) = method.dialog_type() {
            let request = DialogRequest {
                dialog_type,
                arguments: call.arguments,
                correlation_id,
            };
            self.show_dialog(tab, request, ack);
            return;
        }

        if method == BridgeMethod::NotifyTaskCompletion {
            let reply = self.deliver(tab, CallResult::success(correlation_id, Value::Bool(true)));
            send_ack(ack, reply);
            self.export().await;
            return;
        }

        let result = self.save(method, correlation_id, call.arguments.first()).await;
        let reply = self.deliver(tab, result);
        send_ack(ack, reply);
    }

    fn show_dialog(&self, tab: TabId, request: DialogRequest, ack: Option<oneshot::Sender<Ack>>) {
        let Some(entry) = self.tabs.get(&tab) else {
            tracing::warn!("Cannot show dialog {}: {} is gone", request.correlation_id, tab);
            send_ack(ack, Ack::failure(format!("{} is not attached", tab)));
            return;
        };

        let (relay_ack, relay_reply) = oneshot::channel();
        let message = TabMessage {
            envelope: TabEnvelope::ShowDialog(request),
            ack: Some(relay_ack),
        };
        if entry.sender.send(message).is_err() {
            tracing::warn!("Cannot show dialog: {} stopped listening", tab);
            send_ack(ack, Ack::failure(format!("{} is not reachable", tab)));
            return;
        }

        tokio::spawn(async move {
            let reply = relay_reply
                .await
                .unwrap_or_else(|_| Ack::failure("Dialog request was dropped by the tab"));
            send_ack(ack, reply);
        });
    }

    fn handle_dialog_result(&self, tab: TabId, result: DialogResult) -> Ack {
        let DialogResult {
            correlation_id,
            value,
            error,
        } = result;

        let call_result = match error {
            Some(message) => CallResult::failure(correlation_id, message),
            None => {
                let value = if self.config.dispatch.coerce_dialog_values {
                    coerce_dialog_value(value)
                } else {
                    value
                };
                CallResult::success(correlation_id, value)
            }
        };
        self.deliver(tab, call_result)
    }

    async fn save(
        &mut self,
        method: BridgeMethod,
        correlation_id: CorrelationId,
        payload: Option<&Value>,
    ) -> CallResult {
        let slot = if method == BridgeMethod::SaveImportedCourses {
            "courses"
        } else {
            "time-slots"
        };
        let text = match payload {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };

        match self.config.dispatch.save_policy {
            SavePolicy::Cache => match serde_json::from_str::<Value>(&text) {
                Ok(parsed) => {
                    tracing::info!("Cached {} payload", slot);
                    if method == BridgeMethod::SaveImportedCourses {
                        self.cache.courses = Some(parsed);
                    } else {
                        self.cache.time_slots = Some(parsed);
                    }
                    CallResult::success(correlation_id, Value::Bool(true))
                }
                Err(e) => {
                    tracing::warn!("Could not parse {} payload: {}", slot, e);
                    CallResult::failure(correlation_id, e.to_string())
                }
            },
            SavePolicy::Simulated => {
                if !self.rng.gen_bool(self.config.dispatch.success_rate) {
                    tracing::info!("Simulated {} save failure", slot);
                    return CallResult::failure(correlation_id, SAVE_FAILED_MESSAGE);
                }
                let name = format!("{}-{}.json", slot, unix_millis());
                match self.sink.persist(&name, text.as_bytes()).await {
                    Ok(location) => {
                        tracing::info!("Saved {} payload to {}", slot, location);
                        CallResult::success(correlation_id, Value::Bool(true))
                    }
                    Err(e) => {
                        tracing::error!("Could not persist {}: {}", name, e);
                        CallResult::failure(correlation_id, e.to_string())
                    }
                }
            }
        }
    }

    async fn export(&mut self) {
        let document = self.cache.take_export();
        let file_name = self.config.export.file_name.clone();

        let bytes = match serde_json::to_vec_pretty(&document) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Could not serialize export: {}", e);
                return;
            }
        };

        match self.sink.persist(&file_name, &bytes).await {
            Ok(location) => {
                tracing::info!("Exported cached payloads to {}", location);
                self.notifier.notify(
                    "Import finished",
                    &format!("Course data exported to {}", location),
                );
            }
            Err(e) => tracing::error!("Export of {} failed: {}", file_name, e),
        }
    }

    fn start_test(&self, script: String, reply: oneshot::Sender<Ack>) {
        let Some(tab) = self.active else {
            let _ = reply.send(Ack::failure("There is no active page to run the script in."));
            return;
        };
        let Some(entry) = self.tabs.get(&tab) else {
            let _ = reply.send(Ack::failure("There is no active page to run the script in."));
            return;
        };
        if is_internal_url(&entry.url) {
            let _ = reply.send(Ack::failure(
                "The active tab cannot run scripts (browser-internal page). Switch to a regular web page.",
            ));
            return;
        }

        tracing::info!("Starting script '{}' in {}", script, tab);
        let (relay_ack, relay_reply) = oneshot::channel();
        let message = TabMessage {
            envelope: TabEnvelope::RunScript { script },
            ack: Some(relay_ack),
        };
        if entry.sender.send(message).is_err() {
            let _ = reply.send(Ack::failure(format!(
                "Could not send command to the page: {} is closed",
                tab
            )));
            return;
        }

        tokio::spawn(async move {
            let ack = relay_reply
                .await
                .unwrap_or_else(|_| Ack::failure("Could not send command to the page"));
            let _ = reply.send(ack);
        });
    }

    /// Route a result to the tab that issued the call.
    fn deliver(&self, tab: TabId, result: CallResult) -> Ack {
        let id = result.correlation_id.clone();
        let Some(entry) = self.tabs.get(&tab) else {
            tracing::warn!("Dropping result {}: {} is gone", id, tab);
            return Ack::failure(format!("{} is not attached", tab));
        };

        if entry
            .sender
            .send(TabMessage::new(TabEnvelope::Resolve(result)))
            .is_err()
        {
            tracing::warn!("Dropping result {}: {} stopped listening", id, tab);
            return Ack::failure(format!("{} is not reachable", tab));
        }
        tracing::debug!("Delivered result {} to {}", id, tab);
        Ack::ok()
    }
}

pub fn is_internal_url(url: &str) -> bool {
    INTERNAL_URL_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

fn send_ack(ack: Option<oneshot::Sender<Ack>>, reply: Ack) {
    if let Some(ack) = ack {
        let _ = ack.send(reply);
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::DialogType;
    use crate::host::{MemorySink, RecordingNotifier};

    struct Fixture {
        dispatcher: Dispatcher,
        tab_rx: mpsc::UnboundedReceiver<TabMessage>,
        notifier: RecordingNotifier,
        sink: MemorySink,
    }

    fn fixture(config: Config) -> Fixture {
        let notifier = RecordingNotifier::new();
        let sink = MemorySink::new();
        let (status_tx, _) = broadcast::channel(16);
        let mut dispatcher = Dispatcher::new(
            config,
            Arc::new(notifier.clone()),
            Arc::new(sink.clone()),
            status_tx,
        );
        let (sender, tab_rx) = mpsc::unbounded_channel();
        dispatcher.handle_control(Control::Attach {
            tab: TabId(1),
            url: "https://school.example/".to_string(),
            sender,
        });
        Fixture {
            dispatcher,
            tab_rx,
            notifier,
            sink,
        }
    }

    fn call(method: &str, arguments: Vec<Value>, id: Option<&str>) -> (RuntimeMessage, oneshot::Receiver<Ack>) {
        let (ack, ack_rx) = oneshot::channel();
        let message = RuntimeMessage {
            tab: TabId(1),
            envelope: RuntimeEnvelope::Call(CallRequest {
                method: method.to_string(),
                arguments,
                correlation_id: id.map(CorrelationId::from),
            }),
            ack: Some(ack),
        };
        (message, ack_rx)
    }

    fn resolved(tab_rx: &mut mpsc::UnboundedReceiver<TabMessage>) -> CallResult {
        match tab_rx.try_recv().unwrap().envelope {
            TabEnvelope::Resolve(result) => result,
            other => panic!("expected resolve, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_method_acks_failure_without_result() {
        let mut f = fixture(Config::default());
        let (message, ack) = call("vibrate", vec![], Some("c1"));

        f.dispatcher.handle_runtime(message).await;

        let ack = ack.await.unwrap();
        assert!(!ack.success);
        assert_eq!(ack.message.as_deref(), Some("Unknown AndroidBridge method"));
        assert!(f.tab_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn toast_notifies_with_configured_title() {
        let mut f = fixture(Config::default());
        let (message, ack) = call("showToast", vec![json!("hi")], None);

        f.dispatcher.handle_runtime(message).await;

        assert!(ack.await.unwrap().success);
        assert_eq!(
            f.notifier.notifications(),
            vec![("Simulated Toast".to_string(), "hi".to_string())]
        );
        assert!(f.tab_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dialog_calls_are_forwarded_to_the_tab() {
        let mut f = fixture(Config::default());
        let (message, ack) = call("showPrompt", vec![json!("Name")], Some("c9"));

        f.dispatcher.handle_runtime(message).await;

        let forwarded = f.tab_rx.try_recv().unwrap();
        match forwarded.envelope {
            TabEnvelope::ShowDialog(request) => {
                assert_eq!(request.dialog_type, DialogType::Prompt);
                assert_eq!(request.correlation_id, CorrelationId::from("c9"));
                assert_eq!(request.arguments, vec![json!("Name")]);
            }
            other => panic!("expected dialog, got {:?}", other),
        }
        forwarded.ack.unwrap().send(Ack::ok()).unwrap();
        assert!(ack.await.unwrap().success);
    }

    #[tokio::test]
    async fn dialog_call_without_correlation_id_is_refused() {
        let mut f = fixture(Config::default());
        let (message, ack) = call("showAlert", vec![json!("T")], None);

        f.dispatcher.handle_runtime(message).await;

        assert!(!ack.await.unwrap().success);
        assert!(f.tab_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cached_save_resolves_true() {
        let mut f = fixture(Config::default());
        let (message, _ack) = call("savePresetTimeSlots", vec![json!("[{\"number\":1}]")], Some("c2"));

        f.dispatcher.handle_runtime(message).await;

        let result = resolved(&mut f.tab_rx);
        assert_eq!(result.value, json!(true));
        assert!(!result.is_error);
        assert_eq!(f.dispatcher.cache().time_slots, Some(json!([{"number": 1}])));
    }

    #[tokio::test]
    async fn malformed_save_resolves_error() {
        let mut f = fixture(Config::default());
        let (message, _ack) = call("saveImportedCourses", vec![json!("[{oops")], Some("c3"));

        f.dispatcher.handle_runtime(message).await;

        let result = resolved(&mut f.tab_rx);
        assert!(result.is_error);
        assert!(result.value.as_str().unwrap().contains("key must be a string"));
        assert_eq!(f.dispatcher.cache().courses, None);
    }

    #[tokio::test]
    async fn simulated_save_always_fails_at_zero_rate() {
        let mut config = Config::default();
        config.dispatch.save_policy = SavePolicy::Simulated;
        config.dispatch.success_rate = 0.0;
        let mut f = fixture(config);
        let (message, _ack) = call("saveImportedCourses", vec![json!("[]")], Some("c4"));

        f.dispatcher.handle_runtime(message).await;

        let result = resolved(&mut f.tab_rx);
        assert!(result.is_error);
        assert_eq!(result.value, json!(SAVE_FAILED_MESSAGE));
        assert!(f.sink.is_empty());
    }

    #[tokio::test]
    async fn simulated_save_persists_at_full_rate() {
        let mut config = Config::default();
        config.dispatch.save_policy = SavePolicy::Simulated;
        config.dispatch.success_rate = 1.0;
        let mut f = fixture(config);
        let (message, _ack) = call("saveImportedCourses", vec![json!("[]")], Some("c5"));

        f.dispatcher.handle_runtime(message).await;

        assert_eq!(resolved(&mut f.tab_rx).value, json!(true));
        let names = f.sink.names();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("courses-") && names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn task_completion_exports_and_clears_cache() {
        let mut f = fixture(Config::default());
        let (save, _) = call("saveImportedCourses", vec![json!("[1]")], Some("s1"));
        f.dispatcher.handle_runtime(save).await;
        let (notify, _) = call("notifyTaskCompletion", vec![], Some("n1"));
        f.dispatcher.handle_runtime(notify).await;

        resolved(&mut f.tab_rx);
        assert_eq!(resolved(&mut f.tab_rx).value, json!(true));
        let export: Value =
            serde_json::from_slice(&f.sink.get("course_import_export.json").unwrap()).unwrap();
        assert_eq!(export, json!({"courses": [1], "timeSlots": null}));
        assert_eq!(f.dispatcher.cache(), &PayloadCache::default());
        assert_eq!(f.notifier.notifications().len(), 1);
    }

    #[tokio::test]
    async fn dialog_result_is_coerced_before_delivery() {
        let mut f = fixture(Config::default());
        let message = RuntimeMessage {
            tab: TabId(1),
            envelope: RuntimeEnvelope::DialogResult(DialogResult {
                correlation_id: CorrelationId::from("d1"),
                value: json!("'42'"),
                error: None,
            }),
            ack: None,
        };

        f.dispatcher.handle_runtime(message).await;

        assert_eq!(resolved(&mut f.tab_rx).value, json!(42));
    }

    #[tokio::test]
    async fn dialog_error_becomes_rejection() {
        let mut f = fixture(Config::default());
        let message = RuntimeMessage {
            tab: TabId(1),
            envelope: RuntimeEnvelope::DialogResult(DialogResult {
                correlation_id: CorrelationId::from("d2"),
                value: Value::Null,
                error: Some("page unreachable".to_string()),
            }),
            ack: None,
        };

        f.dispatcher.handle_runtime(message).await;

        let result = resolved(&mut f.tab_rx);
        assert!(result.is_error);
        assert_eq!(result.value, json!("page unreachable"));
    }

    #[tokio::test]
    async fn result_for_closed_tab_is_dropped() {
        let mut f = fixture(Config::default());
        drop(f.tab_rx);
        let (message, ack) = call("notifyTaskCompletion", vec![], Some("n2"));

        f.dispatcher.handle_runtime(message).await;

        assert!(!ack.await.unwrap().success);
    }

    #[tokio::test]
    async fn start_test_refuses_internal_pages() {
        let mut f = fixture(Config::default());
        let (sender, _rx) = mpsc::unbounded_channel();
        f.dispatcher.handle_control(Control::Attach {
            tab: TabId(2),
            url: "chrome://settings".to_string(),
            sender,
        });

        let (reply, reply_rx) = oneshot::channel();
        f.dispatcher.handle_control(Control::StartTest {
            script: "demo".to_string(),
            reply,
        });

        let ack = reply_rx.await.unwrap();
        assert!(!ack.success);
        assert!(ack.message.unwrap().contains("browser-internal"));
    }

    #[tokio::test]
    async fn start_test_without_tabs_fails() {
        let mut f = fixture(Config::default());
        f.dispatcher.handle_control(Control::Detach { tab: TabId(1) });

        let (reply, reply_rx) = oneshot::channel();
        f.dispatcher.handle_control(Control::StartTest {
            script: "demo".to_string(),
            reply,
        });

        assert!(!reply_rx.await.unwrap().success);
        assert_eq!(f.dispatcher.active_tab(), None);
    }

    #[test]
    fn internal_urls() {
        assert!(is_internal_url("about:blank"));
        assert!(is_internal_url("chrome-extension://abc/popup.html"));
        assert!(!is_internal_url("https://example.com"));
    }
}

//! A test session: one dispatcher plus any number of simulated tabs, each
//! with its own page context and relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::{Ack, ExecutionStatus, RuntimeMessage, TabId};
use crate::config::Config;
use crate::dialog::{AutoRenderer, DialogRenderer};
use crate::dispatch::{Control, Dispatcher};
use crate::error::{BridgeError, Result};
use crate::host::{ArtifactSink, DirectorySink, Notifier, TracingNotifier};
use crate::page::{DemoScript, PageBridge};
use crate::relay::Relay;

const STATUS_CAPACITY: usize = 64;

pub struct SessionBuilder {
    config: Config,
    renderer: Option<Arc<dyn DialogRenderer>>,
    notifier: Option<Arc<dyn Notifier>>,
    sink: Option<Arc<dyn ArtifactSink>>,
}

impl SessionBuilder {
    pub fn renderer(mut self, renderer: impl DialogRenderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn sink(mut self, sink: impl ArtifactSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Validate the config and start the dispatcher.
    pub fn build(self) -> Result<Session> {
        self.config.validate()?;

        let renderer = self.renderer.unwrap_or_else(|| Arc::new(AutoRenderer));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
        let sink = match self.sink {
            Some(sink) => sink,
            None => Arc::new(DirectorySink::new(self.config.export_dir())),
        };

        let (runtime_tx, runtime_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(STATUS_CAPACITY);
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher::new(self.config.clone(), notifier, sink, status_tx.clone());
        let handle = tokio::spawn(dispatcher.run(runtime_rx, control_rx, shutdown.clone()));

        Ok(Session {
            config: self.config,
            renderer,
            runtime_tx,
            control_tx,
            status_tx,
            shutdown,
            tabs: Mutex::new(HashMap::new()),
            next_tab: AtomicU32::new(1),
            dispatcher: Mutex::new(Some(handle)),
        })
    }
}

/// A simulated browser tab.
#[derive(Clone)]
pub struct Tab {
    id: TabId,
    url: String,
    page: PageBridge,
}

impl Tab {
    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The bridge objects page code calls.
    pub fn page(&self) -> &PageBridge {
        &self.page
    }
}

pub struct Session {
    config: Config,
    renderer: Arc<dyn DialogRenderer>,
    runtime_tx: mpsc::UnboundedSender<RuntimeMessage>,
    control_tx: mpsc::UnboundedSender<Control>,
    status_tx: broadcast::Sender<ExecutionStatus>,
    shutdown: CancellationToken,
    tabs: Mutex<HashMap<TabId, TabTasks>>,
    next_tab: AtomicU32,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// The page context and relay of one open tab.
struct TabTasks {
    token: CancellationToken,
    handles: [JoinHandle<()>; 2],
}

impl Session {
    pub fn builder(config: Config) -> SessionBuilder {
        SessionBuilder {
            config,
            renderer: None,
            notifier: None,
            sink: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open a tab at `url` and make it the active one. The page starts with
    /// the built-in `demo` script registered.
    pub async fn open_tab(&self, url: &str) -> Result<Tab> {
        let id = TabId(self.next_tab.fetch_add(1, Ordering::Relaxed));
        let token = self.shutdown.child_token();

        let (page_tx, page_rx) = mpsc::unbounded_channel();
        let (window_tx, window_rx) = mpsc::unbounded_channel();
        let (tab_tx, tab_rx) = mpsc::unbounded_channel();

        let (page, context) = PageBridge::connect(page_tx);
        page.register_script("demo", DemoScript).await;

        let relay = Relay::new(
            id,
            window_tx,
            self.runtime_tx.clone(),
            Arc::clone(&self.renderer),
            token.clone(),
        );

        self.control_tx
            .send(Control::Attach {
                tab: id,
                url: url.to_string(),
                sender: tab_tx,
            })
            .map_err(|_| BridgeError::Transport("dispatcher has stopped".to_string()))?;

        let page_task = tokio::spawn(context.run(window_rx, token.clone()));
        let relay_task = tokio::spawn(relay.run(page_rx, tab_rx));
        lock(&self.tabs).insert(
            id,
            TabTasks {
                token,
                handles: [page_task, relay_task],
            },
        );

        tracing::info!("Opened {} at {}", id, url);
        Ok(Tab {
            id,
            url: url.to_string(),
            page,
        })
    }

    pub fn focus(&self, tab: TabId) -> Result<()> {
        self.control(Control::Focus { tab })
    }

    /// Tear the tab down. Calls still pending in its page never settle.
    ///
    /// The tab's tasks exit once cancelled and `shutdown` does not wait on them.
    pub fn close_tab(&self, tab: TabId) -> Result<()> {
        match lock(&self.tabs).remove(&tab) {
            Some(tasks) => tasks.token.cancel(),
            None => return Err(BridgeError::Other(format!("{} is not open", tab))),
        }
        tracing::info!("Closed {}", tab);
        self.control(Control::Detach { tab })
    }

    /// Ask the active tab to run `script`. The acknowledgment says whether
    /// the script could be started, not how it went; watch
    /// [`Session::subscribe_status`] for that.
    pub async fn start_test(&self, script: &str) -> Result<Ack> {
        let (reply, reply_rx) = oneshot::channel();
        self.control(Control::StartTest {
            script: script.to_string(),
            reply,
        })?;
        reply_rx
            .await
            .map_err(|_| BridgeError::Transport("dispatcher dropped the start request".to_string()))
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ExecutionStatus> {
        self.status_tx.subscribe()
    }

    /// Stop every context and wait for their tasks to finish.
    ///
    /// Dropping a session also stops every context, without waiting.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let mut tasks: Vec<JoinHandle<()>> = lock(&self.tabs)
            .drain()
            .flat_map(|(_, tab)| tab.handles)
            .collect();
        tasks.extend(lock(&self.dispatcher).take());
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!("Session task ended abnormally: {}", e);
            }
        }
        tracing::info!("Session shut down");
    }

    fn control(&self, control: Control) -> Result<()> {
        self.control_tx
            .send(control)
            .map_err(|_| BridgeError::Transport("dispatcher has stopped".to_string()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

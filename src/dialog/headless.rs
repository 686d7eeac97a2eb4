use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{DialogEvent, DialogRenderer, DialogSpec, DialogSurface};
use crate::bridge::CorrelationId;
use crate::error::{BridgeError, Result};

/// Renderer without any UI: every opened dialog is handed to a
/// [`DialogInbox`] so a test can drive it.
pub struct HeadlessRenderer {
    opened_tx: mpsc::UnboundedSender<HeadlessDialog>,
}

/// Receives the dialogs a [`HeadlessRenderer`] opens, in opening order.
pub struct DialogInbox {
    opened_rx: mpsc::UnboundedReceiver<HeadlessDialog>,
}

impl HeadlessRenderer {
    pub fn new() -> (Self, DialogInbox) {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        (Self { opened_tx }, DialogInbox { opened_rx })
    }
}

impl DialogInbox {
    pub async fn next(&mut self) -> Option<HeadlessDialog> {
        self.opened_rx.recv().await
    }

    /// A dialog that is already open, without waiting.
    pub fn try_next(&mut self) -> Option<HeadlessDialog> {
        self.opened_rx.try_recv().ok()
    }
}

#[async_trait]
impl DialogRenderer for HeadlessRenderer {
    async fn open(&self, id: &CorrelationId, spec: &DialogSpec) -> Result<Box<dyn DialogSurface>> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let dismissed = Arc::new(AtomicBool::new(false));

        let handle = HeadlessDialog {
            id: id.clone(),
            spec: spec.clone(),
            events: events_tx,
            errors: errors_rx,
            dismissed: Arc::clone(&dismissed),
        };
        self.opened_tx
            .send(handle)
            .map_err(|_| BridgeError::Dialog("headless dialog inbox was dropped".to_string()))?;

        Ok(Box::new(HeadlessSurface {
            events: events_rx,
            errors: errors_tx,
            dismissed,
        }))
    }
}

/// Test-side handle of one open headless dialog.
///
/// Dropping the handle removes the dialog, like taking the overlay out of the
/// document.
pub struct HeadlessDialog {
    id: CorrelationId,
    spec: DialogSpec,
    events: mpsc::UnboundedSender<DialogEvent>,
    errors: mpsc::UnboundedReceiver<String>,
    dismissed: Arc<AtomicBool>,
}

impl HeadlessDialog {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn spec(&self) -> &DialogSpec {
        &self.spec
    }

    pub fn input(&self, text: &str) {
        self.send(DialogEvent::Input(text.to_string()));
    }

    pub fn select(&self, index: usize) {
        self.send(DialogEvent::Select(index));
    }

    pub fn confirm(&self) {
        self.send(DialogEvent::Confirm);
    }

    pub fn cancel(&self) {
        self.send(DialogEvent::Cancel);
    }

    pub fn escape(&self) {
        self.send(DialogEvent::Escape);
    }

    pub fn remove(&self) {
        self.send(DialogEvent::Removed);
    }

    /// Wait for the next validation error shown in this dialog.
    pub async fn next_error(&mut self) -> Option<String> {
        self.errors.recv().await
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed.load(Ordering::SeqCst)
    }

    fn send(&self, event: DialogEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Headless dialog {} already closed", self.id);
        }
    }
}

struct HeadlessSurface {
    events: mpsc::UnboundedReceiver<DialogEvent>,
    errors: mpsc::UnboundedSender<String>,
    dismissed: Arc<AtomicBool>,
}

#[async_trait]
impl DialogSurface for HeadlessSurface {
    async fn next_event(&mut self) -> Option<DialogEvent> {
        if self.dismissed.load(Ordering::SeqCst) {
            return None;
        }
        self.events.recv().await
    }

    fn show_error(&mut self, message: &str) {
        let _ = self.errors.send(message.to_string());
    }

    fn dismiss(&mut self) {
        self.dismissed.store(true, Ordering::SeqCst);
        self.events.close();
    }
}

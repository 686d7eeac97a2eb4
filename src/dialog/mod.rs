//! Inline dialogs rendered by a tab's relay on behalf of the dispatcher.
//!
//! The [`DialogSession`] state machine is written once against the
//! [`DialogRenderer`] / [`DialogSurface`] capability; renderers differ per
//! target (scripted for tests, automatic for unattended runs, terminal
//! prompts for interactive use).

mod auto;
mod headless;
mod session;
mod spec;
mod terminal;

use async_trait::async_trait;

use crate::bridge::CorrelationId;
use crate::error::Result;

pub use auto::AutoRenderer;
pub use headless::{DialogInbox, HeadlessDialog, HeadlessRenderer};
pub use session::{DialogSession, DialogState, InputValidator};
pub use spec::DialogSpec;
pub use terminal::TerminalRenderer;

/// A user interaction with an open dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    /// Prompt text changed.
    Input(String),
    /// A selection list item was clicked.
    Select(usize),
    Confirm,
    Cancel,
    Escape,
    /// The dialog disappeared without any of the controls being used.
    Removed,
}

/// One rendered dialog.
#[async_trait]
pub trait DialogSurface: Send {
    /// Wait for the next interaction. `None` means the surface is gone.
    async fn next_event(&mut self) -> Option<DialogEvent>;

    /// Show a validation error and return focus to the input.
    fn show_error(&mut self, message: &str);

    /// Take the dialog off screen after it resolved.
    fn dismiss(&mut self);
}

#[async_trait]
pub trait DialogRenderer: Send + Sync {
    async fn open(&self, id: &CorrelationId, spec: &DialogSpec) -> Result<Box<dyn DialogSurface>>;
}

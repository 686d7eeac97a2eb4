use async_trait::async_trait;
use serde_json::Value;

use super::{DialogEvent, DialogRenderer, DialogSpec, DialogSurface};
use crate::bridge::{CorrelationId, DialogRequest, DialogResult};
use crate::error::Result;

/// Runs a named validator against prompt input in the page context.
#[async_trait]
pub trait InputValidator: Send + Sync {
    /// `Ok(Some(message))` rejects the input, `Ok(None)` accepts it,
    /// `Err` means the page could not be asked.
    async fn validate(&self, validator: &str, input: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Rendered,
    AwaitingValidation,
    Resolved,
}

enum Step {
    Continue,
    Validate(String, String),
    Resolve(Value),
}

/// State machine for one open dialog.
///
/// Produces exactly one [`DialogResult`]: [`DialogSession::run`] consumes the
/// session and returns as soon as the dialog resolves.
pub struct DialogSession {
    id: CorrelationId,
    spec: DialogSpec,
    state: DialogState,
    input: String,
    selected: Option<usize>,
    surface: Box<dyn DialogSurface>,
}

impl DialogSession {
    pub fn new(id: CorrelationId, spec: DialogSpec, surface: Box<dyn DialogSurface>) -> Self {
        let (input, selected) = match &spec {
            DialogSpec::Prompt { default_value, .. } => (default_value.clone(), None),
            DialogSpec::SingleSelection { default_index, .. } => (String::new(), *default_index),
            DialogSpec::Alert { .. } => (String::new(), None),
        };
        Self {
            id,
            spec,
            state: DialogState::Rendered,
            input,
            selected,
            surface,
        }
    }

    /// Render `request` and drive it to a result.
    pub async fn open_and_run(
        renderer: &dyn DialogRenderer,
        validator: &dyn InputValidator,
        request: DialogRequest,
    ) -> DialogResult {
        let spec = DialogSpec::from_request(&request);
        let id = request.correlation_id;

        match renderer.open(&id, &spec).await {
            Ok(surface) => DialogSession::new(id, spec, surface).run(validator).await,
            Err(e) => {
                tracing::error!("Failed to render dialog {}: {}", id, e);
                DialogResult {
                    correlation_id: id,
                    value: Value::Null,
                    error: Some(format!("Dialog could not be rendered: {}", e)),
                }
            }
        }
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub async fn run(mut self, validator: &dyn InputValidator) -> DialogResult {
        loop {
            let event = self.next_event().await;
            match self.on_event(event) {
                Step::Continue => {}
                Step::Resolve(value) => return self.resolve(value, None),
                Step::Validate(name, input) => {
                    if let Some(result) = self.validate(validator, &name, input).await {
                        return result;
                    }
                }
            }
        }
    }

    async fn next_event(&mut self) -> DialogEvent {
        self.surface.next_event().await.unwrap_or(DialogEvent::Removed)
    }

    /// Ask the page to validate `input`, still reacting to cancellation while
    /// waiting. Returns `None` when the dialog stays open.
    async fn validate(
        &mut self,
        validator: &dyn InputValidator,
        name: &str,
        input: String,
    ) -> Option<DialogResult> {
        self.state = DialogState::AwaitingValidation;
        tracing::debug!("Dialog {} awaiting validator '{}'", self.id, name);

        let pending = validator.validate(name, &input);
        tokio::pin!(pending);

        loop {
            tokio::select! {
                verdict = &mut pending => {
                    return match verdict {
                        Ok(None) => Some(self.resolve(Value::String(input.clone()), None)),
                        Ok(Some(message)) => {
                            self.state = DialogState::Rendered;
                            self.surface.show_error(&message);
                            None
                        }
                        Err(e) => {
                            tracing::error!("Validation communication error for dialog {}: {}", self.id, e);
                            Some(self.resolve(Value::Null, Some(e.to_string())))
                        }
                    };
                }
                event = self.surface.next_event() => {
                    let event = event.unwrap_or(DialogEvent::Removed);
                    match self.on_event(event) {
                        Step::Resolve(value) => return Some(self.resolve(value, None)),
                        Step::Validate(..) => {
                            tracing::debug!("Dialog {} ignored confirm while validating", self.id);
                        }
                        Step::Continue => {}
                    }
                }
            }
        }
    }

    fn on_event(&mut self, event: DialogEvent) -> Step {
        match event {
            DialogEvent::Input(text) => {
                if matches!(self.spec, DialogSpec::Prompt { .. }) {
                    self.input = text;
                }
                Step::Continue
            }
            DialogEvent::Select(index) => {
                if let DialogSpec::SingleSelection { options, .. } = &self.spec {
                    if index < options.len() {
                        self.selected = Some(index);
                    }
                }
                Step::Continue
            }
            DialogEvent::Confirm => match &self.spec {
                DialogSpec::Alert { .. } => Step::Resolve(Value::Bool(true)),
                DialogSpec::Prompt {
                    validator: Some(name),
                    ..
                } => Step::Validate(name.clone(), self.input.clone()),
                DialogSpec::Prompt { validator: None, .. } => {
                    Step::Resolve(Value::String(self.input.clone()))
                }
                DialogSpec::SingleSelection { .. } => {
                    Step::Resolve(self.selected.map(Value::from).unwrap_or(Value::Null))
                }
            },
            DialogEvent::Cancel | DialogEvent::Escape if !self.spec.is_cancellable() => {
                Step::Continue
            }
            DialogEvent::Cancel | DialogEvent::Escape => Step::Resolve(Value::Null),
            DialogEvent::Removed => {
                tracing::warn!("Inline dialog (ID: {}) was unexpectedly removed", self.id);
                Step::Resolve(Value::Null)
            }
        }
    }

    fn resolve(&mut self, value: Value, error: Option<String>) -> DialogResult {
        debug_assert_ne!(self.state, DialogState::Resolved);
        self.state = DialogState::Resolved;
        self.surface.dismiss();
        tracing::debug!("Dialog {} resolved with {}", self.id, value);
        DialogResult {
            correlation_id: self.id.clone(),
            value,
            error,
        }
    }
}

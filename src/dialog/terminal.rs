use std::collections::VecDeque;

use async_trait::async_trait;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

use super::{DialogEvent, DialogRenderer, DialogSpec, DialogSurface};
use crate::bridge::CorrelationId;
use crate::error::{BridgeError, Result};

/// Interactive renderer drawing dialogs as terminal prompts.
#[derive(Debug, Default)]
pub struct TerminalRenderer;

impl TerminalRenderer {
    pub fn new() -> Self {
        Self
    }
}

/// Prompt theme with indented radio-button style options.
fn dialog_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("".to_string()).for_stderr(),
        active_item_prefix: style("  ◉ ".to_string()).for_stderr().green(),
        inactive_item_prefix: style("  ○ ".to_string()).for_stderr(),
        ..ColorfulTheme::default()
    }
}

#[async_trait]
impl DialogRenderer for TerminalRenderer {
    async fn open(&self, id: &CorrelationId, spec: &DialogSpec) -> Result<Box<dyn DialogSurface>> {
        tracing::debug!("Rendering {} dialog {} in terminal", spec.dialog_type().as_str(), id);
        let (input, selected) = match spec {
            DialogSpec::Prompt { default_value, .. } => (default_value.clone(), None),
            DialogSpec::SingleSelection { default_index, .. } => (String::new(), *default_index),
            DialogSpec::Alert { .. } => (String::new(), None),
        };
        Ok(Box::new(TerminalSurface {
            spec: spec.clone(),
            input,
            selected,
            queued: VecDeque::new(),
            interacting: true,
        }))
    }
}

struct TerminalSurface {
    spec: DialogSpec,
    input: String,
    selected: Option<usize>,
    queued: VecDeque<DialogEvent>,
    /// False once the user submitted; the prompt is shown again only after
    /// a validation error.
    interacting: bool,
}

#[async_trait]
impl DialogSurface for TerminalSurface {
    async fn next_event(&mut self) -> Option<DialogEvent> {
        if let Some(event) = self.queued.pop_front() {
            return Some(event);
        }
        if !self.interacting {
            return std::future::pending().await;
        }

        let spec = self.spec.clone();
        let input = self.input.clone();
        let selected = self.selected;
        let events = tokio::task::spawn_blocking(move || interact(&spec, &input, selected))
            .await
            .map_err(|e| BridgeError::Dialog(e.to_string()))
            .and_then(|r| r);

        match events {
            Ok(events) => {
                for event in &events {
                    match event {
                        DialogEvent::Input(text) => self.input = text.clone(),
                        DialogEvent::Select(index) => self.selected = Some(*index),
                        _ => {}
                    }
                }
                self.interacting = false;
                self.queued.extend(events);
                self.queued.pop_front()
            }
            Err(e) => {
                tracing::warn!("Terminal dialog closed: {}", e);
                None
            }
        }
    }

    fn show_error(&mut self, message: &str) {
        eprintln!("  {} {}", style("✗").red(), style(message).red());
        self.interacting = true;
    }

    fn dismiss(&mut self) {
        self.queued.clear();
        self.interacting = false;
        eprintln!();
    }
}

fn prompt_error(e: dialoguer::Error) -> BridgeError {
    BridgeError::Dialog(format!("Prompt failed: {}", e))
}

/// Show the dialog once and translate the answer into events.
fn interact(spec: &DialogSpec, input: &str, selected: Option<usize>) -> Result<Vec<DialogEvent>> {
    let theme = dialog_theme();
    eprintln!();
    eprintln!("  {}", style(spec.title()).bold());

    match spec {
        DialogSpec::Alert {
            body,
            confirm_label,
            ..
        } => {
            if !body.is_empty() {
                eprintln!("  {}", body);
            }
            Select::with_theme(&theme)
                .items(&[confirm_label.as_str()])
                .default(0)
                .report(false)
                .interact()
                .map_err(prompt_error)?;
            Ok(vec![DialogEvent::Confirm])
        }
        DialogSpec::Prompt {
            body,
            confirm_label,
            ..
        } => {
            let text: String = Input::with_theme(&theme)
                .with_prompt(if body.is_empty() { spec.title() } else { body.as_str() })
                .with_initial_text(input)
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_error)?;

            let answer = Confirm::with_theme(&theme)
                .with_prompt(format!("{} \"{}\"?", confirm_label, text))
                .default(true)
                .interact_opt()
                .map_err(prompt_error)?;

            Ok(match answer {
                Some(true) => vec![DialogEvent::Input(text), DialogEvent::Confirm],
                Some(false) => vec![DialogEvent::Input(text), DialogEvent::Cancel],
                None => vec![DialogEvent::Escape],
            })
        }
        DialogSpec::SingleSelection {
            options,
            confirm_label,
            ..
        } => {
            if options.is_empty() {
                let answer = Confirm::with_theme(&theme)
                    .with_prompt(format!("No options to choose from. {}?", confirm_label))
                    .default(true)
                    .interact_opt()
                    .map_err(prompt_error)?;
                return Ok(match answer {
                    Some(true) => vec![DialogEvent::Confirm],
                    Some(false) => vec![DialogEvent::Cancel],
                    None => vec![DialogEvent::Escape],
                });
            }

            let choice = Select::with_theme(&theme)
                .items(options)
                .default(selected.unwrap_or(0))
                .interact_opt()
                .map_err(prompt_error)?;

            Ok(match choice {
                Some(index) => vec![DialogEvent::Select(index), DialogEvent::Confirm],
                None => vec![DialogEvent::Escape],
            })
        }
    }
}

use std::collections::VecDeque;

use async_trait::async_trait;

use super::{DialogEvent, DialogRenderer, DialogSpec, DialogSurface};
use crate::bridge::CorrelationId;
use crate::error::Result;

/// Renderer for unattended runs: confirms every dialog with its defaults and
/// cancels a prompt whose input fails validation.
#[derive(Debug, Default)]
pub struct AutoRenderer;

#[async_trait]
impl DialogRenderer for AutoRenderer {
    async fn open(&self, id: &CorrelationId, spec: &DialogSpec) -> Result<Box<dyn DialogSurface>> {
        tracing::info!("Auto-confirming {} dialog '{}' ({})", spec.dialog_type().as_str(), spec.title(), id);
        Ok(Box::new(AutoSurface {
            queued: VecDeque::from([DialogEvent::Confirm]),
        }))
    }
}

struct AutoSurface {
    queued: VecDeque<DialogEvent>,
}

#[async_trait]
impl DialogSurface for AutoSurface {
    async fn next_event(&mut self) -> Option<DialogEvent> {
        match self.queued.pop_front() {
            Some(event) => Some(event),
            // Nothing else will ever happen on this surface.
            None => std::future::pending().await,
        }
    }

    fn show_error(&mut self, message: &str) {
        tracing::warn!("Auto-cancelling dialog after validation error: {}", message);
        self.queued.push_back(DialogEvent::Cancel);
    }

    fn dismiss(&mut self) {
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::bridge::{DialogRequest, DialogType};
    use crate::dialog::{DialogSession, InputValidator};

    struct RejectAll;

    #[async_trait]
    impl InputValidator for RejectAll {
        async fn validate(&self, _validator: &str, _input: &str) -> Result<Option<String>> {
            Ok(Some("never valid".to_string()))
        }
    }

    #[tokio::test]
    async fn confirms_selection_default() {
        let request = DialogRequest {
            dialog_type: DialogType::SingleSelection,
            arguments: vec![json!("Pick"), json!(["a", "b", "c"]), json!(2)],
            correlation_id: CorrelationId::from("auto-1"),
        };
        let result = DialogSession::open_and_run(&AutoRenderer, &RejectAll, request).await;
        assert_eq!(result.value, json!(2));
    }

    #[tokio::test]
    async fn cancels_after_validation_error() {
        let request = DialogRequest {
            dialog_type: DialogType::Prompt,
            arguments: vec![json!("Name"), json!(""), json!("x"), json!("validateName")],
            correlation_id: CorrelationId::from("auto-2"),
        };
        let result = DialogSession::open_and_run(&AutoRenderer, &RejectAll, request).await;
        assert_eq!(result.value, Value::Null);
        assert!(result.error.is_none());
    }
}

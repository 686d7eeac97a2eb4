use serde_json::Value;

use crate::bridge::{DialogRequest, DialogType};

const DEFAULT_ALERT_TITLE: &str = "Notice";
const DEFAULT_PROMPT_TITLE: &str = "Input";
const DEFAULT_SELECTION_TITLE: &str = "Please select";
const DEFAULT_CONFIRM_LABEL: &str = "OK";
const DEFAULT_CANCEL_LABEL: &str = "Cancel";

/// What a renderer has to put on screen for one dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogSpec {
    Alert {
        title: String,
        body: String,
        confirm_label: String,
    },
    Prompt {
        title: String,
        body: String,
        default_value: String,
        validator: Option<String>,
        confirm_label: String,
        cancel_label: String,
    },
    SingleSelection {
        title: String,
        options: Vec<String>,
        default_index: Option<usize>,
        confirm_label: String,
        cancel_label: String,
    },
}

impl DialogSpec {
    /// Build a spec from positional call arguments.
    ///
    /// - alert: `[title, body, confirmLabel]`
    /// - prompt: `[title, body, defaultValue, validatorName]`
    /// - single selection: `[title, optionsJson, defaultIndex, confirmLabel, cancelLabel]`
    ///
    /// Missing or empty arguments fall back to defaults.
    pub fn from_request(request: &DialogRequest) -> Self {
        let args = &request.arguments;
        match request.dialog_type {
            DialogType::Alert => DialogSpec::Alert {
                title: text_arg(args, 0).unwrap_or_else(|| DEFAULT_ALERT_TITLE.to_string()),
                body: text_arg(args, 1).unwrap_or_default(),
                confirm_label: text_arg(args, 2)
                    .unwrap_or_else(|| DEFAULT_CONFIRM_LABEL.to_string()),
            },
            DialogType::Prompt => DialogSpec::Prompt {
                title: text_arg(args, 0).unwrap_or_else(|| DEFAULT_PROMPT_TITLE.to_string()),
                body: text_arg(args, 1).unwrap_or_default(),
                default_value: text_arg(args, 2).unwrap_or_default(),
                validator: text_arg(args, 3),
                confirm_label: DEFAULT_CONFIRM_LABEL.to_string(),
                cancel_label: DEFAULT_CANCEL_LABEL.to_string(),
            },
            DialogType::SingleSelection => {
                let options = options_arg(args.get(1));
                let default_index =
                    index_arg(args.get(2)).filter(|index| *index < options.len());
                DialogSpec::SingleSelection {
                    title: text_arg(args, 0)
                        .unwrap_or_else(|| DEFAULT_SELECTION_TITLE.to_string()),
                    options,
                    default_index,
                    confirm_label: text_arg(args, 3)
                        .unwrap_or_else(|| DEFAULT_CONFIRM_LABEL.to_string()),
                    cancel_label: text_arg(args, 4)
                        .unwrap_or_else(|| DEFAULT_CANCEL_LABEL.to_string()),
                }
            }
        }
    }

    pub fn dialog_type(&self) -> DialogType {
        match self {
            DialogSpec::Alert { .. } => DialogType::Alert,
            DialogSpec::Prompt { .. } => DialogType::Prompt,
            DialogSpec::SingleSelection { .. } => DialogType::SingleSelection,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            DialogSpec::Alert { title, .. }
            | DialogSpec::Prompt { title, .. }
            | DialogSpec::SingleSelection { title, .. } => title,
        }
    }

    /// Alerts only have a confirm control.
    pub fn is_cancellable(&self) -> bool {
        !matches!(self, DialogSpec::Alert { .. })
    }
}

fn text_arg(args: &[Value], index: usize) -> Option<String> {
    match args.get(index)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Null | Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

fn options_arg(arg: Option<&Value>) -> Vec<String> {
    let parsed = match arg {
        Some(Value::String(json)) => match serde_json::from_str::<Value>(json) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Invalid options JSON for single selection dialog: {}", e);
                return Vec::new();
            }
        },
        Some(value) => value.clone(),
        None => return Vec::new(),
    };

    match parsed {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        other => {
            tracing::error!("Single selection options are not an array: {}", other);
            Vec::new()
        }
    }
}

fn index_arg(arg: Option<&Value>) -> Option<usize> {
    match arg? {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CorrelationId;
    use serde_json::json;

    fn request(dialog_type: DialogType, arguments: Vec<Value>) -> DialogRequest {
        DialogRequest {
            dialog_type,
            arguments,
            correlation_id: CorrelationId::from("d1"),
        }
    }

    #[test]
    fn alert_defaults() {
        let spec = DialogSpec::from_request(&request(DialogType::Alert, vec![]));
        assert_eq!(
            spec,
            DialogSpec::Alert {
                title: "Notice".to_string(),
                body: String::new(),
                confirm_label: "OK".to_string(),
            }
        );
        assert!(!spec.is_cancellable());
    }

    #[test]
    fn prompt_reads_validator_name() {
        let spec = DialogSpec::from_request(&request(
            DialogType::Prompt,
            vec![json!("Name"), json!("2+ chars"), json!("guest"), json!("validateName")],
        ));
        match spec {
            DialogSpec::Prompt {
                default_value,
                validator,
                ..
            } => {
                assert_eq!(default_value, "guest");
                assert_eq!(validator.as_deref(), Some("validateName"));
            }
            other => panic!("unexpected spec: {:?}", other),
        }
    }

    #[test]
    fn empty_validator_name_means_no_validator() {
        let spec = DialogSpec::from_request(&request(
            DialogType::Prompt,
            vec![json!("T"), json!("B"), json!(""), json!("")],
        ));
        assert!(matches!(spec, DialogSpec::Prompt { validator: None, .. }));
    }

    #[test]
    fn selection_parses_json_options_and_default() {
        let spec = DialogSpec::from_request(&request(
            DialogType::SingleSelection,
            vec![json!("Fruit"), json!(r#"["X","Y"]"#), json!(1)],
        ));
        assert_eq!(
            spec,
            DialogSpec::SingleSelection {
                title: "Fruit".to_string(),
                options: vec!["X".to_string(), "Y".to_string()],
                default_index: Some(1),
                confirm_label: "OK".to_string(),
                cancel_label: "Cancel".to_string(),
            }
        );
    }

    #[test]
    fn selection_default_out_of_range_is_dropped() {
        for default in [json!(5), json!(-1), json!("x")] {
            let spec = DialogSpec::from_request(&request(
                DialogType::SingleSelection,
                vec![json!("T"), json!(["a"]), default],
            ));
            assert!(matches!(
                spec,
                DialogSpec::SingleSelection {
                    default_index: None,
                    ..
                }
            ));
        }
    }

    #[test]
    fn malformed_options_become_empty() {
        let spec = DialogSpec::from_request(&request(
            DialogType::SingleSelection,
            vec![json!("T"), json!("{not json"), json!(0)],
        ));
        match spec {
            DialogSpec::SingleSelection {
                options,
                default_index,
                ..
            } => {
                assert!(options.is_empty());
                assert_eq!(default_index, None);
            }
            other => panic!("unexpected spec: {:?}", other),
        }
    }
}

//! Envelopes exchanged across the page, relay and dispatch contexts.
//!
//! Each direction of each boundary has its own closed enum, internally tagged
//! by `kind`, so a receiver matches every message it can be sent:
//!
//! - [`PageEnvelope`]: page → relay (window channel, JSON text)
//! - [`WindowEnvelope`]: relay → page (window channel, JSON text)
//! - [`RuntimeEnvelope`]: relay → dispatch (runtime channel)
//! - [`TabEnvelope`]: dispatch → relay (runtime channel)

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

/// Length of the random suffix of a correlation id.
const CORRELATION_SUFFIX_LEN: usize = 13;

/// Opaque token pairing a request with its eventual result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh id: unix-millis prefix + random alphanumeric suffix.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CORRELATION_SUFFIX_LEN)
            .map(|b| (b as char).to_ascii_lowercase())
            .collect();
        Self(format!("{}-{}", millis, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a simulated browser tab (one page + one relay).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}

/// Operations a page may invoke on the simulated host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeMethod {
    ShowToast,
    ShowAlert,
    ShowPrompt,
    ShowSingleSelection,
    SaveImportedCourses,
    SavePresetTimeSlots,
    NotifyTaskCompletion,
}

impl BridgeMethod {
    pub const ALL: [BridgeMethod; 7] = [
        BridgeMethod::ShowToast,
        BridgeMethod::ShowAlert,
        BridgeMethod::ShowPrompt,
        BridgeMethod::ShowSingleSelection,
        BridgeMethod::SaveImportedCourses,
        BridgeMethod::SavePresetTimeSlots,
        BridgeMethod::NotifyTaskCompletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeMethod::ShowToast => "showToast",
            BridgeMethod::ShowAlert => "showAlert",
            BridgeMethod::ShowPrompt => "showPrompt",
            BridgeMethod::ShowSingleSelection => "showSingleSelection",
            BridgeMethod::SaveImportedCourses => "saveImportedCourses",
            BridgeMethod::SavePresetTimeSlots => "savePresetTimeSlots",
            BridgeMethod::NotifyTaskCompletion => "notifyTaskCompletion",
        }
    }

    /// The dialog a method opens, if it needs user interaction.
    pub fn dialog_type(&self) -> Option<DialogType> {
        match self {
            BridgeMethod::ShowAlert => Some(DialogType::Alert),
            BridgeMethod::ShowPrompt => Some(DialogType::Prompt),
            BridgeMethod::ShowSingleSelection => Some(DialogType::SingleSelection),
            _ => None,
        }
    }
}

impl FromStr for BridgeMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BridgeMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("Unknown bridge method: {}", s))
    }
}

impl fmt::Display for BridgeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogType {
    Alert,
    Prompt,
    SingleSelection,
}

impl DialogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogType::Alert => "alert",
            DialogType::Prompt => "prompt",
            DialogType::SingleSelection => "singleSelection",
        }
    }
}

/// A bridge call issued by page code.
///
/// `method` stays a string: pages are untrusted and may name anything.
/// Fire-and-forget calls carry no correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogRequest {
    pub dialog_type: DialogType,
    #[serde(default)]
    pub arguments: Vec<Value>,
    pub correlation_id: CorrelationId,
}

/// Outcome of a rendered dialog, sent from the relay to the dispatcher.
///
/// `error` is set only when the dialog could not complete (e.g. the page
/// stopped answering validation requests).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogResult {
    pub correlation_id: CorrelationId,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result delivered to the page for one correlated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub correlation_id: CorrelationId,
    pub value: Value,
    #[serde(default)]
    pub is_error: bool,
}

impl CallResult {
    pub fn success(correlation_id: CorrelationId, value: Value) -> Self {
        Self {
            correlation_id,
            value,
            is_error: false,
        }
    }

    pub fn failure(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            value: Value::String(message.into()),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub success: bool,
    pub message: String,
}

/// Page → relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PageEnvelope {
    Call(CallRequest),
    #[serde(rename_all = "camelCase")]
    ValidationResult {
        correlation_id: CorrelationId,
        /// Validator error text; `None` means the input passed.
        error: Option<String>,
    },
    ExecutionStatus(ExecutionStatus),
}

/// Relay → page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WindowEnvelope {
    Resolve(CallResult),
    #[serde(rename_all = "camelCase")]
    ValidateInput {
        correlation_id: CorrelationId,
        validator: String,
        input: String,
    },
    RunScript { script: String },
}

/// Relay → dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RuntimeEnvelope {
    Call(CallRequest),
    DialogResult(DialogResult),
    ExecutionStatus(ExecutionStatus),
}

/// Dispatch → relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TabEnvelope {
    ShowDialog(DialogRequest),
    Resolve(CallResult),
    RunScript { script: String },
}

/// Transport-level acknowledgment of a runtime message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// A runtime message from a relay, tagged with its tab so replies can be
/// routed back to the same page instance.
#[derive(Debug)]
pub struct RuntimeMessage {
    pub tab: TabId,
    pub envelope: RuntimeEnvelope,
    pub ack: Option<oneshot::Sender<Ack>>,
}

/// A runtime message addressed to one tab's relay.
#[derive(Debug)]
pub struct TabMessage {
    pub envelope: TabEnvelope,
    pub ack: Option<oneshot::Sender<Ack>>,
}

impl TabMessage {
    pub fn new(envelope: TabEnvelope) -> Self {
        Self { envelope, ack: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_names_round_trip() {
        for method in BridgeMethod::ALL {
            assert_eq!(method.as_str().parse::<BridgeMethod>(), Ok(method));
        }
        assert!("showDialog".parse::<BridgeMethod>().is_err());
    }

    #[test]
    fn dialog_methods_map_to_dialog_types() {
        assert_eq!(BridgeMethod::ShowAlert.dialog_type(), Some(DialogType::Alert));
        assert_eq!(
            BridgeMethod::ShowSingleSelection.dialog_type(),
            Some(DialogType::SingleSelection)
        );
        assert_eq!(BridgeMethod::SaveImportedCourses.dialog_type(), None);
    }

    #[test]
    fn call_envelope_wire_shape() {
        let envelope = PageEnvelope::Call(CallRequest {
            method: "showAlert".to_string(),
            arguments: vec![json!("T"), json!("B"), json!("OK")],
            correlation_id: Some(CorrelationId::from("1-abc")),
        });

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "call",
                "method": "showAlert",
                "arguments": ["T", "B", "OK"],
                "correlationId": "1-abc"
            })
        );
    }

    #[test]
    fn toast_call_omits_correlation_id() {
        let envelope = PageEnvelope::Call(CallRequest {
            method: "showToast".to_string(),
            arguments: vec![json!("hi")],
            correlation_id: None,
        });

        let text = serde_json::to_string(&envelope).unwrap();
        assert!(!text.contains("correlationId"));
    }

    #[test]
    fn tab_envelopes_use_spec_kinds() {
        let show = TabEnvelope::ShowDialog(DialogRequest {
            dialog_type: DialogType::SingleSelection,
            arguments: vec![],
            correlation_id: CorrelationId::from("x"),
        });
        let value = serde_json::to_value(&show).unwrap();
        assert_eq!(value["kind"], "show-dialog");
        assert_eq!(value["dialogType"], "singleSelection");

        let resolve = TabEnvelope::Resolve(CallResult::failure(CorrelationId::from("y"), "bad"));
        let value = serde_json::to_value(&resolve).unwrap();
        assert_eq!(value["kind"], "resolve");
        assert_eq!(value["isError"], true);
        assert_eq!(value["value"], "bad");
    }

    #[test]
    fn window_envelope_parses_from_json() {
        let text = r#"{"kind":"validate-input","correlationId":"v1","validator":"validateName","input":"a"}"#;
        let parsed: WindowEnvelope = serde_json::from_str(text).unwrap();
        assert_eq!(
            parsed,
            WindowEnvelope::ValidateInput {
                correlation_id: CorrelationId::from("v1"),
                validator: "validateName".to_string(),
                input: "a".to_string(),
            }
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let text = r#"{"kind":"teleport","correlationId":"1"}"#;
        assert!(serde_json::from_str::<PageEnvelope>(text).is_err());
    }

    #[test]
    fn generated_ids_have_time_prefix_and_suffix() {
        let id = CorrelationId::generate();
        let (prefix, suffix) = id.as_str().split_once('-').unwrap();
        assert!(prefix.parse::<u128>().is_ok());
        assert_eq!(suffix.len(), CORRELATION_SUFFIX_LEN);
    }
}

//! Structural checks the page runs on save payloads before sending them.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Courses,
    TimeSlots,
}

impl PayloadKind {
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            PayloadKind::Courses => &[
                "name",
                "teacher",
                "position",
                "day",
                "startSection",
                "endSection",
                "weeks",
            ],
            PayloadKind::TimeSlots => &["number", "startTime", "endTime"],
        }
    }

    /// Fields that must be non-blank strings whenever they are present.
    pub fn text_fields(&self) -> &'static [&'static str] {
        match self {
            PayloadKind::Courses => &["name"],
            PayloadKind::TimeSlots => &["startTime", "endTime"],
        }
    }

    fn item_label(&self) -> &'static str {
        match self {
            PayloadKind::Courses => "course",
            PayloadKind::TimeSlots => "time slot",
        }
    }
}

impl FromStr for PayloadKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "courses" => Ok(PayloadKind::Courses),
            "time-slots" | "timeSlots" => Ok(PayloadKind::TimeSlots),
            other => Err(format!("Unknown payload kind: {}", other)),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Courses => f.write_str("courses"),
            PayloadKind::TimeSlots => f.write_str("time-slots"),
        }
    }
}

/// Parse `json` as an array and check every element of it.
///
/// Returns the parsed items on success.
pub fn validate_payload(kind: PayloadKind, json: &str) -> Result<Vec<Value>> {
    let parsed: Value = serde_json::from_str(json)
        .map_err(|e| BridgeError::Validation(format!("{} payload is not valid JSON: {}", kind, e)))?;

    let Value::Array(items) = parsed else {
        return Err(BridgeError::Validation(format!(
            "{} payload must be a JSON array",
            kind
        )));
    };

    for (index, item) in items.iter().enumerate() {
        validate_item(kind, index, item)?;
    }

    Ok(items)
}

fn validate_item(kind: PayloadKind, index: usize, item: &Value) -> Result<()> {
    let label = kind.item_label();
    let Some(object) = item.as_object() else {
        return Err(BridgeError::Validation(format!(
            "{} at index {} must be an object",
            label, index
        )));
    };

    for field in kind.required_fields() {
        match object.get(*field) {
            None | Some(Value::Null) => {
                return Err(BridgeError::Validation(format!(
                    "{} at index {} is missing required field '{}'",
                    label, index, field
                )));
            }
            Some(_) => {}
        }
    }

    for field in kind.text_fields() {
        if let Some(value) = object.get(*field) {
            let blank = value.as_str().map(|s| s.trim().is_empty()).unwrap_or(true);
            if blank {
                return Err(BridgeError::Validation(format!(
                    "{} at index {}: '{}' must be a non-empty string",
                    label, index, field
                )));
            }
        }
    }

    Ok(())
}

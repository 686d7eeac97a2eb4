use std::sync::{Arc, Mutex};

use colored::Colorize;

/// Ambient user notification (the host's toast / system notification).
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Prints notifications to the terminal.
#[derive(Debug, Default)]
pub struct ConsoleNotifier {
    json: bool,
}

impl ConsoleNotifier {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str) {
        if self.json {
            println!(
                "{}",
                serde_json::json!({ "event": "notification", "title": title, "message": message })
            );
        } else {
            println!("  {} {} {}", "◆".cyan(), title.bold(), message);
        }
    }
}

/// Sends notifications to the log only.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!(title, "{}", message);
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far, as `(title, message)` pairs.
    pub fn notifications(&self) -> Vec<(String, String)> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications().into_iter().map(|(_, m)| m).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        let mut seen = match self.seen.lock() {
            Ok(seen) => seen,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.push((title.to_string(), message.to_string()));
    }
}

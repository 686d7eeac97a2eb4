use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// How the dispatcher services bridge calls
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Where exported artifacts go
    #[serde(default)]
    pub export: ExportConfig,

    /// Defaults for test sessions
    #[serde(default)]
    pub session: SessionConfig,

    /// Notification presentation
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// What a save call does with its payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SavePolicy {
    /// Parse and cache the payload until task completion exports it.
    #[default]
    Cache,
    /// Persist immediately, succeeding at random.
    Simulated,
}

impl std::fmt::Display for SavePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SavePolicy::Cache => write!(f, "cache"),
            SavePolicy::Simulated => write!(f, "simulated"),
        }
    }
}

impl std::str::FromStr for SavePolicy {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cache" => Ok(SavePolicy::Cache),
            "simulated" => Ok(SavePolicy::Simulated),
            other => Err(BridgeError::ConfigError(format!(
                "save_policy must be 'cache' or 'simulated', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub save_policy: SavePolicy,

    /// Success probability of a simulated save
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,

    /// Seed for the simulated save outcome (random when unset)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Coerce stringly dialog results back to typed values
    #[serde(default = "default_true")]
    pub coerce_dialog_values: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            save_policy: SavePolicy::default(),
            success_rate: default_success_rate(),
            seed: None,
            coerce_dialog_values: true,
        }
    }
}

fn default_success_rate() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Export directory (defaults to the local data dir)
    pub dir: Option<String>,

    /// File name of the task-completion export
    #[serde(default = "default_export_file_name")]
    pub file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: default_export_file_name(),
        }
    }
}

fn default_export_file_name() -> String {
    "course_import_export.json".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// URL reported for the simulated page
    #[serde(default = "default_page_url")]
    pub page_url: String,

    /// Page script started by `run`
    #[serde(default = "default_script")]
    pub script: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            script: default_script(),
        }
    }
}

fn default_page_url() -> String {
    "https://jwxt.example.edu/".to_string()
}

fn default_script() -> String {
    "demo".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_toast_title")]
    pub toast_title: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            toast_title: default_toast_title(),
        }
    }
}

fn default_toast_title() -> String {
    "Simulated Toast".to_string()
}

impl Config {
    /// Load configuration from all sources (file, env, defaults)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Merge config file if exists
            .merge(Toml::file(config_path))
            // Merge environment variables (DROIDBRIDGE_DISPATCH__SAVE_POLICY, ...)
            .merge(Env::prefixed("DROIDBRIDGE_").split("__"))
            .extract()
            .map_err(|e| BridgeError::ConfigError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let rate = self.dispatch.success_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(BridgeError::ConfigError(format!(
                "dispatch.success_rate must be between 0 and 1, got {}",
                rate
            )));
        }
        if self.export.file_name.trim().is_empty() {
            return Err(BridgeError::ConfigError(
                "export.file_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("droidbridge")
            .join("config.toml")
    }

    /// Directory exports are written to
    pub fn export_dir(&self) -> PathBuf {
        match &self.export.dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("droidbridge")
                .join("exports"),
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::ConfigError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }
}

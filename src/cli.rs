use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::bridge::PayloadKind;
use crate::commands;
use crate::config::Config;
use crate::error::Result;

/// droidbridge - Run pages written for an Android WebView bridge on the desktop
#[derive(Parser)]
#[command(name = "droidbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, env = "DROIDBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a simulated page and run its bridge script
    Run {
        /// URL reported for the simulated page
        #[arg(long)]
        url: Option<String>,

        /// Page script to start
        #[arg(short, long)]
        script: Option<String>,

        /// Answer dialogs automatically instead of prompting
        #[arg(long)]
        headless: bool,

        /// Directory exports are written to
        #[arg(long)]
        export_dir: Option<String>,
    },

    /// Check a save payload the way the page does before sending it
    Validate {
        /// Payload kind: courses or time-slots
        kind: PayloadKind,

        /// JSON file holding the payload
        file: PathBuf,
    },

    /// Show how dialog result strings are coerced to typed values
    Coerce {
        /// Raw dialog values
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Remove the configuration file
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show configuration file path
    Path,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Run {
                url,
                script,
                headless,
                export_dir,
            } => {
                commands::run::run(
                    self,
                    url.as_deref(),
                    script.as_deref(),
                    *headless,
                    export_dir.as_deref(),
                )
                .await
            }
            Commands::Validate { kind, file } => commands::validate::run(self, *kind, file).await,
            Commands::Coerce { values } => commands::coerce::run(self, values).await,
            Commands::Config { command } => commands::config::run(self, command).await,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::config_path)
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load_from(&self.config_path())
    }
}

//! Simulated Android WebView bridge for exercising pages written against
//! `AndroidBridge` / `AndroidBridgePromise` outside an Android host.

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dialog;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod page;
pub mod relay;
pub mod session;

pub use config::Config;
pub use error::{BridgeError, Result};
pub use page::{PageBridge, PageScript};
pub use session::{Session, SessionBuilder, Tab};

use colored::Colorize;
use tokio::sync::broadcast;

use crate::bridge::ExecutionStatus;
use crate::cli::Cli;
use crate::dialog::{AutoRenderer, TerminalRenderer};
use crate::error::{BridgeError, Result};
use crate::host::ConsoleNotifier;
use crate::session::Session;

pub async fn run(
    cli: &Cli,
    url: Option<&str>,
    script: Option<&str>,
    headless: bool,
    export_dir: Option<&str>,
) -> Result<()> {
    let mut config = cli.load_config()?;
    if let Some(dir) = export_dir {
        config.export.dir = Some(dir.to_string());
    }
    let url = url.map(str::to_string).unwrap_or_else(|| config.session.page_url.clone());
    let script = script
        .map(str::to_string)
        .unwrap_or_else(|| config.session.script.clone());

    let builder = Session::builder(config).notifier(ConsoleNotifier::new(cli.json));
    let builder = if headless {
        builder.renderer(AutoRenderer)
    } else {
        builder.renderer(TerminalRenderer::new())
    };
    let session = builder.build()?;
    let mut status_rx = session.subscribe_status();

    let tab = session.open_tab(&url).await?;
    let ack = session.start_test(&script).await?;
    if !ack.success {
        session.shutdown().await;
        return Err(BridgeError::Other(
            ack.message
                .unwrap_or_else(|| format!("Could not start script '{}'", script)),
        ));
    }

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "event": "started",
                "tab": tab.id().0,
                "url": tab.url(),
                "script": script,
            })
        );
    } else {
        println!(
            "{} Running '{}' in {} ({})",
            "▶".cyan(),
            script,
            tab.id(),
            tab.url().dimmed()
        );
    }

    let status = tokio::select! {
        status = next_status(&mut status_rx) => status,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            None
        }
    };
    session.shutdown().await;

    let Some(status) = status else {
        return Err(BridgeError::Other(
            "Session ended before the script reported a status".to_string(),
        ));
    };

    if cli.json {
        println!("{}", serde_json::to_string(&status)?);
    } else if status.success {
        println!("{} {}", "✓".green(), status.message);
    } else {
        println!("{} {}", "✗".red(), status.message);
    }

    if status.success {
        Ok(())
    } else {
        Err(BridgeError::Other(status.message))
    }
}

async fn next_status(status_rx: &mut broadcast::Receiver<ExecutionStatus>) -> Option<ExecutionStatus> {
    loop {
        match status_rx.recv().await {
            Ok(status) => return Some(status),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} status events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

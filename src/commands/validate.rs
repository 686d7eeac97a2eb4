use std::path::Path;

use colored::Colorize;

use crate::bridge::{validate_payload, PayloadKind};
use crate::cli::Cli;
use crate::error::Result;

pub async fn run(cli: &Cli, kind: PayloadKind, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file).await?;
    let items = validate_payload(kind, &text)?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "valid": true,
                "kind": kind.to_string(),
                "count": items.len(),
            })
        );
    } else {
        println!(
            "{} {} {} entries are valid",
            "✓".green(),
            items.len(),
            kind.to_string().bold()
        );
    }

    Ok(())
}

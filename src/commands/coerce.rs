use colored::Colorize;
use serde_json::Value;

use crate::bridge::coerce_dialog_value;
use crate::cli::Cli;
use crate::error::Result;

pub async fn run(cli: &Cli, values: &[String]) -> Result<()> {
    for raw in values {
        let coerced = coerce_dialog_value(Value::String(raw.clone()));

        if cli.json {
            println!("{}", serde_json::json!({ "input": raw, "value": coerced }));
        } else {
            println!("{} {} {}", raw, "→".dimmed(), coerced);
        }
    }

    Ok(())
}

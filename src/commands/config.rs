use colored::Colorize;
use dialoguer::Confirm;

use crate::cli::{Cli, ConfigCommands};
use crate::error::{BridgeError, Result};

pub async fn run(cli: &Cli, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(cli).await,
        ConfigCommands::Set { key, value } => set(cli, key, value).await,
        ConfigCommands::Get { key } => get(cli, key).await,
        ConfigCommands::Reset { yes } => reset(cli, *yes).await,
        ConfigCommands::Path => path(cli).await,
    }
}

async fn show(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| BridgeError::ConfigError(e.to_string()))?;
        println!("{}", toml_str);
    }

    Ok(())
}

fn unknown_key(key: &str) -> BridgeError {
    BridgeError::ConfigError(format!("Unknown config key: {}", key))
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| BridgeError::ConfigError(format!("Invalid value for {}: {}", key, value)))
}

async fn set(cli: &Cli, key: &str, value: &str) -> Result<()> {
    let mut config = cli.load_config()?;

    match key {
        "dispatch.save_policy" => config.dispatch.save_policy = value.parse()?,
        "dispatch.success_rate" => config.dispatch.success_rate = parse(key, value)?,
        "dispatch.seed" => config.dispatch.seed = Some(parse(key, value)?),
        "dispatch.coerce_dialog_values" => {
            config.dispatch.coerce_dialog_values = parse(key, value)?
        }
        "export.dir" => config.export.dir = Some(value.to_string()),
        "export.file_name" => config.export.file_name = value.to_string(),
        "session.page_url" => config.session.page_url = value.to_string(),
        "session.script" => config.session.script = value.to_string(),
        "notify.toast_title" => config.notify.toast_title = value.to_string(),
        _ => return Err(unknown_key(key)),
    }

    config.validate()?;
    config.save_to(&cli.config_path())?;

    if cli.json {
        println!("{}", serde_json::json!({ "key": key, "value": value }));
    } else {
        println!("{} Set {} = {}", "✓".green(), key, value);
    }

    Ok(())
}

async fn get(cli: &Cli, key: &str) -> Result<()> {
    let config = cli.load_config()?;

    let value = match key {
        "dispatch.save_policy" => Some(config.dispatch.save_policy.to_string()),
        "dispatch.success_rate" => Some(config.dispatch.success_rate.to_string()),
        "dispatch.seed" => config.dispatch.seed.map(|seed| seed.to_string()),
        "dispatch.coerce_dialog_values" => Some(config.dispatch.coerce_dialog_values.to_string()),
        "export.dir" => Some(config.export_dir().display().to_string()),
        "export.file_name" => Some(config.export.file_name.clone()),
        "session.page_url" => Some(config.session.page_url.clone()),
        "session.script" => Some(config.session.script.clone()),
        "notify.toast_title" => Some(config.notify.toast_title.clone()),
        _ => return Err(unknown_key(key)),
    };

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "key": key,
                "value": value
            })
        );
    } else {
        match value {
            Some(v) => println!("{}", v),
            None => println!("{}", "(not set)".dimmed()),
        }
    }

    Ok(())
}

async fn reset(cli: &Cli, yes: bool) -> Result<()> {
    let path = cli.config_path();

    if !path.exists() {
        if cli.json {
            println!(
                "{}",
                serde_json::json!({ "status": "no_config", "path": path.display().to_string() })
            );
        } else {
            println!("{} No config file to remove.", "✓".green());
        }
        return Ok(());
    }

    if !yes && !cli.json {
        let confirm = Confirm::new()
            .with_prompt(format!("Delete {}?", path.display()))
            .default(false)
            .interact()
            .map_err(|e| BridgeError::Other(format!("Prompt failed: {}", e)))?;

        if !confirm {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    std::fs::remove_file(&path)?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "status": "removed", "path": path.display().to_string() })
        );
    } else {
        println!(
            "{} Config removed: {}",
            "✓".green(),
            path.display().to_string().dimmed()
        );
    }

    Ok(())
}

async fn path(cli: &Cli) -> Result<()> {
    let path = cli.config_path();

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "path": path.display().to_string()
            })
        );
    } else {
        println!("{}", path.display());
    }

    Ok(())
}

//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};

use alpine_config::Service;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration with secrets masked
    Show,

    /// Show which config files are searched and which were loaded
    Which,

    /// Show the user config and data directory paths
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = loaded.config.redacted();

    if ctx.json_output {
        let value = serde_json::json!({
            "sources": loaded.loaded_from(),
            "warnings": loaded.warnings,
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("# Alpine Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let llm = config.llm();
    println!("LLM:");
    println!("  {} / {}", llm.backend(), llm.model());
    println!("  key: {}", key_status(llm.backend().env_var(), llm.api_key.is_some()));
    println!();

    println!("Services:");
    for service in Service::ALL {
        let section = config.services.get(service);
        let status = match service.env_var() {
            Some(var) => key_status(var, section.api_key.is_some()),
            None => "(no key needed)".to_string(),
        };
        println!(
            "  {:<10} timeout {}s  {}",
            service.key(),
            section.timeout_secs(),
            status
        );
    }
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    println!("---\nMerged config:\n");
    println!("{}", config.to_toml()?);

    Ok(())
}

fn key_status(env_var: &str, in_config: bool) -> String {
    let from_env = std::env::var(env_var).is_ok_and(|v| !v.is_empty());
    match (from_env, in_config) {
        (true, _) => format!("(env {} ✓)", env_var),
        (false, true) => "(config file, plaintext)".to_string(),
        (false, false) => format!("(missing: set {})", env_var),
    }
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;

    println!("Config file search order (later overrides earlier):\n");
    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let config_path = alpine_config::xdg_config_path();
    let data_dir = alpine_config::data_dir();

    if ctx.json_output {
        let value = serde_json::json!({
            "config": config_path,
            "data": data_dir,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match config_path {
        Some(path) => println!("config: {}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    if let Some(dir) = data_dir {
        println!("data:   {}", dir.display());
    }
    Ok(())
}

//! Alpine - ski touring itinerary advisor
//!
//! Main entry point for the Alpine CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use alpine_config::{ConfigError, Language, LoadedConfig};

mod commands;
mod render;
mod stack;

use commands::{ask, chat, config, ranges};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Alpine - ski touring itinerary advisor
#[derive(Parser)]
#[command(name = "alpine")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase console log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output as JSON lines (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file layered over the user and project configs
    #[arg(long, global = true, env = "ALPINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Answer language: french or english
    #[arg(long, global = true, value_parser = parse_language)]
    pub language: Option<Language>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a one-shot question
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// Mountain range reference data
    Ranges(ranges::RangesArgs),

    /// Configuration inspection
    Config(config::ConfigArgs),
}

fn parse_language(s: &str) -> std::result::Result<Language, String> {
    s.parse().map_err(|e: ConfigError| e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

const CRATES: [&str; 5] = [
    "alpine",
    "alpine_agent",
    "alpine_advisor",
    "alpine_llm",
    "alpine_config",
];

fn crate_filter(level: &str, rest: &str) -> String {
    let mut directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    directives.push(rest.to_string());
    directives.join(",")
}

/// Console layer on stderr plus a rolling JSON file. The returned guard
/// flushes the file writer on drop.
fn init_tracing(
    verbose: u8,
    loaded: &LoadedConfig,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let console_filter = match verbose {
        0 => "warn".to_string(),
        1 => crate_filter("info", "warn"),
        2 => crate_filter("debug", "info"),
        _ => crate_filter("trace", "info"),
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_filter));
    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let logging = loaded.config.logging.clone().unwrap_or_default();
    let log_dir = logging
        .dir
        .or_else(|| alpine_config::data_dir().map(|d| d.join("logs")));

    match log_dir.filter(|_| logging.file) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "alpine.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_filter(EnvFilter::new(crate_filter("debug", "info"))),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(console).init();
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_dir = std::env::current_dir().ok();
    let loaded = alpine_config::load_config_with_options(
        project_dir.as_deref(),
        None,
        cli.config.as_deref(),
    )?;
    loaded.config.validate()?;

    let _guard = init_tracing(cli.verbose, &loaded);
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let language = cli
        .language
        .unwrap_or_else(|| loaded.config.agent().language);

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        language,
        loaded,
    };

    match cli.command {
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Ranges(args) => ranges::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

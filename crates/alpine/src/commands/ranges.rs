//! Ranges command - inspect and rebuild the mountain range reference data.

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use console::{Style, style};
use std::path::PathBuf;

use alpine_advisor::{
    AvalancheSource, GeoResolver, NEAR_RANGE_THRESHOLD_KM, RangeIndex, RouteCatalog,
};
use alpine_config::Service;

use super::Context;
use crate::stack;

/// Arguments for the ranges command.
#[derive(Args, Debug)]
pub struct RangesArgs {
    #[command(subcommand)]
    pub command: RangesCommand,
}

#[derive(Subcommand, Debug)]
pub enum RangesCommand {
    /// Show the ranges nearest to a place
    Near {
        /// Free-text place, e.g. "Chamonix"
        #[arg(required = true, num_args = 1..)]
        location: Vec<String>,

        /// How many ranges to list
        #[arg(short, default_value_t = 3)]
        k: usize,
    },

    /// Rebuild the ranges table from catalog summits
    Build {
        /// Catalog massif ids to include, comma-separated
        #[arg(long, value_delimiter = ',', required = true)]
        massifs: Vec<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List massifs missing from the cross-reference table, on either side
    Check,
}

/// Run the ranges command.
pub async fn run(args: RangesArgs, ctx: &Context) -> Result<()> {
    match args.command {
        RangesCommand::Near { location, k } => cmd_near(&location.join(" "), k, ctx).await,
        RangesCommand::Build { massifs, output } => cmd_build(&massifs, output, ctx).await,
        RangesCommand::Check => cmd_check(ctx).await,
    }
}

async fn cmd_near(location: &str, k: usize, ctx: &Context) -> Result<()> {
    if k == 0 {
        bail!("-k must be at least 1");
    }
    let config = &ctx.loaded.config;
    let index = stack::load_ranges(config)?;
    let key = stack::service_secret(config, Service::Geocoder)?;
    let geocoder = stack::geocoder(config, &key)?;

    let Some(coord) = geocoder.resolve(location).await else {
        bail!("could not locate '{}'", location);
    };
    let matches = index.nearest(&coord, k);

    if ctx.json_output {
        let value = serde_json::json!({
            "location": location,
            "coordinate": coord,
            "ranges": matches,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{} {}", style(location).bold(), dim.apply_to(format!("({})", coord)));
    for m in &matches {
        let note = if m.is_near() {
            String::new()
        } else {
            format!(" (beyond {} km)", NEAR_RANGE_THRESHOLD_KM)
        };
        println!(
            "  {:<20} {}{}",
            m.name,
            dim.apply_to(format!("{:.1} km", m.distance_km)),
            dim.apply_to(note)
        );
    }
    Ok(())
}

async fn cmd_build(massifs: &[String], output: Option<PathBuf>, ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;
    let key = stack::service_secret(config, Service::Catalog)?;
    let catalog = stack::catalog_client(config, &key)?;

    let ids: Vec<&str> = massifs.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    let summits = catalog.summits(&ids.join(",")).await?;
    tracing::info!(summits = summits.len(), "Fetched catalog summits");

    let index = RangeIndex::from_summits(summits);
    let json = index.to_json_pretty()?;

    match output {
        Some(path) => {
            std::fs::write(&path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            if !ctx.json_output {
                println!("Wrote {} ranges to {}", index.len(), path.display());
            }
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn cmd_check(ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;
    let crossref = stack::load_crossref(config)?;
    let catalog_key = stack::service_secret(config, Service::Catalog)?;
    let avalanche_key = stack::service_secret(config, Service::Avalanche)?;
    let catalog = stack::catalog_client(config, &catalog_key)?;
    let avalanche = stack::avalanche_client(config, &avalanche_key)?;

    let (massifs, weather_massifs) = tokio::try_join!(catalog.massifs(), avalanche.massifs())?;

    let missing = crossref.unmapped(massifs.iter().map(|m| m.id.as_str()));
    let unmapped: Vec<_> = massifs
        .iter()
        .filter(|m| missing.contains(&m.id.as_str()))
        .collect();
    let orphans: Vec<_> = weather_massifs
        .iter()
        .filter(|w| crossref.to_catalog_space(&w.code).is_err())
        .collect();

    if ctx.json_output {
        let value = serde_json::json!({
            "unmapped_catalog_massifs": unmapped,
            "unmapped_weather_massifs": orphans,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let green = Style::new().green();
    let yellow = Style::new().yellow();
    if unmapped.is_empty() {
        println!(
            "{} All {} catalog massifs are mapped",
            green.apply_to("✓"),
            massifs.len()
        );
    } else {
        println!(
            "{} {} of {} catalog massifs have no avalanche-service id:",
            yellow.apply_to("!"),
            unmapped.len(),
            massifs.len()
        );
        for massif in &unmapped {
            println!("  {:>4}  {}", massif.id, massif.name);
        }
    }

    if !orphans.is_empty() {
        let dim = Style::new().dim();
        println!(
            "{} {} avalanche-service massifs have no catalog id:",
            yellow.apply_to("!"),
            orphans.len()
        );
        for massif in &orphans {
            let group = massif.group.as_deref().unwrap_or_default();
            println!("  {:>4}  {} {}", massif.code, massif.title, dim.apply_to(group));
        }
    }
    Ok(())
}

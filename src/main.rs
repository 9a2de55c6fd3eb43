mod aggregator;
mod cache;
mod config;
mod error;
mod extractor;
mod geocode;
mod record;
mod runner;
mod walker;

use crate::cache::PlaceCache;
use crate::config::AppConfig;
use crate::geocode::{NominatimGeocoder, Resolver};
use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::Path;

/// Scan a photo library, resolve where each photo was taken and aggregate
/// per-trip country/city statistics into two JSON documents.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Override the configured scan root directory.
    #[arg(long)]
    root: Option<String>,

    /// Serve the previous run's documents without re-scanning.
    #[arg(long)]
    reuse: bool,

    /// Override the configured log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::new()?;
    if let Some(root) = args.root {
        config.scan_directory = root;
    }

    let level = args.log_level.as_deref().unwrap_or(config.log_level.as_str());
    env_logger::Builder::new()
        .filter_level(level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting trip-mapper");

    let provider = NominatimGeocoder::new(&config.geocoder)?;
    let cache = PlaceCache::load(Path::new(&config.cache_file));
    let mut resolver = Resolver::new(Box::new(provider), cache, &config.geocoder);

    runner::execute(&config, &mut resolver, args.reuse).await?;

    info!("trip-mapper finished");
    Ok(())
}

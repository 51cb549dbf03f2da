use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use groundwire_common::Config;
use groundwire_pipeline::{BackfillSettings, CoordinateBackfill, HttpGeocoder};
use groundwire_store::Db;

/// Assign coordinates to events via the location cache and the geocoding
/// provider.
#[derive(Parser, Debug)]
struct Args {
    /// Bypass the coordinate cache and re-query the provider.
    #[arg(long)]
    no_cache: bool,

    /// Clear all stored coordinates before backfilling.
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("groundwire=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let db = Db::connect(&config.database_url, config.db_rps).await?;
    let geocoder = HttpGeocoder::new(&config.geocoding_api_key);

    let settings = BackfillSettings {
        use_cache: !args.no_cache,
        reset: args.reset,
    };

    let stats = CoordinateBackfill::new(db, geocoder, settings).run().await?;
    info!(summary = %stats, "coordinate backfill finished");
    Ok(())
}

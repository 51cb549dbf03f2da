use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Gemini;
use groundwire_common::Config;
use groundwire_dedup::{DedupSettings, GroupDeduplicator};
use groundwire_store::Db;

/// Adjudicate precomputed duplicate groups with the model and merge
/// confirmed duplicates.
#[derive(Parser, Debug)]
struct Args {
    /// Actually write merges. Without this flag the run is a dry run that
    /// only prints the planned operations.
    #[arg(long)]
    live: bool,

    /// Minimum group similarity score to consider.
    #[arg(long, default_value_t = 0.5)]
    min_score: f64,

    /// Restrict to one precomputed confidence level (high/medium/low).
    #[arg(long)]
    confidence: Option<String>,

    /// Maximum number of groups to analyze.
    #[arg(long)]
    limit: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("groundwire=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let api_key = config
        .gemini_api_keys
        .first()
        .ok_or_else(|| anyhow::anyhow!("no Gemini API key configured"))?;
    let gemini =
        Gemini::new(api_key.clone(), config.gemini_model.clone()).with_timeout(config.gemini_timeout);

    let db = Db::connect(&config.database_url, config.db_rps).await?;

    let settings = DedupSettings {
        dry_run: !args.live,
        min_score: args.min_score,
        confidence_filter: args.confidence,
        limit: args.limit,
    };
    if settings.dry_run {
        info!("dry run: no writes will be made");
    }

    let stats = GroupDeduplicator::new(db, gemini, settings).run().await?;
    info!(summary = %stats, "dedup finished");
    Ok(())
}

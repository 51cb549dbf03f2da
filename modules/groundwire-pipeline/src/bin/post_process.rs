use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use groundwire_common::{Config, Platform};
use groundwire_ingest::Ingestor;
use groundwire_store::{Db, ObjectStore};

/// Normalize raw scrape files into canonical posts and actor edges.
#[derive(Parser, Debug)]
struct Args {
    /// Re-read already-archived files without moving them again.
    #[arg(long)]
    migration: bool,

    /// Skip the Instagram bucket.
    #[arg(long)]
    twitter_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("groundwire=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    config.log_redacted();

    let db = Db::connect(&config.database_url, config.db_rps).await?;

    let mut ingestor = Ingestor::new(db, args.migration).await?;

    let twitter = ObjectStore::open(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_access_key,
        &config.s3_secret_key,
        &config.twitter_bucket,
        &config.media_public_base_url,
    )?;
    ingestor.process_bucket(&twitter, Platform::Twitter).await?;

    if !args.twitter_only {
        let instagram = ObjectStore::open(
            &config.s3_endpoint,
            &config.s3_region,
            &config.s3_access_key,
            &config.s3_secret_key,
            &config.instagram_bucket,
            &config.media_public_base_url,
        )?;
        ingestor
            .process_bucket(&instagram, Platform::Instagram)
            .await?;
    }

    info!(summary = %ingestor.stats, "post processing complete");

    if ingestor.stats.files_failed > 0 && ingestor.stats.files_processed == 0 {
        anyhow::bail!("every file failed to ingest");
    }
    Ok(())
}

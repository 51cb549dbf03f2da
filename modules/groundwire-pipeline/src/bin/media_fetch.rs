use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use groundwire_common::Config;
use groundwire_ingest::MediaFetcher;
use groundwire_store::{Db, ObjectStore};

/// Download post media into the archive bucket and write back public URLs.
#[derive(Parser, Debug)]
struct Args {
    /// Posts to attempt in this run.
    #[arg(long, default_value_t = 250)]
    batch_size: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("groundwire=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let db = Db::connect(&config.database_url, config.db_rps).await?;
    let store = ObjectStore::open(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_access_key,
        &config.s3_secret_key,
        &config.media_bucket,
        &config.media_public_base_url,
    )?;

    let fetcher = MediaFetcher::new(db, store)?;
    let stats = fetcher.run(args.batch_size).await?;

    info!(summary = %stats, "media fetch finished");
    Ok(())
}

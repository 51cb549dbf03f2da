use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use groundwire_common::{CancelFlag, Config, Post, RunStatus};
use groundwire_extract::{
    build_batches, BatchLimits, BatchStrategy, Extractor, ExtractorSettings, WorkerPool,
};
use groundwire_store::Db;

/// Run the LLM extraction engine over unprocessed posts.
#[derive(Parser, Debug)]
struct Args {
    /// Cap on concurrent workers (further bounded by configured API keys).
    #[arg(long)]
    max_workers: Option<usize>,

    /// Per-worker cooldown between model calls, in seconds.
    #[arg(long)]
    cooldown_seconds: Option<f64>,

    /// Maximum number of posts to pull into batches this run.
    #[arg(long)]
    job_limit: Option<usize>,

    /// Selection page size.
    #[arg(long, default_value_t = 500)]
    batch_size: i64,

    /// Pipeline run to poll for cancellation.
    #[arg(long)]
    job_id: Option<Uuid>,

    /// Pack whole calendar days instead of the configured strategy.
    #[arg(long)]
    chronological: bool,
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

    let posts = select_posts(&db, args.batch_size, args.job_limit).await?;
    if posts.is_empty() {
        info!("no unprocessed posts; nothing to do");
        return Ok(());
    }

    let limits = BatchLimits::from_config(&config);
    let strategy = if args.chronological {
        BatchStrategy::ChronologicalDays
    } else if config.date_clustering_enabled {
        BatchStrategy::DateClustered
    } else {
        BatchStrategy::TokenBounded
    };
    let batches = build_batches(posts, &limits, strategy);
    info!(batches = batches.len(), ?strategy, "batches formed");

    let cancel = CancelFlag::new();
    if let Some(job_id) = args.job_id {
        spawn_cancellation_poller(db.clone(), job_id, cancel.clone());
    }

    let extractor = Arc::new(Extractor::new(
        db.clone().with_cancel(cancel.clone()),
        ExtractorSettings::from_config(&config),
        cancel.clone(),
    ));

    let pool = WorkerPool::new(
        &config,
        args.max_workers,
        args.cooldown_seconds.map(Duration::from_secs_f64),
        cancel,
    )?;

    let outcome = pool.run(extractor.clone(), batches).await;
    info!(
        summary = %extractor.stats(),
        batches_completed = outcome.batches_completed,
        batches_failed = outcome.batches_failed,
        cancelled = outcome.cancelled,
        timed_out = outcome.timed_out,
        "event processing finished"
    );

    if outcome.timed_out {
        anyhow::bail!("worker pool hit its outer timeout");
    }
    if outcome.batches_completed == 0 && outcome.batches_failed > 0 {
        anyhow::bail!("every batch failed");
    }
    Ok(())
}

/// Reverse-chronological pages of unprocessed posts, up to the job limit.
async fn select_posts(db: &Db, page_size: i64, job_limit: Option<usize>) -> Result<Vec<Post>> {
    let mut posts = Vec::new();
    let mut offset = 0i64;
    loop {
        let page = db.unprocessed_posts_page(offset, page_size).await?;
        let fetched = page.len() as i64;
        posts.extend(page);

        if let Some(limit) = job_limit {
            if posts.len() >= limit {
                posts.truncate(limit);
                break;
            }
        }
        if fetched < page_size {
            break;
        }
        offset += page_size;
    }
    info!(posts = posts.len(), "unprocessed posts selected");
    Ok(posts)
}

/// The extractor checks this flag before each retry and each new batch;
/// cancelling the pipeline run stops new work while in-flight batches
/// finish.
fn spawn_cancellation_poller(db: Db, job_id: Uuid, cancel: CancelFlag) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            match db.run_status(job_id).await {
                Ok(Some(RunStatus::Cancelled)) => {
                    warn!(%job_id, "pipeline run cancelled; draining in-flight batches");
                    cancel.cancel();
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(%job_id, error = %e, "cancellation poll failed"),
            }
        }
    });
}

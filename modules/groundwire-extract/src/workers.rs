//! Worker pool and key manager: one worker per API key, each with its own
//! cooldown clock, pulling batches from a shared queue with staggered
//! startup.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use ai_client::Gemini;
use groundwire_common::{CancelFlag, Config, Post};

use crate::engine::Extractor;

/// Staggered startup window for workers after the first.
const STAGGER_MIN_SECS: u64 = 30;
const STAGGER_MAX_SECS: u64 = 90;

/// Grace added to the per-call timeout to bound one batch end-to-end.
const BATCH_GRACE: Duration = Duration::from_secs(300);

pub struct Worker {
    pub id: usize,
    api_key: String,
    model: String,
    timeout: Duration,
    cooldown: Duration,
    /// Lazily built on first use.
    agent: Option<Gemini>,
    last_request: Option<Instant>,
    pub requests_made: u64,
}

impl Worker {
    fn new(id: usize, api_key: String, model: String, timeout: Duration, cooldown: Duration) -> Self {
        Self {
            id,
            api_key,
            model,
            timeout,
            cooldown,
            agent: None,
            last_request: None,
            requests_made: 0,
        }
    }

    /// The worker's model handle, created on first use.
    pub fn agent(&mut self) -> &Gemini {
        if self.agent.is_none() {
            self.agent = Some(
                Gemini::new(self.api_key.clone(), self.model.clone())
                    .with_timeout(self.timeout),
            );
        }
        self.agent.as_ref().expect("agent just initialized")
    }

    /// Sleep out the remainder of this worker's cooldown window.
    pub async fn await_cooldown(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                tokio::time::sleep(self.cooldown - elapsed).await;
            }
        }
    }

    pub fn note_request(&mut self) {
        self.last_request = Some(Instant::now());
        self.requests_made += 1;
    }
}

#[derive(Debug, Default, Clone)]
pub struct PoolOutcome {
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub events_persisted: u64,
    pub cancelled: bool,
    pub timed_out: bool,
}

pub struct WorkerPool {
    workers: Vec<Worker>,
    cancel: CancelFlag,
    outer_timeout: Duration,
    batch_timeout: Duration,
}

impl WorkerPool {
    /// Worker count is the minimum of the explicit parameter, the
    /// environment override, and the number of configured keys — at least 1.
    pub fn new(
        config: &Config,
        max_workers: Option<usize>,
        cooldown: Option<Duration>,
        cancel: CancelFlag,
    ) -> Result<Self> {
        if config.gemini_api_keys.is_empty() {
            bail!("no Gemini API keys configured");
        }

        let mut count = config.gemini_api_keys.len();
        if let Some(env_max) = config.max_workers {
            count = count.min(env_max);
        }
        if let Some(param_max) = max_workers {
            count = count.min(param_max);
        }
        let count = count.max(1);

        let cooldown = cooldown.unwrap_or(config.worker_cooldown);
        let workers = config
            .gemini_api_keys
            .iter()
            .take(count)
            .enumerate()
            .map(|(id, key)| {
                Worker::new(
                    id,
                    key.clone(),
                    config.gemini_model.clone(),
                    config.gemini_timeout,
                    cooldown,
                )
            })
            .collect();

        info!(
            workers = count,
            cooldown_secs = cooldown.as_secs(),
            "worker pool configured"
        );

        Ok(Self {
            workers,
            cancel,
            outer_timeout: config.event_processor_timeout,
            batch_timeout: config.gemini_timeout + BATCH_GRACE,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Process every batch. One failed worker or batch never halts the
    /// others; on cancellation, in-flight batches finish and queued ones
    /// are abandoned.
    pub async fn run(self, extractor: Arc<Extractor>, batches: Vec<Vec<Post>>) -> PoolOutcome {
        let total = batches.len();
        let queue: Arc<Mutex<VecDeque<(usize, Vec<Post>)>>> =
            Arc::new(Mutex::new(batches.into_iter().enumerate().collect()));

        let outcome = Arc::new(Mutex::new(PoolOutcome::default()));
        let mut tasks = JoinSet::new();

        for mut worker in self.workers {
            let queue = queue.clone();
            let extractor = extractor.clone();
            let cancel = self.cancel.clone();
            let outcome = outcome.clone();
            let batch_timeout = self.batch_timeout;

            tasks.spawn(async move {
                if worker.id > 0 {
                    // Avoid every key hitting identical batches at once.
                    let delay = {
                        let mut rng = rand::rng();
                        rng.random_range(STAGGER_MIN_SECS..=STAGGER_MAX_SECS)
                    };
                    info!(worker = worker.id, delay_secs = delay, "staggered start");
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }

                loop {
                    if cancel.is_cancelled() {
                        outcome.lock().await.cancelled = true;
                        break;
                    }

                    let next = queue.lock().await.pop_front();
                    let Some((index, batch)) = next else { break };

                    let batch_posts = batch.len();
                    let result = tokio::time::timeout(
                        batch_timeout,
                        extractor.process_batch(&mut worker, index, total, batch),
                    )
                    .await;

                    let mut o = outcome.lock().await;
                    match result {
                        Ok(Ok(persisted)) => {
                            o.batches_completed += 1;
                            o.events_persisted += persisted as u64;
                        }
                        Ok(Err(e)) => {
                            o.batches_failed += 1;
                            warn!(
                                worker = worker.id,
                                batch = index + 1,
                                total,
                                posts = batch_posts,
                                error = %e,
                                "batch failed; its posts stay unprocessed"
                            );
                        }
                        Err(_) => {
                            o.batches_failed += 1;
                            warn!(
                                worker = worker.id,
                                batch = index + 1,
                                "batch timed out; its posts stay unprocessed"
                            );
                        }
                    }
                }
            });
        }

        let all_done = async {
            while tasks.join_next().await.is_some() {}
        };
        let timed_out = tokio::time::timeout(self.outer_timeout, all_done)
            .await
            .is_err();

        let mut final_outcome = outcome.lock().await.clone();
        final_outcome.timed_out = timed_out;
        final_outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_keys(n: usize) -> Config {
        let mut config = test_config();
        config.gemini_api_keys = (0..n).map(|i| format!("key-{i}")).collect();
        config
    }

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            db_rps: 5,
            s3_endpoint: String::new(),
            s3_region: String::new(),
            s3_access_key: String::new(),
            s3_secret_key: String::new(),
            twitter_bucket: String::new(),
            instagram_bucket: String::new(),
            media_bucket: String::new(),
            media_public_base_url: String::new(),
            gemini_api_keys: Vec::new(),
            gemini_model: "gemini-2.0-flash".to_string(),
            max_workers: None,
            worker_cooldown: Duration::from_secs(60),
            gemini_timeout: Duration::from_secs(600),
            max_tokens_per_batch: 200_000,
            average_tokens_per_post: 500,
            average_tokens_per_image: 300,
            system_prompt_tokens: 15_000,
            posts_per_batch: 1_000,
            max_posts_per_batch: 50,
            max_retries: 10,
            max_date_range_days: 30,
            date_clustering_enabled: true,
            prioritize_recent_posts: true,
            use_function_tools: true,
            event_processor_timeout: Duration::from_secs(43_200),
            geocoding_api_key: String::new(),
            poll_seconds: 30,
            default_project_id: None,
        }
    }

    #[test]
    fn worker_count_is_min_of_keys_env_and_param() {
        let mut config = config_with_keys(4);
        config.max_workers = Some(3);
        let pool = WorkerPool::new(&config, Some(2), None, CancelFlag::new()).unwrap();
        assert_eq!(pool.worker_count(), 2);

        let pool = WorkerPool::new(&config, None, None, CancelFlag::new()).unwrap();
        assert_eq!(pool.worker_count(), 3);

        let config = config_with_keys(1);
        let pool = WorkerPool::new(&config, Some(10), None, CancelFlag::new()).unwrap();
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn no_keys_is_an_error() {
        let config = config_with_keys(0);
        assert!(WorkerPool::new(&config, None, None, CancelFlag::new()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_spaces_requests() {
        let mut worker = Worker::new(
            0,
            "k".to_string(),
            "m".to_string(),
            Duration::from_secs(600),
            Duration::from_secs(60),
        );

        // First call needs no wait.
        let start = Instant::now();
        worker.await_cooldown().await;
        assert!(start.elapsed() < Duration::from_secs(1));
        worker.note_request();

        // Second call waits out the cooldown.
        let start = Instant::now();
        worker.await_cooldown().await;
        assert!(start.elapsed() >= Duration::from_secs(59));
        assert_eq!(worker.requests_made, 1);
    }
}

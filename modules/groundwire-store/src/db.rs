use std::future::Future;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use groundwire_common::CancelFlag;

use crate::error::Result;
use crate::rate_limit::RateLimiter;
use crate::retry::{self, DEFAULT_MAX_RETRIES};

/// Handle to Postgres. Cheap to clone; the pool, the rate limiter, and the
/// cancellation flag are shared.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
    limiter: Arc<RateLimiter>,
    cancel: CancelFlag,
    max_retries: u32,
}

impl Db {
    pub async fn connect(database_url: &str, rps: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!(rps, "connected to Postgres");

        Ok(Self {
            pool,
            limiter: Arc::new(RateLimiter::new(rps)),
            cancel: CancelFlag::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Attach a cancellation flag checked before every retry attempt.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Execute a database operation behind the rate limiter with the
    /// gateway retry policy. `Ok(None)` means a duplicate-key conflict was
    /// swallowed.
    pub(crate) async fn run<T, F, Fut>(&self, op_name: &str, mut f: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let limiter = self.limiter.clone();
        retry::with_retry(op_name, &self.cancel, self.max_retries, || {
            let fut = f();
            let limiter = limiter.clone();
            async move {
                limiter.acquire().await;
                fut.await
            }
        })
        .await
    }

    /// Page through a query until a short page returns.
    pub async fn fetch_paged<T, F, Fut>(&self, page_size: i64, mut fetch: F) -> Result<Vec<T>>
    where
        F: FnMut(i64, i64) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let mut out = Vec::new();
        let mut offset = 0i64;
        loop {
            let page = fetch(offset, page_size).await?;
            let fetched = page.len() as i64;
            out.extend(page);
            if fetched < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(out)
    }
}

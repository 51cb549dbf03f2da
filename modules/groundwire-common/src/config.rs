use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,
    /// Per-process requests-per-second ceiling for the storage gateway.
    pub db_rps: u32,

    // Object store (S3-compatible)
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub twitter_bucket: String,
    pub instagram_bucket: String,
    pub media_bucket: String,
    /// Base URL prepended to media keys to form stable public URLs.
    pub media_public_base_url: String,

    // LLM workers
    pub gemini_api_keys: Vec<String>,
    pub gemini_model: String,
    pub max_workers: Option<usize>,
    pub worker_cooldown: Duration,
    pub gemini_timeout: Duration,

    // Batching
    pub max_tokens_per_batch: u32,
    pub average_tokens_per_post: u32,
    pub average_tokens_per_image: u32,
    pub system_prompt_tokens: u32,
    pub posts_per_batch: usize,
    pub max_posts_per_batch: usize,
    pub max_retries: u32,
    pub max_date_range_days: i64,
    pub date_clustering_enabled: bool,
    pub prioritize_recent_posts: bool,
    pub use_function_tools: bool,

    // Extraction run bounds
    pub event_processor_timeout: Duration,

    // Geocoding
    pub geocoding_api_key: String,

    // Orchestrator
    pub poll_seconds: u64,

    // Project scoping
    pub default_project_id: Option<uuid::Uuid>,
}

impl Config {
    /// Load the full configuration. Panics with a clear message if required
    /// vars are missing.
    pub fn from_env() -> Self {
        let mut gemini_api_keys = Vec::new();
        for i in 1..=6 {
            if let Ok(key) = env::var(format!("GEMINI_API_KEY_{i}")) {
                if !key.is_empty() {
                    gemini_api_keys.push(key);
                }
            }
        }
        if gemini_api_keys.is_empty() {
            if let Ok(key) = env::var("GEMINI_API_KEY") {
                if !key.is_empty() {
                    gemini_api_keys.push(key);
                }
            }
        }

        Self {
            database_url: required_env("DATABASE_URL"),
            db_rps: parsed_env("DB_RPS", 5),
            s3_endpoint: env::var("S3_ENDPOINT").unwrap_or_default(),
            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
            s3_access_key: env::var("S3_ACCESS_KEY").unwrap_or_default(),
            s3_secret_key: env::var("S3_SECRET_KEY").unwrap_or_default(),
            twitter_bucket: env::var("TWITTER_BUCKET")
                .unwrap_or_else(|_| "raw-twitter-data".to_string()),
            instagram_bucket: env::var("INSTAGRAM_BUCKET")
                .unwrap_or_else(|_| "raw-instagram-data".to_string()),
            media_bucket: env::var("MEDIA_BUCKET").unwrap_or_else(|_| "post-media".to_string()),
            media_public_base_url: env::var("MEDIA_PUBLIC_BASE_URL").unwrap_or_default(),
            gemini_api_keys,
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            max_workers: env::var("MAX_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0),
            worker_cooldown: Duration::from_secs_f64(parsed_env(
                "API_WORKER_COOLDOWN_SECONDS",
                60.0,
            )),
            gemini_timeout: Duration::from_secs(parsed_env("GEMINI_API_TIMEOUT", 600)),
            max_tokens_per_batch: parsed_env("MAX_TOKENS_PER_BATCH", 200_000),
            average_tokens_per_post: parsed_env("AVERAGE_TOKENS_PER_POST", 500),
            average_tokens_per_image: parsed_env("AVERAGE_TOKENS_PER_IMAGE", 300),
            system_prompt_tokens: parsed_env("SYSTEM_PROMPT_TOKENS", 15_000),
            posts_per_batch: parsed_env("POSTS_PER_BATCH", 1_000),
            max_posts_per_batch: parsed_env("MAX_POSTS_PER_BATCH", 50),
            max_retries: parsed_env("MAX_RETRIES", 10),
            max_date_range_days: parsed_env("MAX_DATE_RANGE_DAYS", 30),
            date_clustering_enabled: bool_env("DATE_CLUSTERING_ENABLED", true),
            prioritize_recent_posts: bool_env("PRIORITIZE_RECENT_POSTS", true),
            use_function_tools: bool_env("USE_FUNCTION_TOOLS", true),
            event_processor_timeout: Duration::from_secs(parsed_env(
                "EVENT_PROCESSOR_TIMEOUT",
                43_200,
            )),
            geocoding_api_key: env::var("GEOCODING_API_KEY").unwrap_or_default(),
            poll_seconds: parsed_env("POLL_SECONDS", 30),
            default_project_id: env::var("DEFAULT_PROJECT_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Log the presence of sensitive configuration without echoing values.
    pub fn log_redacted(&self) {
        tracing::info!(
            db_rps = self.db_rps,
            gemini_keys = self.gemini_api_keys.len(),
            model = %self.gemini_model,
            "configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

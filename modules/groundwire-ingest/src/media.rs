//! Media fetcher: download one representative media item per post, store
//! it under a deterministic key, and write back the public URL or a
//! terminal expiry sentinel.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use groundwire_common::{OfflineMedia, Post, MEDIA_EXPIRED, MEDIA_PERMANENTLY_EXPIRED};
use groundwire_store::{Db, ObjectStore};

const DOWNLOAD_CONCURRENCY: usize = 100;
const UPLOAD_CONCURRENCY: usize = 50;
const SUB_BATCH: usize = 50;
const SUB_BATCH_PAUSE: Duration = Duration::from_secs(1);
const FLUSH_EVERY: usize = 100;
const MAX_IDLE_PER_HOST: usize = 50;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "mp4", "mov"];

#[derive(Debug, Default, Clone)]
pub struct MediaStats {
    pub posts_attempted: u64,
    pub downloaded: u64,
    pub short_circuited: u64,
    pub marked_expired: u64,
    pub marked_permanently_expired: u64,
    pub failed: u64,
}

impl fmt::Display for MediaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted {}, downloaded {}, cached {}, expired {} (+{} permanent), failed {}",
            self.posts_attempted,
            self.downloaded,
            self.short_circuited,
            self.marked_expired,
            self.marked_permanently_expired,
            self.failed,
        )
    }
}

enum Outcome {
    /// Write this value into `offline_media_url`.
    Update(String),
    ShortCircuit(String),
    Expired(&'static str),
    /// Transient failures leave the column untouched for the next run.
    Skip,
}

pub struct MediaFetcher {
    db: Db,
    store: ObjectStore,
    http: reqwest::Client,
    download_sem: Arc<Semaphore>,
    upload_sem: Arc<Semaphore>,
}

impl MediaFetcher {
    pub fn new(db: Db, store: ObjectStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build()?;
        Ok(Self {
            db,
            store,
            http,
            download_sem: Arc::new(Semaphore::new(DOWNLOAD_CONCURRENCY)),
            upload_sem: Arc::new(Semaphore::new(UPLOAD_CONCURRENCY)),
        })
    }

    /// Fetch media for up to `batch_size` posts. Sub-batches of 50 run
    /// concurrently with a 1-second pause between them; DB write-backs
    /// buffer and flush every 100 entries.
    pub async fn run(&self, batch_size: i64) -> Result<MediaStats> {
        let posts = self.db.posts_needing_media(batch_size).await?;
        if posts.is_empty() {
            info!("no posts need media");
            return Ok(MediaStats::default());
        }

        // Preloaded listing for duplicate-download short-circuiting.
        let existing = Arc::new(self.store.key_set().await?);
        info!(
            posts = posts.len(),
            existing_objects = existing.len(),
            "media fetch starting"
        );

        let mut stats = MediaStats::default();
        let mut buffer: Vec<(Uuid, String)> = Vec::new();

        let total = posts.len();
        for (batch_index, chunk) in posts.chunks(SUB_BATCH).enumerate() {
            let outcomes: Vec<(Uuid, Outcome)> = stream::iter(chunk.iter().cloned())
                .map(|post| {
                    let existing = existing.clone();
                    async move {
                        let id = post.id;
                        (id, self.process_post(&post, &existing).await)
                    }
                })
                .buffer_unordered(SUB_BATCH)
                .collect()
                .await;

            for (post_id, outcome) in outcomes {
                stats.posts_attempted += 1;
                match outcome {
                    Outcome::Update(url) => {
                        stats.downloaded += 1;
                        buffer.push((post_id, url));
                    }
                    Outcome::ShortCircuit(url) => {
                        stats.short_circuited += 1;
                        buffer.push((post_id, url));
                    }
                    Outcome::Expired(value) => {
                        if value == MEDIA_PERMANENTLY_EXPIRED {
                            stats.marked_permanently_expired += 1;
                        } else {
                            stats.marked_expired += 1;
                        }
                        buffer.push((post_id, value.to_string()));
                    }
                    Outcome::Skip => stats.failed += 1,
                }
            }

            if buffer.len() >= FLUSH_EVERY {
                let updates = std::mem::take(&mut buffer);
                self.db.update_offline_media(&updates).await?;
            }

            if (batch_index + 1) * SUB_BATCH < total {
                tokio::time::sleep(SUB_BATCH_PAUSE).await;
            }
        }

        if !buffer.is_empty() {
            self.db.update_offline_media(&buffer).await?;
        }

        info!(%stats, "media fetch complete");
        Ok(stats)
    }

    /// Try each candidate URL in order. The first success wins even if
    /// earlier candidates failed; a post becomes EXPIRED only when every
    /// candidate returned a terminal status.
    async fn process_post(&self, post: &Post, existing: &HashSet<String>) -> Outcome {
        let mut terminal = 0usize;
        let mut transient = 0usize;

        for (index, url) in post.media_urls.iter().enumerate() {
            let key = media_key(&post.external_post_id, index, url);

            if existing.contains(&key) {
                debug!(key, "media already archived");
                return Outcome::ShortCircuit(self.store.public_url(&key));
            }

            match self.download(url).await {
                Ok(bytes) => {
                    let permit = self.upload_sem.acquire().await;
                    let uploaded = self
                        .store
                        .put(&key, &bytes, content_type_for(&key), Some(existing))
                        .await;
                    drop(permit);
                    match uploaded {
                        Ok(public_url) => return Outcome::Update(public_url),
                        Err(e) => {
                            warn!(key, error = %e, "media upload failed");
                            transient += 1;
                        }
                    }
                }
                Err(DownloadError::Terminal(status)) => {
                    debug!(url, status, "terminal media status");
                    terminal += 1;
                }
                Err(DownloadError::Other(e)) => {
                    debug!(url, error = %e, "media download failed");
                    transient += 1;
                }
            }
        }

        if terminal > 0 && transient == 0 {
            // Promote an already-EXPIRED post on its second full strikeout.
            let value = match post.offline_media() {
                OfflineMedia::Expired => MEDIA_PERMANENTLY_EXPIRED,
                _ => MEDIA_EXPIRED,
            };
            return Outcome::Expired(value);
        }

        Outcome::Skip
    }

    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, DownloadError> {
        let _permit = self
            .download_sem
            .acquire()
            .await
            .map_err(|e| DownloadError::Other(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Other(e.to_string()))?;

        let status = response.status().as_u16();
        if matches!(status, 403 | 404 | 410) {
            return Err(DownloadError::Terminal(status));
        }
        if !response.status().is_success() {
            return Err(DownloadError::Other(format!("status {status}")));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| DownloadError::Other(e.to_string()))
    }
}

enum DownloadError {
    /// 403/404/410: the platform has dropped this media for good.
    Terminal(u16),
    Other(String),
}

/// Deterministic object key: `{external_post_id}[_{index}].{ext}`.
pub fn media_key(external_post_id: &str, index: usize, url: &str) -> String {
    let ext = extension_for(url);
    if index == 0 {
        format!("{external_post_id}.{ext}")
    } else {
        format!("{external_post_id}_{index}.{ext}")
    }
}

fn extension_for(url: &str) -> &'static str {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split('?').next().unwrap_or("").to_string());

    let candidate = path.rsplit('.').next().unwrap_or("").to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|e| **e == candidate)
        .copied()
        .unwrap_or("jpg")
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next().unwrap_or("") {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_keys() {
        assert_eq!(
            media_key("12345", 0, "https://cdn.example.com/a/b/photo.JPG?sig=x"),
            "12345.jpg"
        );
        assert_eq!(
            media_key("12345", 2, "https://cdn.example.com/clip.mp4"),
            "12345_2.mp4"
        );
        // Unknown extensions normalize to jpg.
        assert_eq!(media_key("9", 0, "https://cdn.example.com/raw"), "9.jpg");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.mov"), "video/quicktime");
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
    }
}

//! Post reads and writes: ingest-side UPSERTs, duplicate existence checks,
//! batch selection, media write-back, and processed marking.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use groundwire_common::Post;

use crate::db::Db;
use crate::error::Result;
use crate::rows::PostRow;
use crate::{EXISTENCE_CHUNK, UPDATE_ID_CHUNK, UPSERT_CHUNK};

/// Write-side shape of a canonical post produced by the ingest normalizer.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub platform: String,
    pub external_post_id: String,
    pub author_handle: String,
    pub author_display_name: Option<String>,
    pub content_text: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub media_urls: Vec<String>,
    pub mentioned_handles: Vec<String>,
    pub hashtags: Vec<String>,
    pub like_count: i64,
    pub reply_count: i64,
    pub share_count: i64,
    pub location_text: Option<String>,
    pub post_url: Option<String>,
}

/// Identity of a freshly inserted post.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InsertedPost {
    pub id: Uuid,
    pub platform: String,
    pub external_post_id: String,
}

const POST_COLUMNS: &str = "id, platform, external_post_id, author_handle, author_display_name, \
     content_text, posted_at, media_urls, mentioned_handles, hashtags, like_count, reply_count, \
     share_count, location_text, post_url, offline_media_url, processed_for_events, event_processed_at";

impl Db {
    /// Which of these external IDs already exist for a platform. Queries in
    /// chunks of ≤50 IDs per call.
    pub async fn existing_external_ids(
        &self,
        platform: &str,
        external_ids: &[String],
    ) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        for chunk in external_ids.chunks(EXISTENCE_CHUNK) {
            let ids: Vec<String> = chunk.to_vec();
            let rows = self
                .run("check existing post ids", || {
                    sqlx::query_scalar::<_, String>(
                        "SELECT external_post_id FROM posts \
                         WHERE platform = $1 AND external_post_id = ANY($2)",
                    )
                    .bind(platform)
                    .bind(&ids)
                    .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            found.extend(rows);
        }
        Ok(found)
    }

    /// Insert new posts, skipping `(platform, external_post_id)` conflicts.
    /// Returns only the rows actually created, in chunks of ≤1,000.
    pub async fn insert_posts(&self, posts: &[NewPost]) -> Result<Vec<InsertedPost>> {
        let mut inserted = Vec::new();
        for chunk in posts.chunks(UPSERT_CHUNK) {
            let rows = self
                .run("insert posts", || {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO posts (platform, external_post_id, author_handle, \
                         author_display_name, content_text, posted_at, media_urls, \
                         mentioned_handles, hashtags, like_count, reply_count, share_count, \
                         location_text, post_url) ",
                    );
                    qb.push_values(chunk.iter(), |mut b, p| {
                        b.push_bind(p.platform.clone())
                            .push_bind(p.external_post_id.clone())
                            .push_bind(p.author_handle.clone())
                            .push_bind(p.author_display_name.clone())
                            .push_bind(p.content_text.clone())
                            .push_bind(p.posted_at)
                            .push_bind(p.media_urls.clone())
                            .push_bind(p.mentioned_handles.clone())
                            .push_bind(p.hashtags.clone())
                            .push_bind(p.like_count)
                            .push_bind(p.reply_count)
                            .push_bind(p.share_count)
                            .push_bind(p.location_text.clone())
                            .push_bind(p.post_url.clone());
                    });
                    qb.push(
                        " ON CONFLICT (platform, external_post_id) DO NOTHING \
                         RETURNING id, platform, external_post_id",
                    );
                    let pool = self.pool().clone();
                    async move { qb.build_query_as::<InsertedPost>().fetch_all(&pool).await }
                })
                .await?
                .unwrap_or_default();
            inserted.extend(rows);
        }
        Ok(inserted)
    }

    /// One page of unprocessed posts in reverse-chronological order. Posts
    /// without a timestamp never enter a batch.
    pub async fn unprocessed_posts_page(&self, offset: i64, limit: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE processed_for_events = false \
               AND event_processed_at IS NULL \
               AND posted_at IS NOT NULL \
             ORDER BY posted_at DESC \
             OFFSET $1 LIMIT $2"
        );
        let rows = self
            .run("select unprocessed posts", || {
                sqlx::query_as::<_, PostRow>(&sql)
                    .bind(offset)
                    .bind(limit)
                    .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// The subset of these UUIDs that exist, used to guard link creation
    /// against foreign-key violations.
    pub async fn posts_exist(&self, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let mut found = HashSet::new();
        for chunk in ids.chunks(UPDATE_ID_CHUNK) {
            let ids: Vec<Uuid> = chunk.to_vec();
            let rows = self
                .run("verify posts exist", || {
                    sqlx::query_scalar::<_, Uuid>("SELECT id FROM posts WHERE id = ANY($1)")
                        .bind(&ids)
                        .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            found.extend(rows);
        }
        Ok(found)
    }

    /// Mark a batch's posts processed, stamping `event_processed_at`.
    /// Idempotent; chunked to ≤100 IDs per update.
    pub async fn mark_posts_processed(&self, ids: &[Uuid]) -> Result<u64> {
        let mut updated = 0;
        for chunk in ids.chunks(UPDATE_ID_CHUNK) {
            let ids: Vec<Uuid> = chunk.to_vec();
            let result = self
                .run("mark posts processed", || {
                    sqlx::query(
                        "UPDATE posts SET processed_for_events = true, \
                         event_processed_at = now() WHERE id = ANY($1)",
                    )
                    .bind(&ids)
                    .execute(self.pool())
                })
                .await?;
            updated += result.map(|r| r.rows_affected()).unwrap_or(0);
        }
        Ok(updated)
    }

    /// Posts with media URLs and no usable offline copy, for the media
    /// fetcher. `EXPIRED` posts are retried so they can be promoted.
    pub async fn posts_needing_media(&self, limit: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE cardinality(media_urls) > 0 \
               AND (offline_media_url IS NULL \
                    OR offline_media_url IN ('BROKEN', 'ERROR', 'EXPIRED')) \
             ORDER BY posted_at DESC NULLS LAST \
             LIMIT $1"
        );
        let rows = self
            .run("select posts needing media", || {
                sqlx::query_as::<_, PostRow>(&sql)
                    .bind(limit)
                    .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// Bulk write-back of offline media results, keyed on post ID.
    pub async fn update_offline_media(&self, updates: &[(Uuid, String)]) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = updates.iter().map(|(id, _)| *id).collect();
        let urls: Vec<String> = updates.iter().map(|(_, url)| url.clone()).collect();

        let result = self
            .run("update offline media urls", || {
                sqlx::query(
                    "UPDATE posts AS p SET offline_media_url = u.url \
                     FROM UNNEST($1::uuid[], $2::text[]) AS u(id, url) \
                     WHERE p.id = u.id",
                )
                .bind(&ids)
                .bind(&urls)
                .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }

    /// Load full posts by ID (batch handoff to the extractor).
    pub async fn posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ANY($1)");
        let mut out = Vec::new();
        for chunk in ids.chunks(UPDATE_ID_CHUNK) {
            let ids: Vec<Uuid> = chunk.to_vec();
            let rows = self
                .run("load posts by ids", || {
                    sqlx::query_as::<_, PostRow>(&sql)
                        .bind(&ids)
                        .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            out.extend(rows.into_iter().map(Post::from));
        }
        Ok(out)
    }
}

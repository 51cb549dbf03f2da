//! File-level ingestion flow: list scrape files, normalize rows, skip
//! duplicates, write posts and edges, then archive the consumed file.

use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use groundwire_common::{Platform, PostActorRelation};
use groundwire_store::posts::{InsertedPost, NewPost};
use groundwire_store::{Db, ObjectStore};

use crate::normalizer;
use crate::unknown::{self, Observation};
use crate::{instagram, twitter};

#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub files_processed: u64,
    pub files_failed: u64,
    pub rows_seen: u64,
    pub rows_discarded: u64,
    pub posts_inserted: u64,
    pub duplicates_skipped: u64,
    pub unknown_actors_upserted: u64,
    pub known_edges: u64,
    pub unknown_edges: u64,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files {}/{} ok, rows {} ({} discarded), posts {} inserted / {} duplicate, \
             unknown actors {}, edges {} known / {} unknown",
            self.files_processed,
            self.files_processed + self.files_failed,
            self.rows_seen,
            self.rows_discarded,
            self.posts_inserted,
            self.duplicates_skipped,
            self.unknown_actors_upserted,
            self.known_edges,
            self.unknown_edges,
        )
    }
}

pub struct Ingestor {
    db: Db,
    /// Known `(platform, username)` → actor ID, loaded once per run.
    known: HashMap<(String, String), Uuid>,
    /// Session-level duplicate cache of `(platform, external_post_id)`.
    seen: HashSet<(String, String)>,
    /// Migration runs re-read archived files and must not move them again.
    migration: bool,
    pub stats: IngestStats,
}

impl Ingestor {
    pub async fn new(db: Db, migration: bool) -> Result<Self> {
        let known = db.known_usernames().await?;
        info!(known_usernames = known.len(), "actor directory loaded");
        Ok(Self {
            db,
            known,
            seen: HashSet::new(),
            migration,
            stats: IngestStats::default(),
        })
    }

    /// Process every unconsumed file in a platform bucket. Per-file errors
    /// are counted and logged; they never block the other files.
    pub async fn process_bucket(&mut self, store: &ObjectStore, platform: Platform) -> Result<()> {
        let extension = match platform {
            Platform::Twitter => ".csv",
            _ => ".json",
        };

        let keys: Vec<String> = store
            .list_keys("")
            .await?
            .into_iter()
            .filter(|k| !k.starts_with("processed/") && k.ends_with(extension))
            .collect();

        info!(bucket = %store.name(), files = keys.len(), "ingesting scrape files");

        for key in keys {
            match self.process_file(store, &key, &platform).await {
                Ok(inserted) => {
                    self.stats.files_processed += 1;
                    if !self.migration {
                        if let Err(e) = self.archive_file(store, &key).await {
                            warn!(key, error = %e, "failed to archive processed file");
                        }
                    }
                    info!(key, inserted, "file ingested");
                }
                Err(e) => {
                    self.stats.files_failed += 1;
                    warn!(key, error = %e, "file ingestion failed");
                }
            }
        }

        Ok(())
    }

    async fn process_file(
        &mut self,
        store: &ObjectStore,
        key: &str,
        platform: &Platform,
    ) -> Result<u64> {
        let bytes = store.get(key).await.context("download")?;
        if bytes.is_empty() {
            return Ok(0);
        }

        let raw = match platform {
            Platform::Twitter => twitter::parse_csv(&bytes)?,
            _ => instagram::parse_json(&bytes)?,
        };
        self.stats.rows_seen += raw.len() as u64;

        let posts: Vec<NewPost> = raw
            .into_iter()
            .filter_map(|r| {
                let normalized = normalizer::normalize(r);
                if normalized.is_none() {
                    self.stats.rows_discarded += 1;
                }
                normalized
            })
            .collect();

        let fresh = self.filter_duplicates(posts).await?;
        if fresh.is_empty() {
            return Ok(0);
        }

        let inserted = self.db.insert_posts(&fresh).await?;
        self.stats.posts_inserted += inserted.len() as u64;

        self.link_posts(&inserted, &fresh).await?;

        Ok(inserted.len() as u64)
    }

    /// Session cache first, then one IN-query per platform chunk to fill
    /// misses. Duplicate rows within the same file collapse here too.
    async fn filter_duplicates(&mut self, posts: Vec<NewPost>) -> Result<Vec<NewPost>> {
        let mut by_platform: HashMap<String, Vec<String>> = HashMap::new();
        for p in &posts {
            let key = (p.platform.clone(), p.external_post_id.clone());
            if !self.seen.contains(&key) {
                by_platform
                    .entry(p.platform.clone())
                    .or_default()
                    .push(p.external_post_id.clone());
            }
        }

        for (platform, ids) in by_platform {
            let existing = self.db.existing_external_ids(&platform, &ids).await?;
            for id in existing {
                self.seen.insert((platform.clone(), id));
            }
        }

        let mut fresh = Vec::new();
        for p in posts {
            let key = (p.platform.clone(), p.external_post_id.clone());
            if self.seen.insert(key) {
                fresh.push(p);
            } else {
                self.stats.duplicates_skipped += 1;
            }
        }
        Ok(fresh)
    }

    /// Known-actor and unknown-actor edges for freshly inserted posts.
    async fn link_posts(&mut self, inserted: &[InsertedPost], posts: &[NewPost]) -> Result<()> {
        let by_key: HashMap<(String, String), &NewPost> = posts
            .iter()
            .map(|p| ((p.platform.clone(), p.external_post_id.clone()), p))
            .collect();

        let mut known_edges: Vec<(Uuid, Uuid, &'static str)> = Vec::new();
        let mut observations: Vec<Observation> = Vec::new();
        // (post_id, platform, username, relation) pending unknown-actor IDs.
        let mut pending_unknown: Vec<(Uuid, String, String, &'static str)> = Vec::new();

        for row in inserted {
            let Some(post) = by_key
                .get(&(row.platform.clone(), row.external_post_id.clone()))
                .copied()
            else {
                continue;
            };
            let seen_at = post.posted_at.unwrap_or_else(Utc::now);

            let mut handle_edge = |username: &str, relation: PostActorRelation| {
                let key = (post.platform.clone(), username.to_string());
                if let Some(actor_id) = self.known.get(&key) {
                    known_edges.push((row.id, *actor_id, relation.as_str()));
                } else {
                    observations.push(Observation {
                        platform: post.platform.clone(),
                        username: username.to_string(),
                        seen_at,
                        is_author: relation == PostActorRelation::Author,
                        context: Some(post.content_text.clone()),
                    });
                    pending_unknown.push((
                        row.id,
                        post.platform.clone(),
                        username.to_string(),
                        relation.as_str(),
                    ));
                }
            };

            handle_edge(&post.author_handle, PostActorRelation::Author);
            for mention in &post.mentioned_handles {
                handle_edge(mention, PostActorRelation::Mentioned);
            }

            // Hashtags that exactly match a known username become tagged edges.
            for tag in &post.hashtags {
                let bare = tag.trim_start_matches('#').to_lowercase();
                if let Some(actor_id) = self.known.get(&(post.platform.clone(), bare)) {
                    known_edges.push((row.id, *actor_id, PostActorRelation::Tagged.as_str()));
                }
            }
        }

        if !known_edges.is_empty() {
            self.stats.known_edges += self.db.insert_post_actor_edges(&known_edges).await?;
        }

        if observations.is_empty() {
            return Ok(());
        }

        let aggregated = unknown::aggregate(observations);
        let keys = self.db.upsert_unknown_actors(&aggregated).await?;
        self.stats.unknown_actors_upserted += keys.len() as u64;

        let unknown_ids: HashMap<(String, String), Uuid> = keys
            .into_iter()
            .map(|k| ((k.platform, k.detected_username), k.id))
            .collect();

        let mut unknown_edges: Vec<(Uuid, Uuid, &'static str)> = Vec::new();
        for (post_id, platform, username, relation) in pending_unknown {
            if let Some(unknown_id) = unknown_ids.get(&(platform, username)) {
                unknown_edges.push((post_id, *unknown_id, relation));
            }
        }

        if !unknown_edges.is_empty() {
            self.stats.unknown_edges += self
                .db
                .insert_post_unknown_actor_edges(&unknown_edges)
                .await?;
        }

        Ok(())
    }

    /// Copy a consumed file to `processed/YYYY-MM-DD/` and delete the
    /// original.
    async fn archive_file(&self, store: &ObjectStore, key: &str) -> Result<()> {
        let filename = key.rsplit('/').next().unwrap_or(key);
        let dated = format!("processed/{}/{}", Utc::now().format("%Y-%m-%d"), filename);
        store.copy(key, &dated).await?;
        store.delete(key).await?;
        Ok(())
    }
}

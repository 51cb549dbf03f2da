//! The extraction engine: one batch in, validated events and their links
//! out. All database writes for an event are ordered — event, post links,
//! actor links, slugs — and the batch's posts are marked processed only
//! after everything else has succeeded, so a crashed batch is simply
//! redone next run.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ai_client::{encode_base64, AiError, Gemini, Part};
use groundwire_common::{CancelFlag, Config, DynamicSlug, GroundwireError, Post};
use groundwire_store::events::EventInsert;
use groundwire_store::Db;

use crate::event::{self, RawEvent, Rejection};
use crate::images;
use crate::prompt;
use crate::response;
use crate::slug_cache::SlugCache;
use crate::tools::{BatchContext, LinkPostsTool, SearchActorsTool, SearchSlugsTool};
use crate::workers::Worker;
use crate::linker;

/// LLM retry back-off: 2s × 2^attempt, clamped at 30s. Rate limits wait
/// longer, up to two minutes.
const LLM_BASE_DELAY: Duration = Duration::from_secs(2);
const LLM_MAX_DELAY: Duration = Duration::from_secs(30);
const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub model: String,
    pub max_retries: u32,
    pub use_function_tools: bool,
    pub project_id: Option<Uuid>,
}

impl ExtractorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.gemini_model.clone(),
            max_retries: config.max_retries,
            use_function_tools: config.use_function_tools,
            project_id: config.default_project_id,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExtractStats {
    pub batches_processed: u64,
    pub batches_failed: u64,
    pub events_persisted: u64,
    pub events_new: u64,
    pub events_existing: u64,
    pub events_rejected: u64,
    pub posts_marked: u64,
    pub tool_calls: u64,
    pub embed_failures: u64,
}

impl fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batches {} ok / {} failed, events {} ({} new, {} existing, {} rejected), \
             posts marked {}, tool calls {}, embed failures {}",
            self.batches_processed,
            self.batches_failed,
            self.events_persisted,
            self.events_new,
            self.events_existing,
            self.events_rejected,
            self.posts_marked,
            self.tool_calls,
            self.embed_failures,
        )
    }
}

pub struct Extractor {
    db: Db,
    settings: ExtractorSettings,
    slug_cache: Arc<SlugCache>,
    image_http: reqwest::Client,
    cancel: CancelFlag,
    stats: Mutex<ExtractStats>,
}

impl Extractor {
    pub fn new(db: Db, settings: ExtractorSettings, cancel: CancelFlag) -> Self {
        Self {
            db,
            settings,
            slug_cache: Arc::new(SlugCache::new()),
            image_http: images::http_client(),
            cancel,
            stats: Mutex::new(ExtractStats::default()),
        }
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats.lock().expect("stats poisoned").clone()
    }

    fn record<F: FnOnce(&mut ExtractStats)>(&self, f: F) {
        f(&mut self.stats.lock().expect("stats poisoned"));
    }

    /// Process one batch end to end. An error leaves every post in the
    /// batch unprocessed for the next run.
    pub async fn process_batch(
        &self,
        worker: &mut Worker,
        batch_index: usize,
        batch_total: usize,
        posts: Vec<Post>,
    ) -> Result<usize> {
        let result = self
            .process_batch_inner(worker, batch_index, batch_total, &posts)
            .await;
        match &result {
            Ok(persisted) => {
                self.record(|s| {
                    s.batches_processed += 1;
                    s.events_persisted += *persisted as u64;
                });
            }
            Err(_) => self.record(|s| s.batches_failed += 1),
        }
        result
    }

    async fn process_batch_inner(
        &self,
        worker: &mut Worker,
        batch_index: usize,
        batch_total: usize,
        posts: &[Post],
    ) -> Result<usize> {
        self.slug_cache.reload_if_stale(&self.db).await?;

        let ctx = Arc::new(BatchContext {
            post_map: posts
                .iter()
                .map(|p| (p.external_post_id.clone(), p.id))
                .collect(),
        });
        let batch_uuids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();

        let parts = self.build_parts(posts).await;
        info!(
            worker = worker.id,
            batch = batch_index + 1,
            total = batch_total,
            posts = posts.len(),
            parts = parts.len(),
            "batch dispatched to model"
        );

        let text = self.call_model(worker, &ctx, parts).await?;

        let raw_events = response::decode_events(&text).ok_or_else(|| {
            GroundwireError::Extraction(format!(
                "no JSON object in model response (tail: {})",
                ai_client::truncate_to_char_boundary(text.trim(), 500)
            ))
        })?;

        let accepted = self.validate_events(raw_events)?;
        let persisted = self.persist_events(worker, &ctx, accepted).await?;

        // Everything succeeded; only now do the posts leave the queue.
        let marked = self.db.mark_posts_processed(&batch_uuids).await?;
        self.record(|s| s.posts_marked += marked);

        Ok(persisted)
    }

    /// Serialize posts and attach up to one normalized image each.
    async fn build_parts(&self, posts: &[Post]) -> Vec<Part> {
        let mut parts = Vec::with_capacity(posts.len() * 2);
        for post in posts {
            parts.push(Part::text(prompt::serialize_post(post)));

            if let groundwire_common::OfflineMedia::Url(url) = post.offline_media() {
                match images::fetch_prompt_image(&self.image_http, &url).await {
                    Ok(jpeg) => {
                        parts.push(Part::inline_data("image/jpeg", encode_base64(&jpeg)));
                    }
                    Err(e) => debug!(post = %post.id, error = %e, "image skipped"),
                }
            }
        }
        parts
    }

    /// One model exchange with bounded retries. Transient errors back off
    /// geometrically; rate limits wait longer.
    async fn call_model(
        &self,
        worker: &mut Worker,
        ctx: &Arc<BatchContext>,
        parts: Vec<Part>,
    ) -> Result<String> {
        let system = prompt::build_system_prompt(self.settings.use_function_tools);

        let mut agent = worker.agent().clone();
        if self.settings.use_function_tools {
            agent = agent
                .tool(SearchActorsTool {
                    db: self.db.clone(),
                })
                .tool(SearchSlugsTool {
                    db: self.db.clone(),
                })
                .tool(LinkPostsTool {
                    db: self.db.clone(),
                    ctx: ctx.clone(),
                });
        }

        let max_retries = self.settings.max_retries.max(1);
        let mut last_err = None;

        for attempt in 0..max_retries {
            if self.cancel.is_cancelled() {
                return Err(GroundwireError::Cancelled.into());
            }

            worker.await_cooldown().await;
            let outcome = agent.tool_exchange(&system, parts.clone(), 0.1).await;
            worker.note_request();

            match outcome {
                Ok(exchange) => {
                    if exchange.tool_calls > 0 {
                        self.record(|s| s.tool_calls += exchange.tool_calls as u64);
                    }
                    return Ok(exchange.text);
                }
                Err(e) if attempt + 1 < max_retries => {
                    let rate_limited = e
                        .downcast_ref::<AiError>()
                        .map(AiError::is_rate_limit)
                        .unwrap_or(false);
                    let delay = backoff_delay(attempt, rate_limited);
                    warn!(
                        worker = worker.id,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        rate_limited,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e).context("model call failed permanently"),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("model retries exhausted")))
    }

    /// Drop invalid events with a logged reason — except missing source
    /// IDs, which poison the whole batch: if the model violated that part
    /// of the contract, every event it produced is suspect.
    fn validate_events(&self, raw_events: Vec<RawEvent>) -> Result<Vec<RawEvent>> {
        let mut accepted = Vec::with_capacity(raw_events.len());
        for event in raw_events {
            match event::validate(&event) {
                Ok(()) => accepted.push(event),
                Err(Rejection::MissingSourceIds) => {
                    return Err(GroundwireError::MissingSourceIds.into());
                }
                Err(reason) => {
                    warn!(event = %event.event_name, %reason, "event rejected");
                    self.record(|s| s.events_rejected += 1);
                }
            }
        }
        Ok(accepted)
    }

    async fn persist_events(
        &self,
        worker: &mut Worker,
        ctx: &Arc<BatchContext>,
        events: Vec<RawEvent>,
    ) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        // Translate SourceIDs through the batch map; an event none of whose
        // IDs resolve fails the batch.
        let mut prepared: Vec<(RawEvent, Vec<Uuid>, EventInsert)> = Vec::new();
        let mut seen_hashes = std::collections::HashSet::new();
        for event in events {
            let mut source_uuids: Vec<Uuid> = event
                .source_ids
                .iter()
                .filter_map(|raw| {
                    ctx.post_map.get(raw).copied().or_else(|| {
                        raw.parse::<Uuid>()
                            .ok()
                            .filter(|u| ctx.post_map.values().any(|v| v == u))
                    })
                })
                .collect();
            source_uuids.sort();
            source_uuids.dedup();

            if source_uuids.is_empty() {
                bail!(
                    "event '{}' has source IDs outside the current batch",
                    event.event_name
                );
            }

            let date = event::normalize_event_date(event.event_date.as_deref());
            let content_hash = event::content_hash(
                &event.event_name,
                date,
                event.location.as_deref(),
                event.city.as_deref(),
                event.state.as_deref(),
                &source_uuids,
            );
            // The model sometimes emits the same event twice in one batch;
            // one row per content hash.
            if !seen_hashes.insert(content_hash.clone()) {
                continue;
            }

            let embedding = self.embed_event(worker, &event).await;

            let insert = EventInsert {
                event_name: event.event_name.clone(),
                event_date: date,
                event_description: event.event_description.clone(),
                location: event.location.clone(),
                city: event.city.clone(),
                state: event.state.clone(),
                participants: event.participants.clone(),
                category_tags: event.category_tags.clone(),
                source_post_ids: source_uuids.clone(),
                confidence_score: event.confidence_score,
                extracted_by: self.settings.model.clone(),
                extracted_at: Utc::now(),
                content_hash,
                project_id: self.settings.project_id,
                embedding,
            };
            prepared.push((event, source_uuids, insert));
        }

        let inserts: Vec<EventInsert> = prepared.iter().map(|(_, _, i)| i.clone()).collect();
        let outcomes = self.db.upsert_events(&inserts).await?;
        let by_hash: HashMap<String, (Uuid, bool)> = outcomes
            .into_iter()
            .map(|o| (o.content_hash, (o.id, o.is_new)))
            .collect();

        let mut persisted = 0;
        for (event, source_uuids, insert) in &prepared {
            let Some((event_id, is_new)) = by_hash.get(&insert.content_hash).copied() else {
                warn!(event = %event.event_name, "upsert returned no outcome for event");
                continue;
            };
            persisted += 1;

            if !is_new {
                // A prior run already materialized this event's links.
                self.record(|s| s.events_existing += 1);
                debug!(event = %event_id, "content hash already stored, links skipped");
                continue;
            }
            self.record(|s| s.events_new += 1);

            // Post links first, filtered to posts that verifiably exist.
            let existing = self.db.posts_exist(source_uuids).await?;
            let links: Vec<(Uuid, Uuid)> = source_uuids
                .iter()
                .filter(|id| existing.contains(id))
                .map(|id| (event_id, *id))
                .collect();
            if !links.is_empty() {
                self.db.insert_event_post_links(&links).await?;
            }

            // Then the combined actor link set.
            linker::link_event_actors(&self.db, event_id, event, source_uuids).await?;

            // Finally any new dynamic slugs the event's tags introduce.
            self.persist_new_slugs(&event.category_tags).await?;
        }

        Ok(persisted)
    }

    /// Best effort: a failed embedding logs a warning and the event is
    /// stored with a null vector.
    async fn embed_event(&self, worker: &mut Worker, event: &RawEvent) -> Option<Vec<f32>> {
        let agent: Gemini = worker.agent().clone();
        let text = format!(
            "{}. {}. {} {}",
            event.event_name,
            event.event_description,
            event.city.as_deref().unwrap_or(""),
            event.state.as_deref().unwrap_or(""),
        );
        match agent.embed_text(&text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(event = %event.event_name, error = %e, "embedding failed, storing null vector");
                self.record(|s| s.embed_failures += 1);
                None
            }
        }
    }

    async fn persist_new_slugs(&self, category_tags: &[String]) -> Result<()> {
        for tag in category_tags {
            let Some((parent_tag, identifier)) = tag.split_once(':') else {
                continue;
            };
            if !DynamicSlug::is_cacheable(parent_tag) {
                continue;
            }
            let slug = DynamicSlug::new(parent_tag, identifier);
            if self.slug_cache.contains(&slug.full_slug) {
                continue;
            }
            self.db.upsert_slug(&slug).await?;
            self.slug_cache.insert(slug);
        }
        Ok(())
    }
}

fn backoff_delay(attempt: u32, rate_limited: bool) -> Duration {
    let delay = LLM_BASE_DELAY * 2u32.saturating_pow(attempt);
    if rate_limited {
        delay.min(RATE_LIMIT_MAX_DELAY)
    } else {
        delay.min(LLM_MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_geometric_and_clamped() {
        assert_eq!(backoff_delay(0, false), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, false), Duration::from_secs(8));
        assert_eq!(backoff_delay(6, false), Duration::from_secs(30));
        // Rate limits are allowed a longer ceiling.
        assert_eq!(backoff_delay(6, true), Duration::from_secs(120));
        assert_eq!(backoff_delay(10, true), Duration::from_secs(120));
    }
}

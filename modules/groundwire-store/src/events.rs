//! Event persistence: content-hash UPSERTs with is-new detection, link
//! materialization, coordinate updates, duplicate-group reads, and the
//! merge helpers used by the deduplicator.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use groundwire_common::{DuplicateGroup, DuplicatePair, Event};

use crate::db::Db;
use crate::error::Result;
use crate::rows::{
    DuplicateGroupRow, DuplicatePairRow, EventActorLinkReadRow, EventActorLinkRow, EventRow,
    EventUpsertOutcome,
};
use crate::{UPDATE_ID_CHUNK, UPSERT_CHUNK};

/// Write-side shape of an extracted event.
#[derive(Debug, Clone)]
pub struct EventInsert {
    pub event_name: String,
    pub event_date: Option<NaiveDate>,
    pub event_description: String,
    pub location: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub participants: Option<String>,
    pub category_tags: Vec<String>,
    pub source_post_ids: Vec<Uuid>,
    pub confidence_score: f64,
    pub extracted_by: String,
    pub extracted_at: DateTime<Utc>,
    pub content_hash: String,
    pub project_id: Option<Uuid>,
    pub embedding: Option<Vec<f32>>,
}

const EVENT_COLUMNS: &str = "id, event_name, event_date, event_description, location, city, \
     state, participants, category_tags, source_post_ids, confidence_score, extracted_by, \
     extracted_at, verified, content_hash, project_id, embedding, latitude, longitude";

impl Db {
    /// Batch UPSERT on `content_hash`. Each outcome carries the row UUID and
    /// whether it was newly created (`created_at == updated_at`).
    pub async fn upsert_events(&self, events: &[EventInsert]) -> Result<Vec<EventUpsertOutcome>> {
        let mut outcomes = Vec::new();
        for chunk in events.chunks(UPSERT_CHUNK) {
            let rows = self
                .run("upsert events", || {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO events (event_name, event_date, event_description, \
                         location, city, state, participants, category_tags, source_post_ids, \
                         confidence_score, extracted_by, extracted_at, content_hash, \
                         project_id, embedding) ",
                    );
                    qb.push_values(chunk.iter(), |mut b, e| {
                        b.push_bind(e.event_name.clone())
                            .push_bind(e.event_date)
                            .push_bind(e.event_description.clone())
                            .push_bind(e.location.clone())
                            .push_bind(e.city.clone())
                            .push_bind(e.state.clone())
                            .push_bind(e.participants.clone())
                            .push_bind(e.category_tags.clone())
                            .push_bind(e.source_post_ids.clone())
                            .push_bind(e.confidence_score)
                            .push_bind(e.extracted_by.clone())
                            .push_bind(e.extracted_at)
                            .push_bind(e.content_hash.clone())
                            .push_bind(e.project_id)
                            .push_bind(e.embedding.clone());
                    });
                    qb.push(
                        " ON CONFLICT (content_hash) DO UPDATE SET updated_at = now() \
                         RETURNING id, content_hash, (created_at = updated_at) AS is_new",
                    );
                    let pool = self.pool().clone();
                    async move {
                        qb.build_query_as::<EventUpsertOutcome>()
                            .fetch_all(&pool)
                            .await
                    }
                })
                .await?
                .unwrap_or_default();
            outcomes.extend(rows);
        }
        Ok(outcomes)
    }

    /// Create event→post links, ignoring duplicates.
    pub async fn insert_event_post_links(&self, links: &[(Uuid, Uuid)]) -> Result<u64> {
        let mut written = 0;
        for chunk in links.chunks(UPSERT_CHUNK) {
            let result = self
                .run("insert event-post links", || {
                    let mut qb: QueryBuilder<Postgres> =
                        QueryBuilder::new("INSERT INTO event_post_links (event_id, post_id) ");
                    qb.push_values(chunk.iter(), |mut b, (event_id, post_id)| {
                        b.push_bind(*event_id).push_bind(*post_id);
                    });
                    qb.push(" ON CONFLICT DO NOTHING");
                    let pool = self.pool().clone();
                    async move { qb.build().execute(&pool).await }
                })
                .await?;
            written += result.map(|r| r.rows_affected()).unwrap_or(0);
        }
        Ok(written)
    }

    /// UPSERT event→actor links keyed on `(event_id, actor_handle, platform)`.
    /// The partial unique index on `(event_id, unknown_actor_id)` can also
    /// fire; those conflicts are swallowed by the retry policy.
    pub async fn insert_event_actor_links(&self, links: &[EventActorLinkRow]) -> Result<u64> {
        let mut written = 0;
        for chunk in links.chunks(UPSERT_CHUNK) {
            let result = self
                .run("insert event-actor links", || {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO event_actor_links (event_id, actor_handle, platform, \
                         actor_type, actor_id, unknown_actor_id) ",
                    );
                    qb.push_values(chunk.iter(), |mut b, l| {
                        b.push_bind(l.event_id)
                            .push_bind(l.actor_handle.clone())
                            .push_bind(l.platform.clone())
                            .push_bind(l.actor_type.clone())
                            .push_bind(l.actor_id)
                            .push_bind(l.unknown_actor_id);
                    });
                    qb.push(" ON CONFLICT (event_id, actor_handle, platform) DO NOTHING");
                    let pool = self.pool().clone();
                    async move { qb.build().execute(&pool).await }
                })
                .await?;
            written += result.map(|r| r.rows_affected()).unwrap_or(0);
        }
        Ok(written)
    }

    pub async fn events_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ANY($1)");
        let mut out = Vec::new();
        for chunk in ids.chunks(UPDATE_ID_CHUNK) {
            let ids: Vec<Uuid> = chunk.to_vec();
            let rows = self
                .run("load events by ids", || {
                    sqlx::query_as::<_, EventRow>(&sql)
                        .bind(&ids)
                        .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            out.extend(rows.into_iter().map(Event::from));
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Merge helpers (deduplicator)
    // -----------------------------------------------------------------------

    pub async fn event_post_link_ids(&self, event_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = self
            .run("load event post links", || {
                sqlx::query_scalar::<_, Uuid>(
                    "SELECT post_id FROM event_post_links WHERE event_id = $1",
                )
                .bind(event_id)
                .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows)
    }

    pub async fn event_actor_link_rows(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<EventActorLinkReadRow>> {
        let rows = self
            .run("load event actor links", || {
                sqlx::query_as::<_, EventActorLinkReadRow>(
                    "SELECT event_id, actor_handle, platform, actor_type, actor_id, \
                     unknown_actor_id FROM event_actor_links WHERE event_id = $1",
                )
                .bind(event_id)
                .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows)
    }

    pub async fn delete_event_post_links(&self, event_id: Uuid) -> Result<u64> {
        let result = self
            .run("delete event post links", || {
                sqlx::query("DELETE FROM event_post_links WHERE event_id = $1")
                    .bind(event_id)
                    .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }

    pub async fn delete_event_actor_links(&self, event_id: Uuid) -> Result<u64> {
        let result = self
            .run("delete event actor links", || {
                sqlx::query("DELETE FROM event_actor_links WHERE event_id = $1")
                    .bind(event_id)
                    .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }

    pub async fn delete_event(&self, event_id: Uuid) -> Result<u64> {
        let result = self
            .run("delete event", || {
                sqlx::query("DELETE FROM events WHERE id = $1")
                    .bind(event_id)
                    .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }

    pub async fn update_event_tags(&self, event_id: Uuid, tags: &[String]) -> Result<()> {
        let tags: Vec<String> = tags.to_vec();
        self.run("update event tags", || {
            sqlx::query("UPDATE events SET category_tags = $1, updated_at = now() WHERE id = $2")
                .bind(&tags)
                .bind(event_id)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn update_event_description(&self, event_id: Uuid, description: &str) -> Result<()> {
        self.run("update event description", || {
            sqlx::query(
                "UPDATE events SET event_description = $1, updated_at = now() WHERE id = $2",
            )
            .bind(description)
            .bind(event_id)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn update_event_city(&self, event_id: Uuid, city: &str) -> Result<()> {
        self.run("update event city", || {
            sqlx::query("UPDATE events SET city = $1, updated_at = now() WHERE id = $2")
                .bind(city)
                .bind(event_id)
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Duplicate groups (precomputed in SQL)
    // -----------------------------------------------------------------------

    pub async fn refresh_duplicate_groups(&self) -> Result<()> {
        self.run("refresh duplicate pairs", || {
            sqlx::query("REFRESH MATERIALIZED VIEW duplicate_event_pairs").execute(self.pool())
        })
        .await?;
        self.run("refresh duplicate groups", || {
            sqlx::query("REFRESH MATERIALIZED VIEW duplicate_groups").execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn duplicate_groups(
        &self,
        min_score: f64,
        confidence_level: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<DuplicateGroup>> {
        let rows = self
            .run("load duplicate groups", || {
                sqlx::query_as::<_, DuplicateGroupRow>(
                    "SELECT group_id, event_ids, group_size, max_similarity_score, \
                            avg_similarity_score, confidence_level, has_electioneering \
                     FROM duplicate_groups \
                     WHERE max_similarity_score >= $1 \
                       AND ($2::text IS NULL OR confidence_level = $2) \
                     ORDER BY max_similarity_score DESC \
                     LIMIT $3",
                )
                .bind(min_score)
                .bind(confidence_level)
                .bind(limit.unwrap_or(i64::MAX))
                .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows.into_iter().map(DuplicateGroup::from).collect())
    }

    /// Pairwise similarity details for the events of one group.
    pub async fn duplicate_pairs_for(&self, event_ids: &[Uuid]) -> Result<Vec<DuplicatePair>> {
        let ids: Vec<Uuid> = event_ids.to_vec();
        let rows = self
            .run("load duplicate pairs", || {
                sqlx::query_as::<_, DuplicatePairRow>(
                    "SELECT event1_id, event2_id, event1_name, event2_name, name_similarity, \
                            date_proximity_score, location_score, overall_similarity_score \
                     FROM duplicate_event_pairs \
                     WHERE event1_id = ANY($1) AND event2_id = ANY($1) \
                     ORDER BY overall_similarity_score DESC",
                )
                .bind(&ids)
                .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows.into_iter().map(DuplicatePair::from).collect())
    }

    // -----------------------------------------------------------------------
    // Coordinate backfill
    // -----------------------------------------------------------------------

    /// Distinct `(city, state)` pairs on events missing coordinates.
    pub async fn locations_missing_coordinates(&self) -> Result<Vec<(Option<String>, String)>> {
        let rows = self
            .run("load locations missing coordinates", || {
                sqlx::query_as::<_, (Option<String>, String)>(
                    "SELECT DISTINCT city, state FROM events \
                     WHERE latitude IS NULL AND longitude IS NULL \
                       AND state IS NOT NULL AND state <> ''",
                )
                .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows)
    }

    /// Distinct `(city, state)` pairs on events that still lack
    /// coordinates, including rows whose state is empty (the virtual
    /// pre-pass wants to see those too).
    pub async fn distinct_unresolved_locations(&self) -> Result<Vec<(Option<String>, Option<String>)>> {
        let rows = self
            .run("load unresolved locations", || {
                sqlx::query_as::<_, (Option<String>, Option<String>)>(
                    "SELECT DISTINCT city, state FROM events \
                     WHERE latitude IS NULL AND longitude IS NULL \
                       AND (city IS NOT NULL AND city <> '' OR state IS NOT NULL AND state <> '')",
                )
                .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();
        Ok(rows)
    }

    /// Null out a non-geographic city value for one `(city, state)` pair,
    /// demoting those events to state-level.
    pub async fn clear_event_city(&self, city: &str, state: Option<&str>) -> Result<u64> {
        let result = self
            .run("clear event city", || {
                sqlx::query(
                    "UPDATE events SET city = NULL \
                     WHERE city = $1 AND ($2::text IS NULL AND state IS NULL OR state = $2)",
                )
                .bind(city)
                .bind(state)
                .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }

    /// Null out both city and state for fully virtual locations.
    pub async fn clear_event_location(&self, city: &str, state: Option<&str>) -> Result<u64> {
        let result = self
            .run("clear event location", || {
                sqlx::query(
                    "UPDATE events SET city = NULL, state = NULL \
                     WHERE city = $1 AND ($2::text IS NULL AND state IS NULL OR state = $2)",
                )
                .bind(city)
                .bind(state)
                .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }

    /// Null out a virtual state value (and any city under it).
    pub async fn clear_event_state(&self, state: &str) -> Result<u64> {
        let result = self
            .run("clear event state", || {
                sqlx::query("UPDATE events SET city = NULL, state = NULL WHERE state = $1")
                    .bind(state)
                    .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }

    /// Assign coordinates to every event sharing a `(city, state)`.
    pub async fn update_event_coordinates(
        &self,
        city: Option<&str>,
        state: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<u64> {
        let result = self
            .run("update event coordinates", || {
                sqlx::query(
                    "UPDATE events SET latitude = $1, longitude = $2 \
                     WHERE state = $3 \
                       AND ($4::text IS NULL AND city IS NULL OR city = $4) \
                       AND latitude IS NULL",
                )
                .bind(latitude)
                .bind(longitude)
                .bind(state)
                .bind(city)
                .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }

    /// Clear all stored coordinates (backfill `--reset`).
    pub async fn reset_event_coordinates(&self) -> Result<u64> {
        let result = self
            .run("reset event coordinates", || {
                sqlx::query(
                    "UPDATE events SET latitude = NULL, longitude = NULL \
                     WHERE latitude IS NOT NULL OR longitude IS NOT NULL",
                )
                .execute(self.pool())
            })
            .await?;
        Ok(result.map(|r| r.rows_affected()).unwrap_or(0))
    }
}

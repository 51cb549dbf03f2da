//! Known-actor directory reads, unknown-actor aggregation UPSERTs, and
//! post↔actor edge writes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use groundwire_common::{DirectoryEntry, UnknownActor};

use crate::db::Db;
use crate::error::Result;
use crate::rows::{DirectoryRow, UnknownActorRow};
use crate::{UPDATE_ID_CHUNK, UPSERT_CHUNK};

/// Aggregated unknown-actor observation for one `(platform, username)`,
/// merged on conflict: min first_seen, max last_seen, summed counters.
#[derive(Debug, Clone)]
pub struct UnknownActorUpsert {
    pub platform: String,
    pub detected_username: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: i64,
    pub author_count: i64,
    pub mention_context: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnknownActorKey {
    pub id: Uuid,
    pub platform: String,
    pub detected_username: String,
}

impl Db {
    /// All known `(platform, username)` pairs mapped to their actor IDs.
    pub async fn known_usernames(&self) -> Result<HashMap<(String, String), Uuid>> {
        let rows = self
            .run("load known usernames", || {
                sqlx::query_as::<_, (String, String, Uuid)>(
                    "SELECT platform, username, actor_id FROM actor_usernames",
                )
                .fetch_all(self.pool())
            })
            .await?
            .unwrap_or_default();

        Ok(rows
            .into_iter()
            .map(|(platform, username, actor_id)| {
                ((platform.to_lowercase(), username.to_lowercase()), actor_id)
            })
            .collect())
    }

    /// Directory entries for specific handles, fetched in chunks of ≤100
    /// `(platform, username)` pairs.
    pub async fn directory_entries(
        &self,
        handles: &[(String, String)],
    ) -> Result<Vec<DirectoryEntry>> {
        let mut out = Vec::new();
        for chunk in handles.chunks(UPDATE_ID_CHUNK) {
            let platforms: Vec<String> = chunk.iter().map(|(p, _)| p.clone()).collect();
            let usernames: Vec<String> = chunk.iter().map(|(_, u)| u.clone()).collect();
            let rows = self
                .run("load actor directory", || {
                    sqlx::query_as::<_, DirectoryRow>(
                        "SELECT ad.actor_id, ad.username, ad.platform, ad.actor_type, \
                                ad.name, ad.about, ad.city, ad.state \
                         FROM actor_directory ad \
                         JOIN UNNEST($1::text[], $2::text[]) AS q(platform, username) \
                           ON lower(ad.platform) = q.platform \
                          AND lower(ad.username) = q.username",
                    )
                    .bind(&platforms)
                    .bind(&usernames)
                    .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            out.extend(rows.into_iter().map(DirectoryEntry::from));
        }
        Ok(out)
    }

    /// Directory entries for a set of actor IDs (reverse lookup: actor →
    /// usernames).
    pub async fn directory_by_actor_ids(&self, actor_ids: &[Uuid]) -> Result<Vec<DirectoryEntry>> {
        let mut out = Vec::new();
        for chunk in actor_ids.chunks(UPDATE_ID_CHUNK) {
            let ids: Vec<Uuid> = chunk.to_vec();
            let rows = self
                .run("load directory by actor ids", || {
                    sqlx::query_as::<_, DirectoryRow>(
                        "SELECT actor_id, username, platform, actor_type, name, about, city, state \
                         FROM actor_directory WHERE actor_id = ANY($1)",
                    )
                    .bind(&ids)
                    .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            out.extend(rows.into_iter().map(DirectoryEntry::from));
        }
        Ok(out)
    }

    /// UPSERT aggregated unknown-actor observations. Counters accumulate,
    /// timestamps widen, the first non-empty context sticks.
    pub async fn upsert_unknown_actors(
        &self,
        records: &[UnknownActorUpsert],
    ) -> Result<Vec<UnknownActorKey>> {
        let mut keys = Vec::new();
        for chunk in records.chunks(UPSERT_CHUNK) {
            let rows = self
                .run("upsert unknown actors", || {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO unknown_actors (platform, detected_username, first_seen, \
                         last_seen, mention_count, author_count, mention_context) ",
                    );
                    qb.push_values(chunk.iter(), |mut b, r| {
                        b.push_bind(r.platform.clone())
                            .push_bind(r.detected_username.clone())
                            .push_bind(r.first_seen)
                            .push_bind(r.last_seen)
                            .push_bind(r.mention_count)
                            .push_bind(r.author_count)
                            .push_bind(r.mention_context.clone());
                    });
                    qb.push(
                        " ON CONFLICT (platform, detected_username) DO UPDATE SET \
                         first_seen = LEAST(unknown_actors.first_seen, EXCLUDED.first_seen), \
                         last_seen = GREATEST(unknown_actors.last_seen, EXCLUDED.last_seen), \
                         mention_count = unknown_actors.mention_count + EXCLUDED.mention_count, \
                         author_count = unknown_actors.author_count + EXCLUDED.author_count, \
                         mention_context = COALESCE(unknown_actors.mention_context, EXCLUDED.mention_context) \
                         RETURNING id, platform, detected_username",
                    );
                    let pool = self.pool().clone();
                    async move { qb.build_query_as::<UnknownActorKey>().fetch_all(&pool).await }
                })
                .await?
                .unwrap_or_default();
            keys.extend(rows);
        }
        Ok(keys)
    }

    /// Unknown actors for specific handles, excluding ones already attached
    /// to a curated actor.
    pub async fn unknown_actors_by_handles(
        &self,
        handles: &[(String, String)],
    ) -> Result<Vec<UnknownActor>> {
        let sql = "SELECT ua.id, ua.platform, ua.detected_username, ua.first_seen, ua.last_seen, \
                    ua.mention_count, ua.author_count, ua.mention_context, ua.bio, \
                    ua.display_name, ua.review_status \
             FROM unknown_actors ua \
             JOIN UNNEST($1::text[], $2::text[]) AS q(platform, username) \
               ON ua.platform = q.platform AND ua.detected_username = q.username \
             WHERE ua.review_status <> 'attached'";
        let mut out = Vec::new();
        for chunk in handles.chunks(UPDATE_ID_CHUNK) {
            let platforms: Vec<String> = chunk.iter().map(|(p, _)| p.clone()).collect();
            let usernames: Vec<String> = chunk.iter().map(|(_, u)| u.clone()).collect();
            let rows = self
                .run("load unknown actors", || {
                    sqlx::query_as::<_, UnknownActorRow>(sql)
                        .bind(&platforms)
                        .bind(&usernames)
                        .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            out.extend(rows.into_iter().map(UnknownActor::from));
        }
        Ok(out)
    }

    /// Insert post→known-actor edges, ignoring duplicates.
    pub async fn insert_post_actor_edges(
        &self,
        edges: &[(Uuid, Uuid, &'static str)],
    ) -> Result<u64> {
        let mut written = 0;
        for chunk in edges.chunks(UPSERT_CHUNK) {
            let result = self
                .run("insert post-actor edges", || {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO post_actors (post_id, actor_id, relationship_type) ",
                    );
                    qb.push_values(chunk.iter(), |mut b, (post_id, actor_id, rel)| {
                        b.push_bind(*post_id).push_bind(*actor_id).push_bind(*rel);
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

    /// Insert post→unknown-actor edges keyed on `(post_id, unknown_actor_id)`.
    pub async fn insert_post_unknown_actor_edges(
        &self,
        edges: &[(Uuid, Uuid, &'static str)],
    ) -> Result<u64> {
        let mut written = 0;
        for chunk in edges.chunks(UPSERT_CHUNK) {
            let result = self
                .run("insert post-unknown-actor edges", || {
                    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO post_unknown_actors (post_id, unknown_actor_id, relationship_type) ",
                    );
                    qb.push_values(chunk.iter(), |mut b, (post_id, unknown_id, rel)| {
                        b.push_bind(*post_id).push_bind(*unknown_id).push_bind(*rel);
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

    /// Known-actor edges for a set of posts.
    pub async fn post_actor_edges(&self, post_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>> {
        let mut out = Vec::new();
        for chunk in post_ids.chunks(UPDATE_ID_CHUNK) {
            let ids: Vec<Uuid> = chunk.to_vec();
            let rows = self
                .run("load post-actor edges", || {
                    sqlx::query_as::<_, (Uuid, Uuid)>(
                        "SELECT post_id, actor_id FROM post_actors WHERE post_id = ANY($1)",
                    )
                    .bind(&ids)
                    .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            out.extend(rows);
        }
        Ok(out)
    }

    /// Unknown-actor edges for a set of posts.
    pub async fn post_unknown_actor_edges(&self, post_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>> {
        let mut out = Vec::new();
        for chunk in post_ids.chunks(UPDATE_ID_CHUNK) {
            let ids: Vec<Uuid> = chunk.to_vec();
            let rows = self
                .run("load post-unknown-actor edges", || {
                    sqlx::query_as::<_, (Uuid, Uuid)>(
                        "SELECT post_id, unknown_actor_id FROM post_unknown_actors \
                         WHERE post_id = ANY($1)",
                    )
                    .bind(&ids)
                    .fetch_all(self.pool())
                })
                .await?
                .unwrap_or_default();
            out.extend(rows);
        }
        Ok(out)
    }
}

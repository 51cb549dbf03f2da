//! The extraction engine's tool palette: actor lookup, dynamic-slug
//! search, and linking posts to pre-existing events.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use ai_client::Tool;
use groundwire_common::{text, ActorLookup, Platform};
use groundwire_store::Db;

use crate::linker;

/// Batch-local state shared with the tools: the external-ID → UUID map
/// the model's `post_ids` are translated through.
#[derive(Debug, Default)]
pub struct BatchContext {
    pub post_map: HashMap<String, Uuid>,
}

// =============================================================================
// search_actors
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub platform: String,
    pub handle: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchActorsArgs {
    pub actors: Vec<ActorQuery>,
}

#[derive(Debug, Serialize)]
pub struct ActorRecord {
    pub handle: String,
    pub platform: String,
    #[serde(rename = "type")]
    pub actor_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

pub struct SearchActorsTool {
    pub db: Db,
}

impl SearchActorsTool {
    async fn lookup(&self, queries: &[ActorQuery]) -> Result<Vec<ActorRecord>> {
        let pairs: Vec<(String, String)> = queries
            .iter()
            .map(|q| {
                (
                    Platform::parse(&q.platform).as_str().to_string(),
                    text::normalize_handle(&q.handle, false),
                )
            })
            .collect();

        let known = self.db.directory_entries(&pairs).await?;
        let mut resolved: HashMap<(String, String), ActorLookup> = known
            .into_iter()
            .map(|e| {
                (
                    (e.platform.as_str().to_string(), e.username.to_lowercase()),
                    ActorLookup::Known {
                        actor_id: e.actor_id,
                        actor_type: e.actor_type,
                        name: e.name,
                        about: e.about,
                        city: e.city,
                        state: e.state,
                    },
                )
            })
            .collect();

        let misses: Vec<(String, String)> = pairs
            .iter()
            .filter(|p| !resolved.contains_key(*p))
            .cloned()
            .collect();
        if !misses.is_empty() {
            for u in self.db.unknown_actors_by_handles(&misses).await? {
                resolved.insert(
                    (u.platform.as_str().to_string(), u.detected_username.clone()),
                    ActorLookup::Unknown {
                        unknown_actor_id: u.id,
                        bio: u.bio.or(u.mention_context),
                        display_name: u.display_name,
                    },
                );
            }
        }

        Ok(pairs
            .into_iter()
            .map(|(platform, handle)| {
                match resolved.remove(&(platform.clone(), handle.clone())) {
                    Some(ActorLookup::Known {
                        actor_type,
                        name,
                        about,
                        city,
                        state,
                        ..
                    }) => ActorRecord {
                        handle,
                        platform,
                        actor_type: actor_type.as_str().to_string(),
                        name,
                        about,
                        city,
                        state,
                    },
                    Some(ActorLookup::Unknown {
                        bio, display_name, ..
                    }) => ActorRecord {
                        handle,
                        platform,
                        actor_type: "unknown".to_string(),
                        name: display_name,
                        about: bio,
                        city: None,
                        state: None,
                    },
                    _ => ActorRecord {
                        handle,
                        platform,
                        actor_type: "not_found".to_string(),
                        name: None,
                        about: None,
                        city: None,
                        state: None,
                    },
                }
            })
            .collect())
    }
}

#[async_trait]
impl Tool for SearchActorsTool {
    const NAME: &'static str = "search_actors";
    type Args = SearchActorsArgs;
    type Output = Vec<ActorRecord>;

    fn description(&self) -> String {
        "Look up actor information by handles/usernames. Returns type, name, bio, and \
         location for each handle."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "actors": {
                    "type": "array",
                    "description": "Actors to look up",
                    "items": {
                        "type": "object",
                        "properties": {
                            "platform": {
                                "type": "string",
                                "enum": ["twitter", "instagram", "facebook", "tiktok"]
                            },
                            "handle": { "type": "string" }
                        },
                        "required": ["platform", "handle"]
                    }
                }
            },
            "required": ["actors"]
        })
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output> {
        self.lookup(&args.actors).await
    }
}

// =============================================================================
// search_dynamic_slugs
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchSlugsArgs {
    pub search_term: String,
    #[serde(default)]
    pub parent_tag_filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SlugVariant {
    pub parent_tag: String,
    pub full_slug: String,
}

pub struct SearchSlugsTool {
    pub db: Db,
}

#[async_trait]
impl Tool for SearchSlugsTool {
    const NAME: &'static str = "search_dynamic_slugs";
    type Args = SearchSlugsArgs;
    /// Grouped by identifier so every parent-tag variant is visible for
    /// disambiguation.
    type Output = HashMap<String, Vec<SlugVariant>>;

    fn description(&self) -> String {
        "Search existing dynamic slugs by identifier. Returns all matching slugs across \
         parent tags so the right variant can be chosen; an empty result means a new slug \
         should be created."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_term": {
                    "type": "string",
                    "description": "Term to search for in slug identifiers"
                },
                "parent_tag_filter": {
                    "type": "string",
                    "description": "Optional parent tag to restrict the search",
                    "enum": [
                        "Institution", "BallotMeasure", "Recall", "Conference",
                        "LobbyingTopic", "Primary", "GeneralElection", "Church",
                        "School", "Election", "Candidate"
                    ]
                }
            },
            "required": ["search_term"]
        })
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output> {
        let term = text::normalize_slug_identifier(&args.search_term);
        let slugs = self
            .db
            .search_slugs(&term, args.parent_tag_filter.as_deref())
            .await?;

        let mut grouped: HashMap<String, Vec<SlugVariant>> = HashMap::new();
        for slug in slugs {
            grouped
                .entry(slug.slug_identifier.clone())
                .or_default()
                .push(SlugVariant {
                    parent_tag: slug.parent_tag,
                    full_slug: slug.full_slug,
                });
        }
        Ok(grouped)
    }
}

// =============================================================================
// link_posts_to_existing_event
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LinkPostsArgs {
    pub event_id: String,
    pub post_ids: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct LinkPostsResult {
    pub success: bool,
    pub linked_posts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub migrated_actors: MigratedActors,
}

#[derive(Debug, Default, Serialize)]
pub struct MigratedActors {
    pub instagram: Vec<String>,
    pub twitter: Vec<String>,
}

pub struct LinkPostsTool {
    pub db: Db,
    pub ctx: Arc<BatchContext>,
}

#[async_trait]
impl Tool for LinkPostsTool {
    const NAME: &'static str = "link_posts_to_existing_event";
    type Args = LinkPostsArgs;
    type Output = LinkPostsResult;

    fn description(&self) -> String {
        "Link posts from this batch to an existing event instead of creating a duplicate. \
         Migrates the posts' actor links to the event automatically."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_id": {
                    "type": "string",
                    "description": "UUID of the existing event"
                },
                "post_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Post IDs from this batch to link"
                },
                "reason": {
                    "type": "string",
                    "description": "Why these posts belong to that event"
                }
            },
            "required": ["event_id", "post_ids", "reason"]
        })
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output> {
        let event_id: Uuid = args
            .event_id
            .parse()
            .map_err(|_| anyhow!("invalid event id: {}", args.event_id))?;

        // Translate model-supplied IDs (external or UUID) through the
        // batch's local map.
        let mut post_uuids = Vec::new();
        for raw in &args.post_ids {
            if let Some(uuid) = self.ctx.post_map.get(raw) {
                post_uuids.push(*uuid);
            } else if let Ok(uuid) = raw.parse::<Uuid>() {
                if self.ctx.post_map.values().any(|v| v == &uuid) {
                    post_uuids.push(uuid);
                }
            } else {
                warn!(post_id = %raw, "post id not in current batch");
            }
        }

        if post_uuids.is_empty() {
            return Ok(LinkPostsResult {
                success: false,
                linked_posts: 0,
                message: Some("no valid post IDs found in current batch".to_string()),
                migrated_actors: MigratedActors::default(),
            });
        }

        let links: Vec<(Uuid, Uuid)> = post_uuids.iter().map(|p| (event_id, *p)).collect();
        self.db.insert_event_post_links(&links).await?;

        // Migrate the posts' actor edges onto the event, preserving the
        // known/unknown distinction.
        let empty = crate::event::RawEvent::default();
        linker::link_event_actors(&self.db, event_id, &empty, &post_uuids).await?;

        // Report the migrated handles back to the model.
        let mut migrated = MigratedActors::default();
        for row in self.db.event_actor_link_rows(event_id).await? {
            match row.platform.as_str() {
                "instagram" => migrated.instagram.push(row.actor_handle),
                "twitter" => migrated.twitter.push(row.actor_handle),
                _ => {}
            }
        }

        info!(
            event = %event_id,
            posts = post_uuids.len(),
            reason = %args.reason,
            "posts linked to existing event"
        );

        Ok(LinkPostsResult {
            success: true,
            linked_posts: post_uuids.len(),
            message: None,
            migrated_actors: migrated,
        })
    }
}

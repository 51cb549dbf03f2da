//! Row representations for sqlx, converted into the domain types from
//! `groundwire-common` at the gateway boundary.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use groundwire_common::{
    ActorType, DirectoryEntry, DuplicateGroup, DuplicatePair, DynamicSlug, Event,
    LocationCoordinate, LocationType, PipelineRun, Platform, Post, ReviewStatus, RunStatus,
    StepState, UnknownActor,
};

#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: Uuid,
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
    pub offline_media_url: Option<String>,
    pub processed_for_events: bool,
    pub event_processed_at: Option<DateTime<Utc>>,
}

impl From<PostRow> for Post {
    fn from(r: PostRow) -> Self {
        Post {
            id: r.id,
            platform: Platform::parse(&r.platform),
            external_post_id: r.external_post_id,
            author_handle: r.author_handle,
            author_display_name: r.author_display_name,
            content_text: r.content_text,
            timestamp: r.posted_at,
            media_urls: r.media_urls,
            mentioned_handles: r.mentioned_handles,
            hashtags: r.hashtags,
            like_count: r.like_count,
            reply_count: r.reply_count,
            share_count: r.share_count,
            location_text: r.location_text,
            post_url: r.post_url,
            offline_media_url: r.offline_media_url,
            processed_for_events: r.processed_for_events,
            event_processed_at: r.event_processed_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DirectoryRow {
    pub actor_id: Uuid,
    pub username: String,
    pub platform: String,
    pub actor_type: String,
    pub name: Option<String>,
    pub about: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl From<DirectoryRow> for DirectoryEntry {
    fn from(r: DirectoryRow) -> Self {
        DirectoryEntry {
            actor_id: r.actor_id,
            username: r.username,
            platform: Platform::parse(&r.platform),
            actor_type: ActorType::parse(&r.actor_type).unwrap_or(ActorType::Person),
            name: r.name,
            about: r.about,
            city: r.city,
            state: r.state,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UnknownActorRow {
    pub id: Uuid,
    pub platform: String,
    pub detected_username: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: i64,
    pub author_count: i64,
    pub mention_context: Option<String>,
    pub bio: Option<String>,
    pub display_name: Option<String>,
    pub review_status: String,
}

impl From<UnknownActorRow> for UnknownActor {
    fn from(r: UnknownActorRow) -> Self {
        UnknownActor {
            id: r.id,
            platform: Platform::parse(&r.platform),
            detected_username: r.detected_username,
            first_seen: r.first_seen,
            last_seen: r.last_seen,
            mention_count: r.mention_count,
            author_count: r.author_count,
            mention_context: r.mention_context,
            bio: r.bio,
            display_name: r.display_name,
            review_status: ReviewStatus::parse(&r.review_status),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
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
    pub verified: bool,
    pub content_hash: String,
    pub project_id: Option<Uuid>,
    pub embedding: Option<Vec<f32>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<EventRow> for Event {
    fn from(r: EventRow) -> Self {
        Event {
            id: r.id,
            event_name: r.event_name,
            event_date: r.event_date,
            event_description: r.event_description,
            location: r.location,
            city: r.city,
            state: r.state,
            participants: r.participants,
            category_tags: r.category_tags,
            source_post_ids: r.source_post_ids,
            confidence_score: r.confidence_score,
            extracted_by: r.extracted_by,
            extracted_at: r.extracted_at,
            verified: r.verified,
            content_hash: r.content_hash,
            project_id: r.project_id,
            embedding: r.embedding,
            latitude: r.latitude,
            longitude: r.longitude,
        }
    }
}

/// Result of a batch event UPSERT, one entry per input row.
#[derive(Debug, Clone, FromRow)]
pub struct EventUpsertOutcome {
    pub id: Uuid,
    pub content_hash: String,
    pub is_new: bool,
}

/// Flat write-side representation of an event→actor edge. Unknown actors
/// carry a `unknown_<uuid>` sentinel handle and `platform = "unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventActorLinkRow {
    pub event_id: Uuid,
    pub actor_handle: String,
    pub platform: String,
    pub actor_type: String,
    pub actor_id: Option<Uuid>,
    pub unknown_actor_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EventActorLinkReadRow {
    pub event_id: Uuid,
    pub actor_handle: String,
    pub platform: String,
    pub actor_type: Option<String>,
    pub actor_id: Option<Uuid>,
    pub unknown_actor_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SlugRow {
    pub parent_tag: String,
    pub slug_identifier: String,
    pub full_slug: String,
}

impl From<SlugRow> for DynamicSlug {
    fn from(r: SlugRow) -> Self {
        DynamicSlug {
            parent_tag: r.parent_tag,
            slug_identifier: r.slug_identifier,
            full_slug: r.full_slug,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CoordinateRow {
    pub city: Option<String>,
    pub state: String,
    pub location_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub source: String,
    pub confidence: f64,
    pub last_verified: DateTime<Utc>,
}

impl From<CoordinateRow> for LocationCoordinate {
    fn from(r: CoordinateRow) -> Self {
        LocationCoordinate {
            city: r.city,
            state: r.state,
            location_type: if r.location_type == "state" {
                LocationType::State
            } else {
                LocationType::City
            },
            latitude: r.latitude,
            longitude: r.longitude,
            source: r.source,
            confidence: r.confidence,
            last_verified: r.last_verified,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DuplicateGroupRow {
    pub group_id: i64,
    pub event_ids: Vec<Uuid>,
    pub group_size: i64,
    pub max_similarity_score: f64,
    pub avg_similarity_score: f64,
    pub confidence_level: String,
    pub has_electioneering: bool,
}

impl From<DuplicateGroupRow> for DuplicateGroup {
    fn from(r: DuplicateGroupRow) -> Self {
        DuplicateGroup {
            group_id: r.group_id,
            event_ids: r.event_ids,
            group_size: r.group_size,
            max_similarity_score: r.max_similarity_score,
            avg_similarity_score: r.avg_similarity_score,
            confidence_level: r.confidence_level,
            has_electioneering: r.has_electioneering,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DuplicatePairRow {
    pub event1_id: Uuid,
    pub event2_id: Uuid,
    pub event1_name: String,
    pub event2_name: String,
    pub name_similarity: f64,
    pub date_proximity_score: f64,
    pub location_score: f64,
    pub overall_similarity_score: f64,
}

impl From<DuplicatePairRow> for DuplicatePair {
    fn from(r: DuplicatePairRow) -> Self {
        DuplicatePair {
            event1_id: r.event1_id,
            event2_id: r.event2_id,
            event1_name: r.event1_name,
            event2_name: r.event2_name,
            name_similarity: r.name_similarity,
            date_proximity_score: r.date_proximity_score,
            location_score: r.location_score,
            overall_similarity_score: r.overall_similarity_score,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PipelineRunRow {
    pub id: Uuid,
    pub status: String,
    pub include_instagram: bool,
    pub current_step: Option<String>,
    pub step_states: serde_json::Value,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PipelineRunRow> for PipelineRun {
    fn from(r: PipelineRunRow) -> Self {
        let step_states: std::collections::BTreeMap<String, StepState> =
            serde_json::from_value(r.step_states).unwrap_or_default();
        PipelineRun {
            id: r.id,
            status: RunStatus::parse(&r.status),
            include_instagram: r.include_instagram,
            current_step: r.current_step,
            step_states,
            started_at: r.started_at,
            completed_at: r.completed_at,
            error_message: r.error_message,
            created_at: r.created_at,
        }
    }
}

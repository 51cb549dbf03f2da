//! Domain types shared across the pipeline crates.
//!
//! Storage row representations live in `groundwire-store`; these are the
//! in-memory shapes the components pass around.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Twitter,
    Instagram,
    TruthSocial,
    Facebook,
    TikTok,
    Other(String),
}

impl Platform {
    /// Canonicalize platform names: `x` → twitter, `truth`/`truthsocial` →
    /// truth_social, everything else lowercased.
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "twitter" | "x" => Platform::Twitter,
            "instagram" => Platform::Instagram,
            "truth_social" | "truthsocial" | "truth" => Platform::TruthSocial,
            "facebook" => Platform::Facebook,
            "tiktok" => Platform::TikTok,
            other => Platform::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::TruthSocial => "truth_social",
            Platform::Facebook => "facebook",
            Platform::TikTok => "tiktok",
            Platform::Other(s) => s,
        }
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Platform::parse(&s)
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.as_str().to_string()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// Terminal sentinels stored in the `offline_media_url` column when every
/// candidate URL for a post has been confirmed unreachable.
pub const MEDIA_EXPIRED: &str = "EXPIRED";
pub const MEDIA_PERMANENTLY_EXPIRED: &str = "PERMANENTLY_EXPIRED";

/// State of a post's archived media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineMedia {
    /// Stable object-store URL.
    Url(String),
    Expired,
    PermanentlyExpired,
    Missing,
}

impl OfflineMedia {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => OfflineMedia::Missing,
            Some(s) => match s {
                MEDIA_EXPIRED => OfflineMedia::Expired,
                MEDIA_PERMANENTLY_EXPIRED => OfflineMedia::PermanentlyExpired,
                s if s.starts_with("http") => OfflineMedia::Url(s.to_string()),
                // Legacy sentinels (BROKEN, ERROR, empty) read as missing so
                // the fetcher retries them.
                _ => OfflineMedia::Missing,
            },
        }
    }

    pub fn as_column_value(&self) -> Option<String> {
        match self {
            OfflineMedia::Url(u) => Some(u.clone()),
            OfflineMedia::Expired => Some(MEDIA_EXPIRED.to_string()),
            OfflineMedia::PermanentlyExpired => Some(MEDIA_PERMANENTLY_EXPIRED.to_string()),
            OfflineMedia::Missing => None,
        }
    }

    /// Whether the fetcher still owes this post a download attempt.
    pub fn needs_download(&self) -> bool {
        matches!(self, OfflineMedia::Missing | OfflineMedia::Expired)
    }
}

/// One canonical social-media item.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: Uuid,
    pub platform: Platform,
    pub external_post_id: String,
    pub author_handle: String,
    pub author_display_name: Option<String>,
    pub content_text: String,
    pub timestamp: Option<DateTime<Utc>>,
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

impl Post {
    pub fn offline_media(&self) -> OfflineMedia {
        OfflineMedia::parse(self.offline_media_url.as_deref())
    }

    /// A post carries at most one prompt image: a valid offline URL.
    pub fn has_image(&self) -> bool {
        matches!(self.offline_media(), OfflineMedia::Url(_))
    }
}

/// How a post relates to a known actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostActorRelation {
    Author,
    Mentioned,
    Tagged,
}

impl PostActorRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostActorRelation::Author => "author",
            PostActorRelation::Mentioned => "mentioned",
            PostActorRelation::Tagged => "tagged",
        }
    }
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Person,
    Chapter,
    Organization,
}

impl ActorType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "person" => Some(ActorType::Person),
            "chapter" => Some(ActorType::Chapter),
            "organization" => Some(ActorType::Organization),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Person => "person",
            ActorType::Chapter => "chapter",
            ActorType::Organization => "organization",
        }
    }
}

/// A curated, known entity. Created out-of-band; the pipeline only reads
/// these and links events to them.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub actor_type: ActorType,
    pub name: String,
    pub about: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// A row from the actor directory view: one username joined to its actor.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub actor_id: Uuid,
    pub username: String,
    pub platform: Platform,
    pub actor_type: ActorType,
    pub name: Option<String>,
    pub about: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pending,
    Attached,
    Ignored,
}

impl ReviewStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "attached" => ReviewStatus::Attached,
            "ignored" => ReviewStatus::Ignored,
            _ => ReviewStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Attached => "attached",
            ReviewStatus::Ignored => "ignored",
        }
    }
}

/// A handle observed in posts that is not yet a curated actor.
#[derive(Debug, Clone)]
pub struct UnknownActor {
    pub id: Uuid,
    pub platform: Platform,
    pub detected_username: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: i64,
    pub author_count: i64,
    pub mention_context: Option<String>,
    pub bio: Option<String>,
    pub display_name: Option<String>,
    pub review_status: ReviewStatus,
}

/// The result of looking an actor handle up for the model.
#[derive(Debug, Clone)]
pub enum ActorLookup {
    Known {
        actor_id: Uuid,
        actor_type: ActorType,
        name: Option<String>,
        about: Option<String>,
        city: Option<String>,
        state: Option<String>,
    },
    Unknown {
        unknown_actor_id: Uuid,
        bio: Option<String>,
        display_name: Option<String>,
    },
    NotFound,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A structured event record emitted by the extractor.
#[derive(Debug, Clone)]
pub struct Event {
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

/// One event→actor edge, before it is flattened into the single-table
/// representation at the persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorLink {
    Known {
        actor_id: Uuid,
        handle: String,
        platform: Platform,
        actor_type: ActorType,
    },
    Unknown {
        unknown_actor_id: Uuid,
    },
}

impl ActorLink {
    /// The `actor_handle` column value. Unknown actors use a
    /// `unknown_<uuid>` sentinel so the `(event_id, actor_handle, platform)`
    /// uniqueness key covers both variants in one namespace.
    pub fn handle_column(&self) -> String {
        match self {
            ActorLink::Known { handle, .. } => handle.clone(),
            ActorLink::Unknown { unknown_actor_id } => format!("unknown_{unknown_actor_id}"),
        }
    }

    pub fn platform_column(&self) -> String {
        match self {
            ActorLink::Known { platform, .. } => platform.as_str().to_string(),
            ActorLink::Unknown { .. } => "unknown".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dynamic slugs
// ---------------------------------------------------------------------------

/// Parent tags whose slugs are persisted and cached. Anything else in a
/// `Parent:identifier` tag passes through untouched.
pub const CACHEABLE_PARENT_TAGS: &[&str] = &[
    "Institution",
    "BallotMeasure",
    "Recall",
    "Conference",
    "LobbyingTopic",
    "Primary",
    "GeneralElection",
    "Church",
    "School",
    "Election",
    "Candidate",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicSlug {
    pub parent_tag: String,
    pub slug_identifier: String,
    pub full_slug: String,
}

impl DynamicSlug {
    pub fn new(parent_tag: &str, identifier: &str) -> Self {
        let slug_identifier = crate::text::normalize_slug_identifier(identifier);
        let full_slug = format!("{parent_tag}:{slug_identifier}");
        Self {
            parent_tag: parent_tag.to_string(),
            slug_identifier,
            full_slug,
        }
    }

    pub fn is_cacheable(parent_tag: &str) -> bool {
        CACHEABLE_PARENT_TAGS.iter().any(|t| *t == parent_tag)
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    City,
    State,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::City => "city",
            LocationType::State => "state",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationCoordinate {
    pub city: Option<String>,
    pub state: String,
    pub location_type: LocationType,
    pub latitude: f64,
    pub longitude: f64,
    pub source: String,
    pub confidence: f64,
    pub last_verified: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Duplicate groups
// ---------------------------------------------------------------------------

/// One precomputed cluster of candidate-duplicate events.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub group_id: i64,
    pub event_ids: Vec<Uuid>,
    pub group_size: i64,
    pub max_similarity_score: f64,
    pub avg_similarity_score: f64,
    pub confidence_level: String,
    pub has_electioneering: bool,
}

#[derive(Debug, Clone)]
pub struct DuplicatePair {
    pub event1_id: Uuid,
    pub event2_id: Uuid,
    pub event1_name: String,
    pub event2_name: String,
    pub name_similarity: f64,
    pub date_proximity_score: f64,
    pub location_score: f64,
    pub overall_similarity_score: f64,
}

// ---------------------------------------------------------------------------
// Pipeline runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "running" => RunStatus::Running,
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            "cancelled" => RunStatus::Cancelled,
            _ => RunStatus::Queued,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Skipped,
    Failed,
}

/// Durable per-step progress, serialized into `pipeline_runs.step_states`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_tail: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub include_instagram: bool,
    pub current_step: Option<String>,
    pub step_states: std::collections::BTreeMap<String, StepState>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_canonicalization() {
        assert_eq!(Platform::parse("X"), Platform::Twitter);
        assert_eq!(Platform::parse("truthsocial"), Platform::TruthSocial);
        assert_eq!(Platform::parse("Truth"), Platform::TruthSocial);
        assert_eq!(Platform::parse("Instagram"), Platform::Instagram);
        assert_eq!(
            Platform::parse("Bluesky"),
            Platform::Other("bluesky".to_string())
        );
    }

    #[test]
    fn offline_media_sentinels_round_trip() {
        assert_eq!(OfflineMedia::parse(Some("EXPIRED")), OfflineMedia::Expired);
        assert_eq!(
            OfflineMedia::parse(Some("PERMANENTLY_EXPIRED")),
            OfflineMedia::PermanentlyExpired
        );
        assert_eq!(
            OfflineMedia::parse(Some("https://cdn.example.com/a.jpg")),
            OfflineMedia::Url("https://cdn.example.com/a.jpg".to_string())
        );
        assert_eq!(OfflineMedia::parse(Some("BROKEN")), OfflineMedia::Missing);
        assert_eq!(OfflineMedia::parse(None), OfflineMedia::Missing);
        assert!(OfflineMedia::Expired.needs_download());
        assert!(!OfflineMedia::PermanentlyExpired.needs_download());
    }

    #[test]
    fn unknown_actor_link_uses_sentinel_handle() {
        let id = Uuid::new_v4();
        let link = ActorLink::Unknown {
            unknown_actor_id: id,
        };
        assert_eq!(link.handle_column(), format!("unknown_{id}"));
        assert_eq!(link.platform_column(), "unknown");
    }

    #[test]
    fn dynamic_slug_normalizes_identifier() {
        let slug = DynamicSlug::new("Election", "AZ Senate Kari-Lake  2024");
        assert_eq!(slug.slug_identifier, "az_senate_kari_lake_2024");
        assert_eq!(slug.full_slug, "Election:az_senate_kari_lake_2024");
    }
}

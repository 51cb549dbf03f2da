//! Unified actor linker: one pass that materializes every event→actor
//! edge — actors already linked to the event's source posts, unknown
//! actors on those posts, and `@handle` mentions found in the event's own
//! text — without ever writing the same logical actor twice.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::debug;
use uuid::Uuid;

use groundwire_common::{text, ActorType, DirectoryEntry, Platform};
use groundwire_store::rows::EventActorLinkRow;
use groundwire_store::Db;

use crate::event::RawEvent;

/// A known actor reached through a source post.
#[derive(Debug, Clone)]
pub struct KnownPostEdge {
    pub actor_id: Uuid,
    pub username: String,
    pub platform: Platform,
    pub actor_type: ActorType,
}

/// Candidate handles from the event's own fields: `@` mentions in
/// Participants / EventDescription / Justification plus the two handle
/// arrays, all lowercased.
pub fn handles_from_event(event: &RawEvent) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut handles = Vec::new();

    let text_blob = format!(
        "{} {} {}",
        event.participants.as_deref().unwrap_or(""),
        event.event_description,
        event.justification.as_deref().unwrap_or(""),
    );
    for handle in text::extract_handles(&text_blob) {
        if seen.insert(handle.clone()) {
            handles.push(handle);
        }
    }

    for raw in event.instagram_handles.iter().chain(&event.twitter_handles) {
        let normalized = text::normalize_handle(raw, false);
        if !normalized.is_empty() && seen.insert(normalized.clone()) {
            handles.push(normalized);
        }
    }

    handles
}

/// Pure link-set computation. Known rows are keyed by
/// `(platform, handle)`, unknown rows by `unknown_actor_id`; handles
/// already covered by a post edge are not probed again.
pub fn compute_links(
    event_id: Uuid,
    known_post_edges: &[KnownPostEdge],
    unknown_post_edge_ids: &[Uuid],
    text_handles: &[String],
    known_directory: &HashMap<(String, String), DirectoryEntry>,
    unknown_directory: &HashMap<(String, String), Uuid>,
) -> Vec<EventActorLinkRow> {
    let mut known: HashMap<(String, String), EventActorLinkRow> = HashMap::new();
    let mut unknown: HashMap<Uuid, EventActorLinkRow> = HashMap::new();

    // (a) known actors reached through posts
    for edge in known_post_edges {
        let platform = edge.platform.as_str().to_string();
        let handle = edge.username.to_lowercase();
        known
            .entry((platform.clone(), handle.clone()))
            .or_insert_with(|| EventActorLinkRow {
                event_id,
                actor_handle: handle,
                platform,
                actor_type: edge.actor_type.as_str().to_string(),
                actor_id: Some(edge.actor_id),
                unknown_actor_id: None,
            });
    }

    // (b) unknown actors reached through posts
    for unknown_id in unknown_post_edge_ids {
        unknown
            .entry(*unknown_id)
            .or_insert_with(|| unknown_row(event_id, *unknown_id));
    }

    // (c) handles from the event's own text, known directory first, then
    // unknown, probing both platforms.
    for handle in text_handles {
        let covered = known
            .keys()
            .any(|(_, existing_handle)| existing_handle == handle);
        if covered {
            continue;
        }

        let mut resolved = false;
        for platform in ["instagram", "twitter"] {
            let key = (platform.to_string(), handle.clone());
            if let Some(entry) = known_directory.get(&key) {
                known.entry(key).or_insert_with(|| EventActorLinkRow {
                    event_id,
                    actor_handle: handle.clone(),
                    platform: platform.to_string(),
                    actor_type: entry.actor_type.as_str().to_string(),
                    actor_id: Some(entry.actor_id),
                    unknown_actor_id: None,
                });
                resolved = true;
            }
        }
        if resolved {
            continue;
        }

        for platform in ["instagram", "twitter"] {
            let key = (platform.to_string(), handle.clone());
            if let Some(unknown_id) = unknown_directory.get(&key) {
                unknown
                    .entry(*unknown_id)
                    .or_insert_with(|| unknown_row(event_id, *unknown_id));
                break;
            }
        }
    }

    let mut rows: Vec<EventActorLinkRow> = known.into_values().collect();
    rows.extend(unknown.into_values());
    rows.sort_by(|a, b| (&a.platform, &a.actor_handle).cmp(&(&b.platform, &b.actor_handle)));
    rows
}

fn unknown_row(event_id: Uuid, unknown_actor_id: Uuid) -> EventActorLinkRow {
    EventActorLinkRow {
        event_id,
        actor_handle: format!("unknown_{unknown_actor_id}"),
        platform: "unknown".to_string(),
        actor_type: "unknown".to_string(),
        actor_id: None,
        unknown_actor_id: Some(unknown_actor_id),
    }
}

/// Fetch directories and post edges, compute the combined link set, and
/// UPSERT it. Returns `(known, unknown)` row counts.
pub async fn link_event_actors(
    db: &Db,
    event_id: Uuid,
    event: &RawEvent,
    post_ids: &[Uuid],
) -> Result<(usize, usize)> {
    let handles = handles_from_event(event);

    // Directories for just the handles in play, probing both platforms.
    let mut pairs = Vec::with_capacity(handles.len() * 2);
    for handle in &handles {
        pairs.push(("instagram".to_string(), handle.clone()));
        pairs.push(("twitter".to_string(), handle.clone()));
    }

    let known_directory: HashMap<(String, String), DirectoryEntry> = db
        .directory_entries(&pairs)
        .await?
        .into_iter()
        .map(|e| {
            (
                (e.platform.as_str().to_string(), e.username.to_lowercase()),
                e,
            )
        })
        .collect();

    let unknown_directory: HashMap<(String, String), Uuid> = db
        .unknown_actors_by_handles(&pairs)
        .await?
        .into_iter()
        .map(|u| {
            (
                (u.platform.as_str().to_string(), u.detected_username.clone()),
                u.id,
            )
        })
        .collect();

    // Post-linked actors: actor IDs back to usernames via the directory.
    let actor_ids: Vec<Uuid> = db
        .post_actor_edges(post_ids)
        .await?
        .into_iter()
        .map(|(_, actor_id)| actor_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let known_post_edges: Vec<KnownPostEdge> = db
        .directory_by_actor_ids(&actor_ids)
        .await?
        .into_iter()
        .map(|e| KnownPostEdge {
            actor_id: e.actor_id,
            username: e.username,
            platform: e.platform,
            actor_type: e.actor_type,
        })
        .collect();

    let unknown_post_edge_ids: Vec<Uuid> = db
        .post_unknown_actor_edges(post_ids)
        .await?
        .into_iter()
        .map(|(_, unknown_id)| unknown_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let rows = compute_links(
        event_id,
        &known_post_edges,
        &unknown_post_edge_ids,
        &handles,
        &known_directory,
        &unknown_directory,
    );

    let known_count = rows.iter().filter(|r| r.actor_id.is_some()).count();
    let unknown_count = rows.len() - known_count;

    if !rows.is_empty() {
        db.insert_event_actor_links(&rows).await?;
    }

    debug!(
        event = %event_id,
        known = known_count,
        unknown = unknown_count,
        "event actor links materialized"
    );
    Ok((known_count, unknown_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(platform: &str, username: &str, actor_id: Uuid) -> DirectoryEntry {
        DirectoryEntry {
            actor_id,
            username: username.to_string(),
            platform: Platform::parse(platform),
            actor_type: ActorType::Person,
            name: None,
            about: None,
            city: None,
            state: None,
        }
    }

    #[test]
    fn unifies_post_actors_unknowns_and_text_mentions() {
        let event_id = Uuid::new_v4();
        let known_actor = Uuid::new_v4();
        let unknown_id = Uuid::new_v4();
        let jane_id = Uuid::new_v4();

        let known_post_edges = vec![KnownPostEdge {
            actor_id: known_actor,
            username: "ChapterAZ".to_string(),
            platform: Platform::Instagram,
            actor_type: ActorType::Chapter,
        }];
        let unknown_post_edge_ids = vec![unknown_id];
        let text_handles = vec!["jane".to_string()];

        let mut known_directory = HashMap::new();
        known_directory.insert(
            ("twitter".to_string(), "jane".to_string()),
            entry("twitter", "jane", jane_id),
        );
        let unknown_directory = HashMap::new();

        let rows = compute_links(
            event_id,
            &known_post_edges,
            &unknown_post_edge_ids,
            &text_handles,
            &known_directory,
            &unknown_directory,
        );

        assert_eq!(rows.len(), 3);

        let chapter = rows
            .iter()
            .find(|r| r.actor_handle == "chapteraz")
            .unwrap();
        assert_eq!(chapter.platform, "instagram");
        assert_eq!(chapter.actor_id, Some(known_actor));

        let unknown = rows
            .iter()
            .find(|r| r.unknown_actor_id == Some(unknown_id))
            .unwrap();
        assert_eq!(unknown.actor_handle, format!("unknown_{unknown_id}"));
        assert_eq!(unknown.platform, "unknown");

        let jane = rows.iter().find(|r| r.actor_handle == "jane").unwrap();
        assert_eq!(jane.platform, "twitter");
        assert_eq!(jane.actor_id, Some(jane_id));
    }

    #[test]
    fn post_covered_handles_are_not_probed_again() {
        let event_id = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let known_post_edges = vec![KnownPostEdge {
            actor_id: actor,
            username: "jane".to_string(),
            platform: Platform::Twitter,
            actor_type: ActorType::Person,
        }];

        // Directory also knows jane on instagram; the post edge already
        // covers the handle, so no second row appears.
        let mut known_directory = HashMap::new();
        known_directory.insert(
            ("instagram".to_string(), "jane".to_string()),
            entry("instagram", "jane", Uuid::new_v4()),
        );

        let rows = compute_links(
            event_id,
            &known_post_edges,
            &[],
            &["jane".to_string()],
            &known_directory,
            &HashMap::new(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].platform, "twitter");
    }

    #[test]
    fn duplicate_unknown_ids_collapse() {
        let event_id = Uuid::new_v4();
        let unknown_id = Uuid::new_v4();
        let rows = compute_links(
            event_id,
            &[],
            &[unknown_id, unknown_id],
            &[],
            &HashMap::new(),
            &HashMap::new(),
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn text_handle_falls_back_to_unknown_directory() {
        let event_id = Uuid::new_v4();
        let unknown_id = Uuid::new_v4();
        let mut unknown_directory = HashMap::new();
        unknown_directory.insert(("twitter".to_string(), "mystery".to_string()), unknown_id);

        let rows = compute_links(
            event_id,
            &[],
            &[],
            &["mystery".to_string()],
            &HashMap::new(),
            &unknown_directory,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unknown_actor_id, Some(unknown_id));
    }

    #[test]
    fn handles_extracted_from_all_event_text_fields() {
        let event = RawEvent {
            event_description: "Canvass led by @Jane_Doe".to_string(),
            justification: Some("mentions @bob".to_string()),
            participants: Some("@carol and friends".to_string()),
            twitter_handles: vec!["@Dave".to_string()],
            ..Default::default()
        };
        let handles = handles_from_event(&event);
        assert_eq!(handles, vec!["carol", "jane_doe", "bob", "dave"]);
    }
}

//! The merge executor. Merges are per-pair: a failed pair is logged and
//! skipped, never aborting the rest of the run. Dry-run mode prints the
//! planned operations and writes nothing.

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use ai_client::Gemini;
use groundwire_common::{DuplicateGroup, Event};
use groundwire_store::rows::{EventActorLinkReadRow, EventActorLinkRow};
use groundwire_store::Db;

use crate::decision;

#[derive(Debug, Clone)]
pub struct DedupSettings {
    pub dry_run: bool,
    pub min_score: f64,
    pub confidence_filter: Option<String>,
    pub limit: Option<i64>,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            dry_run: true,
            min_score: 0.5,
            confidence_filter: None,
            limit: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DedupStats {
    pub groups_analyzed: u64,
    pub merges_planned: u64,
    pub merges_completed: u64,
    pub merges_failed: u64,
    pub merges_blocked: u64,
}

impl fmt::Display for DedupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "groups {}, merges {} planned / {} completed / {} failed / {} blocked",
            self.groups_analyzed,
            self.merges_planned,
            self.merges_completed,
            self.merges_failed,
            self.merges_blocked,
        )
    }
}

pub struct GroupDeduplicator {
    db: Db,
    gemini: Gemini,
    settings: DedupSettings,
    stats: DedupStats,
}

impl GroupDeduplicator {
    pub fn new(db: Db, gemini: Gemini, settings: DedupSettings) -> Self {
        Self {
            db,
            gemini,
            settings,
            stats: DedupStats::default(),
        }
    }

    pub async fn run(mut self) -> Result<DedupStats> {
        if let Err(e) = self.db.refresh_duplicate_groups().await {
            warn!(error = %e, "duplicate group refresh failed, reading stale view");
        }

        let groups = self
            .db
            .duplicate_groups(
                self.settings.min_score,
                self.settings.confidence_filter.as_deref(),
                self.settings.limit,
            )
            .await?;
        info!(
            groups = groups.len(),
            dry_run = self.settings.dry_run,
            "duplicate groups loaded"
        );

        for group in groups {
            match self.process_group(&group).await {
                Ok(()) => self.stats.groups_analyzed += 1,
                Err(e) => warn!(group = group.group_id, error = %e, "group analysis failed"),
            }
        }

        info!(stats = %self.stats, "dedup run complete");
        Ok(self.stats)
    }

    async fn process_group(&mut self, group: &DuplicateGroup) -> Result<()> {
        if group.event_ids.len() < 2 {
            return Ok(());
        }

        let events = self.db.events_by_ids(&group.event_ids).await?;
        if events.len() < 2 {
            return Ok(());
        }
        let pairs = self.db.duplicate_pairs_for(&group.event_ids).await?;

        let prompt = decision::build_prompt(group, &events, &pairs);
        let response = self
            .gemini
            .complete_json(decision::SYSTEM_PROMPT, &prompt)
            .await?;

        let Some(parsed) = decision::parse_decision(&response) else {
            warn!(group = group.group_id, "model produced no parsable decision");
            return Ok(());
        };

        for (master_id, duplicate_id, reasoning) in decision::accepted_merges(&parsed) {
            self.stats.merges_planned += 1;

            let master = events.iter().find(|e| e.id == master_id);
            let duplicate = events.iter().find(|e| e.id == duplicate_id);
            let (Some(master), Some(duplicate)) = (master, duplicate) else {
                warn!(%master_id, %duplicate_id, "merge references events outside the group");
                self.stats.merges_failed += 1;
                continue;
            };

            // Defensive date guard on top of the prompt instruction.
            if group.has_electioneering && master.event_date != duplicate.event_date {
                info!(
                    master = %master.event_name,
                    duplicate = %duplicate.event_name,
                    "electioneering merge across differing dates blocked"
                );
                self.stats.merges_blocked += 1;
                continue;
            }

            if self.settings.dry_run {
                let merged = merged_tags(&master.category_tags, &duplicate.category_tags);
                info!(
                    master = %master.event_name,
                    duplicate = %duplicate.event_name,
                    tags_after = merged.as_ref().map(Vec::len).unwrap_or(master.category_tags.len()),
                    reasoning,
                    "[dry run] would merge"
                );
                continue;
            }

            match self.merge_pair(master, duplicate).await {
                Ok(()) => {
                    self.stats.merges_completed += 1;
                    info!(
                        master = %master.event_name,
                        duplicate = %duplicate.event_name,
                        reasoning,
                        "merged duplicate event"
                    );
                }
                Err(e) => {
                    self.stats.merges_failed += 1;
                    warn!(%master_id, %duplicate_id, error = %e, "merge failed, pair skipped");
                }
            }
        }

        Ok(())
    }

    /// Merge `duplicate` into `master`. Ordering matters: links must be
    /// gone from the duplicate before its row can be deleted, so a failure
    /// anywhere still force-cleans the child links first.
    async fn merge_pair(&self, master: &Event, duplicate: &Event) -> Result<()> {
        let merge_result = self.merge_content_and_links(master, duplicate).await;

        if let Err(e) = &merge_result {
            warn!(error = %e, "merge step failed; force-cleaning duplicate links before delete");
            if let Err(cleanup) = self.force_clean_links(duplicate.id).await {
                // Without link cleanup the delete would hit FK violations.
                anyhow::bail!("link cleanup failed, duplicate left in place: {cleanup}");
            }
        }

        if self.db.delete_event(duplicate.id).await.is_err() {
            // One forced cleanup, then a single retry of the delete.
            self.force_clean_links(duplicate.id).await?;
            self.db.delete_event(duplicate.id).await?;
        }

        merge_result
    }

    async fn merge_content_and_links(&self, master: &Event, duplicate: &Event) -> Result<()> {
        // 1. Union the tags into the master.
        if let Some(merged) = merged_tags(&master.category_tags, &duplicate.category_tags) {
            self.db.update_event_tags(master.id, &merged).await?;
        }

        // 2. Copy description and city where the master lacks them.
        if master.event_description.trim().is_empty()
            && !duplicate.event_description.trim().is_empty()
        {
            self.db
                .update_event_description(master.id, &duplicate.event_description)
                .await?;
        }
        if master.city.as_deref().unwrap_or("").is_empty() {
            if let Some(city) = duplicate.city.as_deref().filter(|c| !c.is_empty()) {
                self.db.update_event_city(master.id, city).await?;
            }
        }

        // 3. Move post links not already on the master, then drop the
        // duplicate's.
        let dup_posts = self.db.event_post_link_ids(duplicate.id).await?;
        if !dup_posts.is_empty() {
            let master_posts: HashSet<Uuid> = self
                .db
                .event_post_link_ids(master.id)
                .await?
                .into_iter()
                .collect();
            let new_links: Vec<(Uuid, Uuid)> = dup_posts
                .iter()
                .filter(|p| !master_posts.contains(p))
                .map(|p| (master.id, *p))
                .collect();
            if !new_links.is_empty() {
                self.db.insert_event_post_links(&new_links).await?;
            }
            self.db.delete_event_post_links(duplicate.id).await?;
        }

        // 4. Same for actor links, colliding on either uniqueness key.
        let dup_actors = self.db.event_actor_link_rows(duplicate.id).await?;
        if !dup_actors.is_empty() {
            let master_actors = self.db.event_actor_link_rows(master.id).await?;
            let to_migrate = actor_rows_to_migrate(master.id, &master_actors, &dup_actors);
            if !to_migrate.is_empty() {
                self.db.insert_event_actor_links(&to_migrate).await?;
            }
            self.db.delete_event_actor_links(duplicate.id).await?;
        }

        Ok(())
    }

    async fn force_clean_links(&self, event_id: Uuid) -> Result<()> {
        self.db.delete_event_post_links(event_id).await?;
        self.db.delete_event_actor_links(event_id).await?;
        Ok(())
    }
}

/// Union of tags, master's ordering first. `None` when the duplicate adds
/// nothing.
pub fn merged_tags(master: &[String], duplicate: &[String]) -> Option<Vec<String>> {
    let mut seen: HashSet<&str> = master.iter().map(String::as_str).collect();
    let mut merged: Vec<String> = master.to_vec();
    for tag in duplicate {
        if seen.insert(tag) {
            merged.push(tag.clone());
        }
    }
    (merged.len() > master.len()).then_some(merged)
}

/// Actor rows of the duplicate that can move to the master without
/// colliding on `(actor_handle, platform)` or on `unknown_actor_id`.
pub fn actor_rows_to_migrate(
    master_id: Uuid,
    master_rows: &[EventActorLinkReadRow],
    dup_rows: &[EventActorLinkReadRow],
) -> Vec<EventActorLinkRow> {
    let mut handles: HashSet<(String, String)> = master_rows
        .iter()
        .map(|r| (r.actor_handle.clone(), r.platform.clone()))
        .collect();
    let mut unknown_ids: HashSet<Uuid> =
        master_rows.iter().filter_map(|r| r.unknown_actor_id).collect();

    let mut out = Vec::new();
    for row in dup_rows {
        let handle_key = (row.actor_handle.clone(), row.platform.clone());
        if handles.contains(&handle_key) {
            continue;
        }
        if let Some(unknown_id) = row.unknown_actor_id {
            if unknown_ids.contains(&unknown_id) {
                continue;
            }
            unknown_ids.insert(unknown_id);
        }
        handles.insert(handle_key);

        out.push(EventActorLinkRow {
            event_id: master_id,
            actor_handle: row.actor_handle.clone(),
            platform: row.platform.clone(),
            actor_type: row.actor_type.clone().unwrap_or_else(|| "person".to_string()),
            actor_id: row.actor_id,
            unknown_actor_id: row.unknown_actor_id,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_row(
        event_id: Uuid,
        handle: &str,
        platform: &str,
        actor_id: Option<Uuid>,
        unknown_actor_id: Option<Uuid>,
    ) -> EventActorLinkReadRow {
        EventActorLinkReadRow {
            event_id,
            actor_handle: handle.to_string(),
            platform: platform.to_string(),
            actor_type: Some("person".to_string()),
            actor_id,
            unknown_actor_id,
        }
    }

    #[test]
    fn tag_union_preserves_master_order() {
        let merged = merged_tags(
            &["x".to_string(), "y".to_string()],
            &["y".to_string(), "z".to_string()],
        )
        .unwrap();
        assert_eq!(merged, vec!["x", "y", "z"]);
    }

    #[test]
    fn tag_union_none_when_duplicate_adds_nothing() {
        assert!(merged_tags(&["x".to_string()], &["x".to_string()]).is_none());
        assert!(merged_tags(&["x".to_string()], &[]).is_none());
    }

    #[test]
    fn actor_migration_skips_both_collision_keys() {
        let master_id = Uuid::new_v4();
        let dup_id = Uuid::new_v4();
        let shared_actor = Uuid::new_v4();
        let shared_unknown = Uuid::new_v4();
        let fresh_actor = Uuid::new_v4();

        let master_rows = vec![
            read_row(master_id, "a1", "twitter", Some(shared_actor), None),
            read_row(
                master_id,
                &format!("unknown_{shared_unknown}"),
                "unknown",
                None,
                Some(shared_unknown),
            ),
        ];
        let dup_rows = vec![
            // Collides on (handle, platform).
            read_row(dup_id, "a1", "twitter", Some(shared_actor), None),
            // Same unknown actor under a different handle row: collides on
            // unknown_actor_id.
            read_row(dup_id, "legacy_handle", "unknown", None, Some(shared_unknown)),
            // Genuinely new.
            read_row(dup_id, "a2", "instagram", Some(fresh_actor), None),
        ];

        let migrate = actor_rows_to_migrate(master_id, &master_rows, &dup_rows);
        assert_eq!(migrate.len(), 1);
        assert_eq!(migrate[0].actor_handle, "a2");
        assert_eq!(migrate[0].event_id, master_id);
    }

    #[test]
    fn scenario_merge_produces_union() {
        // Master has {A1}, duplicate has {A1, A2}: only A2 migrates.
        let master_id = Uuid::new_v4();
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();
        let master_rows = vec![read_row(master_id, "a1", "twitter", Some(a1), None)];
        let dup_rows = vec![
            read_row(Uuid::new_v4(), "a1", "twitter", Some(a1), None),
            read_row(Uuid::new_v4(), "a2", "twitter", Some(a2), None),
        ];
        let migrate = actor_rows_to_migrate(master_id, &master_rows, &dup_rows);
        assert_eq!(migrate.len(), 1);
        assert_eq!(migrate[0].actor_id, Some(a2));
    }
}

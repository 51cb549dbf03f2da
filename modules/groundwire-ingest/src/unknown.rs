//! Unknown-actor discovery: handles seen in posts that are not in the
//! known-actor directory, aggregated per `(platform, username)` before a
//! single UPSERT pass.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use groundwire_store::actors::UnknownActorUpsert;

const CONTEXT_SNIPPET_MAX: usize = 500;

/// One sighting of an uncatalogued handle.
#[derive(Debug, Clone)]
pub struct Observation {
    pub platform: String,
    pub username: String,
    pub seen_at: DateTime<Utc>,
    pub is_author: bool,
    pub context: Option<String>,
}

/// Collapse observations into one UPSERT record per `(platform, username)`:
/// timestamps widen, every occurrence counts as a mention, authorship adds
/// one author count, and the first non-empty context snippet sticks.
pub fn aggregate(observations: Vec<Observation>) -> Vec<UnknownActorUpsert> {
    let mut merged: HashMap<(String, String), UnknownActorUpsert> = HashMap::new();

    for obs in observations {
        let key = (obs.platform.clone(), obs.username.clone());
        let entry = merged.entry(key).or_insert_with(|| UnknownActorUpsert {
            platform: obs.platform.clone(),
            detected_username: obs.username.clone(),
            first_seen: obs.seen_at,
            last_seen: obs.seen_at,
            mention_count: 0,
            author_count: 0,
            mention_context: None,
        });

        entry.first_seen = entry.first_seen.min(obs.seen_at);
        entry.last_seen = entry.last_seen.max(obs.seen_at);
        entry.mention_count += 1;
        if obs.is_author {
            entry.author_count += 1;
        }
        if entry.mention_context.is_none() {
            entry.mention_context = obs
                .context
                .filter(|c| !c.trim().is_empty())
                .map(|c| snippet(&c));
        }
    }

    let mut out: Vec<UnknownActorUpsert> = merged.into_values().collect();
    out.sort_by(|a, b| {
        (a.platform.as_str(), a.detected_username.as_str())
            .cmp(&(b.platform.as_str(), b.detected_username.as_str()))
    });
    out
}

fn snippet(content: &str) -> String {
    let mut end = content.len().min(CONTEXT_SNIPPET_MAX);
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    content[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    fn obs(username: &str, day: u32, is_author: bool) -> Observation {
        Observation {
            platform: "twitter".to_string(),
            username: username.to_string(),
            seen_at: at(day),
            is_author,
            context: Some(format!("post on day {day}")),
        }
    }

    #[test]
    fn author_counts_as_both_mention_and_author() {
        let merged = aggregate(vec![obs("jane", 15, true)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].mention_count, 1);
        assert_eq!(merged[0].author_count, 1);
    }

    #[test]
    fn counters_and_timestamps_merge() {
        let merged = aggregate(vec![
            obs("bob", 10, false),
            obs("bob", 20, false),
            obs("bob", 15, true),
        ]);
        assert_eq!(merged.len(), 1);
        let bob = &merged[0];
        assert_eq!(bob.mention_count, 3);
        assert_eq!(bob.author_count, 1);
        assert_eq!(bob.first_seen, at(10));
        assert_eq!(bob.last_seen, at(20));
        // First non-empty context wins.
        assert_eq!(bob.mention_context.as_deref(), Some("post on day 10"));
    }

    #[test]
    fn context_snippet_is_bounded() {
        let long = "x".repeat(2_000);
        let merged = aggregate(vec![Observation {
            platform: "instagram".to_string(),
            username: "v".to_string(),
            seen_at: at(1),
            is_author: false,
            context: Some(long),
        }]);
        assert_eq!(merged[0].mention_context.as_ref().unwrap().len(), 500);
    }

    #[test]
    fn distinct_platforms_stay_separate() {
        let mut o = obs("same", 1, false);
        o.platform = "instagram".to_string();
        let merged = aggregate(vec![obs("same", 1, false), o]);
        assert_eq!(merged.len(), 2);
    }
}

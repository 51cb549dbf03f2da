//! Merge-adjudication prompt and decision parsing.

use serde::Deserialize;
use uuid::Uuid;

use ai_client::{extract_json_object, truncate_to_char_boundary};
use groundwire_common::{DuplicateGroup, DuplicatePair, Event};

pub const SYSTEM_PROMPT: &str = "You are an expert at identifying duplicate event records. \
You are conservative: you only merge events you are confident describe the same real-world \
occurrence, and you always answer with a single JSON object.";

#[derive(Debug, Clone, Deserialize)]
pub struct MergeGroup {
    pub master_event_id: Uuid,
    #[serde(default)]
    pub duplicate_event_ids: Vec<Uuid>,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeepSeparate {
    #[serde(default)]
    pub event_ids: Vec<Uuid>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Decision {
    pub merge_groups: Vec<MergeGroup>,
    pub keep_separate: Vec<KeepSeparate>,
}

/// Build the adjudication prompt for one group.
pub fn build_prompt(group: &DuplicateGroup, events: &[Event], pairs: &[DuplicatePair]) -> String {
    let mut prompt = format!(
        "Analyze this group of potentially duplicate events.\n\n\
         GROUP:\n\
         - Events in group: {}\n\
         - Max similarity: {:.0}%\n\
         - Avg similarity: {:.0}%\n\
         - Confidence level: {}\n\
         - Contains electioneering: {}\n\n\
         This group may contain multiple distinct events that merely look similar. Identify \
         which are TRUE duplicates (one occurrence reported several times), keep distinct \
         events separate (daily canvassing sessions are distinct), and pick the most \
         specific, most detailed event as the master of each merge.\n\n\
         EVENTS:\n",
        group.group_size,
        group.max_similarity_score * 100.0,
        group.avg_similarity_score * 100.0,
        group.confidence_level,
        group.has_electioneering,
    );

    for (i, event) in events.iter().enumerate() {
        prompt.push_str(&format!(
            "\n{n}. EVENT {id}\n   Name: {name}\n   Date: {date}\n   Location: {city}, {state}\n   \
             Description: {description}\n   Tags: {tags}\n",
            n = i + 1,
            id = event.id,
            name = event.event_name,
            date = event
                .event_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            city = event.city.as_deref().unwrap_or("unknown"),
            state = event.state.as_deref().unwrap_or("unknown"),
            description = truncate_to_char_boundary(&event.event_description, 500),
            tags = if event.category_tags.is_empty() {
                "none".to_string()
            } else {
                event.category_tags.join(", ")
            },
        ));
    }

    prompt.push_str("\nPAIRWISE SIMILARITIES:\n");
    for pair in pairs.iter().take(10) {
        prompt.push_str(&format!(
            "- \"{}\" vs \"{}\": name {:.0}%, date {:.0}%, location {:.0}%, overall {:.0}%\n",
            pair.event1_name,
            pair.event2_name,
            pair.name_similarity * 100.0,
            pair.date_proximity_score * 100.0,
            pair.location_score * 100.0,
            pair.overall_similarity_score * 100.0,
        ));
    }

    if group.has_electioneering {
        prompt.push_str(
            "\nELECTIONEERING WARNING: these look like canvassing/electioneering events, which \
             recur frequently. Do NOT merge events on different dates; different dates mean \
             different sessions even with identical names.\n",
        );
    }

    prompt.push_str(
        "\nRespond in JSON:\n\
         {\n\
         \x20 \"merge_groups\": [\n\
         \x20   {\"master_event_id\": \"uuid\", \"duplicate_event_ids\": [\"uuid\"], \
         \"confidence\": \"high|medium|low\", \"reasoning\": \"...\"}\n\
         \x20 ],\n\
         \x20 \"keep_separate\": [\n\
         \x20   {\"event_ids\": [\"uuid\"], \"reasoning\": \"...\"}\n\
         \x20 ]\n\
         }\n\
         Only merge when confident; when unsure, keep events separate.",
    );

    prompt
}

pub fn parse_decision(text: &str) -> Option<Decision> {
    let value = extract_json_object(text)?;
    serde_json::from_value(value).ok()
}

/// Flatten a decision into `(master, duplicate, reasoning)` pairs,
/// keeping only high- and medium-confidence merges.
pub fn accepted_merges(decision: &Decision) -> Vec<(Uuid, Uuid, String)> {
    let mut merges = Vec::new();
    for group in &decision.merge_groups {
        if !matches!(group.confidence.as_str(), "high" | "medium") {
            continue;
        }
        for dup in &group.duplicate_event_ids {
            if *dup == group.master_event_id {
                continue;
            }
            merges.push((group.master_event_id, *dup, group.reasoning.clone()));
        }
    }
    merges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_from_fenced_response() {
        let master = Uuid::new_v4();
        let dup = Uuid::new_v4();
        let text = format!(
            "Looking at the group:\n```json\n{{\"merge_groups\": [{{\"master_event_id\": \
             \"{master}\", \"duplicate_event_ids\": [\"{dup}\"], \"confidence\": \"high\", \
             \"reasoning\": \"same rally\"}}], \"keep_separate\": []}}\n```"
        );
        let decision = parse_decision(&text).unwrap();
        let merges = accepted_merges(&decision);
        assert_eq!(merges, vec![(master, dup, "same rally".to_string())]);
    }

    #[test]
    fn low_confidence_merges_are_dropped() {
        let master = Uuid::new_v4();
        let dup = Uuid::new_v4();
        let decision = Decision {
            merge_groups: vec![MergeGroup {
                master_event_id: master,
                duplicate_event_ids: vec![dup],
                confidence: "low".to_string(),
                reasoning: String::new(),
            }],
            keep_separate: Vec::new(),
        };
        assert!(accepted_merges(&decision).is_empty());
    }

    #[test]
    fn self_merges_are_ignored() {
        let master = Uuid::new_v4();
        let decision = Decision {
            merge_groups: vec![MergeGroup {
                master_event_id: master,
                duplicate_event_ids: vec![master],
                confidence: "high".to_string(),
                reasoning: String::new(),
            }],
            keep_separate: Vec::new(),
        };
        assert!(accepted_merges(&decision).is_empty());
    }

    #[test]
    fn unparsable_response_is_none() {
        assert!(parse_decision("I think they are duplicates.").is_none());
    }
}

//! The model's event schema, validation, date normalization, and the
//! canonical content hash.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One event as emitted by the model. Field names follow the prompt's
/// JSON schema; serde aliases absorb the variants models actually produce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    #[serde(alias = "EventName")]
    pub event_name: String,
    #[serde(alias = "EventDate", alias = "Date")]
    pub event_date: Option<String>,
    #[serde(alias = "EventDescription")]
    pub event_description: String,
    #[serde(alias = "CategoryTags")]
    pub category_tags: Vec<String>,
    #[serde(alias = "Location")]
    pub location: Option<String>,
    #[serde(alias = "City")]
    pub city: Option<String>,
    #[serde(alias = "State")]
    pub state: Option<String>,
    #[serde(alias = "Participants", deserialize_with = "string_or_list", default)]
    pub participants: Option<String>,
    #[serde(alias = "ConfidenceScore")]
    pub confidence_score: f64,
    #[serde(alias = "Justification")]
    pub justification: Option<String>,
    #[serde(alias = "SourceIDs")]
    pub source_ids: Vec<String>,
    #[serde(alias = "InstagramHandles")]
    pub instagram_handles: Vec<String>,
    #[serde(alias = "TwitterHandles")]
    pub twitter_handles: Vec<String>,
}

/// Participants arrive as either a string or a list; lists render as a
/// comma-joined string.
fn string_or_list<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    })
}

/// Why a single event was rejected. Invalid events are dropped with a
/// logged reason; missing source IDs instead fail the whole batch upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingName,
    MissingDescription,
    MissingSourceIds,
    ConfidenceOutOfRange,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Rejection::MissingName => "missing event name",
            Rejection::MissingDescription => "missing event description",
            Rejection::MissingSourceIds => "missing source IDs",
            Rejection::ConfidenceOutOfRange => "confidence score outside [0, 1]",
        };
        f.write_str(text)
    }
}

pub fn validate(event: &RawEvent) -> Result<(), Rejection> {
    if event.event_name.trim().is_empty() {
        return Err(Rejection::MissingName);
    }
    if event.event_description.trim().is_empty() {
        return Err(Rejection::MissingDescription);
    }
    if event.source_ids.is_empty() {
        return Err(Rejection::MissingSourceIds);
    }
    if !(0.0..=1.0).contains(&event.confidence_score) {
        return Err(Rejection::ConfidenceOutOfRange);
    }
    Ok(())
}

/// Normalize a model-supplied date: empty → null, a `-00` day (month
/// inferred) → the first of the month.
pub fn normalize_event_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let fixed = if let Some(prefix) = raw.strip_suffix("-00") {
        format!("{prefix}-01")
    } else {
        raw.to_string()
    };
    NaiveDate::parse_from_str(&fixed, "%Y-%m-%d").ok()
}

/// SHA-256 over the pipe-joined normalized tuple. Source post IDs are
/// sorted so the same post set hashes identically regardless of order.
pub fn content_hash(
    name: &str,
    date: Option<NaiveDate>,
    location: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    source_post_ids: &[Uuid],
) -> String {
    let mut ids: Vec<String> = source_post_ids.iter().map(|u| u.to_string()).collect();
    ids.sort();

    let components = [
        name.to_lowercase().trim().to_string(),
        date.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        location.unwrap_or("").to_lowercase().trim().to_string(),
        city.unwrap_or("").to_lowercase().trim().to_string(),
        state.unwrap_or("").to_uppercase().trim().to_string(),
        ids.join("|"),
    ];

    let mut hasher = Sha256::new();
    hasher.update(components.join("|").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> RawEvent {
        serde_json::from_str(
            r#"{
                "EventName": "AZ Canvass",
                "EventDate": "2025-03-15",
                "EventDescription": "Door knocking in Mesa",
                "CategoryTags": ["Electioneering", "Election:az_mesa_recall_2025"],
                "City": "Mesa",
                "State": "AZ",
                "Participants": ["Jane", "Bob"],
                "ConfidenceScore": 0.9,
                "SourceIDs": ["12345"],
                "TwitterHandles": ["@jane"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn pascal_case_aliases_decode() {
        let e = event();
        assert_eq!(e.event_name, "AZ Canvass");
        assert_eq!(e.participants.as_deref(), Some("Jane, Bob"));
        assert_eq!(e.source_ids, vec!["12345"]);
        assert!(validate(&e).is_ok());
    }

    #[test]
    fn validation_rejections() {
        let mut e = event();
        e.event_name = " ".to_string();
        assert_eq!(validate(&e), Err(Rejection::MissingName));

        let mut e = event();
        e.source_ids.clear();
        assert_eq!(validate(&e), Err(Rejection::MissingSourceIds));

        let mut e = event();
        e.confidence_score = 1.5;
        assert_eq!(validate(&e), Err(Rejection::ConfidenceOutOfRange));
    }

    #[test]
    fn date_day_zero_becomes_first() {
        assert_eq!(
            normalize_event_date(Some("2025-06-00")),
            NaiveDate::from_ymd_opt(2025, 6, 1)
        );
        assert_eq!(
            normalize_event_date(Some("2025-06-15")),
            NaiveDate::from_ymd_opt(2025, 6, 15)
        );
        assert_eq!(normalize_event_date(Some("")), None);
        assert_eq!(normalize_event_date(None), None);
        assert_eq!(normalize_event_date(Some("June 2025")), None);
    }

    #[test]
    fn hash_is_order_independent_over_source_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2025, 3, 15);

        let h1 = content_hash("AZ Canvass", date, Some(""), Some("Mesa"), Some("AZ"), &[a, b]);
        let h2 = content_hash("AZ Canvass", date, Some(""), Some("Mesa"), Some("AZ"), &[b, a]);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);

        // Case-insensitive on name/city, case-normalizing on state.
        let h3 = content_hash("az canvass", date, Some(""), Some("MESA"), Some("az"), &[a, b]);
        assert_eq!(h1, h3);

        // Different post set → different event.
        let h4 = content_hash("AZ Canvass", date, Some(""), Some("Mesa"), Some("AZ"), &[a]);
        assert_ne!(h1, h4);
    }
}

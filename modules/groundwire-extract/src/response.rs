//! Strict decoding of the model's final message into typed events. The
//! accepted shapes are `{"events": […]}`, a bare array, or a single event
//! object; everything else is a schema violation.

use ai_client::extract_json_object;
use tracing::warn;

use crate::event::RawEvent;

/// Parse the final response text into raw events. Returns `None` when no
/// JSON could be located at all (a batch-level failure); individual
/// undecodable entries are dropped with a logged reason.
pub fn decode_events(text: &str) -> Option<Vec<RawEvent>> {
    let value = extract_json_object(text)?;

    let items: Vec<serde_json::Value> = match value {
        serde_json::Value::Object(ref obj) if obj.contains_key("events") => {
            match obj.get("events") {
                Some(serde_json::Value::Array(items)) => items.clone(),
                Some(serde_json::Value::Null) | None => Vec::new(),
                Some(other) => vec![other.clone()],
            }
        }
        serde_json::Value::Array(items) => items,
        single @ serde_json::Value::Object(_) => vec![single],
        _ => return None,
    };

    let mut events = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<RawEvent>(item.clone()) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(error = %e, raw = %item, "dropping undecodable event entry");
            }
        }
    }
    Some(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_object_decodes() {
        let text = r#"```json
        {"events": [{"EventName": "Rally", "EventDescription": "d", "SourceIDs": ["1"], "ConfidenceScore": 0.8}]}
        ```"#;
        let events = decode_events(text).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, "Rally");
    }

    #[test]
    fn bare_array_is_wrapped() {
        let text = r#"[{"EventName": "A", "EventDescription": "d", "SourceIDs": ["1"]}]"#;
        let events = decode_events(text).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn single_object_is_wrapped() {
        let text = r#"{"EventName": "Solo", "EventDescription": "d", "SourceIDs": ["1"]}"#;
        let events = decode_events(text).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, "Solo");
    }

    #[test]
    fn empty_events_is_valid() {
        let events = decode_events(r#"{"events": []}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn no_json_at_all_is_none() {
        assert!(decode_events("I could not find any events.").is_none());
    }
}

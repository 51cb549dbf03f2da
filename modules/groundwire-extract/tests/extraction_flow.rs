//! Scenarios for the response-to-persistence path: decoding, validation,
//! date normalization, and the content-hash dedup key.

use chrono::NaiveDate;
use uuid::Uuid;

use groundwire_extract::event::{content_hash, normalize_event_date, validate, Rejection};
use groundwire_extract::response::decode_events;

const MODEL_RESPONSE: &str = r#"
I found one event in this batch.

```json
{
  "events": [
    {
      "EventName": "AZ Canvass",
      "EventDate": "2025-03-15",
      "EventDescription": "Door knocking about the Mesa recall.",
      "CategoryTags": ["Electioneering", "Election:AZ_Mesa_City_Council_Recall_2025"],
      "Location": "",
      "City": "Mesa",
      "State": "AZ",
      "Participants": "Jane Doe",
      "ConfidenceScore": 0.95,
      "Justification": "Photo evidence of canvassers.",
      "SourceIDs": ["11111111-1111-1111-1111-111111111111", "22222222-2222-2222-2222-222222222222"],
      "InstagramHandles": [],
      "TwitterHandles": ["janedoe"]
    }
  ]
}
```
"#;

#[test]
fn model_response_decodes_and_validates() {
    let events = decode_events(MODEL_RESPONSE).unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert!(validate(event).is_ok());
    assert_eq!(event.source_ids.len(), 2);
    assert_eq!(
        normalize_event_date(event.event_date.as_deref()),
        NaiveDate::from_ymd_opt(2025, 3, 15)
    );
}

#[test]
fn event_without_source_ids_is_the_batch_poison_case() {
    let text = r#"{"events": [{"EventName": "X", "EventDescription": "d", "SourceIDs": []}]}"#;
    let events = decode_events(text).unwrap();
    assert_eq!(validate(&events[0]), Err(Rejection::MissingSourceIds));
}

#[test]
fn content_hash_dedup_scenario() {
    // Two batches emit events with the identical canonical tuple; both
    // submissions must resolve to the same content hash (and therefore
    // the same row via the UPSERT conflict key).
    let p1: Uuid = "11111111-1111-1111-1111-111111111111".parse().unwrap();
    let p2: Uuid = "22222222-2222-2222-2222-222222222222".parse().unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 3, 15);

    let first = content_hash("AZ Canvass", date, Some(""), Some("Mesa"), Some("AZ"), &[p1, p2]);
    let second = content_hash("AZ Canvass", date, Some(""), Some("Mesa"), Some("AZ"), &[p2, p1]);
    assert_eq!(first, second);

    // A differing date is a different event.
    let other_date = NaiveDate::from_ymd_opt(2025, 3, 16);
    let third = content_hash(
        "AZ Canvass",
        other_date,
        Some(""),
        Some("Mesa"),
        Some("AZ"),
        &[p1, p2],
    );
    assert_ne!(first, third);
}

#[test]
fn inferred_month_dates_land_on_the_first() {
    assert_eq!(
        normalize_event_date(Some("2025-07-00")),
        NaiveDate::from_ymd_opt(2025, 7, 1)
    );
}

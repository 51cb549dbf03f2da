//! Prompt assembly: the static system prompt and the per-post context
//! blocks handed to the model.

use groundwire_common::Post;

/// Static extraction rules. Dynamic context (actor bios, existing slugs)
/// is retrieved on demand through the tool palette instead of being
/// embedded here.
pub fn build_system_prompt(use_tools: bool) -> String {
    let tool_section = if use_tools {
        "\
## Tools

You can retrieve context on demand:

1. **search_actors** — look up any handle you see (author, mention, or in post text) to get
   its biographical record. Batch several actors into one call.
2. **search_dynamic_slugs** — check for existing dynamic slugs before inventing one. Results
   are grouped by identifier and show every parent-tag variant; if nothing matches, create a
   new slug in CategoryTags.
3. **link_posts_to_existing_event** — link posts to an already-stored event instead of
   emitting a duplicate. Use sparingly, only for unambiguous matches; a separate pass handles
   systematic deduplication.

Work tools-first: look up actors, then extract, then verify slugs. After tool results arrive,
respond with the final JSON only.\n\n"
    } else {
        ""
    };

    format!(
        "\
You are a data extraction assistant tracking the real-world political and organizational \
activity of a monitored movement network. You turn social-media posts into structured event \
records for researchers mapping field activity: who, what, where, when.

{tool_section}\
## Activity gate

Extract an event only when the content describes one of:

- **Electioneering** (highest priority, never miss these): canvassing, door-knocking, \
signature gathering, phone banking, or voter registration — including informal descriptions \
(\"out talking with voters about the recall\" IS a canvassing event).
- **Organized gatherings**: a scheduled or completed in-person rally, training, chapter \
meeting, conference, or campus tabling.
- **Official engagements and public conflict**: testimony or attendance at a government \
meeting in an official capacity, or a public conflict where an actor is a principal \
organizer, instigator, or target of institutional sanction.
- **Official digital programming**: coordinated virtual events with a defined goal run by an \
organization.

Ignore commentary, online arguments, and media appearances. When in doubt, do not extract: \
`{{\"events\": []}}` is a valid and often correct response.

## Confidence score

- 0.9–1.0: actor clearly acting in an official capacity for its organization.
- 0.3–0.7: an affiliated actor present at an event, capacity unclear.
- Multiply by 0.7 for events that are national news (presidential administration activity, \
celebrity endorsements, major rallies with national coverage).
- Multiply by 1.2 (cap 1.0) for hyperlocal grassroots work: field reps at community groups, \
school-board testimony, door-to-door canvassing, chapter meetings.

## Event rules

- One row per unique occurrence (activity, date, location). Multi-day series: one event per \
day. Multi-state announcements: one event per location.
- Electioneering on different days is ALWAYS separate events; same day but different \
locations or actors is separate too.
- No exact date in the text: infer month and year from the post timestamp and use day `01`. \
For canvassing, the post date IS the event date unless a future date is promoted.

## Dynamic slugs

Certain activities MUST carry a `ParentTag:identifier` slug in CategoryTags. Reuse an \
existing slug when one matches. Naming conventions:

- `Election:{{STATE}}_{{Office}}[_{{Candidate}}]_{{Year}}` — add `_Special` or `_Recall` \
when applicable, never a redundant `_General`.
- `BallotMeasure:{{STATE}}_Prop{{N}}_{{Topic}}_{{Year}}`
- `School:{{STATE}}_{{Name}}`   `Church:{{Name}}_{{City}}_{{STATE}}`
- `Conference:{{Name}}_{{Year}}_{{Location}}`   `LobbyingTopic:{{Topic}}`

## Output

Respond with a single JSON object inside a fenced ```json code block:

```json
{{
  \"events\": [
    {{
      \"EventName\": \"Mesa Recall Canvass\",
      \"EventDate\": \"2025-03-15\",
      \"EventDescription\": \"Door-knocking about the Mesa city council recall.\",
      \"CategoryTags\": [\"Electioneering\", \"Election:AZ_Mesa_City_Council_Recall_2025\"],
      \"Location\": \"Dobson Ranch neighborhood\",
      \"City\": \"Mesa\",
      \"State\": \"AZ\",
      \"Participants\": \"Jane Doe\",
      \"ConfidenceScore\": 0.95,
      \"Justification\": \"Photo of canvassers with clipboards, explicit recall mention.\",
      \"SourceIDs\": [\"<post UUID>\"],
      \"InstagramHandles\": [],
      \"TwitterHandles\": [\"janedoe\"]
    }}
  ]
}}
```

`SourceIDs` must contain the UUID values shown for each post. Every event needs at least one."
    )
}

/// Serialize one post for the model. The UUID is the value that must come
/// back in `SourceIDs`.
pub fn serialize_post(post: &Post) -> String {
    let timestamp = post
        .timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "--- POST ---\n\
         UUID: {id}\n\
         External ID: {external}\n\
         Platform: {platform}\n\
         Author: @{author}\n\
         Timestamp: {timestamp}\n\
         Location: {location}\n\
         Mentions: {mentions}\n\
         Hashtags: {hashtags}\n\
         Content: {content}\n",
        id = post.id,
        external = post.external_post_id,
        platform = post.platform,
        author = post.author_handle,
        timestamp = timestamp,
        location = post.location_text.as_deref().unwrap_or("unknown"),
        mentions = if post.mentioned_handles.is_empty() {
            "none".to_string()
        } else {
            post.mentioned_handles.join(", ")
        },
        hashtags = if post.hashtags.is_empty() {
            "none".to_string()
        } else {
            post.hashtags.join(" ")
        },
        content = post.content_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn system_prompt_mentions_tools_only_when_enabled() {
        let with = build_system_prompt(true);
        let without = build_system_prompt(false);
        assert!(with.contains("search_actors"));
        assert!(!without.contains("search_actors"));
        assert!(with.contains("```json"));
    }

    #[test]
    fn post_serialization_exposes_uuid() {
        let id = Uuid::new_v4();
        let post = Post {
            id,
            platform: groundwire_common::Platform::Twitter,
            external_post_id: "12345".to_string(),
            author_handle: "jane".to_string(),
            author_display_name: None,
            content_text: "Canvassing today".to_string(),
            timestamp: Some(Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap()),
            media_urls: Vec::new(),
            mentioned_handles: vec!["bob".to_string()],
            hashtags: vec!["#AZ".to_string()],
            like_count: 0,
            reply_count: 0,
            share_count: 0,
            location_text: None,
            post_url: None,
            offline_media_url: None,
            processed_for_events: false,
            event_processed_at: None,
        };
        let text = serialize_post(&post);
        assert!(text.contains(&id.to_string()));
        assert!(text.contains("External ID: 12345"));
        assert!(text.contains("@jane"));
        assert!(text.contains("bob"));
    }
}

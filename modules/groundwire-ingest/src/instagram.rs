//! Instagram scrape files: JSON arrays of post objects, with the handle
//! either top-level or nested under `owner.username`.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::normalizer::RawPost;

fn str_field(obj: &Value, keys: &[&str]) -> String {
    for key in keys {
        if let Some(v) = obj.get(*key) {
            match v {
                Value::String(s) if !s.trim().is_empty() => return s.trim().to_string(),
                Value::Number(n) => return n.to_string(),
                _ => {}
            }
        }
    }
    String::new()
}

fn count_field(obj: &Value, keys: &[&str]) -> i64 {
    for key in keys {
        if let Some(n) = obj.get(*key).and_then(Value::as_i64) {
            return n;
        }
    }
    0
}

fn handle(obj: &Value) -> String {
    let top = str_field(obj, &["handle", "username"]);
    if !top.is_empty() {
        return top;
    }
    obj.get("owner")
        .map(|o| str_field(o, &["username"]))
        .unwrap_or_default()
}

fn string_list(obj: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        if let Some(Value::Array(items)) = obj.get(*key) {
            return items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
    }
    Vec::new()
}

/// Parse one Instagram JSON file into raw records.
pub fn parse_json(content: &[u8]) -> Result<Vec<RawPost>> {
    let value: Value = serde_json::from_slice(content).context("invalid instagram JSON")?;
    let items = match value {
        Value::Array(items) => items,
        single @ Value::Object(_) => vec![single],
        _ => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for item in items {
        let mut media_urls = string_list(&item, &["media_urls"]);
        if media_urls.is_empty() {
            let src = str_field(&item, &["src_url", "display_url"]);
            if !src.is_empty() {
                media_urls.push(src);
            }
        }

        let mentioned = string_list(&item, &["mentioned_users", "mentions"]);
        let hashtags = string_list(&item, &["hashtags"]);

        records.push(RawPost {
            platform: "instagram".to_string(),
            external_post_id: str_field(&item, &["id", "post_id", "shortcode"]),
            author_handle: handle(&item),
            author_display_name: Some(str_field(&item, &["full_name", "display_name"]))
                .filter(|s| !s.is_empty()),
            content_text: str_field(&item, &["caption", "text"]),
            timestamp_raw: str_field(&item, &["taken_at", "timestamp", "date"]),
            media_urls,
            mentioned_users_raw: serde_json::to_string(&mentioned).unwrap_or_default(),
            hashtags_raw: hashtags.join(";"),
            like_count: count_field(&item, &["like_count", "likes"]),
            reply_count: count_field(&item, &["comment_count", "comments"]),
            share_count: 0,
            location_text: Some(str_field(&item, &["location", "location_name"]))
                .filter(|s| !s.is_empty()),
            post_url: Some(str_field(&item, &["url", "post_url"])).filter(|s| !s.is_empty()),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_owner_handle_and_unix_timestamp() {
        let json = r#"[{
            "post_id": "abc123",
            "owner": {"username": "GroupChapter"},
            "caption": "Meeting tonight",
            "taken_at": 1742032800,
            "src_url": "https://cdn.example.com/p.jpg",
            "like_count": 10,
            "comment_count": 2
        }]"#;
        let records = parse_json(json.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.external_post_id, "abc123");
        assert_eq!(r.author_handle, "GroupChapter");
        assert_eq!(r.timestamp_raw, "1742032800");
        assert_eq!(r.media_urls, vec!["https://cdn.example.com/p.jpg"]);
        assert_eq!(r.like_count, 10);
        assert_eq!(r.reply_count, 2);
    }

    #[test]
    fn top_level_handle_wins() {
        let json = r#"[{"handle": "direct", "owner": {"username": "nested"}, "caption": "x", "id": "1"}]"#;
        let records = parse_json(json.as_bytes()).unwrap();
        assert_eq!(records[0].author_handle, "direct");
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_json(b"not json").is_err());
    }
}

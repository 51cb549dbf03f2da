//! Text normalization applied at the ingestion boundary and inside the
//! extraction engine. All handles are lowercased everywhere they are
//! stored, queried, or cached.

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Twitter usernames are capped at 15 characters.
const TWITTER_HANDLE_MAX: usize = 15;

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\w+").unwrap())
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([a-z0-9_]{2,32})").unwrap())
}

/// Strip control characters, keeping newlines, and trim.
pub fn clean_content(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Content that carries no signal and excludes the post from ingestion.
pub fn is_blank_content(text: &str) -> bool {
    let t = text.trim();
    t.is_empty() || t.eq_ignore_ascii_case("nan")
}

/// Normalize a handle: strip leading `@`, lowercase, keep only username
/// characters, truncate twitter handles to the platform cap.
pub fn normalize_handle(raw: &str, twitter: bool) -> String {
    let mut handle: String = raw
        .trim()
        .trim_start_matches('@')
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    if twitter {
        handle.truncate(TWITTER_HANDLE_MAX);
    }
    handle
}

/// Parse a mentioned-users field: a JSON array string, a `;`-delimited
/// string, or an already-split list. Duplicates are dropped, first-seen
/// order kept.
pub fn parse_mentioned_users(raw: &str, twitter: bool) -> Vec<String> {
    let parts: Vec<String> = if raw.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<serde_json::Value>>(raw)
            .map(|vals| {
                vals.into_iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Object(map) => map
                            .get("username")
                            .or_else(|| map.get("screen_name"))
                            .and_then(|u| u.as_str().map(str::to_string)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    } else {
        raw.split(';').map(str::to_string).collect()
    };

    let mut seen = std::collections::HashSet::new();
    parts
        .iter()
        .map(|p| normalize_handle(p, twitter))
        .filter(|h| !h.is_empty() && seen.insert(h.clone()))
        .collect()
}

/// Union of the hashtags field (after `;` split) and `#token` occurrences
/// in the content, order-preserving and de-duplicated.
pub fn collect_hashtags(field: &str, content: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for raw in field.split(';') {
        let tag = raw.trim();
        if tag.is_empty() {
            continue;
        }
        let tag = if tag.starts_with('#') {
            tag.to_string()
        } else {
            format!("#{tag}")
        };
        if seen.insert(tag.to_lowercase()) {
            out.push(tag);
        }
    }

    for m in hashtag_re().find_iter(content) {
        let tag = m.as_str().to_string();
        if seen.insert(tag.to_lowercase()) {
            out.push(tag);
        }
    }

    out
}

/// Force a raw timestamp to UTC. Accepts RFC 3339 / ISO 8601 strings
/// (naive ones are assumed UTC) and Unix-second integers. Anything else
/// yields `None`, which excludes the post from downstream batching.
pub fn force_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw.replace(' ', "T")) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return Utc.timestamp_opt(secs as i64, 0).single();
    }
    None
}

/// Calendar-style composite IDs carry a suffix after `@`; only the prefix
/// identifies the post.
pub fn normalize_external_post_id(raw: &str) -> String {
    match raw.split_once('@') {
        Some((prefix, _)) => prefix.to_string(),
        None => raw.to_string(),
    }
}

/// Normalize a slug identifier: lowercase, spaces and hyphens to
/// underscores, repeats collapsed.
pub fn normalize_slug_identifier(identifier: &str) -> String {
    let mut normalized = identifier
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_");
    while normalized.contains("__") {
        normalized = normalized.replace("__", "_");
    }
    normalized
}

/// Extract lowercase `@handle` mentions from free-form text.
pub fn extract_handles(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut seen = std::collections::HashSet::new();
    mention_re()
        .captures_iter(&lowered)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn clean_content_strips_control_chars() {
        assert_eq!(clean_content("hi\u{0007} there\u{200b}"), "hi there\u{200b}");
        assert_eq!(clean_content("line1\nline2"), "line1\nline2");
        assert_eq!(clean_content("  padded  "), "padded");
    }

    #[test]
    fn blank_content_detection() {
        assert!(is_blank_content(""));
        assert!(is_blank_content("   "));
        assert!(is_blank_content("nan"));
        assert!(is_blank_content("NaN"));
        assert!(!is_blank_content("canvassing today"));
    }

    #[test]
    fn handle_normalization() {
        assert_eq!(normalize_handle("@Jane", true), "jane");
        assert_eq!(normalize_handle("  @Bob_Smith ", false), "bob_smith");
        assert_eq!(normalize_handle("weird!chars#here", false), "weirdcharshere");
        // Twitter cap
        assert_eq!(
            normalize_handle("a_very_long_twitter_name", true),
            "a_very_long_twi"
        );
        assert_eq!(
            normalize_handle("a_very_long_instagram_name_ok", false),
            "a_very_long_instagram_name_ok"
        );
    }

    #[test]
    fn mentioned_users_json_and_semicolon() {
        assert_eq!(
            parse_mentioned_users(r#"["@Bob", "alice"]"#, true),
            vec!["bob", "alice"]
        );
        assert_eq!(
            parse_mentioned_users("@Bob; alice ;@bob", true),
            vec!["bob", "alice"]
        );
        assert_eq!(
            parse_mentioned_users(r#"[{"username": "Carol"}]"#, true),
            vec!["carol"]
        );
        assert!(parse_mentioned_users("", true).is_empty());
    }

    #[test]
    fn hashtags_union_field_and_content() {
        let tags = collect_hashtags("AZ;turnout", "Doors knocked #AZ #Vote2024");
        assert_eq!(tags, vec!["#AZ", "#turnout", "#Vote2024"]);
    }

    #[test]
    fn force_utc_accepts_iso_and_unix() {
        let iso = force_utc("2025-03-15T10:00:00Z").unwrap();
        assert_eq!(iso.year(), 2025);
        let offset = force_utc("2025-03-15T10:00:00+07:00").unwrap();
        assert_eq!(offset.hour(), 3);
        let unix = force_utc("1742032800").unwrap();
        assert_eq!(unix.year(), 2025);
        assert!(force_utc("tomorrow").is_none());
        assert!(force_utc("").is_none());
    }

    #[test]
    fn composite_external_ids_keep_prefix() {
        assert_eq!(normalize_external_post_id("12345@calendar"), "12345");
        assert_eq!(normalize_external_post_id("12345"), "12345");
    }

    #[test]
    fn slug_identifier_collapses_repeats() {
        assert_eq!(
            normalize_slug_identifier("AZ  Prop-139 -- Abortion"),
            "az_prop_139_abortion"
        );
    }

    #[test]
    fn handle_extraction_from_text() {
        let handles = extract_handles("Shoutout to @Jane_Doe and @bob. @x is too short");
        assert_eq!(handles, vec!["jane_doe", "bob"]);
        // Dots are outside the handle character class.
        assert_eq!(extract_handles("cc @foo.bar"), vec!["foo"]);
    }
}

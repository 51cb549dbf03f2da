//! Twitter scrape CSVs: one row per tweet, column names as produced by the
//! scraper (`tweet content`, `likeCount`, `mentionedUsers`, …).

use std::collections::HashMap;

use anyhow::Result;

use crate::normalizer::RawPost;

fn field(row: &HashMap<String, String>, names: &[&str]) -> String {
    for name in names {
        if let Some(v) = row.get(*name) {
            if !v.trim().is_empty() {
                return v.trim().to_string();
            }
        }
    }
    String::new()
}

fn count(row: &HashMap<String, String>, names: &[&str]) -> i64 {
    field(row, names).parse::<f64>().map(|f| f as i64).unwrap_or(0)
}

fn media_urls(raw: &str) -> Vec<String> {
    if raw.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<String>>(raw).unwrap_or_default()
    } else if raw.trim().is_empty() {
        Vec::new()
    } else {
        raw.split(';').map(|s| s.trim().to_string()).collect()
    }
}

/// Parse a Twitter CSV file into raw records. Unparsable rows are skipped,
/// not fatal.
pub fn parse_csv(content: &[u8]) -> Result<Vec<RawPost>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content);

    let mut records = Vec::new();
    for row in reader.deserialize::<HashMap<String, String>>() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparsable CSV row");
                continue;
            }
        };

        records.push(RawPost {
            platform: "twitter".to_string(),
            external_post_id: field(&row, &["id", "tweet_id"]),
            author_handle: field(&row, &["username", "user", "screen_name"]),
            author_display_name: Some(field(&row, &["display_name", "displayname", "name"]))
                .filter(|s| !s.is_empty()),
            content_text: field(&row, &["tweet content", "content", "text", "rawContent"]),
            timestamp_raw: field(&row, &["date", "created_at", "timestamp"]),
            media_urls: media_urls(&field(&row, &["media_urls", "media"])),
            mentioned_users_raw: field(&row, &["mentionedUsers", "mentioned_users"]),
            hashtags_raw: field(&row, &["hashtags"]),
            like_count: count(&row, &["likeCount", "like_count", "likes"]),
            reply_count: count(&row, &["replyCount", "reply_count", "replies"]),
            share_count: count(&row, &["retweetCount", "retweet_count", "shares"]),
            location_text: Some(field(&row, &["location", "place"])).filter(|s| !s.is_empty()),
            post_url: Some(field(&row, &["url", "tweet_url"])).filter(|s| !s.is_empty()),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scraper_columns() {
        let csv = "id,url,date,username,display_name,tweet content,likeCount,replyCount,retweetCount,mentionedUsers,hashtags,media_urls\n\
                   12345,https://x.com/jane/status/12345,2025-03-15T10:00:00Z,Jane,Jane D,Canvassing today #AZ,3,0,1,\"[\"\"@Bob\"\"]\",AZ,\"[\"\"https://pbs.example.com/img.jpg\"\"]\"\n";
        let records = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.external_post_id, "12345");
        assert_eq!(r.author_handle, "Jane");
        assert_eq!(r.content_text, "Canvassing today #AZ");
        assert_eq!(r.like_count, 3);
        assert_eq!(r.media_urls, vec!["https://pbs.example.com/img.jpg"]);
        assert_eq!(r.mentioned_users_raw, r#"["@Bob"]"#);
    }

    #[test]
    fn empty_file_yields_no_records() {
        let records = parse_csv(b"id,username\n").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn semicolon_media_fallback() {
        assert_eq!(
            media_urls("https://a.jpg; https://b.jpg"),
            vec!["https://a.jpg", "https://b.jpg"]
        );
        assert!(media_urls("").is_empty());
    }
}

//! Canonicalization of raw scraped records. Rules apply in order: content
//! cleanup, UTC timestamp coercion, composite-ID trimming, platform and
//! handle normalization, mention and hashtag collection.

use groundwire_common::text;
use groundwire_common::Platform;
use groundwire_store::posts::NewPost;

/// A raw record as parsed from a scrape file, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawPost {
    pub platform: String,
    pub external_post_id: String,
    pub author_handle: String,
    pub author_display_name: Option<String>,
    pub content_text: String,
    pub timestamp_raw: String,
    pub media_urls: Vec<String>,
    pub mentioned_users_raw: String,
    pub hashtags_raw: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub share_count: i64,
    pub location_text: Option<String>,
    pub post_url: Option<String>,
}

/// Normalize one raw record into a canonical post. Returns `None` for
/// records that carry no usable content or identity.
pub fn normalize(raw: RawPost) -> Option<NewPost> {
    let content_text = text::clean_content(&raw.content_text);
    if text::is_blank_content(&content_text) {
        return None;
    }

    let platform = Platform::parse(&raw.platform);
    let is_twitter = platform == Platform::Twitter;

    let external_post_id = text::normalize_external_post_id(raw.external_post_id.trim());
    if external_post_id.is_empty() {
        return None;
    }

    let author_handle = text::normalize_handle(&raw.author_handle, is_twitter);
    if author_handle.is_empty() {
        return None;
    }

    // A null timestamp keeps the post out of downstream batching but does
    // not block ingestion.
    let posted_at = text::force_utc(&raw.timestamp_raw);

    let mentioned_handles = text::parse_mentioned_users(&raw.mentioned_users_raw, is_twitter);
    let hashtags = text::collect_hashtags(&raw.hashtags_raw, &content_text);

    let media_urls: Vec<String> = raw
        .media_urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| u.starts_with("http"))
        .collect();

    Some(NewPost {
        platform: platform.as_str().to_string(),
        external_post_id,
        author_handle,
        author_display_name: raw
            .author_display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        content_text,
        posted_at,
        media_urls,
        mentioned_handles,
        hashtags,
        like_count: raw.like_count,
        reply_count: raw.reply_count,
        share_count: raw.share_count,
        location_text: raw
            .location_text
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
        post_url: raw.post_url.filter(|u| !u.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn raw() -> RawPost {
        RawPost {
            platform: "x".to_string(),
            external_post_id: "12345".to_string(),
            author_handle: "Jane".to_string(),
            author_display_name: Some("Jane D".to_string()),
            content_text: "Canvassing today #AZ".to_string(),
            timestamp_raw: "2025-03-15T10:00:00Z".to_string(),
            media_urls: vec!["https://pbs.example.com/img.jpg".to_string()],
            mentioned_users_raw: r#"["@Bob"]"#.to_string(),
            hashtags_raw: String::new(),
            like_count: 3,
            reply_count: 0,
            share_count: 1,
            location_text: None,
            post_url: Some("https://x.com/jane/status/12345".to_string()),
        }
    }

    #[test]
    fn basic_twitter_row_normalizes() {
        let post = normalize(raw()).unwrap();
        assert_eq!(post.platform, "twitter");
        assert_eq!(post.author_handle, "jane");
        assert_eq!(post.mentioned_handles, vec!["bob"]);
        assert_eq!(post.hashtags, vec!["#AZ"]);
        let ts = post.posted_at.unwrap();
        assert_eq!((ts.year(), ts.hour()), (2025, 10));
    }

    #[test]
    fn blank_content_is_discarded() {
        let mut r = raw();
        r.content_text = "  ".to_string();
        assert!(normalize(r).is_none());

        let mut r = raw();
        r.content_text = "nan".to_string();
        assert!(normalize(r).is_none());
    }

    #[test]
    fn composite_external_id_is_trimmed() {
        let mut r = raw();
        r.external_post_id = "98765@recurring-event".to_string();
        assert_eq!(normalize(r).unwrap().external_post_id, "98765");
    }

    #[test]
    fn unparsable_timestamp_yields_null() {
        let mut r = raw();
        r.timestamp_raw = "yesterday-ish".to_string();
        assert!(normalize(r).unwrap().posted_at.is_none());
    }

    #[test]
    fn non_http_media_urls_are_dropped() {
        let mut r = raw();
        r.media_urls = vec!["EXPIRED".to_string(), "https://ok.example.com/a.png".to_string()];
        assert_eq!(
            normalize(r).unwrap().media_urls,
            vec!["https://ok.example.com/a.png"]
        );
    }
}

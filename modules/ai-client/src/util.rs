use base64::Engine;

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a model response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Standard base64 for inline media payloads.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Pull a JSON object out of a model response, trying in order: a fenced
/// ```json block, the widest `{…}` span, then the widest `[…]` span
/// (wrapped as `{"events": […]}`).
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    if text.is_empty() {
        return None;
    }

    if let Some(fence_start) = text.find("```json") {
        let after = &text[fence_start + "```json".len()..];
        if let Some(fence_end) = after.find("```") {
            if let Ok(value) = serde_json::from_str(after[..fence_end].trim()) {
                return Some(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                return Some(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text[start..=end]) {
                return Some(serde_json::json!({ "events": value }));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
        assert_eq!(truncate_to_char_boundary("Hello", 100), "Hello");
    }

    #[test]
    fn strip_code_blocks_handles_fences() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn base64_round_trip() {
        assert_eq!(encode_base64(b"abc"), "YWJj");
    }

    #[test]
    fn extract_json_prefers_fenced_block() {
        let text = "Here you go:\n```json\n{\"events\": [1]}\n```\ntrailing { not json }";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["events"][0], 1);
    }

    #[test]
    fn extract_json_falls_back_to_brace_span() {
        let value = extract_json_object("noise {\"a\": 2} more").unwrap();
        assert_eq!(value["a"], 2);
    }

    #[test]
    fn extract_json_wraps_bare_arrays() {
        let value = extract_json_object("[{\"EventName\": \"x\"}]").unwrap();
        assert_eq!(value["events"][0]["EventName"], "x");
    }

    #[test]
    fn extract_json_none_for_garbage() {
        assert!(extract_json_object("no structure here").is_none());
        assert!(extract_json_object("").is_none());
    }
}

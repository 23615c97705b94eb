//! JSON extraction from LLM text responses.
//!
//! Models that cannot use the structured-tool channel embed JSON in prose.
//! Extraction uses a brace-balanced scanner that honours string literals
//! (a depth counter over `{`/`}`, ignoring braces inside unescaped `"..."`),
//! so nested objects and braces inside string values parse correctly where
//! a regex would not.

/// Marker for the textual tool-call protocol.
pub const TOOL_CALL_MARKER: &str = "TOOL_CALL:";

/// Extract the first balanced `{...}` object from `text`.
pub fn extract_first_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    balanced_object(text, start)
}

/// Extract every JSON object following a `TOOL_CALL:` marker.
pub fn extract_tool_call_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(TOOL_CALL_MARKER) {
        let after_marker = search_from + found + TOOL_CALL_MARKER.len();
        let rest = &text[after_marker..];

        // The object must follow the marker with nothing but whitespace between
        let skipped = rest.len() - rest.trim_start().len();
        if rest.trim_start().starts_with('{') {
            if let Some(block) = balanced_object(text, after_marker + skipped) {
                blocks.push(block);
                search_from = after_marker + skipped + block.len();
                continue;
            }
        }
        search_from = after_marker;
    }

    blocks
}

/// Find a JSON object anywhere in `text` that carries `key`, e.g. the
/// `{"is_final_answer": true}` block a Responder may embed in its reply.
pub fn extract_object_with_key(text: &str, key: &str) -> Option<serde_json::Value> {
    let needle = format!("\"{key}\"");
    let mut search_from = 0;
    while let Some(found) = text[search_from..].find(&needle) {
        let at = search_from + found;
        if let Some(open) = text[..at].rfind('{') {
            if let Some(block) = balanced_object(text, open) {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(block) {
                    if value.get(key).is_some() {
                        return Some(value);
                    }
                }
            }
        }
        search_from = at + needle.len();
    }
    None
}

/// Scan a balanced object starting at byte offset `start` (which must point
/// at `{`). Returns the delimited substring, or `None` when the braces never
/// balance.
fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

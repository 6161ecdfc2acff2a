//! Lossy JSON recovery for LLM responses (§4.5, §9).
//!
//! LLMs routinely wrap JSON in markdown code fences, prepend a sentence of
//! preamble, or truncate mid-object on a token-limit cutoff. Rather than
//! treating any of that as an error, every caller in this crate that expects
//! JSON back from an LLM runs it through [`extract_json_object`] first and
//! falls back to a default value if even that fails — per §7, a parse
//! failure here must never propagate as an [`crate::error::EngineError`].

use serde_json::Value;

/// Strip a leading/trailing markdown code fence (```` ```json ... ``` ````
/// or plain ```` ``` ... ``` ````), if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

/// Find the largest brace-balanced `{...}` span in `text` and parse it as a
/// JSON object. Returns `None` if no balanced span parses as valid JSON.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let text = strip_code_fence(text);

    // Fast path: the whole (fence-stripped) string is valid JSON.
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }

    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let end = end?;
    let candidate = std::str::from_utf8(&bytes[start..=end]).ok()?;
    serde_json::from_str(candidate).ok()
}

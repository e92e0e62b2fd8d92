//! Extracts the JSON plan fragment from raw LLM output, which is often
//! wrapped in prose or a markdown code fence (spec §4.4 step 3).

/// Scans for the first `{` and returns the substring up to its matching
/// `}`, tracking string literals and escapes so braces inside strings don't
/// confuse the count.
pub fn extract_json_fragment(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let start = raw.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(raw[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

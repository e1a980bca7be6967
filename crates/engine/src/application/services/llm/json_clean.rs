//! Tolerant JSON extraction for model outputs.
//!
//! Agents are asked for strict JSON but models wrap it in code fences,
//! sprinkle comments, leave trailing commas and occasionally emit raw
//! control characters. One cleanup pass handles all four before the
//! strict parse; a second failure is the caller's chapter-level retry.

use serde::de::DeserializeOwned;

/// Parse a model response into `T`, tolerating the usual damage.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    // Fast path: the model behaved.
    if let Ok(value) = serde_json::from_str::<T>(raw.trim()) {
        return Ok(value);
    }
    let cleaned = clean_json(raw);
    serde_json::from_str(&cleaned).map_err(|e| format!("{e} (after cleanup)"))
}

/// Run the cleanup passes: fence stripping, body extraction, comment and
/// trailing-comma removal, control-character escaping.
pub fn clean_json(raw: &str) -> String {
    let stripped = strip_code_fences(raw);
    let body = extract_json_body(stripped);
    let no_comments = strip_comments(&body);
    let no_trailing = strip_trailing_commas(&no_comments);
    escape_control_chars(&no_trailing)
}

/// Remove a ```json ... ``` (or plain ```) wrapper if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Cut everything outside the outermost JSON object or array.
fn extract_json_body(raw: &str) -> String {
    let start = raw.find(['{', '[']);
    let end = raw.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e >= s => raw[s..=e].to_string(),
        _ => raw.to_string(),
    }
}

/// Remove `//` line comments and `/* */` block comments outside strings.
fn strip_comments(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' => match chars.peek() {
                Some('/') => {
                    for next in chars.by_ref() {
                        if next == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = ' ';
                    for next in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            break;
                        }
                        prev = next;
                    }
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }
    out
}

/// Remove commas immediately preceding a closing brace or bracket.
fn strip_trailing_commas(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in raw.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '}' | ']' => {
                // Drop a comma separated from this close by whitespace only.
                let trailing_ws: String = out
                    .chars()
                    .rev()
                    .take_while(|ch| ch.is_whitespace())
                    .collect();
                let check_at = out.len() - trailing_ws.len();
                if out[..check_at].ends_with(',') {
                    out.truncate(check_at - 1);
                    out.push_str(&trailing_ws.chars().rev().collect::<String>());
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Escape raw control characters that appear inside string literals and
/// drop them outside of strings.
fn escape_control_chars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in raw.chars() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                '"' => {
                    out.push(c);
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => out.push(c),
            }
        } else {
            match c {
                '"' => {
                    out.push(c);
                    in_string = true;
                }
                c if c.is_control() && c != '\n' && c != '\r' && c != '\t' => {}
                c => out.push(c),
            }
        }
    }
    out
}

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseNormalizationError {
    #[error("model response is empty")]
    Empty,
    #[error("model response contains no JSON object")]
    NoJsonObject,
    #[error("model response JSON object is truncated")]
    Truncated,
}

/// Extracts the outermost JSON object from free-form model output.
///
/// Output that already parses as JSON is returned as is. Otherwise a code
/// fence (with or without a language tag) opening before the first `{` is
/// skipped, and prose before or after the object is dropped. The object end
/// is found by string-aware brace matching, so backticks quoted inside
/// values never cut it short. An object whose braces never close is
/// reported as truncated rather than repaired.
pub fn normalize_json_response(raw: &str) -> Result<&str, ResponseNormalizationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ResponseNormalizationError::Empty);
    }
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed);
    }
    let body = skip_leading_fence(trimmed);
    let start = body
        .find('{')
        .ok_or(ResponseNormalizationError::NoJsonObject)?;
    let end = matching_brace_end(&body[start..]).ok_or(ResponseNormalizationError::Truncated)?;
    Ok(&body[start..start + end])
}

/// Text after the fence header line, when a fence opens before any `{`.
fn skip_leading_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    if text.find('{').is_some_and(|brace| brace < open) {
        return text;
    }
    let after_open = &text[open + 3..];
    match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open,
    }
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
fn matching_brace_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, character) in text.char_indices() {
        if in_string {
            match character {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match character {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

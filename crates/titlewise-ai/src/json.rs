//! Pulling a JSON document out of model output that may be wrapped in
//! markdown fences or surrounded by prose.

use serde::de::IgnoredAny;

/// Best-effort JSON extraction.
///
/// Tries, in order: a ```` ```json ```` fenced block, any fenced block that
/// starts with `{` or `[`, a balanced object or array, and finally
/// the span from the first opening to the last closing bracket.
pub fn extract_json(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(block) = fenced_block(text, "```json") {
        return Some(block);
    }
    if let Some(block) = fenced_block(text, "```").filter(|b| b.starts_with(['{', '['])) {
        return Some(block);
    }
    balanced(text).or_else(|| outer_span(text))
}

fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// Picks among the top-level balanced spans: the first object that parses,
/// else the first span that parses, else the first span. Bracketed prose such
/// as `found [1] issue` ahead of the real object is skipped this way.
fn balanced(text: &str) -> Option<&str> {
    let spans = balanced_spans(text);
    let parses = |s: &str| serde_json::from_str::<IgnoredAny>(s).is_ok();
    spans
        .iter()
        .copied()
        .find(|s| s.starts_with('{') && parses(s))
        .or_else(|| spans.iter().copied().find(|s| parses(s)))
        .or_else(|| spans.first().copied())
}

fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find(['{', '[']) {
        let start = from + offset;
        match span_end(&text[start..]) {
            Some(len) => {
                spans.push(&text[start..start + len]);
                from = start + len;
            }
            None => from = start + 1,
        }
    }
    spans
}

/// Byte length of the bracketed value opening `text`, honoring string
/// literals. `None` when it never closes or the brackets mismatch.
fn span_end(text: &str) -> Option<usize> {
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.pop()? != c {
                    return None;
                }
                if open.is_empty() {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn outer_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_block() {
        let text = "Here is the review:\n```json\n{\"a\": 1}\n```\nThanks.";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn bare_fence() {
        assert_eq!(extract_json("```\n[1, 2]\n```"), Some("[1, 2]"));
    }

    #[test]
    fn object_inside_prose() {
        let text = r#"Sure. {"summary": "a } inside", "issues": [{"id": "x"}]} Let me know."#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"summary": "a } inside", "issues": [{"id": "x"}]}"#)
        );
    }

    #[test]
    fn escaped_quotes_in_strings() {
        let text = r#"{"note": "said \"no\" }"}"#;
        assert_eq!(extract_json(text), Some(text));
    }

    #[test]
    fn unclosed_object_yields_inner_balanced_one() {
        assert_eq!(extract_json("x {\"a\": {\"b\": 1} y"), Some("{\"b\": 1}"));
    }

    #[test]
    fn mismatched_brackets_fall_back_to_outer_span() {
        assert_eq!(extract_json("x {\"a\": [1} y"), Some("{\"a\": [1}"));
    }

    #[test]
    fn bracketed_prose_before_object() {
        let text = "I found [1] issue:\n{\"issues\": [{\"category\": \"BOUNDARY_MISMATCH\"}]}";
        assert_eq!(
            extract_json(text),
            Some("{\"issues\": [{\"category\": \"BOUNDARY_MISMATCH\"}]}")
        );
    }

    #[test]
    fn bare_array_still_extracted() {
        assert_eq!(extract_json("Issues: [{\"id\": \"x\"}] done"), Some("[{\"id\": \"x\"}]"));
    }

    #[test]
    fn no_json() {
        assert_eq!(extract_json("I cannot help with that."), None);
        assert_eq!(extract_json("   "), None);
    }
}

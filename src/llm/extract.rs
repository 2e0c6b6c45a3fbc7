//! Extraction of structured JSON from free-form model output.
//!
//! Generation endpoints wrap their JSON in prose, truncate it, or emit
//! Python-flavoured literals. `extract_json` slices out the JSON-looking
//! region, tries a strict parse, and falls back to a structural repair pass
//! before reparsing. The result is a tagged value; nothing here panics and
//! untrusted text is never evaluated.

use serde_json::Value;

/// Outcome of one extraction attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum Extracted {
    Parsed(Value),
    Failed(String),
}

impl Extracted {
    /// Consumes the result, degrading failures to `None`.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Extracted::Parsed(value) => Some(value),
            Extracted::Failed(_) => None,
        }
    }
}

/// Extracts the first JSON object or array embedded in `raw`.
///
/// The slice runs from the earliest `[` or `{` to the matching last closing
/// delimiter (to the end of input when the closer is missing, leaving the
/// repair pass to balance it). Strict parse first, repair-and-reparse second,
/// `Failed` with both reasons third.
pub fn extract_json(raw: &str) -> Extracted {
    let list_start = raw.find('[');
    let object_start = raw.find('{');
    let (start, closer) = match (list_start, object_start) {
        (None, None) => return Extracted::Failed("no JSON delimiter found".into()),
        (Some(l), Some(o)) if l < o => (l, ']'),
        (Some(_), Some(o)) => (o, '}'),
        (Some(l), None) => (l, ']'),
        (None, Some(o)) => (o, '}'),
    };
    let end = raw
        .rfind(closer)
        .filter(|&e| e > start)
        .map(|e| e + 1)
        .unwrap_or(raw.len());
    let slice = &raw[start..end];

    match serde_json::from_str::<Value>(slice) {
        Ok(value) => Extracted::Parsed(value),
        Err(strict_err) => {
            let repaired = repair_json(slice);
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => Extracted::Parsed(value),
                Err(repair_err) => Extracted::Failed(format!(
                    "strict parse: {strict_err}; after repair: {repair_err}"
                )),
            }
        }
    }
}

/// Best-effort structural repair of almost-JSON text.
///
/// Handles the artifacts generation endpoints actually produce: single-quoted
/// strings, Python `True`/`False`/`None`, raw control characters inside
/// strings, trailing commas, and truncation (unterminated strings, unclosed
/// brackets and braces).
fn repair_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut single_quoted = false;
    let mut escaped = false;
    let mut word = String::new();

    fn flush_word(out: &mut String, word: &mut String) {
        if word.is_empty() {
            return;
        }
        match word.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            other => out.push_str(other),
        }
        word.clear();
    }

    fn trim_trailing_comma(out: &mut String) {
        out.truncate(out.trim_end().len());
        if out.ends_with(',') {
            out.pop();
        }
    }

    for c in input.chars() {
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
                '\'' if single_quoted => {
                    out.push('"');
                    in_string = false;
                    single_quoted = false;
                }
                '"' if single_quoted => out.push_str("\\\""),
                '"' => {
                    out.push('"');
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => {}
                _ => out.push(c),
            }
            continue;
        }

        if c.is_alphabetic() {
            word.push(c);
            continue;
        }
        flush_word(&mut out, &mut word);

        match c {
            '"' => {
                in_string = true;
                single_quoted = false;
                out.push('"');
            }
            '\'' => {
                in_string = true;
                single_quoted = true;
                out.push('"');
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                trim_trailing_comma(&mut out);
                if stack.last() == Some(&c) {
                    stack.pop();
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    flush_word(&mut out, &mut word);
    if in_string {
        out.push('"');
    }
    trim_trailing_comma(&mut out);
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

//! Response parser — turns raw model output into a structured intent.
//!
//! Models are unreliable about emitting *only* JSON, so the parser is
//! lenient about what surrounds the object (prose, markdown fences, extra
//! objects on later lines) and strict about the object itself: it must be
//! one of the two wire shapes
//!
//! ```text
//! {"type":"tool_request","tool_name":"<name>","arguments":{...}}
//! {"type":"final_answer","content":"<text>"}
//! ```
//!
//! Anything else is [`ParsedIntent::Unrecognized`]. Parsing is a pure
//! function with no shared state.

use serde::Deserialize;
use veracity_core::tool::ToolArguments;

const FENCE: &str = "```";

/// What the model asked for in one round.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedIntent {
    /// Run one tool, then continue the turn.
    ToolRequest {
        tool_name: String,
        arguments: ToolArguments,
    },

    /// Answer the user and end the turn.
    FinalAnswer { content: String },

    /// Neither shape could be found.
    Unrecognized,
}

impl ParsedIntent {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, ParsedIntent::Unrecognized)
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireIntent {
    ToolRequest {
        tool_name: String,
        #[serde(default)]
        arguments: Option<ToolArguments>,
    },
    FinalAnswer {
        content: String,
    },
}

/// Parse raw model output, returning the first intent found by, in order:
///
/// 1. the whole text (after stripping one fenced code block)
/// 2. its first non-empty line
/// 3. the first balanced `{...}` that has a legal shape
///
/// When a fence was stripped and nothing inside it parses, the unfenced
/// text is tried the same way.
pub fn parse(raw: &str) -> ParsedIntent {
    let trimmed = raw.trim();
    let unfenced = strip_fence(trimmed);

    let mut candidates = vec![unfenced];
    if unfenced != trimmed {
        candidates.push(trimmed);
    }

    candidates
        .into_iter()
        .find_map(|text| {
            parse_object(text)
                .or_else(|| first_line(text).and_then(parse_object))
                .or_else(|| scan_objects(text))
        })
        .unwrap_or(ParsedIntent::Unrecognized)
}

/// The body of the first fenced block, minus an optional language tag.
fn strip_fence(text: &str) -> &str {
    let Some(open) = text.find(FENCE) else {
        return text;
    };
    let mut body = &text[open + FENCE.len()..];

    let line_end = body.find('\n').unwrap_or(body.len());
    if body[..line_end].trim().chars().all(|c| c.is_ascii_alphanumeric()) {
        body = &body[line_end..];
    }

    match body.find(FENCE) {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

fn parse_object(candidate: &str) -> Option<ParsedIntent> {
    let intent = match serde_json::from_str::<WireIntent>(candidate.trim()).ok()? {
        WireIntent::ToolRequest {
            tool_name,
            arguments,
        } => {
            if tool_name.trim().is_empty() {
                return None;
            }
            ParsedIntent::ToolRequest {
                tool_name,
                arguments: arguments.unwrap_or_default(),
            }
        }
        WireIntent::FinalAnswer { content } => ParsedIntent::FinalAnswer { content },
    };
    Some(intent)
}

/// Try each top-level balanced object in turn. A candidate that fails to
/// parse is skipped whole, so objects nested inside it are never tried.
fn scan_objects(text: &str) -> Option<ParsedIntent> {
    let bytes = text.as_bytes();
    let mut from = 0;

    while let Some(offset) = text[from..].find('{') {
        let open = from + offset;
        match matching_brace(bytes, open) {
            Some(close) => {
                if let Some(intent) = parse_object(&text[open..=close]) {
                    return Some(intent);
                }
                from = close + 1;
            }
            None => from = open + 1,
        }
    }
    None
}

/// Index of the `}` closing the `{` at `open`, ignoring braces inside
/// JSON strings.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
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
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

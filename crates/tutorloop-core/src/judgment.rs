//! Interpretation of raw oracle responses.
//!
//! A response is either a well-formed structured payload (trusted), a
//! malformed but non-empty text that is classified lexically (low trust), or
//! empty (treated like a failed call).

use serde::Deserialize;

use crate::model::{Confidence, ErrorKind, Verdict};

/// Longest feedback kept from an unstructured response.
const MAX_INFERRED_FEEDBACK_CHARS: usize = 500;

const AFFIRMING: &[&str] = &[
    "correct",
    "right",
    "yes",
    "true",
    "exactly",
    "excellent",
    "perfect",
    "accurate",
    "good",
    "great",
    "valid",
];

const NEGATING: &[&str] = &[
    "incorrect",
    "wrong",
    "false",
    "mistake",
    "mistaken",
    "invalid",
    "inaccurate",
    "incomplete",
    "unfortunately",
    "nope",
];

/// Words that flip a following affirming word ("not correct").
const NEGATORS: &[&str] = &["not", "isn't", "isnt", "never", "hardly", "no"];

/// Outcome of reading a raw oracle response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    /// A well-formed payload; confidence is `Oracle`.
    Structured(Verdict),
    /// Malformed text classified by affirming/negating language; confidence is `Heuristic`.
    Inferred(Verdict),
    /// Nothing usable came back.
    Empty,
}

#[derive(Debug, Deserialize)]
struct OraclePayload {
    #[serde(alias = "is_correct", alias = "isCorrect")]
    correct: bool,
    #[serde(
        default,
        alias = "errorKind",
        alias = "error_type",
        alias = "errorType"
    )]
    error_kind: Option<String>,
    #[serde(default)]
    feedback: Option<String>,
}

/// Interpret a raw oracle response.
pub fn interpret_response(raw: &str) -> Interpretation {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Interpretation::Empty;
    }

    match parse_structured(trimmed) {
        Some(verdict) => Interpretation::Structured(verdict),
        None => Interpretation::Inferred(infer_lexically(trimmed)),
    }
}

/// Parse a structured payload, returning `None` if it is malformed.
///
/// The error kind must come from the closed set; any other string makes the
/// whole payload malformed.
pub fn parse_structured(raw: &str) -> Option<Verdict> {
    let json = extract_json_block(raw)?;
    let payload: OraclePayload = serde_json::from_str(json).ok()?;

    let error_kind = match payload.error_kind.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(kind) => Some(kind.parse::<ErrorKind>().ok()?),
    };

    let error_kind = match (payload.correct, error_kind) {
        (true, _) => ErrorKind::None,
        (false, None) | (false, Some(ErrorKind::None)) => ErrorKind::Unknown,
        (false, Some(kind)) => kind,
    };

    Some(Verdict {
        correct: payload.correct,
        error_kind,
        feedback: payload.feedback.unwrap_or_default().trim().to_string(),
        confidence: Confidence::Oracle,
    })
}

/// Best-effort classification of free text.
///
/// Correct only when affirming language appears without any negation.
/// Negative verdicts are classed as `Calculation`, everything else as
/// `Unknown`.
pub fn infer_lexically(raw: &str) -> Verdict {
    let lowered = raw.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    let mut affirming = 0usize;
    let mut negating = 0usize;
    for (i, word) in words.iter().enumerate() {
        if NEGATING.contains(word) {
            negating += 1;
        } else if AFFIRMING.contains(word) {
            let negated = i > 0 && NEGATORS.contains(&words[i - 1]);
            if negated {
                negating += 1;
            } else {
                affirming += 1;
            }
        }
    }

    let correct = affirming > 0 && negating == 0;
    let error_kind = if negating > 0 {
        ErrorKind::Calculation
    } else {
        ErrorKind::Unknown
    };

    Verdict {
        correct,
        error_kind,
        feedback: raw.chars().take(MAX_INFERRED_FEEDBACK_CHARS).collect(),
        confidence: Confidence::Heuristic,
    }
}

/// Locate a JSON object in an oracle response.
///
/// Handles:
/// - ```json fenced blocks (preferred)
/// - generic ``` fenced blocks
/// - a bare object, taken from the first `{` to the last `}`
pub fn extract_json_block(response: &str) -> Option<&str> {
    let mut generic = None;
    let mut rest = response;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let line_end = after_fence.find('\n').unwrap_or(after_fence.len());
        let lang = after_fence[..line_end].trim().to_lowercase();
        let body_start = (line_end + 1).min(after_fence.len());
        let body = &after_fence[body_start..];
        let (block, remainder) = match body.find("```") {
            Some(close) => (&body[..close], &body[close + 3..]),
            // Unclosed fence: take the rest of the response.
            None => (body, ""),
        };

        if lang == "json" {
            return Some(block.trim());
        }
        if lang.is_empty() && generic.is_none() && block.trim_start().starts_with('{') {
            generic = Some(block.trim());
        }
        rest = remainder;
    }

    if generic.is_some() {
        return generic;
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

//! Deterministic local validator used when the oracle is unavailable.
//!
//! Multiple-choice items are matched exactly against the expected answer
//! (option letters resolve to their option text). Free-form items are checked
//! for structural completeness and for the final and intermediate values of
//! the expected solution.

use crate::model::{AnswerAttempt, Confidence, ErrorKind, Expected, Item, ItemType, Verdict};
use crate::traits::option_labels;

/// Relative tolerance when comparing numbers.
const NUMERIC_TOLERANCE: f64 = 1e-6;

/// Characters a complete expression may not end with.
const DANGLING: &[char] = &['+', '-', '*', '/', '=', '^', '(', '[', '{', ','];

/// The rule-based fallback validator. Stateless and always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicValidator;

impl HeuristicValidator {
    pub fn new() -> Self {
        Self
    }

    /// Judge an attempt with local rules only.
    pub fn validate(&self, item: &Item, attempt: &AnswerAttempt) -> Verdict {
        match item.item_type {
            ItemType::MultipleChoice => self.validate_choice(item, &attempt.content),
            ItemType::FreeForm => self.validate_free_form(item, &attempt.content),
        }
    }

    fn validate_choice(&self, item: &Item, content: &str) -> Verdict {
        let expected = normalize(item.expected.final_answer());
        let chosen = resolve_choice(item, content);

        if chosen == expected {
            return heuristic(true, ErrorKind::None, "Correct.".to_string());
        }

        let known_option = item.options.iter().any(|o| normalize(o) == chosen);
        if item.options.is_empty() || known_option {
            heuristic(
                false,
                ErrorKind::Conceptual,
                format!(
                    "Not quite: the expected answer is {}.",
                    item.expected.final_answer()
                ),
            )
        } else {
            heuristic(
                false,
                ErrorKind::Syntax,
                "That answer is not one of the listed options.".to_string(),
            )
        }
    }

    fn validate_free_form(&self, item: &Item, content: &str) -> Verdict {
        if let Some(problem) = structural_problem(content) {
            return heuristic(false, ErrorKind::Syntax, problem);
        }

        let final_answer = item.expected.final_answer();
        if states_answer(content, final_answer) {
            return heuristic(true, ErrorKind::None, "Correct.".to_string());
        }

        let intermediates = item.expected.intermediates();
        let found = intermediates
            .iter()
            .filter(|value| mentions(content, value))
            .count();

        if !intermediates.is_empty() && found * 2 >= intermediates.len() {
            heuristic(
                false,
                ErrorKind::Calculation,
                format!(
                    "Your working is on track ({found} of {} steps found) but the final answer should be {final_answer}.",
                    intermediates.len()
                ),
            )
        } else if matches!(item.expected, Expected::Steps(_)) {
            heuristic(
                false,
                ErrorKind::Conceptual,
                "The key steps of the method are missing; review the approach.".to_string(),
            )
        } else {
            heuristic(
                false,
                ErrorKind::Unknown,
                format!("Not quite: the expected answer is {final_answer}."),
            )
        }
    }
}

fn heuristic(correct: bool, error_kind: ErrorKind, feedback: String) -> Verdict {
    Verdict {
        correct,
        error_kind,
        feedback,
        confidence: Confidence::Heuristic,
    }
}

/// Lowercase, drop surrounding punctuation and collapse whitespace.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '.' || c == ')' || c == '(')
        .trim()
        .to_lowercase()
}

/// Map a letter answer ("b", "B)", "(B)") to its option text.
fn resolve_choice(item: &Item, content: &str) -> String {
    let normalized = normalize(content);
    let mut chars = normalized.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        let letter = letter.to_ascii_uppercase();
        if let Some(option) = option_labels()
            .zip(&item.options)
            .find(|(label, _)| *label == letter)
            .map(|(_, option)| option)
        {
            return normalize(option);
        }
    }
    normalized
}

/// Returns a description of the first structural defect, if any.
fn structural_problem(content: &str) -> Option<String> {
    let mut stack = Vec::new();
    for c in content.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return Some(format!("Unmatched '{c}' in your answer."));
                }
            }
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Some(format!("Unclosed '{open}' in your answer."));
    }

    let last = content.trim_end().chars().last()?;
    if DANGLING.contains(&last) {
        return Some(format!("Your answer ends with '{last}', it looks unfinished."));
    }
    None
}

/// Whether the attempt gives `value` as its answer.
///
/// An expected equation must be the last one stated for its left-hand side.
/// An expected number must be the last number in the attempt, so listing
/// candidates earns nothing.
fn states_answer(content: &str, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }

    if let Some((lhs, rhs)) = split_equation(value) {
        if !content.contains('=') {
            return parse_number(&rhs)
                .zip(numbers_in(content).last())
                .is_some_and(|(expected, given)| approx_eq(given, expected));
        }
        return equations_in(content)
            .iter()
            .rev()
            .find(|(given, _)| same_side(given, &lhs))
            .is_some_and(|(_, given)| same_side(given, &rhs));
    }

    if let Some(expected) = parse_number(value) {
        return numbers_in(content)
            .last()
            .is_some_and(|given| approx_eq(given, expected));
    }

    contains_token(&canonical(content), &canonical(value))
}

/// Whether `value` appears anywhere in the attempt as a whole equation,
/// number or token.
fn mentions(content: &str, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }

    if let Some((lhs, rhs)) = split_equation(value) {
        return equations_in(content)
            .iter()
            .any(|(l, r)| same_side(l, &lhs) && same_side(r, &rhs));
    }

    if let Some(expected) = parse_number(value) {
        return numbers_in(content).any(|n| approx_eq(n, expected));
    }

    contains_token(&canonical(content), &canonical(value))
}

/// Lowercase with whitespace dropped around operators and kept, single,
/// between words: `"6 * 7"` and `"6*7"` agree, `"no idea"` stays two words.
fn canonical(s: &str) -> String {
    let mut out = String::new();
    for word in s.to_lowercase().split_whitespace() {
        if let (Some(prev), Some(next)) = (out.chars().last(), word.chars().next()) {
            if prev.is_alphanumeric() && next.is_alphanumeric() {
                out.push(' ');
            }
        }
        out.push_str(word);
    }
    out
}

/// Substring match that does not start or end inside a word or number.
fn contains_token(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric() || c == '.')
            && !after.is_some_and(char::is_alphanumeric)
    })
}

fn split_equation(value: &str) -> Option<(String, String)> {
    let (lhs, rhs) = value.split_once('=')?;
    let (lhs, rhs) = (canonical(lhs), canonical(rhs));
    (!lhs.is_empty() && !rhs.is_empty()).then_some((lhs, rhs))
}

fn same_side(a: &str, b: &str) -> bool {
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => approx_eq(x, y),
        _ => a == b,
    }
}

const CLAUSE_END: &[char] = &[',', ';', ':', '.'];

/// Numbers, operators and single-letter variables; not prose like "so" or "is".
fn is_expression_token(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        || token.chars().filter(|c| c.is_alphabetic()).count() <= 1
}

/// The `lhs = rhs` pairs stated in free text, in order.
///
/// A side runs from its `=` over expression tokens and stops at prose or at
/// a clause separator, so `"3x = 12, x = 4"` yields `3x = 12` and `x = 4`.
fn equations_in(content: &str) -> Vec<(String, String)> {
    let pieces: Vec<&str> = content.split('=').collect();
    pieces
        .windows(2)
        .filter_map(|pair| {
            let lhs = trailing_expression(pair[0]);
            let rhs = leading_expression(pair[1]);
            (!lhs.is_empty() && !rhs.is_empty()).then_some((lhs, rhs))
        })
        .collect()
}

fn trailing_expression(piece: &str) -> String {
    let mut tokens: Vec<&str> = piece
        .split_whitespace()
        .rev()
        .take_while(|token| !token.ends_with(CLAUSE_END) && is_expression_token(token))
        .collect();
    tokens.reverse();
    canonical(&tokens.join(" "))
}

fn leading_expression(piece: &str) -> String {
    let mut tokens = Vec::new();
    for token in piece.split_whitespace() {
        let bare = token.trim_end_matches(CLAUSE_END);
        if !is_expression_token(bare) {
            break;
        }
        tokens.push(bare);
        if bare.len() != token.len() {
            break;
        }
    }
    canonical(&tokens.join(" "))
}

fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| *c != ',' && *c != ' ').collect();
    if let Some((num, den)) = cleaned.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }
    cleaned.parse().ok()
}

/// Numeric literals appearing in free text, including simple fractions.
fn numbers_in(content: &str) -> impl Iterator<Item = f64> + '_ {
    content
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '/'))
        .filter_map(|token| {
            let token = token.trim_matches(|c: char| c == '.' || c == '/');
            if token.is_empty() || token == "-" {
                return None;
            }
            parse_number(token).or_else(|| {
                // "3-4" style ranges or subtractions: try the last signed part.
                token.rsplit('-').next().and_then(|t| t.parse().ok())
            })
        })
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= NUMERIC_TOLERANCE * b.abs().max(1.0)
}

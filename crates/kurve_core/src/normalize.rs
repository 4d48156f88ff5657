//! Cleaning and validation of user-entered expressions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the canonical expression length, in characters.
pub const MAX_EXPRESSION_LEN: usize = 200;

const FUNCTION_LETTERS: &str = "sincota";
const OPERATORS: &str = "+-*/^().";

/// Why a canonical expression was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    #[error("expression is empty")]
    Empty,
    #[error("expression has {len} characters, the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("character '{character}' is not allowed")]
    DisallowedCharacter { character: char },
    #[error("parentheses are not balanced")]
    UnbalancedParentheses,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedExpression {
    /// Text as the user typed it, kept for display.
    pub original: String,
    /// Cleaned form used for evaluation.
    pub canonical: String,
    pub valid: bool,
    #[serde(default)]
    pub rejection: Option<Rejection>,
}

/// Cleans and validates a raw expression.
pub fn normalize(raw: &str) -> NormalizedExpression {
    let canonical = canonicalize(raw);
    let rejection = validate(&canonical).err();
    NormalizedExpression {
        original: raw.to_string(),
        canonical,
        valid: rejection.is_none(),
        rejection,
    }
}

/// Produces the canonical form: whitespace stripped, `**` as `^`, decimal
/// commas as dots, lower case, superscript digits as an explicit `^digits`.
pub fn canonicalize(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let lowered = compact.replace("**", "^").replace(',', ".").to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    let mut in_superscript = false;
    for c in lowered.chars() {
        match superscript_digit(c) {
            Some(digit) => {
                if !in_superscript {
                    out.push('^');
                    in_superscript = true;
                }
                out.push(digit);
            }
            None => {
                in_superscript = false;
                out.push(c);
            }
        }
    }
    out
}

/// Checks a canonical expression against the input rules.
pub fn validate(canonical: &str) -> Result<(), Rejection> {
    if canonical.is_empty() {
        return Err(Rejection::Empty);
    }
    let len = canonical.chars().count();
    if len > MAX_EXPRESSION_LEN {
        return Err(Rejection::TooLong {
            len,
            max: MAX_EXPRESSION_LEN,
        });
    }
    if let Some(character) = canonical.chars().find(|c| !is_allowed(*c)) {
        return Err(Rejection::DisallowedCharacter { character });
    }

    let mut depth = 0usize;
    for c in canonical.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(Rejection::UnbalancedParentheses)?;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Rejection::UnbalancedParentheses);
    }
    Ok(())
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_digit() || c == 'x' || OPERATORS.contains(c) || FUNCTION_LETTERS.contains(c)
}

fn superscript_digit(c: char) -> Option<char> {
    match c {
        '\u{2070}' => Some('0'),
        '\u{00B9}' => Some('1'),
        '\u{00B2}' => Some('2'),
        '\u{00B3}' => Some('3'),
        '\u{2074}'..='\u{2079}' => char::from_digit(c as u32 - 0x2070, 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_applies_all_rewrites() {
        assert_eq!(canonicalize(" 2 * X ** 2 + 0,5 "), "2*x^2+0.5");
        assert_eq!(canonicalize("SIN(x)"), "sin(x)");
        assert_eq!(canonicalize("x² + x¹⁰ - 3x⁴"), "x^2+x^10-3x^4");
    }

    #[test]
    fn accepts_ordinary_expressions() {
        for raw in ["x^2-4", "sin(x)*cos(x)", "tan(x/2)", "(x+1)*(x-1)", "3.5*x"] {
            let normalized = normalize(raw);
            assert!(normalized.valid, "{raw} should be valid");
            assert_eq!(normalized.rejection, None);
            assert_eq!(normalized.original, raw);
        }
    }

    #[test]
    fn rejects_empty_and_whitespace_only() {
        assert_eq!(normalize("").rejection, Some(Rejection::Empty));
        assert_eq!(normalize("   ").rejection, Some(Rejection::Empty));
    }

    #[test]
    fn rejects_overlong_input() {
        let raw = "x+".repeat(100) + "x";
        let normalized = normalize(&raw);
        assert!(!normalized.valid);
        assert_eq!(
            normalized.rejection,
            Some(Rejection::TooLong { len: 201, max: 200 })
        );

        let at_limit = "x+".repeat(99) + "xx";
        assert_eq!(at_limit.len(), 200);
        assert!(normalize(&at_limit).valid);
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert_eq!(
            normalize("!!!invalid").rejection,
            Some(Rejection::DisallowedCharacter { character: '!' })
        );
        assert_eq!(
            normalize("exp(x)").rejection,
            Some(Rejection::DisallowedCharacter { character: 'e' })
        );
        assert_eq!(
            normalize("y+1").rejection,
            Some(Rejection::DisallowedCharacter { character: 'y' })
        );
    }

    #[test]
    fn rejects_unbalanced_parentheses() {
        for raw in ["(x+1", "x+1)", ")x(", "((x)"] {
            assert_eq!(
                normalize(raw).rejection,
                Some(Rejection::UnbalancedParentheses),
                "{raw}"
            );
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "X ** 2 - 4",
            "x²+2,5x",
            "x***2",
            "SIN ( x ) ^ 2",
            "(x+1",
            "!!!",
            "x³³-1",
        ] {
            let first = normalize(raw);
            let second = normalize(&first.canonical);
            assert_eq!(second.canonical, first.canonical, "{raw}");
            assert_eq!(second.valid, first.valid, "{raw}");
            assert_eq!(second.rejection, first.rejection, "{raw}");
        }
    }
}

//! Extraction of answers from free text.
//!
//! A mask is a positional template where `9` stands for a digit, `A` for an alphanumeric
//! character, `X` for any character and `+` repeats the previous element. Any other character
//! stands for itself. Both masks and regular expressions are searched anywhere in the text.

use regex::Regex;
use tracing::debug;

use super::error::PatternError;

/// How candidate answers are turned into accepted values.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Accept any non-blank text, trimmed.
    Trim,
    Mask(Regex),
    Expression(Regex),
}

impl Filter {
    /// Select the filter for an optional `mask` or `regex`, compiling it once.
    pub(super) fn new(mask: Option<&str>, regex: Option<&str>) -> Result<Self, PatternError> {
        match (mask, regex) {
            (Some(mask), _) => Ok(Self::Mask(compile_mask(mask)?)),
            (None, Some(regex)) => Ok(Self::Expression(compile_expression(regex)?)),
            (None, None) => Ok(Self::Trim),
        }
    }

    /// Extract the accepted value from `value`, or `None` when it does not fit.
    pub fn apply(&self, value: &str) -> Option<String> {
        match self {
            Self::Trim => Some(value.trim())
                .filter(|trimmed| !trimmed.is_empty())
                .map(str::to_string),
            Self::Mask(pattern) => whole_match(pattern, value),
            Self::Expression(pattern) => first_group(pattern, value),
        }
    }
}

/// Search `text` for a substring shaped like `mask`.
pub fn search_mask(mask: &str, text: &str) -> Result<Option<String>, PatternError> {
    if text.is_empty() {
        return Err(PatternError::EmptySubject);
    }

    let pattern = compile_mask(mask)?;
    Ok(whole_match(&pattern, text))
}

/// Search `text` for `expression`, returning the first capture group if it has one, or the
/// whole match otherwise.
pub fn search_expression(expression: &str, text: &str) -> Result<Option<String>, PatternError> {
    if text.is_empty() {
        return Err(PatternError::EmptySubject);
    }

    let pattern = compile_expression(expression)?;
    Ok(first_group(&pattern, text))
}

/// Translate a mask into the equivalent regular expression.
pub fn mask_to_expression(mask: &str) -> String {
    let mut expression = String::with_capacity(mask.len() * 2);

    for placeholder in mask.chars() {
        match placeholder {
            '9' => expression.push_str(r"\d"),
            'A' => expression.push_str(r"\w"),
            'X' => expression.push('.'),
            '+' => expression.push('+'),
            literal => expression.push_str(&regex::escape(literal.encode_utf8(&mut [0; 4]))),
        }
    }

    expression
}

fn compile_mask(mask: &str) -> Result<Regex, PatternError> {
    if mask.is_empty() {
        return Err(PatternError::EmptyPattern);
    }

    let expression = mask_to_expression(mask);
    debug!(mask = %mask, expression = %expression, "Translated mask");
    Ok(Regex::new(&expression)?)
}

fn compile_expression(expression: &str) -> Result<Regex, PatternError> {
    if expression.is_empty() {
        return Err(PatternError::EmptyPattern);
    }

    Ok(Regex::new(expression)?)
}

fn whole_match(pattern: &Regex, text: &str) -> Option<String> {
    pattern.find(text).map(|found| found.as_str().to_string())
}

fn first_group(pattern: &Regex, text: &str) -> Option<String> {
    let captures = pattern.captures(text)?;

    let found = if pattern.captures_len() > 1 {
        captures.get(1)
    } else {
        captures.get(0)
    };

    found.map(|found| found.as_str().to_string())
}

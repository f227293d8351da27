//! Glob patterns compiled to anchored regular expressions
//!
//! Supported syntax:
//! - `*` any run of characters (including none)
//! - `?` exactly one character
//! - `[abc]`, `[a-z]`, `[!abc]` character classes
//! - `{alt1,alt2}` alternation, nestable
//! - `\x` literal `x`

use regex::Regex;
use thiserror::Error;

use super::string::split_top_level;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid glob pattern '{pattern}': {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

impl PatternError {
    fn new(pattern: &str, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// A compiled glob that matches whole strings only
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let translated = translate(pattern)?;
        let regex =
            Regex::new(&translated).map_err(|e| PatternError::new(pattern, e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Compile a comma-separated list of globs. Commas inside `{...}` do not split.
pub fn compile_list(patterns: &str) -> Result<Vec<GlobPattern>, PatternError> {
    split_top_level(patterns, ',')
        .into_iter()
        .map(GlobPattern::compile)
        .collect()
}

/// True if any pattern matches
pub fn any_matches(patterns: &[GlobPattern], candidate: &str) -> bool {
    patterns.iter().any(|p| p.matches(candidate))
}

fn translate(pattern: &str) -> Result<String, PatternError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut chars = pattern.chars().peekable();
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(next) => push_literal(&mut out, next),
                None => return Err(PatternError::new(pattern, "trailing escape")),
            },
            '[' => translate_class(pattern, &mut chars, &mut out)?,
            '{' => {
                depth += 1;
                out.push_str("(?:");
            }
            '}' if depth > 0 => {
                depth -= 1;
                out.push(')');
            }
            ',' if depth > 0 => out.push('|'),
            other => push_literal(&mut out, other),
        }
    }

    if depth > 0 {
        return Err(PatternError::new(pattern, "unclosed '{'"));
    }
    out.push('$');
    Ok(out)
}

fn translate_class(
    pattern: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    out: &mut String,
) -> Result<(), PatternError> {
    let negated = chars.next_if_eq(&'!').is_some();
    let mut items = String::new();
    let mut empty = true;

    loop {
        let c = match chars.next() {
            Some(']') => break,
            Some('\\') => chars
                .next()
                .ok_or_else(|| PatternError::new(pattern, "trailing escape"))?,
            Some(c) => c,
            None => return Err(PatternError::new(pattern, "unclosed '['")),
        };

        if chars.peek() == Some(&'-') {
            chars.next();
            let hi = match chars.next() {
                Some(']') | None => {
                    return Err(PatternError::new(pattern, "unterminated range in '[...]'"));
                }
                Some(hi) => hi,
            };
            if hi < c {
                return Err(PatternError::new(
                    pattern,
                    format!("invalid range '{}-{}'", c, hi),
                ));
            }
            items.push_str(&regex::escape(&c.to_string()));
            items.push('-');
            items.push_str(&regex::escape(&hi.to_string()));
        } else {
            items.push_str(&regex::escape(&c.to_string()));
        }
        empty = false;
    }

    if empty {
        return Err(PatternError::new(pattern, "empty character class"));
    }

    out.push('[');
    if negated {
        out.push('^');
    }
    out.push_str(&items);
    out.push(']');
    Ok(())
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

//! Text patterns: exact values, wildcard globs and regular expressions.

use regex::{Regex, RegexBuilder};
use std::sync::Arc;

/// A string value with pre-computed lowercase for efficient case-insensitive matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    /// Original value (for case-sensitive matching)
    pub value: String,
    /// Pre-computed lowercase (for case-insensitive matching)
    pub lower: String,
}

impl CachedValue {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let lower = value.to_lowercase();
        Self { value, lower }
    }

    /// Get the appropriate value for matching based on case sensitivity.
    #[inline]
    pub fn pattern(&self, ignore_case: bool) -> &str {
        if ignore_case {
            &self.lower
        } else {
            &self.value
        }
    }

    #[inline]
    pub fn equals(&self, value: &str, ignore_case: bool) -> bool {
        if ignore_case {
            value.to_lowercase() == self.lower
        } else {
            value == self.value
        }
    }

    /// Glob match where `*` is any run of characters and `?` is exactly one.
    pub fn glob(&self, value: &str, ignore_case: bool) -> bool {
        let pattern: Vec<char> = self.pattern(ignore_case).chars().collect();
        let text: Vec<char> = if ignore_case {
            value.to_lowercase().chars().collect()
        } else {
            value.chars().collect()
        };
        glob_match(&pattern, &text)
    }
}

impl From<&str> for CachedValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Iterative glob matcher with single-star backtracking.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Compile a regex, honouring ignore-case through the builder rather than the pattern.
pub fn compile_regex(pattern: &str, ignore_case: bool) -> Result<Arc<Regex>, regex::Error> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()?;
    Ok(Arc::new(regex))
}

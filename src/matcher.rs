use std::fmt::{Display, Formatter};

use log::warn;
use regex_lite::Regex;
use serde::Deserialize;

/// How a declared pattern is matched against a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMatcherKind {
    #[default]
    Exact,
    Regexp,
    Glob,
}

impl PatternMatcherKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "exact" => Some(Self::Exact),
            "regexp" => Some(Self::Regexp),
            "glob" => Some(Self::Glob),
            _ => None,
        }
    }

    /// Compiles `pattern` once for repeated matching.
    pub fn compile(self, pattern: &str) -> CompiledPattern {
        match self {
            Self::Exact => CompiledPattern::Exact(pattern.to_owned()),
            Self::Regexp => compile_anchored(pattern),
            Self::Glob => {
                if pattern == "*" {
                    CompiledPattern::Any
                } else {
                    compile_anchored(&glob_to_regex(pattern))
                }
            }
        }
    }

    pub fn matches(self, pattern: &str, value: &str) -> bool {
        self.compile(pattern).matches(value)
    }
}

impl Display for PatternMatcherKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::Regexp => f.write_str("regexp"),
            Self::Glob => f.write_str("glob"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Any,
    Exact(String),
    Regex(Regex),
    Never,
}

impl CompiledPattern {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == value,
            Self::Regex(regex) => regex.is_match(value),
            Self::Never => false,
        }
    }
}

fn compile_anchored(pattern: &str) -> CompiledPattern {
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(regex) => CompiledPattern::Regex(regex),
        Err(error) => {
            warn!("Invalid pattern `{}`, it will match nothing: {}", pattern, error);
            CompiledPattern::Never
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2);
    for ch in glob.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            c if r"\.+()|[]{}^$".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_regexp_and_glob() {
        assert!(PatternMatcherKind::Exact.matches("1.0", "1.0"));
        assert!(!PatternMatcherKind::Exact.matches("1.0", "1.0.1"));
        assert!(PatternMatcherKind::Regexp.matches(r"1\.\d+", "1.12"));
        assert!(!PatternMatcherKind::Regexp.matches(r"1\.\d+", "21.12"));
        assert!(PatternMatcherKind::Glob.matches("org.acme.*", "org.acme.core"));
        assert!(!PatternMatcherKind::Glob.matches("org.acme.*", "org.acmeX"));
        assert!(PatternMatcherKind::Glob.matches("*", "anything"));
        assert!(!PatternMatcherKind::Regexp.matches("(", "("));
    }
}

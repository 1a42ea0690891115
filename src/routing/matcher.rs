//! Path matching.
//!
//! # Design Decisions
//! - Exact matches compare the full decoded pathname, case-sensitive
//! - `/x` and `/x/` are different paths
//! - Patterns are regular expressions tested against the pathname

use regex::Regex;

/// Path condition of a handler entry.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Pattern(Regex),
}

impl Matcher {
    pub fn matches(&self, pathname: &str) -> bool {
        match self {
            Matcher::Exact(path) => path == pathname,
            Matcher::Pattern(pattern) => pattern.is_match(pathname),
        }
    }

    /// Short form for logs.
    pub fn describe(&self) -> String {
        match self {
            Matcher::Exact(path) => path.clone(),
            Matcher::Pattern(pattern) => format!("~{}", pattern.as_str()),
        }
    }
}

impl From<&str> for Matcher {
    fn from(path: &str) -> Self {
        Matcher::Exact(path.to_string())
    }
}

impl From<String> for Matcher {
    fn from(path: String) -> Self {
        Matcher::Exact(path)
    }
}

impl From<Regex> for Matcher {
    fn from(pattern: Regex) -> Self {
        Matcher::Pattern(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_strict() {
        let matcher = Matcher::from("/x");
        assert!(matcher.matches("/x"));
        assert!(!matcher.matches("/x/"));
        assert!(!matcher.matches("/X"));
        assert!(!matcher.matches("/xy"));
    }

    #[test]
    fn pattern_match() {
        let matcher = Matcher::from(Regex::new(r"^/files/\d+$").unwrap());
        assert!(matcher.matches("/files/42"));
        assert!(!matcher.matches("/files/abc"));
        assert_eq!(matcher.describe(), r"~^/files/\d+$");
    }
}

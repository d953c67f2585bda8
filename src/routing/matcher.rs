//! Route matching logic.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefixes match whole segments: `/api/auth` matches `/api/auth` and
//!   `/api/auth/login`, never `/api/authors`
//! - No regex to guarantee O(n) matching

/// Matches the request path prefix on a segment boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher. A trailing slash is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true if `path` (without query string) falls under this prefix.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// The part of `path_and_query` after the prefix, or `None` if it does not match.
    pub fn strip<'a>(&self, path_and_query: &'a str) -> Option<&'a str> {
        let path = path_and_query.split('?').next().unwrap_or_default();
        if !self.matches(path) {
            return None;
        }
        if self.prefix == "/" {
            return Some(path_and_query);
        }
        Some(&path_and_query[self.prefix.len()..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api/auth");

        assert!(matcher.matches("/api/auth"));
        assert!(matcher.matches("/api/auth/"));
        assert!(matcher.matches("/api/auth/login"));
        assert!(!matcher.matches("/api/authors"));
        assert!(!matcher.matches("/api"));
        assert!(!matcher.matches("/API/auth")); // case sensitive
    }

    #[test]
    fn trailing_slash_in_prefix_is_ignored() {
        let matcher = PathPrefixMatcher::new("/api/books/");
        assert_eq!(matcher.prefix(), "/api/books");
        assert!(matcher.matches("/api/books/42"));
    }

    #[test]
    fn root_prefix_matches_everything() {
        let matcher = PathPrefixMatcher::new("/");
        assert!(matcher.matches("/"));
        assert!(matcher.matches("/anything/at/all"));
        assert_eq!(matcher.strip("/a?b=1"), Some("/a?b=1"));
    }

    #[test]
    fn strip_keeps_query() {
        let matcher = PathPrefixMatcher::new("/api/chat");
        assert_eq!(matcher.strip("/api/chat/foo?room=fantasy"), Some("/foo?room=fantasy"));
        assert_eq!(matcher.strip("/api/chat?page=2"), Some("?page=2"));
        assert_eq!(matcher.strip("/api/chatter?x=/api/chat"), None);
    }
}

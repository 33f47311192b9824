//! Route pattern compilation, matching and specificity scoring.
//!
//! Patterns are slash-delimited paths. A single `*` matches one or more
//! characters inside a segment, `**` matches anything (including `/` and the
//! empty string). Patterns are compiled once into a regex and reused for every
//! request that hits the owning project.
//!
//! Two compatibility rules widen matching at the route level (see
//! [`Pattern::matches`]):
//! - a pattern shaped exactly `<prefix>/*` also accepts any path under
//!   `<prefix>/`, at any depth;
//! - a path ending in `.html` also matches the literal pattern equal to the
//!   path without that extension.

use regex::Regex;
use thiserror::Error;

/// Bonus that lifts every literal pattern above any wildcard pattern.
const LITERAL_BONUS: i64 = 1000;
const SINGLE_WILDCARD_COST: i64 = 1;
const MULTI_WILDCARD_COST: i64 = 10;

const HTML_SUFFIX: &str = ".html";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("route pattern must start with '/'")]
    MissingLeadingSlash,
    #[error("route pattern must not contain whitespace")]
    Whitespace,
    #[error("route pattern contains a run of more than two '*'")]
    TooManyStars,
    #[error("route pattern failed to compile: {0}")]
    Compile(String),
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal,
    Glob(Regex),
}

/// A validated, compiled route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    matcher: Matcher,
    single_wildcards: usize,
    multi_wildcards: usize,
    // `Some("<prefix>/")` when the pattern is exactly `<prefix>/*`.
    legacy_prefix: Option<String>,
}

impl Pattern {
    /// Validates and compiles `source`.
    ///
    /// # Errors
    /// Returns a [`PatternError`] when the pattern does not start with `/`,
    /// contains whitespace, or has a run of three or more `*`.
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        if !source.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash);
        }
        if source.chars().any(char::is_whitespace) {
            return Err(PatternError::Whitespace);
        }

        let mut expr = String::from("^");
        let mut literal = String::new();
        let mut single_wildcards = 0;
        let mut multi_wildcards = 0;
        let mut chars = source.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch != '*' {
                literal.push(ch);
                continue;
            }
            let mut run = 1;
            while chars.peek() == Some(&'*') {
                chars.next();
                run += 1;
            }
            expr.push_str(&regex::escape(&literal));
            literal.clear();
            match run {
                1 => {
                    single_wildcards += 1;
                    expr.push_str("[^/]+");
                }
                2 => {
                    multi_wildcards += 1;
                    expr.push_str(".*");
                }
                _ => return Err(PatternError::TooManyStars),
            }
        }

        let matcher = if single_wildcards == 0 && multi_wildcards == 0 {
            Matcher::Literal
        } else {
            expr.push_str(&regex::escape(&literal));
            expr.push('$');
            Matcher::Glob(Regex::new(&expr).map_err(|err| PatternError::Compile(err.to_string()))?)
        };

        let legacy_prefix = (single_wildcards == 1 && multi_wildcards == 0)
            .then(|| source.strip_suffix('*'))
            .flatten()
            .filter(|prefix| prefix.ends_with('/'))
            .map(str::to_string);

        Ok(Self {
            source: source.to_string(),
            matcher,
            single_wildcards,
            multi_wildcards,
            legacy_prefix,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn has_wildcards(&self) -> bool {
        matches!(self.matcher, Matcher::Glob(_))
    }

    /// Ranking used to pick the best matching route; higher wins.
    ///
    /// Literal patterns score `len + 1000`. Wildcard patterns score
    /// `len - singles - 10 * multis`.
    #[must_use]
    pub fn specificity(&self) -> i64 {
        let len = i64::try_from(self.source.len()).unwrap_or(i64::MAX - LITERAL_BONUS);
        if self.has_wildcards() {
            let singles = i64::try_from(self.single_wildcards).unwrap_or(i64::MAX);
            let multis = i64::try_from(self.multi_wildcards).unwrap_or(i64::MAX);
            len - singles * SINGLE_WILDCARD_COST - multis * MULTI_WILDCARD_COST
        } else {
            len + LITERAL_BONUS
        }
    }

    /// Strict grammar match: literals must be identical, `*` stays inside one
    /// segment, `**` spans segments.
    #[must_use]
    pub fn glob_matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Literal => self.source == path,
            Matcher::Glob(regex) => regex.is_match(path),
        }
    }

    /// Route-level match: the strict grammar plus the directory-prefix and
    /// `.html` fallback rules.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        if self.glob_matches(path) {
            return true;
        }
        if let Some(prefix) = &self.legacy_prefix
            && path.starts_with(prefix.as_str())
        {
            return true;
        }
        match self.matcher {
            Matcher::Literal => path
                .strip_suffix(HTML_SUFFIX)
                .is_some_and(|stripped| stripped == self.source),
            Matcher::Glob(_) => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pattern(source: &str) -> Pattern {
        Pattern::parse(source).unwrap()
    }

    #[test]
    fn literal_matches_only_identical_path() {
        let p = pattern("/a/b");
        assert!(p.glob_matches("/a/b"));
        assert!(!p.glob_matches("/a/c"));
        assert!(!p.glob_matches("/a/b/"));
        assert!(!p.has_wildcards());
    }

    #[test]
    fn single_wildcard_stays_within_a_segment() {
        assert!(pattern("/status/*/*").glob_matches("/status/200/OK"));
        assert!(!pattern("/drip/*").glob_matches("/drip/10/2/0/200"));
        assert!(!pattern("/drip/*").glob_matches("/drip/"));
        assert!(pattern("/files/*.js").glob_matches("/files/app.js"));
        assert!(!pattern("/files/*.js").glob_matches("/files/app.css"));
    }

    #[test]
    fn double_wildcard_spans_segments_and_may_be_empty() {
        let p = pattern("/drip/**");
        assert!(p.glob_matches("/drip/10/2/0/200"));
        assert!(p.glob_matches("/drip/"));
        assert!(!p.glob_matches("/drop/1"));
        assert!(pattern("/**").glob_matches("/"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = pattern("/v1.0/*");
        assert!(p.glob_matches("/v1.0/users"));
        assert!(!p.glob_matches("/v1x0/users"));
    }

    #[test]
    fn specificity_orders_literal_single_multi() {
        let literal = pattern("/api/users").specificity();
        let single = pattern("/api/*").specificity();
        let multi = pattern("/**").specificity();
        assert_eq!(literal, 1010);
        assert_eq!(single, 5);
        assert_eq!(multi, -7);
        assert!(literal > single && single > multi);
    }

    #[test]
    fn legacy_prefix_accepts_nested_paths() {
        let p = pattern("/assets/*");
        assert!(!p.glob_matches("/assets/js/app.js"));
        assert!(p.matches("/assets/js/app.js"));
        assert!(p.matches("/assets/app.js"));
        assert!(!p.matches("/assetsx/app.js"));
    }

    #[test]
    fn catch_all_accepts_every_path() {
        let p = pattern("/*");
        assert!(p.matches("/"));
        assert!(p.matches("/blog/2024/post"));
    }

    #[test]
    fn legacy_prefix_requires_exact_shape() {
        // A second wildcard disables the prefix rule.
        let p = pattern("/*/files/*");
        assert!(!p.matches("/a/files/b/c"));
        // So does a wildcard that is not a whole trailing segment.
        let p = pattern("/files/a*");
        assert!(!p.matches("/files/abc/d"));
    }

    #[test]
    fn html_fallback_matches_extensionless_literal() {
        let p = pattern("/about");
        assert!(p.matches("/about.html"));
        assert!(p.matches("/about"));
        assert!(!p.matches("/about.htm"));
        assert!(!pattern("/about/*").matches("/about.html"));
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert_eq!(
            Pattern::parse("api/*").unwrap_err(),
            PatternError::MissingLeadingSlash
        );
        assert_eq!(
            Pattern::parse("/a/***").unwrap_err(),
            PatternError::TooManyStars
        );
        assert_eq!(
            Pattern::parse("/a b").unwrap_err(),
            PatternError::Whitespace
        );
    }
}

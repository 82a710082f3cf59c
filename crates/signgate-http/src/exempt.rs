//! ANT-style path exemptions.
//!
//! Pattern syntax, evaluated per `/`-separated segment:
//!
//! - `**` matches zero or more whole segments
//! - `*` matches any run of characters within one segment
//! - `?` matches exactly one character within one segment
//!
//! A trailing `/` on the request path is ignored. Request paths are
//! normalized before matching: repeated slashes collapse and `.`/`..`
//! segments are resolved. A path is exempt only if both its raw and its
//! percent-decoded form match, so encoded separators cannot reach an
//! exempt pattern that the decoded route would not.

use percent_encoding::percent_decode_str;
use regex::Regex;
use signgate_core::{DEFAULT_EXEMPT_PATHS, SignGateError, SignGateResult};

/// One compiled ANT-style pattern.
#[derive(Debug, Clone)]
pub struct AntPattern {
    pattern: String,
    regex: Regex,
}

impl AntPattern {
    /// Compile `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`SignGateError::InvalidPattern`] if the pattern does not start
    /// with `/` or uses `**` inside a segment.
    pub fn compile(pattern: &str) -> SignGateResult<Self> {
        let invalid = |reason: &str| SignGateError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("pattern must start with '/'"));
        }

        let mut source = String::from("^");
        for segment in pattern.split('/').filter(|s| !s.is_empty()) {
            match segment {
                "**" => source.push_str("(?:/[^/]+)*"),
                "*" => source.push_str("/[^/]+"),
                s if s.contains("**") => return Err(invalid("'**' must be a whole segment")),
                s => {
                    source.push('/');
                    for ch in s.chars() {
                        match ch {
                            '*' => source.push_str("[^/]*"),
                            '?' => source.push_str("[^/]"),
                            c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
                        }
                    }
                }
            }
        }
        source.push_str("/?$");

        let regex = Regex::new(&source).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
        })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether the already-normalized `path` matches.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Ordered set of exemption patterns.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<AntPattern>,
}

impl PathMatcher {
    /// Compile `patterns`, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns the first [`SignGateError::InvalidPattern`] encountered.
    pub fn new<I, S>(patterns: I) -> SignGateResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| AntPattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// The compiled patterns in match order.
    #[must_use]
    pub fn patterns(&self) -> &[AntPattern] {
        &self.patterns
    }

    /// The first pattern matching `path`, if the path is exempt.
    #[must_use]
    pub fn matching_pattern(&self, path: &str) -> Option<&AntPattern> {
        let raw = normalize_path(path);
        let decoded = normalize_path(&percent_decode_str(path).decode_utf8_lossy());
        self.patterns
            .iter()
            .find(|p| p.matches(&raw) && p.matches(&decoded))
    }

    /// Whether `path` is exempt from signature verification.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }
}

impl Default for PathMatcher {
    fn default() -> Self {
        let patterns = DEFAULT_EXEMPT_PATHS
            .iter()
            .filter_map(|p| AntPattern::compile(p).ok())
            .collect();
        Self { patterns }
    }
}

/// Collapse repeated slashes and resolve `.` and `..` segments.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

//! Built-in credential patterns.
//!
//! Each pattern describes one family of credential assignment. The order of
//! [`credential_patterns`] is the order families are checked in.

use regex::Regex;

/// A compiled credential pattern.
#[derive(Debug)]
pub struct CredentialPattern {
    /// Family name for identification.
    pub name: &'static str,

    /// Reason reported when this family matches.
    pub reason: &'static str,

    /// The compiled regex.
    regex: Regex,
}

impl CredentialPattern {
    /// Create a new credential pattern.
    ///
    /// # Panics
    ///
    /// Panics if the regex pattern is invalid.
    #[must_use]
    pub fn new(name: &'static str, reason: &'static str, pattern: &str) -> Self {
        Self {
            name,
            reason,
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
        }
    }

    /// Check if the content matches this pattern.
    #[must_use]
    pub fn matches(&self, content: &str) -> bool {
        self.regex.is_match(content)
    }
}

/// Get the built-in credential patterns in evaluation order.
#[must_use]
pub fn credential_patterns() -> Vec<CredentialPattern> {
    vec![
        CredentialPattern::new(
            "password",
            "contains password",
            r"(?i)(password|passwd|pwd)\s*[:=]\s*\S+",
        ),
        CredentialPattern::new(
            "token",
            "contains token",
            r"(?i)(token|bearer)\s*[:=]?\s*[A-Za-z0-9_-]{20,}",
        ),
        CredentialPattern::new(
            "api_key",
            "contains API key",
            r"(?i)(api[_-]?key|secret[_-]?key)\s*[:=]\s*\S+",
        ),
    ]
}

/// Fragments whose presence marks content as source code.
#[must_use]
pub fn code_markers() -> &'static [&'static str] {
    &[
        "func ",
        "function ",
        "def ",
        "class ",
        "import ",
        "const ",
        "let ",
        "var ",
    ]
}

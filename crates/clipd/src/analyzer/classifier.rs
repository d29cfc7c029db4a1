//! Content classifier.
//!
//! The classifier decides, for one piece of clipboard text, whether it is a
//! credential and what kind of content it is. It is pure: no I/O, no state
//! beyond its compiled patterns, and the same input always yields the same
//! verdict.

use tracing::trace;

use super::patterns::{code_markers, credential_patterns, CredentialPattern};
use crate::entry::{Classification, ContentType};

/// Maps raw content to a [`Classification`].
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Classify the given content. Never fails.
    fn analyze(&self, content: &str) -> Classification;
}

/// The built-in analyzer.
#[derive(Debug)]
pub struct Classifier {
    patterns: Vec<CredentialPattern>,
}

impl Classifier {
    /// Create a classifier with the built-in credential patterns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: credential_patterns(),
        }
    }

    /// Structural content-type detection for non-sensitive content.
    fn detect_type(content: &str) -> ContentType {
        if looks_binary(content) {
            return ContentType::Unknown;
        }

        if has_prefix_ignore_case(content, "http://") || has_prefix_ignore_case(content, "https://")
        {
            return ContentType::Url;
        }

        if content.starts_with('/') || content.contains(":\\") {
            return ContentType::FilePath;
        }

        if code_markers().iter().any(|marker| content.contains(marker)) {
            return ContentType::Code;
        }

        ContentType::Text
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for Classifier {
    fn analyze(&self, content: &str) -> Classification {
        if let Some(pattern) = self.patterns.iter().find(|p| p.matches(content)) {
            trace!(family = pattern.name, "Credential pattern matched");
            return Classification::sensitive(pattern.reason);
        }

        Classification::safe(Self::detect_type(content))
    }
}

fn has_prefix_ignore_case(content: &str, prefix: &str) -> bool {
    content
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Content with NUL bytes or non-whitespace control characters.
fn looks_binary(content: &str) -> bool {
    content
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

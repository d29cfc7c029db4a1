//! Core clipboard types for clipd.
//!
//! A [`CapturedValue`] is what the monitor sees on the clipboard. It is handed
//! to the ingestion service exactly once and, if accepted, becomes an
//! [`Entry`] with an identifier assigned by storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A value read from the clipboard, not yet accepted for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedValue {
    /// The captured text.
    pub content: String,
    /// When the value was captured.
    pub captured_at: DateTime<Utc>,
}

impl CapturedValue {
    /// Create a captured value timestamped now.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            captured_at: Utc::now(),
        }
    }

    /// Create a captured value with an explicit timestamp.
    #[must_use]
    pub fn at(content: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            captured_at,
        }
    }

    /// Check if the captured content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A persisted clipboard entry.
///
/// Entries are immutable once stored. The identifier is opaque to everything
/// except the storage adapter that assigned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Identifier assigned by storage.
    pub id: String,
    /// The stored text.
    pub content: String,
    /// When the content was captured.
    pub timestamp: DateTime<Utc>,
}

/// The kind of content found on the clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain prose or anything unrecognised.
    Text,
    /// An `http://` or `https://` address.
    Url,
    /// Source code.
    Code,
    /// A filesystem path.
    #[serde(rename = "filepath")]
    FilePath,
    /// Content that could not be inspected.
    Unknown,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Url => write!(f, "url"),
            Self::Code => write!(f, "code"),
            Self::FilePath => write!(f, "filepath"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// The verdict computed for one captured value. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The detected content type.
    pub content_type: ContentType,
    /// Whether the content looks like a credential.
    pub is_sensitive: bool,
    /// Which credential family matched; empty when not sensitive.
    pub reason: String,
}

impl Classification {
    /// A non-sensitive verdict of the given type.
    #[must_use]
    pub fn safe(content_type: ContentType) -> Self {
        Self {
            content_type,
            is_sensitive: false,
            reason: String::new(),
        }
    }

    /// A sensitive verdict carrying the matched family name.
    #[must_use]
    pub fn sensitive(reason: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            is_sensitive: true,
            reason: reason.into(),
        }
    }
}

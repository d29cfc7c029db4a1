//! Content analysis for captured clipboard values.
//!
//! - **Credential detection**: password, token, and API-key assignments are
//!   flagged as sensitive. Families are checked in that order and the first
//!   match determines the reported reason.
//!
//! - **Content typing**: non-sensitive content is tagged as a URL, file path,
//!   source code, plain text, or unknown (binary-looking) content.
//!
//! # Example
//!
//! ```
//! use clipd::analyzer::{Analyzer, Classifier};
//! use clipd::entry::ContentType;
//!
//! let classifier = Classifier::new();
//!
//! let verdict = classifier.analyze("password: hunter2");
//! assert!(verdict.is_sensitive);
//!
//! let verdict = classifier.analyze("https://example.com");
//! assert_eq!(verdict.content_type, ContentType::Url);
//! ```

mod classifier;
mod patterns;

pub use classifier::{Analyzer, Classifier};
pub use patterns::{code_markers, credential_patterns, CredentialPattern};

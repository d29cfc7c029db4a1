//! Clipboard change detection.
//!
//! The polling loop asks a [`Monitor`] once per tick whether the clipboard
//! changed. Monitors keep just enough state to answer that question; they
//! never decide what gets stored.

use clipboard_rs::{Clipboard, ClipboardContext, ContentFormat};
use tracing::{debug, trace};

use crate::entry::CapturedValue;
use crate::error::{Error, Result};

/// Largest clipboard payload passed on, in bytes.
pub const MAX_CONTENT_LENGTH: usize = 1_000_000;

/// A source of clipboard changes.
pub trait Monitor: Send + std::fmt::Debug {
    /// Check for a changed value.
    ///
    /// Returns `Ok(None)` when nothing changed since the last reported value.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard could not be read. Callers treat
    /// this as transient.
    fn check(&mut self) -> Result<Option<CapturedValue>>;
}

/// Reads the system clipboard through `clipboard-rs`.
///
/// A fresh clipboard context is opened on every check so a restarted display
/// server or pasteboard does not wedge the monitor.
#[derive(Debug, Default)]
pub struct ClipboardMonitor {
    last_hash: Option<blake3::Hash>,
}

impl ClipboardMonitor {
    /// Create a monitor with no history; the first non-empty read is a change.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current clipboard text.
    ///
    /// Empty and non-text clipboards read as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be opened, or if it
    /// advertises text that cannot be read.
    pub fn current_text() -> Result<Option<String>> {
        let ctx = ClipboardContext::new().map_err(|e| Error::monitor(e.to_string()))?;
        read_text(ctx.has(ContentFormat::Text), || ctx.get_text())
    }

    /// Feed one clipboard reading through change detection.
    fn observe(&mut self, text: Option<String>) -> Option<CapturedValue> {
        let text = text?;
        let content = truncate(text, MAX_CONTENT_LENGTH);

        let hash = blake3::hash(content.as_bytes());
        if self.last_hash == Some(hash) {
            trace!("Clipboard content unchanged");
            return None;
        }

        debug!(hash = %hash.to_hex(), len = content.len(), "New clipboard content detected");
        self.last_hash = Some(hash);
        Some(CapturedValue::new(content))
    }
}

impl Monitor for ClipboardMonitor {
    fn check(&mut self) -> Result<Option<CapturedValue>> {
        let text = Self::current_text()?;
        Ok(self.observe(text))
    }
}

/// Turn one clipboard text read into a reading.
///
/// `read` is only called when the clipboard holds text.
fn read_text<F>(has_text: bool, read: F) -> Result<Option<String>>
where
    F: FnOnce() -> clipboard_rs::Result<String>,
{
    if !has_text {
        return Ok(None);
    }

    let text = read().map_err(|e| Error::monitor(format!("failed to read clipboard text: {e}")))?;
    Ok((!text.is_empty()).then_some(text))
}

/// Truncate to at most `max` bytes without splitting a character.
fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        debug!(len = text.len(), max, "Truncating clipboard content");
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reading_is_a_change() {
        let mut monitor = ClipboardMonitor::new();
        let value = monitor.observe(Some("hello".to_string())).unwrap();
        assert_eq!(value.content, "hello");
    }

    #[test]
    fn test_repeated_reading_is_unchanged() {
        let mut monitor = ClipboardMonitor::new();
        assert!(monitor.observe(Some("hello".to_string())).is_some());
        assert!(monitor.observe(Some("hello".to_string())).is_none());
        assert!(monitor.observe(Some("world".to_string())).is_some());
        assert!(monitor.observe(Some("hello".to_string())).is_some());
    }

    #[test]
    fn test_empty_clipboard_is_unchanged() {
        let mut monitor = ClipboardMonitor::new();
        assert!(monitor.observe(None).is_none());

        monitor.observe(Some("a".to_string()));
        assert!(monitor.observe(None).is_none());
        // Clearing the clipboard does not reset change detection.
        assert!(monitor.observe(Some("a".to_string())).is_none());
    }

    #[test]
    fn test_clipboard_without_text_reads_as_none() {
        let reading = read_text(false, || panic!("text read without a text format")).unwrap();
        assert!(reading.is_none());
    }

    #[test]
    fn test_empty_text_reads_as_none() {
        assert!(read_text(true, || Ok(String::new())).unwrap().is_none());
        assert_eq!(
            read_text(true, || Ok("copied".to_string())).unwrap().as_deref(),
            Some("copied")
        );
    }

    #[test]
    fn test_text_read_failure_is_reported() {
        let err = read_text(true, || Err("display connection lost".into())).unwrap_err();
        assert!(matches!(err, Error::Monitor(ref m) if m.contains("display connection lost")));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello".to_string(), 10), "hello");
        assert_eq!(truncate("hello".to_string(), 3), "hel");
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate("hé".to_string(), 2), "h");
    }

    #[test]
    fn test_oversized_content_is_truncated() {
        let mut monitor = ClipboardMonitor::new();
        let value = monitor
            .observe(Some("x".repeat(MAX_CONTENT_LENGTH + 10)))
            .unwrap();
        assert_eq!(value.content.len(), MAX_CONTENT_LENGTH);
    }
}

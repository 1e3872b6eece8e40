use core::fmt;
use std::sync::Arc;

/// Reason attached to every abort notice produced by the gate.
pub const ABORT_REASON: &str = "validation_blocked";

/// Immutable input text shared by the generator and the validator.
///
/// Cloning is cheap, so a validator task can own its copy while the caller
/// keeps its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prompt(Arc<str>);

impl Prompt {
    /// Creates a prompt from any string-like value.
    pub fn new<T: Into<String>>(text: T) -> Self {
        Self(Arc::from(text.into()))
    }

    /// Returns the prompt text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// One ordered chunk of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment(String);

impl Fragment {
    /// Wraps generated text in a fragment.
    pub fn new<T: Into<String>>(text: T) -> Self {
        Self(text.into())
    }

    /// Returns the fragment text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the fragment, returning its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Concatenates fragments in order.
    pub fn concat(fragments: &[Self]) -> String {
        fragments.iter().map(Self::as_str).collect()
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for Fragment {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Notification sent to the consumer when a race is aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortNotice {
    /// Always [`ABORT_REASON`].
    pub reason: String,
    /// Trimmed, truncated view of the discarded buffer, for diagnostics only.
    pub preview: String,
}

impl AbortNotice {
    /// Builds the notice for a discarded buffer.
    ///
    /// The preview is the concatenated buffer with surrounding whitespace
    /// removed, cut to at most `preview_chars` characters.
    pub fn blocked(discarded: &[Fragment], preview_chars: usize) -> Self {
        let joined = Fragment::concat(discarded);
        let preview = joined.trim().chars().take(preview_chars).collect();
        Self {
            reason: ABORT_REASON.to_owned(),
            preview,
        }
    }
}

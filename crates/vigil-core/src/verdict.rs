use core::fmt;
use core::result::Result as CoreResult;
use core::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Marker the classifier must reply with to block a prompt.
const UNSAFE_MARKER: &str = "UNSAFE";

/// Binary safety classification of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Content may be shown.
    Safe,
    /// Content must be withheld.
    Unsafe,
}

/// Reasons a classification attempt produced no usable verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The backend answered with a non-success status.
    #[error("validator returned status {0}")]
    Status(u16),

    /// The backend could not be reached.
    #[error("validator connection failed: {0}")]
    Connect(String),

    /// No verdict arrived within the allotted time.
    #[error("validator timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with something that is not a classification.
    #[error("malformed validator response: {0}")]
    Malformed(String),

    /// Any other transport failure.
    #[error("validator transport error: {0}")]
    Transport(String),

    /// The validator task ended without answering.
    #[error("validator task ended without a verdict")]
    Dropped,
}

impl Verdict {
    /// Extracts a verdict from the classifier's reply text.
    ///
    /// Only a case-insensitive occurrence of `UNSAFE` blocks; any other text,
    /// including an empty reply, is `Safe`.
    pub fn from_reply(reply: &str) -> Self {
        if reply.to_uppercase().contains(UNSAFE_MARKER) {
            Self::Unsafe
        } else {
            Self::Safe
        }
    }

    /// Resolves a classification attempt, failing open.
    ///
    /// Every [`ValidationError`] becomes `Safe`. Availability is preferred
    /// over strict enforcement: a degraded validator never blocks output.
    pub fn fail_open(outcome: CoreResult<Self, ValidationError>) -> Self {
        match outcome {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!(%error, "validator failed, treating prompt as safe");
                Self::Safe
            }
        }
    }

    /// Returns `true` for [`Verdict::Safe`].
    pub fn is_safe(self) -> bool {
        matches!(self, Self::Safe)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => formatter.write_str("SAFE"),
            Self::Unsafe => formatter.write_str(UNSAFE_MARKER),
        }
    }
}

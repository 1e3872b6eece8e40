use core::result::Result as CoreResult;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{Fragment, Prompt, Result, ValidationError, Verdict};

/// Lazy, finite, non-restartable sequence of generated fragments.
///
/// An `Err` item ends the sequence early; consumers treat it as end-of-stream.
pub type FragmentStream = BoxStream<'static, Result<Fragment>>;

/// A generation backend that streams its output.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Returns the identifier for this source, used in logs.
    fn name(&self) -> &'static str;

    /// Starts generation for the prompt and returns its fragment stream.
    ///
    /// Each call opens a new, independent stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the request or cannot be reached.
    async fn open(&self, prompt: &Prompt) -> Result<FragmentStream>;
}

/// A backend that classifies a prompt as safe or unsafe.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Returns the identifier for this validator, used in logs.
    fn name(&self) -> &'static str;

    /// Classifies the prompt once.
    ///
    /// Callers resolve errors with [`Verdict::fail_open`].
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing why no verdict was obtained.
    async fn classify(&self, prompt: &Prompt) -> CoreResult<Verdict, ValidationError>;
}

//! Scripted collaborators for tests and offline runs.
//!
//! [`ScriptedStream`] replays fixed fragments with an optional pacing delay,
//! and [`MockValidator`] answers with a canned verdict, reply, or error. Both
//! record what they were asked so tests can assert on call counts.

use core::result::Result as CoreResult;
use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::{StreamExt as _, stream};
use tokio::time::sleep;
use vigil_core::{
    Error, Fragment, FragmentStream, Prompt, Result, StreamSource, ValidationError, Validator,
    Verdict,
};

/// Shared prompt log.
type History = Arc<Mutex<Vec<String>>>;

fn record(history: &History, prompt: &Prompt) {
    history
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(prompt.as_str().to_owned());
}

fn snapshot(history: &History) -> Vec<String> {
    history
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// What the scripted stream replays.
#[derive(Clone)]
enum Script {
    /// The same fragments for every prompt.
    Fixed(Vec<Fragment>),
    /// A canned answer mentioning the prompt, split on spaces.
    Echo,
}

/// Stream source that replays a script.
#[derive(Clone)]
pub struct ScriptedStream {
    script: Script,
    /// Pause before each fragment.
    delay: Duration,
    /// Yields a provider error after this many fragments.
    fail_after: Option<usize>,
    history: History,
}

impl ScriptedStream {
    /// Replays `parts` verbatim.
    #[must_use]
    pub fn new<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::with_script(Script::Fixed(parts.into_iter().map(Fragment::new).collect()))
    }

    /// Replays `text` one word at a time, keeping the separating spaces.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::new(split_words(text))
    }

    /// Answers every prompt with a short canned reply that quotes it.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_script(Script::Echo)
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            fail_after: None,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pauses before every fragment.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Ends the stream with an error after `count` fragments.
    #[must_use]
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Prompts this source was opened with, oldest first.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        snapshot(&self.history)
    }

    fn fragments_for(&self, prompt: &Prompt) -> Vec<Fragment> {
        match &self.script {
            Script::Fixed(parts) => parts.clone(),
            Script::Echo => split_words(&format!(
                "Here is a scripted answer to '{prompt}'. It arrives one word at a time."
            ))
            .into_iter()
            .map(Fragment::new)
            .collect(),
        }
    }
}

fn split_words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_owned).collect()
}

#[async_trait]
impl StreamSource for ScriptedStream {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self, prompt: &Prompt) -> Result<FragmentStream> {
        record(&self.history, prompt);

        let mut items: Vec<Result<Fragment>> = self
            .fragments_for(prompt)
            .into_iter()
            .map(Ok)
            .collect();
        if let Some(count) = self.fail_after {
            items.truncate(count);
            items.push(Err(Error::Provider("scripted stream failure".to_owned())));
        }

        let delay = self.delay;
        let fragments = stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            item
        });
        Ok(fragments.boxed())
    }
}

/// How the mock validator decides.
#[derive(Clone)]
enum Behavior {
    /// Always the same outcome.
    Fixed(CoreResult<Verdict, ValidationError>),
    /// Parse a canned classifier reply.
    Reply(String),
    /// `Unsafe` when the lowercased prompt contains any keyword.
    Keywords(Vec<String>),
}

/// Validator with scripted behaviour.
#[derive(Clone)]
pub struct MockValidator {
    behavior: Behavior,
    delay: Duration,
    history: History,
}

impl MockValidator {
    /// Always answers `verdict`.
    #[must_use]
    pub fn new(verdict: Verdict) -> Self {
        Self::with_behavior(Behavior::Fixed(Ok(verdict)))
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: ValidationError) -> Self {
        Self::with_behavior(Behavior::Fixed(Err(error)))
    }

    /// Classifies as if the backend had replied with `reply`.
    #[must_use]
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Reply(reply.into()))
    }

    /// Blocks prompts mentioning any of `keywords`, case-insensitively.
    #[must_use]
    pub fn keywords<I, T>(keywords: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::with_behavior(Behavior::Keywords(
            keywords
                .into_iter()
                .map(|keyword| keyword.into().to_lowercase())
                .collect(),
        ))
    }

    /// A keyword filter covering the demo prompts.
    #[must_use]
    pub fn demo() -> Self {
        Self::keywords(["molotov", "steal", "weapon", "bomb", "kill"])
    }

    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Waits `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of prompts classified so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        snapshot(&self.history).len()
    }

    /// Prompts classified so far, oldest first.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        snapshot(&self.history)
    }
}

#[async_trait]
impl Validator for MockValidator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn classify(&self, prompt: &Prompt) -> CoreResult<Verdict, ValidationError> {
        record(&self.history, prompt);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match &self.behavior {
            Behavior::Fixed(outcome) => outcome.clone(),
            Behavior::Reply(reply) => Ok(Verdict::from_reply(reply)),
            Behavior::Keywords(keywords) => {
                let text = prompt.as_str().to_lowercase();
                if keywords.iter().any(|keyword| text.contains(keyword.as_str())) {
                    Ok(Verdict::Unsafe)
                } else {
                    Ok(Verdict::Safe)
                }
            }
        }
    }
}

use core::result::Result as CoreResult;
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot::{self, Receiver, Sender, error::TryRecvError};
use tokio::time;
use tracing::debug;
use vigil_core::{Prompt, ValidationError, Validator, Verdict};

/// Raw result of one classification attempt.
type Outcome = CoreResult<Verdict, ValidationError>;

/// Write side of a [`VerdictHandle`].
#[derive(Debug)]
pub struct VerdictSender {
    sender: Sender<Outcome>,
}

impl VerdictSender {
    /// Delivers a verdict to the handle.
    pub fn resolve(self, verdict: Verdict) {
        self.send(Ok(verdict));
    }

    /// Reports that classification failed; the handle fails open.
    pub fn fail(self, error: ValidationError) {
        self.send(Err(error));
    }

    fn send(self, outcome: Outcome) {
        if self.sender.send(outcome).is_err() {
            debug!("race finished before the verdict was read");
        }
    }
}

/// A verdict that resolves exactly once.
///
/// Readiness checks never block. Once resolved, the verdict is cached and
/// every later call returns the same value. Errors of any kind, including the
/// validator task disappearing, resolve to [`Verdict::Safe`].
#[derive(Debug)]
pub struct VerdictHandle {
    receiver: Option<Receiver<Outcome>>,
    resolved: Option<Verdict>,
}

impl VerdictHandle {
    /// Creates an unresolved handle together with its sender.
    pub fn channel() -> (VerdictSender, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            VerdictSender { sender },
            Self {
                receiver: Some(receiver),
                resolved: None,
            },
        )
    }

    /// Creates a handle that is already resolved.
    pub fn resolved(verdict: Verdict) -> Self {
        Self {
            receiver: None,
            resolved: Some(verdict),
        }
    }

    /// Classifies `prompt` on a background task bounded by `timeout`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(validator: Arc<dyn Validator>, prompt: Prompt, timeout: Duration) -> Self {
        let (sender, handle) = Self::channel();
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = time::timeout(timeout, validator.classify(&prompt))
                .await
                .unwrap_or(Err(ValidationError::Timeout(timeout)));
            debug!(
                validator = validator.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "classification finished"
            );
            sender.send(outcome);
        });
        handle
    }

    /// Returns `true` once the verdict is known. Never blocks.
    pub fn is_ready(&mut self) -> bool {
        self.try_verdict().is_some()
    }

    /// Returns the verdict if it is already known. Never blocks.
    pub fn try_verdict(&mut self) -> Option<Verdict> {
        if self.resolved.is_none()
            && let Some(receiver) = self.receiver.as_mut()
        {
            match receiver.try_recv() {
                Ok(outcome) => self.settle(Some(outcome)),
                Err(TryRecvError::Closed) => self.settle(None),
                Err(TryRecvError::Empty) => {}
            }
        }
        self.resolved
    }

    /// Waits for the verdict.
    ///
    /// Bounded by the validator's own timeout when created with
    /// [`VerdictHandle::spawn`].
    pub async fn await_result(mut self) -> Verdict {
        if let Some(verdict) = self.try_verdict() {
            return verdict;
        }
        let received = match self.receiver.take() {
            Some(receiver) => receiver.await.ok(),
            None => None,
        };
        self.settle(received);
        self.resolved.unwrap_or(Verdict::Safe)
    }

    /// The only place a raw outcome becomes a verdict.
    fn settle(&mut self, received: Option<Outcome>) {
        self.receiver = None;
        self.resolved = Some(Verdict::fail_open(
            received.unwrap_or(Err(ValidationError::Dropped)),
        ));
    }
}

use core::mem;
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt as _;
use futures::stream;
use tracing::{debug, info, warn};
use vigil_core::{
    AbortNotice, Fragment, FragmentStream, GateConfig, Prompt, StreamSource, Validator,
    ValidatorConfig, Verdict, VigilConfig,
};

use crate::{Consumer, VerdictHandle};

/// Lifecycle of one race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaceState {
    /// Verdict unknown; fragments are buffered.
    Pending,
    /// Stream exhausted; waiting on the verdict.
    BlockedWait,
    /// Verdict was safe; fragments pass through.
    Cleared,
    /// Verdict was unsafe; nothing is delivered.
    Aborted,
}

impl RaceState {
    /// Returns `true` for `Cleared` and `Aborted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cleared | Self::Aborted)
    }
}

/// Summary of a finished race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceReport {
    /// Terminal state
    pub state: RaceState,
    /// Whether the race had to wait for the verdict after the stream ended
    pub blocked_wait: bool,
    /// Fragments read from the stream
    pub fragments_observed: usize,
    /// Fragments handed to the consumer
    pub fragments_delivered: usize,
    /// Size of the released block, zero if nothing was buffered or the race aborted
    pub released_block: usize,
    /// Time from race start until the verdict was observed
    pub time_to_verdict: Duration,
    /// Total race duration
    pub elapsed: Duration,
}

impl RaceReport {
    /// The verdict this race acted on.
    pub fn verdict(&self) -> Verdict {
        if self.state == RaceState::Aborted {
            Verdict::Unsafe
        } else {
            Verdict::Safe
        }
    }

    /// Returns `true` if the race ended in pass-through.
    pub fn is_cleared(&self) -> bool {
        self.state == RaceState::Cleared
    }
}

/// Mutable state of a single race, owned by the consumption loop.
struct Race {
    state: RaceState,
    buffer: Vec<Fragment>,
    preview_chars: usize,
    blocked_wait: bool,
    observed: usize,
    delivered: usize,
    released_block: usize,
    started: Instant,
    verdict_at: Option<Duration>,
}

impl Race {
    fn new(preview_chars: usize) -> Self {
        Self {
            state: RaceState::Pending,
            buffer: Vec::new(),
            preview_chars,
            blocked_wait: false,
            observed: 0,
            delivered: 0,
            released_block: 0,
            started: Instant::now(),
            verdict_at: None,
        }
    }

    fn transition(&mut self, next: RaceState) {
        debug!(from = ?self.state, to = ?next, buffered = self.buffer.len(), "race transition");
        self.state = next;
    }

    /// Acts on the verdict: flush and pass through, or discard and abort.
    fn settle<C: Consumer + ?Sized>(&mut self, verdict: Verdict, consumer: &mut C) {
        self.verdict_at = Some(self.started.elapsed());
        match verdict {
            Verdict::Safe => {
                let block = mem::take(&mut self.buffer);
                self.released_block = block.len();
                self.delivered += block.len();
                self.transition(RaceState::Cleared);
                if !block.is_empty() {
                    consumer.on_release(block);
                }
            }
            Verdict::Unsafe => {
                let notice = AbortNotice::blocked(&self.buffer, self.preview_chars);
                self.buffer.clear();
                self.transition(RaceState::Aborted);
                consumer.on_abort(notice);
            }
        }
    }

    fn into_report(self) -> RaceReport {
        let elapsed = self.started.elapsed();
        RaceReport {
            state: self.state,
            blocked_wait: self.blocked_wait,
            fragments_observed: self.observed,
            fragments_delivered: self.delivered,
            released_block: self.released_block,
            time_to_verdict: self.verdict_at.unwrap_or(elapsed),
            elapsed,
        }
    }
}

/// Runs a generation stream against a safety verdict.
///
/// Each call to [`RaceGate::run`] is an independent race with its own buffer
/// and state; a gate can be reused for any number of prompts.
pub struct RaceGate {
    source: Arc<dyn StreamSource>,
    validator: Arc<dyn Validator>,
    validator_timeout: Duration,
    preview_chars: usize,
}

impl RaceGate {
    /// Creates a gate with default timeout and preview length.
    pub fn new(source: Arc<dyn StreamSource>, validator: Arc<dyn Validator>) -> Self {
        Self {
            source,
            validator,
            validator_timeout: ValidatorConfig::default().timeout(),
            preview_chars: GateConfig::default().preview_chars,
        }
    }

    /// Creates a gate using the timeout and preview length from `config`.
    pub fn from_config(
        source: Arc<dyn StreamSource>,
        validator: Arc<dyn Validator>,
        config: &VigilConfig,
    ) -> Self {
        Self::new(source, validator)
            .with_validator_timeout(config.validator.timeout())
            .with_preview_chars(config.gate.preview_chars)
    }

    /// Sets the upper bound on one classification.
    #[must_use]
    pub fn with_validator_timeout(mut self, timeout: Duration) -> Self {
        self.validator_timeout = timeout;
        self
    }

    /// Sets how many characters of a discarded buffer an abort notice keeps.
    #[must_use]
    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    /// Races generation for `prompt` against its classification.
    ///
    /// The classification starts first so that it overlaps with opening the
    /// stream. A stream that fails to open is treated as empty.
    pub async fn run<C: Consumer + ?Sized>(&self, prompt: &Prompt, consumer: &mut C) -> RaceReport {
        info!(
            source = self.source.name(),
            validator = self.validator.name(),
            "race started"
        );

        let handle = VerdictHandle::spawn(
            Arc::clone(&self.validator),
            prompt.clone(),
            self.validator_timeout,
        );

        let fragments: FragmentStream = match self.source.open(prompt).await {
            Ok(fragments) => fragments,
            Err(error) => {
                warn!(source = self.source.name(), %error, "stream failed to open");
                stream::empty().boxed()
            }
        };

        let report = self.drive(fragments, handle, consumer).await;
        info!(
            state = ?report.state,
            blocked_wait = report.blocked_wait,
            delivered = report.fragments_delivered,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "race finished"
        );
        report
    }

    /// Consumes `fragments`, gated by `handle`.
    ///
    /// The verdict is polled without blocking after each buffered fragment.
    /// If the stream ends first, the race waits for the verdict exactly once.
    /// The stream is dropped as soon as it is no longer needed.
    pub async fn drive<C: Consumer + ?Sized>(
        &self,
        mut fragments: FragmentStream,
        mut handle: VerdictHandle,
        consumer: &mut C,
    ) -> RaceReport {
        let mut race = Race::new(self.preview_chars);

        while let Some(item) = fragments.next().await {
            let fragment = match item {
                Ok(fragment) => fragment,
                Err(error) => {
                    warn!(%error, observed = race.observed, "stream ended early");
                    break;
                }
            };
            race.observed += 1;

            match race.state {
                RaceState::Cleared => {
                    race.delivered += 1;
                    consumer.on_fragment(fragment);
                }
                RaceState::Pending => {
                    race.buffer.push(fragment);
                    if let Some(verdict) = handle.try_verdict() {
                        race.settle(verdict, consumer);
                    }
                }
                RaceState::BlockedWait | RaceState::Aborted => {}
            }

            if race.state == RaceState::Aborted {
                break;
            }
        }
        drop(fragments);

        if race.state == RaceState::Pending {
            race.blocked_wait = true;
            race.transition(RaceState::BlockedWait);
            consumer.on_blocked_wait();
            let verdict = handle.await_result().await;
            race.settle(verdict, consumer);
        }

        race.into_report()
    }
}

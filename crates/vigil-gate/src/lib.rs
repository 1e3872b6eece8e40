//! Speculative stream gating.
//!
//! A [`RaceGate`] starts a generation stream and a safety classification at
//! the same time, buffers generated fragments while the verdict is pending,
//! then either releases them and passes the rest of the stream through, or
//! discards them and aborts.

/// Consumer callbacks and event forwarding.
pub mod consumer;
/// The race loop and its report.
pub mod gate;
/// Handle to a verdict that is still being computed.
pub mod handle;

pub use consumer::{Consumer, EventChannel, GateEvent};
pub use gate::{RaceGate, RaceReport, RaceState};
pub use handle::{VerdictHandle, VerdictSender};

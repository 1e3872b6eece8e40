//! Core types and traits for gated streaming.
//!
//! This crate provides the prompt, fragment, and verdict types, the fail-open
//! verdict policy, error handling, configuration, and the collaborator traits
//! that the race gate consumes.

/// Configuration for generators, validators, and the gate.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Trait definitions for stream sources and validators.
pub mod traits;
/// Core data types for prompts, fragments, and abort notices.
pub mod types;
/// Verdicts, validation errors, and the fail-open policy.
pub mod verdict;

pub use config::{GateConfig, GeneratorConfig, GeneratorKind, ValidatorConfig, VigilConfig};
pub use error::{Error, Result};
pub use traits::{FragmentStream, StreamSource, Validator};
pub use types::{ABORT_REASON, AbortNotice, Fragment, Prompt};
pub use verdict::{ValidationError, Verdict};

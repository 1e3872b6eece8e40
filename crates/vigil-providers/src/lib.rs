//! Stream sources and validators backed by external services.

/// OpenAI-compatible streaming chat completions.
pub mod chat_completions;
/// OpenAI-compatible safety classifier.
pub mod guardrail;
/// Line reassembly over chunked response bodies.
mod lines;
/// Scripted sources and validators for tests and offline runs.
pub mod mock;
/// Ollama streaming generation.
pub mod ollama;

pub use chat_completions::ChatCompletionStream;
pub use guardrail::ChatCompletionValidator;
pub use mock::{MockValidator, ScriptedStream};
pub use ollama::OllamaStream;

use std::sync::Arc;
use vigil_core::{GeneratorConfig, GeneratorKind, StreamSource};

/// Builds the stream source described by `config`.
pub fn stream_source_from_config(config: &GeneratorConfig) -> Arc<dyn StreamSource> {
    match config.kind {
        GeneratorKind::ChatCompletions => Arc::new(ChatCompletionStream::from_config(config)),
        GeneratorKind::Ollama => Arc::new(OllamaStream::from_config(config)),
    }
}

use async_trait::async_trait;
use futures::{StreamExt as _, future};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_core::{Error, Fragment, FragmentStream, GeneratorConfig, Prompt, Result, StreamSource};

use crate::lines::lines;

/// Prefix of an SSE data line.
const SSE_DATA_PREFIX: &str = "data:";
/// Payload marking the end of an OpenAI-style stream.
const SSE_DONE: &str = "[DONE]";

/// Streaming generator speaking the OpenAI-compatible chat completions API.
///
/// Works against vLLM, llama.cpp server, Groq, `OpenRouter`, and any other
/// backend that emits `chat.completion.chunk` server-sent events.
pub struct ChatCompletionStream {
    /// HTTP client for API requests.
    client: Client,
    /// Base URL; `/chat/completions` is appended.
    base_url: String,
    /// Model name to use.
    model: String,
    /// Optional bearer token.
    api_key: Option<String>,
    /// Maximum number of tokens to generate.
    max_tokens: usize,
    /// Sampling temperature.
    temperature: f32,
}

impl ChatCompletionStream {
    /// Creates a source for `base_url` and `model` with default sampling.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let defaults = GeneratorConfig::default();
        Self {
            client: Client::default(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        }
    }

    /// Creates a source from generator configuration.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            client: Client::default(),
            base_url: config.base_url().to_owned(),
            model: config.model().to_owned(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Request payload for a streamed completion.
#[derive(Debug, Serialize)]
struct StreamRequest<'req> {
    /// Model identifier.
    model: &'req str,
    /// Conversation sent to the model.
    messages: Vec<ChatMessage<'req>>,
    /// Sampling temperature.
    temperature: f32,
    /// Maximum number of tokens in the completion.
    max_tokens: usize,
    /// Always `true`.
    stream: bool,
}

/// Message delivered to the API.
#[derive(Debug, Serialize)]
struct ChatMessage<'req> {
    /// Role of the message author.
    role: &'static str,
    /// Textual content of the message.
    content: &'req str,
}

/// One `chat.completion.chunk` event.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    /// Candidate deltas; only the first is used.
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

/// A single choice within a chunk.
#[derive(Debug, Deserialize)]
struct StreamChoice {
    /// Incremental message content.
    #[serde(default)]
    delta: StreamDelta,
}

/// Incremental content of a choice.
#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    /// Newly generated text, absent on role-only or final chunks.
    content: Option<String>,
}

/// Interpretation of one SSE line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    /// Comment, blank line, non-data field, or chunk without text.
    Skip,
    /// Generated text.
    Text(String),
    /// End of stream marker.
    Done,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let Some(payload) = line.trim().strip_prefix(SSE_DATA_PREFIX) else {
        return Ok(SseLine::Skip);
    };
    let payload = payload.trim();
    if payload == SSE_DONE {
        return Ok(SseLine::Done);
    }
    if payload.is_empty() {
        return Ok(SseLine::Skip);
    }

    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|err| Error::InvalidResponse(format!("bad stream chunk: {err}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty())
        .map_or(SseLine::Skip, SseLine::Text))
}

#[async_trait]
impl StreamSource for ChatCompletionStream {
    fn name(&self) -> &'static str {
        "chat-completions"
    }

    async fn open(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let request = StreamRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.as_str(),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Accept", "text/event-stream")
            .json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Chat completions request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(Error::Provider(format!(
                "Chat completions error {status}: {error_text}"
            )));
        }

        debug!(model = %self.model, "generation stream opened");

        let fragments = lines(response.bytes_stream())
            .map(|line| line.and_then(|text| parse_sse_line(&text)))
            .take_while(|parsed| future::ready(!matches!(parsed, Ok(SseLine::Done))))
            .filter_map(|parsed| {
                future::ready(match parsed {
                    Ok(SseLine::Text(text)) => Some(Ok(Fragment::new(text))),
                    Ok(SseLine::Skip | SseLine::Done) => None,
                    Err(error) => Some(Err(error)),
                })
            });

        Ok(fragments.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let line = r#"data: {"id":"1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Rain"}}]}"#;
        assert_eq!(
            parse_sse_line(line).expect("valid chunk"),
            SseLine::Text("Rain".to_owned())
        );
    }

    #[test]
    fn test_parse_role_only_and_finish_chunks_skip() {
        let role = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        let finish = r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let empty = r#"data: {"choices":[{"index":0,"delta":{"content":""}}]}"#;
        assert_eq!(parse_sse_line(role).expect("valid"), SseLine::Skip);
        assert_eq!(parse_sse_line(finish).expect("valid"), SseLine::Skip);
        assert_eq!(parse_sse_line(empty).expect("valid"), SseLine::Skip);
    }

    #[test]
    fn test_parse_done_and_non_data_lines() {
        assert_eq!(parse_sse_line("data: [DONE]").expect("valid"), SseLine::Done);
        assert_eq!(parse_sse_line("").expect("valid"), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").expect("valid"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message").expect("valid"), SseLine::Skip);
    }

    #[test]
    fn test_parse_malformed_chunk() {
        let error = parse_sse_line("data: {not json").unwrap_err();
        assert!(matches!(error, Error::InvalidResponse(_)));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let source = ChatCompletionStream::new("http://127.0.0.1:8001/v1/", "m");
        assert_eq!(source.endpoint(), "http://127.0.0.1:8001/v1/chat/completions");
    }

    #[test]
    fn test_from_config() {
        let config = GeneratorConfig {
            api_key: Some("sk-test".to_owned()),
            ..GeneratorConfig::default()
        };
        let source = ChatCompletionStream::from_config(&config);
        assert_eq!(source.name(), "chat-completions");
        assert_eq!(source.max_tokens, 512);
        assert_eq!(source.api_key.as_deref(), Some("sk-test"));
        assert_eq!(source.endpoint(), "http://127.0.0.1:8001/v1/chat/completions");
    }
}

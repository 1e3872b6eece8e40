use async_trait::async_trait;
use futures::{StreamExt as _, future};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_core::{
    Error, Fragment, FragmentStream, GeneratorConfig, GeneratorKind, Prompt, Result, StreamSource,
};

use crate::lines::lines;

/// Streaming generator backed by a local Ollama server.
pub struct OllamaStream {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl OllamaStream {
    /// Creates a source for `model` on the default local Ollama server.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        let defaults = GeneratorConfig::default();
        Self {
            client: Client::new(),
            base_url: GeneratorKind::Ollama.default_base_url().to_owned(),
            model: model.into(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        }
    }

    /// Points the source at another Ollama server.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Creates a source from generator configuration, using `base_url` as the
    /// Ollama root.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url().to_owned(),
            model: config.model().to_owned(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

/// `/api/generate` request body.
#[derive(Debug, Serialize)]
struct GenerateRequest<'req> {
    model: &'req str,
    prompt: &'req str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: usize,
}

/// One NDJSON line of a streamed `/api/generate` response.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

fn parse_chunk(line: &str) -> Result<Option<GenerateChunk>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: GenerateChunk = serde_json::from_str(line)
        .map_err(|err| Error::InvalidResponse(format!("bad Ollama chunk: {err}")))?;
    if let Some(message) = chunk.error {
        return Err(Error::Provider(format!("Ollama stream error: {message}")));
    }
    Ok(Some(chunk))
}

#[async_trait]
impl StreamSource for OllamaStream {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn open(&self, prompt: &Prompt) -> Result<FragmentStream> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: prompt.as_str(),
            stream: true,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Ollama request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "Ollama returned error: {}",
                response.status()
            )));
        }

        debug!(model = %self.model, "Ollama stream opened");

        // A `done` chunk can still carry text, so stop after emitting it.
        let fragments = lines(response.bytes_stream())
            .map(|line| line.and_then(|text| parse_chunk(&text)))
            .scan(false, |finished, parsed| {
                if *finished {
                    return future::ready(None);
                }
                if let Ok(Some(chunk)) = &parsed {
                    *finished = chunk.done;
                }
                future::ready(Some(parsed))
            })
            .filter_map(|parsed| {
                future::ready(match parsed {
                    Ok(Some(chunk)) if !chunk.response.is_empty() => {
                        Some(Ok(Fragment::new(chunk.response)))
                    }
                    Ok(_) => None,
                    Err(error) => Some(Err(error)),
                })
            });

        Ok(fragments.boxed())
    }
}

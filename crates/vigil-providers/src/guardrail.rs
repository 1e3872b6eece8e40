use core::result::Result as CoreResult;
use core::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, Error as ReqwestError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vigil_core::{Prompt, ValidationError, Validator, ValidatorConfig, Verdict};

/// Instruction frame sent as the system message of every classification.
pub const SAFETY_INSTRUCTION: &str = "You are a safety filter. Reply 'UNSAFE' if the input involves violence, self-harm, or illegal acts. Otherwise reply 'SAFE'.";

/// Safety classifier backed by a small model behind an OpenAI-compatible
/// `chat/completions` endpoint.
///
/// Each call asks the model for a one-word reply and maps it through
/// [`Verdict::from_reply`]. Failures surface as [`ValidationError`] and are
/// resolved to a verdict by the caller.
pub struct ChatCompletionValidator {
    /// HTTP client with the request timeout applied.
    client: Client,
    /// Full endpoint URL.
    url: String,
    /// Classifier model name.
    model: String,
    /// Reply length limit.
    max_tokens: usize,
    /// Request timeout, reported in [`ValidationError::Timeout`].
    timeout: Duration,
}

impl ChatCompletionValidator {
    /// Creates a validator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &ValidatorConfig) -> CoreResult<Self, ReqwestError> {
        let timeout = config.timeout();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    /// Returns the endpoint this validator posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify_error(&self, error: &ReqwestError) -> ValidationError {
        if error.is_timeout() {
            ValidationError::Timeout(self.timeout)
        } else if error.is_connect() {
            ValidationError::Connect(error.to_string())
        } else if error.is_decode() {
            ValidationError::Malformed(error.to_string())
        } else {
            ValidationError::Transport(error.to_string())
        }
    }
}

/// Classification request body.
#[derive(Debug, Serialize)]
struct ClassifyRequest<'req> {
    model: &'req str,
    messages: [ClassifyMessage<'req>; 2],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ClassifyMessage<'req> {
    role: &'static str,
    content: &'req str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    choices: Vec<ClassifyChoice>,
}

#[derive(Debug, Deserialize)]
struct ClassifyChoice {
    message: ClassifyReply,
}

#[derive(Debug, Deserialize)]
struct ClassifyReply {
    content: Option<String>,
}

impl ClassifyResponse {
    fn into_reply(self) -> CoreResult<String, ValidationError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ValidationError::Malformed("reply has no message content".to_owned()))
    }
}

#[async_trait]
impl Validator for ChatCompletionValidator {
    fn name(&self) -> &'static str {
        "chat-completions-guardrail"
    }

    async fn classify(&self, prompt: &Prompt) -> CoreResult<Verdict, ValidationError> {
        let start = Instant::now();
        let user_content = format!("Classify this input: '{prompt}'");
        let request = ClassifyRequest {
            model: &self.model,
            messages: [
                ClassifyMessage {
                    role: "system",
                    content: SAFETY_INSTRUCTION,
                },
                ClassifyMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.0,
        };

        debug!(url = %self.url, model = %self.model, "classifying prompt");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.classify_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ValidationError::Status(status.as_u16()));
        }

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|err| self.classify_error(&err))?;
        let reply = body.into_reply()?;
        let verdict = Verdict::from_reply(&reply);

        info!(
            reply = reply.trim(),
            %verdict,
            latency_ms = start.elapsed().as_millis(),
            "validator replied"
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> CoreResult<String, ValidationError> {
        serde_json::from_str::<ClassifyResponse>(json)
            .expect("valid json")
            .into_reply()
    }

    #[test]
    fn test_reply_extraction() {
        let reply = parse(r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"UNSAFE"}}]}"#);
        assert_eq!(reply, Ok("UNSAFE".to_owned()));
    }

    #[test]
    fn test_missing_content_is_malformed() {
        assert!(matches!(
            parse(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(parse(r#"{"choices":[]}"#), Err(ValidationError::Malformed(_))));
        assert!(matches!(parse("{}"), Err(ValidationError::Malformed(_))));
    }

    #[test]
    fn test_from_config() {
        let config = ValidatorConfig {
            timeout_ms: 250,
            ..ValidatorConfig::default()
        };
        let validator = ChatCompletionValidator::from_config(&config).expect("client builds");
        assert_eq!(validator.url(), config.url);
        assert_eq!(validator.timeout, Duration::from_millis(250));
        assert_eq!(validator.max_tokens, 10);
    }
}

use anyhow::Result;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::answer_matching::extract_json_array;
use crate::config::LlmConfig;

/// Per-attempt network timeout. Retries add delay on top of this, bounded by
/// `max_retries * max(1s, computed backoff)`.
const REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETRY_DELAY_SECS: f64 = 1.5;
const MIN_RETRY_DELAY_SECS: f64 = 1.0;

/// A 429 body carrying this marker means the key has zero credits, so
/// retrying cannot help.
const ZERO_QUOTA_MARKER: &str = "limit: 0";

/// Upstream failure classification for OpenRouter calls
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("OpenRouter HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error(
        "OpenRouter quota/credits are unavailable for this key. Add credits or use a key with access to the configured model."
    )]
    QuotaExhausted,

    #[error("OpenRouter request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Model returned empty response")]
    EmptyResponse,

    #[error("Model returned empty summary")]
    EmptySummary,

    #[error("Model returned {got} items, expected {expected}")]
    TooFewItems { expected: usize, got: usize },

    #[error("{0}")]
    Malformed(String),
}

/// OpenRouter chat-completions client with bounded retry on rate limiting.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
    max_tokens: u32,
    app_origin: String,
    app_name: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<MessageContent>,
}

/// The provider returns textual content either as one plain string or as a
/// sequence of typed parts; both shapes must decode.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    PlainText(String),
    PartedText(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ChatResponse {
    /// Extract text from the first choice: the string itself in the plain
    /// shape, all "text"-typed parts joined with newlines in the parted
    /// shape, or empty when neither yields content.
    fn extract_text(&self) -> String {
        let Some(content) = self.choices.first().and_then(|c| c.message.content.as_ref()) else {
            return String::new();
        };
        match content {
            MessageContent::PlainText(text) => text.clone(),
            MessageContent::PartedText(parts) => parts
                .iter()
                .filter(|part| part.kind == "text")
                .map(|part| part.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string(),
        }
    }
}

fn retry_hint_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)retry in ([0-9.]+)s").expect("retry hint pattern is valid"))
}

/// Parse a "retry in <seconds>s" hint out of an error body.
fn parse_retry_hint(body: &str) -> Option<f64> {
    retry_hint_pattern()
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

impl OpenRouterClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            max_tokens: config.max_tokens,
            app_origin: config.app_origin.clone(),
            app_name: config.app_name.clone(),
        })
    }

    /// POST the prompt and return the raw response body. Only HTTP 429 is
    /// retried, up to the configured bound; the delay comes from the
    /// Retry-After header, then a "retry in <n>s" hint in the body, then a
    /// default, and is never shorter than one second. A zero-quota 429 is
    /// terminal. After exhausting retries the last observed error surfaces.
    pub async fn call(&self, prompt: &str) -> Result<String, LlmError> {
        let request_body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.3,
            max_tokens: self.max_tokens,
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=self.max_retries {
            info!(
                model = %self.model,
                attempt,
                prompt_length = prompt.len(),
                "Sending OpenRouter request"
            );

            let response = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("HTTP-Referer", &self.app_origin)
                .header("X-Title", &self.app_name)
                .json(&request_body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let body = response.text().await?;
                debug!(response_length = body.len(), "Received OpenRouter response");
                return Ok(body);
            }

            let retry_after_header = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<f64>().ok());
            let body = response.text().await.unwrap_or_default();

            if status != StatusCode::TOO_MANY_REQUESTS {
                error!(status = %status, body = %body, "OpenRouter request failed");
                return Err(LlmError::Provider {
                    status: status.as_u16(),
                    body,
                });
            }

            if body.contains(ZERO_QUOTA_MARKER) {
                error!("OpenRouter key has no remaining quota");
                return Err(LlmError::QuotaExhausted);
            }

            last_error = Some(LlmError::Provider {
                status: status.as_u16(),
                body: body.clone(),
            });

            if attempt < self.max_retries {
                let delay = retry_after_header
                    .or_else(|| parse_retry_hint(&body))
                    .unwrap_or(DEFAULT_RETRY_DELAY_SECS)
                    .max(MIN_RETRY_DELAY_SECS);
                warn!(
                    attempt,
                    delay_secs = delay,
                    "OpenRouter rate limited, retrying"
                );
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
        }

        Err(last_error.unwrap_or(LlmError::Provider {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            body: "OpenRouter request failed".to_string(),
        }))
    }

    /// Generate a typed item list from source content. The model is told to
    /// return a raw JSON array; whatever prose it wraps around the array is
    /// tolerated. Fewer than `expected_count` items is a hard failure, extra
    /// items beyond the count are dropped.
    pub async fn generate_items_from_source<T>(
        &self,
        source_text: &str,
        instruction: &str,
        expected_count: usize,
    ) -> Result<Vec<T>, LlmError>
    where
        T: DeserializeOwned,
    {
        let prompt = format!(
            "{instruction}\n\nReturn only a JSON array with no markdown fences and no extra text.\n\nSource content:\n{source_text}"
        );

        let body = self.call(&prompt).await?;
        let envelope: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Malformed(format!("Provider envelope was not valid JSON: {e}")))?;

        let text = envelope.extract_text();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let array = extract_json_array(&text).map_err(|e| LlmError::Malformed(e.to_string()))?;
        let Value::Array(mut values) = array else {
            return Err(LlmError::Malformed("Model response is not a list".to_string()));
        };

        if values.len() < expected_count {
            return Err(LlmError::TooFewItems {
                expected: expected_count,
                got: values.len(),
            });
        }
        values.truncate(expected_count);

        values
            .into_iter()
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| LlmError::Malformed(format!("Model item has the wrong shape: {e}")))
            })
            .collect()
    }

    /// Generate a plain-text study summary (5-7 bullet points).
    pub async fn generate_summary_from_source(&self, source_text: &str) -> Result<String, LlmError> {
        let prompt = format!(
            "Create a concise study summary from the provided content. Return 5-7 bullet points as plain text. Do not include markdown fences or extra commentary.\n\nSource content:\n{source_text}"
        );

        let body = self.call(&prompt).await?;
        let envelope: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Malformed(format!("Provider envelope was not valid JSON: {e}")))?;

        let text = envelope.extract_text().trim().to_string();
        if text.is_empty() {
            return Err(LlmError::EmptySummary);
        }
        Ok(text)
    }
}

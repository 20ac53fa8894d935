use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use leadflow_core::config::{ExtractorConfig, ExtractorProvider};
use leadflow_core::domain::contact::ExtractedContact;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extractor is not configured")]
    NotConfigured,
    #[error("extractor transport failure: {0}")]
    Transport(String),
    #[error("extractor rejected the request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("extractor response could not be decoded: {0}")]
    Decode(String),
}

/// Structured-field extraction from one conversation record.
#[async_trait]
pub trait ContactExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ExtractedContact, ExtractError>;
}

/// Extractor backed by an OpenAI-compatible chat-completion endpoint.
pub struct ChatCompletionExtractor {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl ChatCompletionExtractor {
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        let endpoint = resolve_endpoint(config)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ExtractError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn complete(&self, text: &str) -> Result<String, ExtractError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(text)},
            ],
            "temperature": 0.1,
            "response_format": {"type": "json_object"},
        });

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| ExtractError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractError::Api { status: status.as_u16(), message });
        }

        let payload: Value =
            response.json().await.map_err(|error| ExtractError::Decode(error.to_string()))?;
        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ExtractError::Decode("completion has no message content".to_string()))
    }
}

#[async_trait]
impl ContactExtractor for ChatCompletionExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractedContact, ExtractError> {
        let mut last_error = ExtractError::NotConfigured;
        for attempt in 0..=self.max_retries {
            match self.complete(text).await {
                Ok(content) => {
                    debug!(
                        event_name = "extract.completion_received",
                        attempt,
                        "chat completion returned"
                    );
                    return Ok(parse_extraction(&content, text));
                }
                Err(error @ ExtractError::Transport(_)) => {
                    warn!(
                        event_name = "extract.attempt_failed",
                        attempt,
                        error = %error,
                        "extraction attempt failed, retrying"
                    );
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error)
    }
}

const SYSTEM_PROMPT: &str = "You extract CRM fields from sales conversations. \
Answer with a single JSON object and nothing else. Only report values that \
are explicitly present in the text.";

fn build_prompt(text: &str) -> String {
    format!(
        "Extract the contact mentioned in the conversation below.\n\
         Reply with JSON of the shape \
         {{\"name\": string|null, \"company\": string|null, \"phone\": string|null}}.\n\
         Use null for anything not clearly mentioned.\n\n\
         CONVERSATION:\n{text}"
    )
}

/// Parses the model output. Malformed output degrades to an empty extraction
/// carrying only the original text, never an error: extraction quality is a
/// collaborator concern, not a pipeline failure.
fn parse_extraction(content: &str, original_text: &str) -> ExtractedContact {
    let parsed: Option<Value> = serde_json::from_str(content.trim()).ok();
    let Some(fields) = parsed else {
        return ExtractedContact { free_text: original_text.to_string(), ..Default::default() };
    };

    ExtractedContact {
        name: string_field(&fields, "name"),
        company: string_field(&fields, "company"),
        phone: string_field(&fields, "phone"),
        free_text: original_text.to_string(),
    }
}

fn string_field(fields: &Value, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn resolve_endpoint(config: &ExtractorConfig) -> Result<String, ExtractError> {
    let base = match (&config.base_url, config.provider) {
        (Some(base), _) => base.trim_end_matches('/').to_string(),
        (None, ExtractorProvider::OpenAi) => "https://api.openai.com/v1".to_string(),
        (None, ExtractorProvider::Github) => "https://models.inference.ai.azure.com".to_string(),
        (None, ExtractorProvider::Ollama) => return Err(ExtractError::NotConfigured),
    };

    let base = match config.provider {
        // Ollama exposes the OpenAI-compatible surface under /v1.
        ExtractorProvider::Ollama if !base.ends_with("/v1") => format!("{base}/v1"),
        _ => base,
    };

    Ok(format!("{base}/chat/completions"))
}

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::info;

use crate::extractor::ExtractError;

/// The transcription API refuses uploads past this size.
const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Speech-to-text boundary. Only the CLI drives it today; the webhook path
/// receives text messages directly.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, ExtractError>;
}

/// Transcriber backed by a Whisper-style `/audio/transcriptions` endpoint.
pub struct WhisperHttpTranscriber {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    language: String,
}

impl WhisperHttpTranscriber {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        language: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ExtractError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| ExtractError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/audio/transcriptions", base_url.trim_end_matches('/')),
            api_key,
            model: "whisper-1".to_string(),
            language: language.into(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperHttpTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, ExtractError> {
        let metadata = tokio::fs::metadata(audio_path)
            .await
            .map_err(|error| ExtractError::Transport(format!("audio file unavailable: {error}")))?;
        if metadata.len() > MAX_UPLOAD_BYTES {
            return Err(ExtractError::Api {
                status: 413,
                message: format!("audio file is {} bytes, limit is {MAX_UPLOAD_BYTES}", metadata.len()),
            });
        }

        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|error| ExtractError::Transport(format!("audio file unreadable: {error}")))?;
        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        info!(
            event_name = "transcribe.upload",
            file = %file_name,
            bytes = metadata.len(),
            "uploading audio for transcription"
        );

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
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
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ExtractError::Decode("transcription has no text field".to_string()))
    }
}

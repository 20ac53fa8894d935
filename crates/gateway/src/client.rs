use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use leadflow_core::config::GatewayConfig;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway client is not configured")]
    NotConfigured,
    #[error("gateway transport failure: {0}")]
    Transport(String),
    #[error("gateway rejected the request ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Send client for the messaging gateway. Replies are a courtesy; callers
/// treat every error here as non-fatal.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    instance_name: String,
}

impl GatewayClient {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        if !config.enabled {
            return Err(GatewayError::NotConfigured);
        }
        let api_key = config.api_key.clone().ok_or(GatewayError::NotConfigured)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            instance_name: config.instance_name.clone(),
        })
    }

    pub async fn send_text(&self, number: &str, text: &str) -> Result<(), GatewayError> {
        let url = format!("{}/message/sendText/{}", self.base_url, self.instance_name);
        let response = self
            .http
            .post(&url)
            .header("apikey", self.api_key.expose_secret())
            .json(&json!({ "number": number, "text": text }))
            .send()
            .await
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status: status.as_u16(), message });
        }

        info!(
            event_name = "gateway.text_sent",
            number,
            "acknowledgment delivered through the gateway"
        );
        Ok(())
    }
}

//! Hosted generative model client.
//!
//! [`ModelClient`] is the single-call contract the chat orchestrator
//! depends on: prompt in, text out. [`GeminiClient`] implements it over
//! the Gemini `generateContent` REST endpoint. Calls are not retried.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::ModelConfig;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model API key is not configured (set GEMINI_API_KEY)")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Parse(String),
}

/// Generates text for a fully assembled prompt.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = config.resolve_api_key().ok_or(ModelError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_gemini_response(&json)
    }
}

/// Joins the text of every part of the first candidate with a space.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String, ModelError> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates returned");
            ModelError::Parse(reason.to_string())
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| ModelError::Parse("candidate has no content parts".to_string()))?;

    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if texts.is_empty() {
        return Err(ModelError::Parse("candidate has no text".to_string()));
    }
    Ok(texts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_part_text() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Abuja." }], "role": "model" } }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "Abuja.");
    }

    #[test]
    fn multiple_parts_joined_with_space() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Cells" }, { "text": "divide." }] } }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "Cells divide.");
    }

    #[test]
    fn blocked_prompt_reports_reason() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_response(&json).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn missing_parts_is_parse_error() {
        let json = serde_json::json!({ "candidates": [{ "finishReason": "STOP" }] });
        assert!(matches!(
            parse_gemini_response(&json),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn client_requires_api_key() {
        std::env::remove_var(crate::config::API_KEY_ENV);
        let config = ModelConfig::default();
        assert!(matches!(
            GeminiClient::new(&config),
            Err(ModelError::MissingApiKey)
        ));
    }
}

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::providers::{Provider, ProviderResponse};

/// Gemini client for the `generateContent` endpoint
#[derive(Debug)]
pub struct Gemini {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL
    endpoint: String,
    /// Model name
    model: String,
    /// Extra generationConfig entries
    generation_config: Map<String, Value>,
}

/// generateContent request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest<'a> {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

/// generateContent response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub total_token_count: Option<u64>,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl Gemini {
    /// Create a new Gemini client
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            generation_config: Map::new(),
        }
    }

    /// Send `generation_config` entries with every request
    pub fn with_generation_config(mut self, generation_config: Map<String, Value>) -> Self {
        self.generation_config = generation_config;
        self
    }

    /// Create a client from the provider section of the configuration
    pub fn from_config(config: &ProviderConfig, api_key: impl Into<String>) -> Self {
        Self::new(
            api_key,
            config.endpoint.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .with_generation_config(config.generation_config.clone())
    }

    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    /// Text of the first candidate
    pub fn extract_text(response: &GeminiResponse) -> Option<String> {
        let content = response.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.is_empty() { None } else { Some(text) }
    }

    /// Classify a transport failure
    fn classify_transport(error: &reqwest::Error) -> ProviderError {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            ProviderError::Retriable(format!("Failed to reach Gemini: {}", error))
        } else {
            ProviderError::Fatal(format!("Failed to send request to Gemini: {}", error))
        }
    }
}

#[async_trait]
impl Provider for Gemini {
    async fn structured_output(&self, prompt: &str, schema: &Value) -> Result<ProviderResponse, ProviderError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
                extra: &self.generation_config,
            },
        };

        let response = self
            .client
            .post(self.api_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let (status_name, message) = match serde_json::from_str::<GeminiErrorBody>(&error_text) {
                Ok(body) => (body.error.status, body.error.message),
                Err(_) => (String::new(), error_text),
            };
            error!("Gemini API error ({}): {}", status, message);
            return Err(ProviderError::from_status(status.as_u16(), &status_name, message));
        }

        let gemini_response = response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse Gemini API response: {}", e)))?;

        let total_tokens = gemini_response
            .usage_metadata
            .as_ref()
            .and_then(|usage| usage.total_token_count);

        let text = Self::extract_text(&gemini_response).ok_or_else(|| {
            let reason = gemini_response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            ProviderError::Malformed(format!("Gemini returned no text ({})", reason))
        })?;

        debug!("Gemini call terminated, {:?} tokens", total_tokens);
        Ok(ProviderResponse { text, total_tokens })
    }
}

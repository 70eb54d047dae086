//! Google AI Studio (Gemini) API Integration
//!
//! Production [`AnalysisService`]: one `generateContent` request per payload.
//! HTTP 429 / `RESOURCE_EXHAUSTED` is reported as transient, every other
//! failure (transport, non-success status, blocked or empty answer) as fatal.

use crate::service::{AnalysisService, ServiceError};
use crate::LlmResult;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Default endpoint prefix; the model id and `:generateContent` are appended
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Request structure for Gemini API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// Response structure from Gemini API
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    #[serde(default)]
    text: String,
}

/// Gemini API client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client for `model`
    pub fn new(api_key: String, model: String) -> LlmResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            api_key,
            model,
            base_url: GEMINI_API_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at another endpoint prefix (proxies, test servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    fn request_body(payload: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: payload.to_string(),
                }],
            }],
            // Vulnerability write-ups must not be filtered as dangerous content
            safety_settings: vec![SafetySetting {
                category: "HARM_CATEGORY_DANGEROUS_CONTENT",
                threshold: "BLOCK_NONE",
            }],
        }
    }
}

fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED")
}

#[async_trait]
impl AnalysisService for GeminiClient {
    async fn generate(&self, payload: &str) -> Result<String, ServiceError> {
        let response = self.client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::request_body(payload))
            .send()
            .await
            .map_err(|e| ServiceError::Fatal(format!("Gemini API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("Gemini API error ({}): {}", status, error_text);
            return Err(if is_rate_limited(status, &error_text) {
                ServiceError::Transient(message)
            } else {
                ServiceError::Fatal(message)
            });
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Fatal(format!("Failed to parse Gemini response: {}", e)))?;

        let text: String = gemini_response.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ServiceError::Fatal("No text in Gemini response (blocked or empty candidate)".to_string()));
        }

        Ok(text)
    }
}

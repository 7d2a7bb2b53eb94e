//! Gemini-backed [`LanguageModel`] and helpers for pulling JSON out of model text

use anyhow::{Context, Result};
use cluster_assistant_sdk::{async_trait, CollaboratorResult, LanguageModel};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::Settings;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model API key is not configured")]
    NotConfigured,

    #[error("language model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model returned no text")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl GeminiClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub fn new(api_key: Option<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for the language model")?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.gemini_api_key.clone(),
            settings.gemini_model.clone(),
            settings.llm_timeout(),
        )
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;

        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed.text().ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> CollaboratorResult<String> {
        Ok(self.generate_text(prompt).await?)
    }
}

/// The outermost `{...}` span of `text`, if any.
///
/// Models like to wrap JSON in prose or code fences; everything before the
/// first `{` and after the last `}` is discarded.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Extract and deserialize the JSON object embedded in model output
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let json = extract_json(text).ok_or_else(|| {
        format!(
            "no JSON object in model response: {}",
            truncate(text.trim(), 120)
        )
    })?;
    serde_json::from_str(json).map_err(|e| format!("malformed JSON in model response: {}", e))
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

//! AI captioning client
//!
//! Sends one image to a hosted Gemini model and asks for a one-sentence
//! description plus an SEO-style filename. The public entry point never fails:
//! every transport, status or parse problem is logged and mapped to `None`, so
//! a flaky endpoint can only cost a record its caption, never its conversion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("snapconvert/", env!("CARGO_PKG_VERSION"));

/// Description and filename suggested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub description: String,
    #[serde(rename = "suggestedName")]
    pub suggested_name: String,
}

/// Anything that can caption an image. Must not fail: absence is `None`.
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, base64_payload: &str, mime_type: &str) -> Option<Caption>;
}

/// Captioner used when AI analysis is switched off
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCaptions;

#[async_trait]
impl Captioner for NoCaptions {
    async fn caption(&self, _base64_payload: &str, _mime_type: &str) -> Option<Caption> {
        None
    }
}

/// Captioning failures. Never leave this module.
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Empty response")]
    Empty,

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone)]
pub struct CaptionConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
    /// Language of the description
    pub language: String,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            language: "Arabic".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Gemini `generateContent` client
pub struct GeminiCaptioner {
    http_client: reqwest::Client,
    config: CaptionConfig,
}

impl GeminiCaptioner {
    pub fn new(config: CaptionConfig) -> Result<Self, CaptionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CaptionError::Network(e.to_string()))?;

        Ok(Self { http_client, config })
    }

    fn prompt(&self) -> String {
        format!(
            "Analyze this image. Give a very short description (one sentence) in {} and suggest an \
             SEO-friendly file name in English, lowercase words joined by hyphens, without an extension. \
             Answer with JSON only: {{ \"description\": \"...\", \"suggestedName\": \"...\" }}",
            self.config.language
        )
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn request(&self, base64_payload: &str, mime_type: &str) -> Result<Caption, CaptionError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": self.prompt() },
                    { "inlineData": { "mimeType": mime_type, "data": base64_payload } }
                ]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        debug!(model = %self.config.model, mime_type, "Requesting caption");

        let response = self
            .http_client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CaptionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CaptionError::Api(status.as_u16(), error_text));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CaptionError::Parse(e.to_string()))?;

        let text = generated
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or(CaptionError::Empty)?;

        parse_caption(&text)
    }
}

#[async_trait]
impl Captioner for GeminiCaptioner {
    async fn caption(&self, base64_payload: &str, mime_type: &str) -> Option<Caption> {
        match self.request(base64_payload, mime_type).await {
            Ok(caption) => {
                debug!(suggested_name = %caption.suggested_name, "Caption received");
                Some(caption)
            }
            Err(e) => {
                warn!("Caption analysis failed: {}", e);
                None
            }
        }
    }
}

/// Parse the model's JSON text into a caption with a usable file name
pub fn parse_caption(text: &str) -> Result<Caption, CaptionError> {
    let trimmed = strip_code_fence(text.trim());
    if trimmed.is_empty() {
        return Err(CaptionError::Empty);
    }

    let mut caption: Caption = serde_json::from_str(trimmed).map_err(|e| CaptionError::Parse(e.to_string()))?;

    caption.description = caption.description.trim().to_string();
    caption.suggested_name = sanitize_file_stem(&caption.suggested_name);
    if caption.suggested_name.is_empty() {
        return Err(CaptionError::Parse("empty suggestedName".to_string()));
    }

    Ok(caption)
}

fn strip_code_fence(text: &str) -> &str {
    match text.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => text,
    }
}

/// Reduce a suggested name to a single path component with no extension
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect();

    let stem = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if matches!(ext.to_lowercase().as_str(), "png" | "jpg" | "jpeg" | "webp") => stem,
        _ => cleaned.as_str(),
    };

    stem.trim_matches(|c| c == '.' || c == '-').to_string()
}

//! Text-generation backend.
//!
//! [`TextGeneration`] is the seam the scorer and the bulletin writers call
//! through. [`TextGenerator`] is the production client for the Gemini
//! `generateContent` REST endpoint. Model output is free text that is
//! *supposed* to be JSON; [`extract_json`] and [`parse_structured`] turn it
//! into values without ever failing the caller.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::logging::DataSource;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("generator not configured: {0}")]
    NotConfigured(String),
    /// HTTP 429, or a provider message about quota or rate.
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("empty response from generator")]
    EmptyResponse,
}

impl GenerationError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited(_))
    }
}

#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// Gemini client
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationSettings,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini REST client.
///
/// Settings sit behind a lock so an operator can swap the API key at runtime
/// with [`TextGenerator::reconfigure`]; in-flight calls keep the key they
/// started with.
pub struct TextGenerator {
    client: reqwest::Client,
    settings: RwLock<GeneratorConfig>,
}

impl TextGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .user_agent("hazmon_service/0.1")
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(Self {
            client,
            settings: RwLock::new(config),
        })
    }

    pub fn reconfigure(&self, api_key: Option<String>) {
        match self.settings.write() {
            Ok(mut settings) => settings.api_key = api_key.filter(|k| !k.trim().is_empty()),
            Err(poisoned) => poisoned.into_inner().api_key = api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.snapshot().api_key.is_some()
    }

    fn snapshot(&self) -> GeneratorConfig {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn call_once(&self, settings: &GeneratorConfig, api_key: &str, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent",
            settings.base_url.trim_end_matches('/'),
            settings.model
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationSettings {
                temperature: settings.temperature,
                max_output_tokens: settings.max_output_tokens,
            },
        };

        let timeout = Duration::from_secs(settings.timeout_secs);
        // The deadline covers the body as well as the headers
        let exchange = async {
            let response = self
                .client
                .post(&url)
                .query(&[("key", api_key)])
                .json(&body)
                .send()
                .await
                .map_err(|e| GenerationError::Network(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| GenerationError::Network(e.to_string()))?;
            Ok::<_, GenerationError>((status, text))
        };
        let (status, text) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| GenerationError::Timeout(timeout))??;

        if !status.is_success() {
            return Err(classify_http_failure(status.as_u16(), text));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).map_err(|_| GenerationError::EmptyResponse)?;
        let output: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        if output.trim().is_empty() {
            Err(GenerationError::EmptyResponse)
        } else {
            Ok(output)
        }
    }
}

/// Maps a non-2xx answer onto an error, spotting quota and rate messages
/// that some gateways send with other status codes.
pub fn classify_http_failure(status: u16, body: String) -> GenerationError {
    let lower = body.to_ascii_lowercase();
    if status == 429 || lower.contains("quota") || lower.contains("rate limit") || lower.contains("resource_exhausted") {
        GenerationError::RateLimited(format!("HTTP {}", status))
    } else {
        GenerationError::Http { status, body }
    }
}

#[async_trait]
impl TextGeneration for TextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let settings = self.snapshot();
        let Some(api_key) = settings.api_key.clone() else {
            return Err(GenerationError::NotConfigured("GEMINI_API_KEY".into()));
        };

        match self.call_once(&settings, &api_key, prompt).await {
            Err(e) if e.is_rate_limited() => {
                let delay = Duration::from_secs(settings.retry_delay_secs);
                warn!(source = %DataSource::Generator, "rate limited, retrying once in {:?}", delay);
                tokio::time::sleep(delay).await;
                self.call_once(&settings, &api_key, prompt).await
            }
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Output decoding
// ---------------------------------------------------------------------------

/// Contents of the first fenced block (```json or bare ```), or the trimmed
/// text when there is none.
pub fn strip_code_fence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text.trim();
    };
    let after = &text[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

/// Removes commas that directly precede `}` or `]`, outside string literals.
pub fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Best-effort JSON from model output. Never fails: unparsable text is
/// logged and comes back as an empty array or object, matching what the
/// text looked like it was trying to be.
pub fn extract_json(text: &str) -> Value {
    let body = remove_trailing_commas(strip_code_fence(text));
    match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(source = %DataSource::Generator, "generator output is not JSON: {}", e);
            debug!(source = %DataSource::Generator, raw = %body, "raw generator output");
            if body.starts_with('[') {
                Value::Array(Vec::new())
            } else {
                Value::Object(Default::default())
            }
        }
    }
}

/// Decodes model output into `T`, or `T::default()` when it does not fit.
pub fn parse_structured<T: DeserializeOwned + Default>(text: &str) -> T {
    match serde_json::from_value(extract_json(text)) {
        Ok(value) => value,
        Err(e) => {
            debug!(source = %DataSource::Generator, "generator JSON has unexpected shape: {}", e);
            T::default()
        }
    }
}

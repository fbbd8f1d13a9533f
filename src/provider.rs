//! LLM provider adapter for email classification
//!
//! One single-method trait, two independent backends (OpenAI and Gemini),
//! selected once at startup from configuration. The adapter owns the three
//! outcome classes callers rely on: a trimmed category string on success,
//! `OrganizerError::RateLimited` on a 429/quota signal, and a permanent
//! error for everything else. Callers never see provider-specific shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{CategoryConfig, ProviderConfig};
use crate::error::{OrganizerError, Result};
use crate::models::Category;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upper bound on completion length; the model is asked for a single
/// category token.
const MAX_COMPLETION_TOKENS: u32 = 64;

const TRUNCATION_NOTICE: &str = "\n\n[Email content truncated due to length...]";

/// Uniform classification capability over interchangeable LLM backends
#[async_trait]
pub trait ClassifyProvider: Send + Sync {
    /// Classify message content into a single category string
    async fn classify(&self, content: &str) -> Result<Category>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Build the provider selected by configuration.
///
/// This is the only place that inspects `provider.backend`; the rest of the
/// pipeline works against the trait object.
pub fn from_config(
    provider: &ProviderConfig,
    categories: &CategoryConfig,
) -> Result<Box<dyn ClassifyProvider>> {
    match provider.backend.as_str() {
        "openai" => {
            let api_key = resolve_api_key(provider.api_key.as_deref(), "OPENAI_API_KEY")?;
            Ok(Box::new(OpenAiProvider::new(
                api_key,
                provider.openai_model.clone(),
                categories.known.clone(),
                provider.max_content_length,
                Duration::from_secs(provider.request_timeout_secs),
            )?))
        }
        "gemini" => {
            let api_key = resolve_api_key(provider.api_key.as_deref(), "GOOGLE_API_KEY")?;
            Ok(Box::new(GeminiProvider::new(
                api_key,
                provider.gemini_model.clone(),
                categories.known.clone(),
                provider.max_content_length,
                Duration::from_secs(provider.request_timeout_secs),
            )?))
        }
        other => Err(OrganizerError::Config(format!(
            "Unknown provider backend: '{}'",
            other
        ))),
    }
}

fn resolve_api_key(explicit: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = explicit {
        if !key.trim().is_empty() {
            return Ok(key.to_string());
        }
    }
    std::env::var(env_var).map_err(|_| {
        OrganizerError::Config(format!(
            "No API key found: set provider.api_key or the {} environment variable",
            env_var
        ))
    })
}

/// Truncate content to `max_length` characters, preferring a word boundary
/// when one falls within the last 10% of the limit, and appending a notice
/// so the model knows the tail is missing.
fn truncate_content(content: &str, max_length: usize) -> String {
    if content.chars().count() <= max_length {
        return content.to_string();
    }

    let mut truncated: String = content.chars().take(max_length).collect();
    if let Some(last_space) = truncated.rfind(' ') {
        if last_space > truncated.len() * 9 / 10 {
            truncated.truncate(last_space);
        }
    }

    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}

fn build_prompt(categories: &[String], content: &str) -> String {
    format!(
        "Categorize this email into one of these categories: {}\n\n\
         Email: {}\n\n\
         Respond with just the category name.",
        categories.join(", "),
        content
    )
}

fn parse_category(raw: &str, provider: &str) -> Result<Category> {
    let category = Category::new(raw);
    if category.is_empty() {
        return Err(OrganizerError::Provider(format!(
            "{} returned an empty category",
            provider
        )));
    }
    Ok(category)
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Classification over the OpenAI chat completions API
pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    categories: Vec<String>,
    max_content_length: usize,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        model: String,
        categories: Vec<String>,
        max_content_length: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrganizerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key,
            model,
            categories,
            max_content_length,
        })
    }

    /// Point the provider at a different endpoint (tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ClassifyProvider for OpenAiProvider {
    async fn classify(&self, content: &str) -> Result<Category> {
        let prompt = build_prompt(
            &self.categories,
            &truncate_content(content, self.max_content_length),
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are an email categorization assistant.".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OrganizerError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(OrganizerError::Auth(format!(
                "OpenAI rejected the API key (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(OrganizerError::Provider(format!(
                "OpenAI returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| OrganizerError::Provider(format!("Malformed OpenAI response: {}", e)))?;

        let text = body
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| {
                OrganizerError::Provider("OpenAI response contained no choices".to_string())
            })?;

        parse_category(text, "OpenAI")
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// Classification over the Gemini generateContent API
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    categories: Vec<String>,
    max_content_length: usize,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        model: String,
        categories: Vec<String>,
        max_content_length: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrganizerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            model,
            categories,
            max_content_length,
        })
    }

    /// Point the provider at a different endpoint (tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ClassifyProvider for GeminiProvider {
    async fn classify(&self, content: &str) -> Result<Category> {
        let prompt = build_prompt(
            &self.categories,
            &truncate_content(content, self.max_content_length),
        );

        let request = GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OrganizerError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(OrganizerError::Auth(format!(
                "Gemini rejected the API key (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(OrganizerError::Provider(format!(
                "Gemini returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OrganizerError::Provider(format!("Malformed Gemini response: {}", e)))?;

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| {
                OrganizerError::Provider("Gemini response contained no candidates".to_string())
            })?;

        parse_category(text, "Gemini")
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

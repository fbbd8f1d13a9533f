use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{OrganizerError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub categories: CategoryConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub unsubscribe: UnsubscribeConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// LLM backend: "openai" or "gemini"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// API key. When absent, the provider's conventional environment
    /// variable is consulted (OPENAI_API_KEY / GOOGLE_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Maximum characters of message content submitted per classification
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            openai_model: default_openai_model(),
            gemini_model: default_gemini_model(),
            api_key: None,
            max_content_length: default_max_content_length(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Category vocabulary offered to the model in the prompt
    #[serde(default = "default_known_categories")]
    pub known: Vec<String>,
    /// Categories whose messages are labeled and archived; everything else
    /// is trashed
    #[serde(default = "default_keep_categories")]
    pub keep: Vec<String>,
    /// Category assigned when classification fails outright
    #[serde(default = "default_fallback_category")]
    pub fallback: String,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            known: default_known_categories(),
            keep: default_keep_categories(),
            fallback: default_fallback_category(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LabelConfig {
    /// Labels never removed or deleted by any operation
    #[serde(default)]
    pub preserve: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Categories eligible for automatic unsubscribe
    #[serde(default = "default_unsubscribe_categories")]
    pub categories: Vec<String>,
    /// Sender substrings that also make a message eligible
    #[serde(default)]
    pub sender_patterns: Vec<String>,
    #[serde(default = "default_unsubscribe_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum spacing between outbound unsubscribe requests
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Host patterns (regex) that are never dereferenced
    #[serde(default = "default_denied_host_patterns")]
    pub denied_host_patterns: Vec<String>,
}

impl Default for UnsubscribeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            categories: default_unsubscribe_categories(),
            sender_patterns: Vec::new(),
            timeout_secs: default_unsubscribe_timeout_secs(),
            min_request_interval_ms: default_min_request_interval_ms(),
            denied_host_patterns: default_denied_host_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Delay between two consecutive message classifications
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,
    /// Base delay for exponential backoff after a rate-limit signal
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            message_delay_ms: default_message_delay_ms(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
}

fn default_backend() -> String {
    "openai".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_max_content_length() -> usize {
    8000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_known_categories() -> Vec<String> {
    vec![
        "Notes".to_string(),
        "Github".to_string(),
        "Newsletters".to_string(),
        "Promotions".to_string(),
        "Receipts".to_string(),
        "Spam".to_string(),
    ]
}

fn default_keep_categories() -> Vec<String> {
    vec!["Notes".to_string(), "Github".to_string()]
}

fn default_fallback_category() -> String {
    "Uncategorized".to_string()
}

fn default_unsubscribe_categories() -> Vec<String> {
    vec!["Newsletters".to_string(), "Promotions".to_string()]
}

fn default_unsubscribe_timeout_secs() -> u64 {
    10
}

fn default_min_request_interval_ms() -> u64 {
    1000
}

fn default_denied_host_patterns() -> Vec<String> {
    vec![
        // Raw IP-address hosts
        r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$".to_string(),
        // Free TLDs heavily used for throwaway phishing domains
        r"\.tk$".to_string(),
        r"\.ml$".to_string(),
        // URL shorteners hide the real destination
        r"bit\.ly".to_string(),
        r"tinyurl\.com".to_string(),
        r"goo\.gl".to_string(),
    ]
}

fn default_message_delay_ms() -> u64 {
    1000
}

fn default_base_backoff_ms() -> u64 {
    3000
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| OrganizerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| OrganizerError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OrganizerError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| OrganizerError::Config(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| OrganizerError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        match self.provider.backend.as_str() {
            "openai" | "gemini" => {}
            other => {
                return Err(OrganizerError::Config(format!(
                    "Invalid provider.backend: '{}'. Must be 'openai' or 'gemini'",
                    other
                )));
            }
        }

        if self.provider.max_content_length == 0 {
            return Err(OrganizerError::Config(
                "provider.max_content_length must be at least 1".to_string(),
            ));
        }

        if self.provider.request_timeout_secs == 0 {
            return Err(OrganizerError::Config(
                "provider.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.categories.known.is_empty() {
            return Err(OrganizerError::Config(
                "categories.known cannot be empty".to_string(),
            ));
        }

        if self.categories.fallback.trim().is_empty() {
            return Err(OrganizerError::Config(
                "categories.fallback cannot be empty".to_string(),
            ));
        }

        for category in self.categories.keep.iter().chain(&self.categories.known) {
            if category.trim().is_empty() {
                return Err(OrganizerError::Config(
                    "category names cannot be empty strings".to_string(),
                ));
            }
        }

        if self.unsubscribe.timeout_secs == 0 {
            return Err(OrganizerError::Config(
                "unsubscribe.timeout_secs must be at least 1".to_string(),
            ));
        }

        for pattern in &self.unsubscribe.denied_host_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                OrganizerError::Config(format!(
                    "unsubscribe.denied_host_patterns entry '{}' is not a valid regex: {}",
                    pattern, e
                ))
            })?;
        }

        if self.pacing.base_backoff_ms == 0 {
            return Err(OrganizerError::Config(
                "pacing.base_backoff_ms must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

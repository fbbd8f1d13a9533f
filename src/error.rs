use thiserror::Error;

/// Type alias for Result with OrganizerError
pub type Result<T> = std::result::Result<T, OrganizerError>;

/// Error types for the inbox organizer
#[derive(Error, Debug)]
pub enum OrganizerError {
    /// LLM provider signalled a rate limit (HTTP 429 / quota exhausted).
    /// The only error class the categorization engine retries.
    #[error("Provider rate limit exceeded")]
    RateLimited,

    /// Rate-limit retries were exhausted for a single message
    #[error("Rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// Permanent provider failure (bad auth, malformed response, rejected request)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network-related error (connection issues, DNS, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// An outbound HTTP call exceeded its deadline
    #[error("Request timed out")]
    Timeout,

    /// Unsubscribe target failed domain-safety validation
    #[error("Unsubscribe target rejected: {0}")]
    UnsafeTarget(String),

    /// Mailbox operation failed (label/archive/trash/fetch)
    #[error("Mailbox error: {0}")]
    Mailbox(String),

    /// Label-related errors
    #[error("Label error: {0}")]
    Label(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrganizerError {
    /// Check if the error is transient and should be retried.
    ///
    /// Only rate-limit signals are retried; everything else is surfaced
    /// immediately so the message can take the fallback path.
    pub fn is_transient(&self) -> bool {
        matches!(self, OrganizerError::RateLimited)
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl From<reqwest::Error> for OrganizerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            OrganizerError::Timeout
        } else if error.is_connect() || error.is_request() {
            OrganizerError::Network(error.to_string())
        } else {
            OrganizerError::Provider(error.to_string())
        }
    }
}

impl From<google_gmail1::Error> for OrganizerError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => OrganizerError::RateLimited,
                    401 | 403 => OrganizerError::Auth(message),
                    500..=599 => OrganizerError::Network(message),
                    _ => OrganizerError::Mailbox(message),
                }
            }
            // BadRequest variant (request not understood by server)
            google_gmail1::Error::BadRequest(ref err) => {
                OrganizerError::Mailbox(format!("{}", err))
            }
            // Network/connection errors
            google_gmail1::Error::HttpError(ref err) => {
                OrganizerError::Network(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => OrganizerError::Network(err.to_string()),
            // All other errors
            _ => OrganizerError::Mailbox(error.to_string()),
        }
    }
}

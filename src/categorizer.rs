//! Categorization retry engine
//!
//! Drives the LLM provider adapter for one message at a time through an
//! explicit state machine:
//!
//! `Pending -> Attempting -> { Classified | RateLimited -> Attempting | Failed }`
//!
//! Rate-limit signals are retried with exponential backoff, bounded at
//! [`MAX_RATE_LIMIT_RETRIES`]; every other failure is terminal for the
//! message. The delay function is injected so the machine can be tested
//! without real timing.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::OrganizerError;
use crate::models::ClassificationOutcome;
use crate::provider::ClassifyProvider;

/// Maximum rate-limit retries per message. One initial call plus this many
/// retries bounds the engine at four provider calls per message.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Injectable delay source
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Backoff delay for the k-th rate-limit signal: `base * 2^(k-1)`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Per-message classification state
#[derive(Debug)]
enum ClassificationState {
    Pending,
    Attempting { attempt: u32 },
    RateLimited { attempts: u32 },
}

/// Drives one classification to a terminal outcome, plus the shared pacing
/// delay applied between consecutive messages.
pub struct Categorizer {
    provider: Box<dyn ClassifyProvider>,
    base_backoff: Duration,
    message_delay: Duration,
    sleeper: Box<dyn Sleeper>,
}

impl Categorizer {
    pub fn new(
        provider: Box<dyn ClassifyProvider>,
        base_backoff: Duration,
        message_delay: Duration,
    ) -> Self {
        Self {
            provider,
            base_backoff,
            message_delay,
            sleeper: Box::new(TokioSleeper),
        }
    }

    /// Replace the delay source (tests)
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Backend name, for logging
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Classify one message's content, retrying rate limits with bounded
    /// exponential backoff. Always returns a terminal outcome.
    pub async fn classify(&self, content: &str) -> ClassificationOutcome {
        let mut state = ClassificationState::Pending;

        loop {
            state = match state {
                ClassificationState::Pending => ClassificationState::Attempting { attempt: 1 },

                ClassificationState::Attempting { attempt } => {
                    match self.provider.classify(content).await {
                        Ok(category) => {
                            debug!(
                                provider = self.provider.name(),
                                attempt,
                                category = %category,
                                "classification succeeded"
                            );
                            return ClassificationOutcome::Classified(category);
                        }
                        Err(e) if e.is_transient() => {
                            ClassificationState::RateLimited { attempts: attempt }
                        }
                        Err(e) => {
                            warn!(provider = self.provider.name(), attempt, error = %e,
                                "classification failed permanently");
                            return ClassificationOutcome::Failed(e);
                        }
                    }
                }

                ClassificationState::RateLimited { attempts } => {
                    if attempts > MAX_RATE_LIMIT_RETRIES {
                        return ClassificationOutcome::Failed(
                            OrganizerError::RateLimitExhausted { attempts },
                        );
                    }
                    let delay = backoff_delay(self.base_backoff, attempts);
                    warn!(
                        provider = self.provider.name(),
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    ClassificationState::Attempting {
                        attempt: attempts + 1,
                    }
                }
            };
        }
    }

    /// Pacing delay applied between two consecutive message classifications
    pub async fn pace(&self) {
        if !self.message_delay.is_zero() {
            self.sleeper.sleep(self.message_delay).await;
        }
    }
}

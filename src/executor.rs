//! Unsubscribe execution
//!
//! Performs the single selected unsubscribe candidate. Targets are
//! attacker-controlled, so every http(s) candidate passes a pure
//! domain-safety predicate before any network activity, dry-run mode stops
//! short of the network call, and consecutive live requests are spaced by a
//! minimum interval so third-party servers are not hammered.

use regex::RegexSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;

use crate::config::UnsubscribeConfig;
use crate::error::{OrganizerError, Result};
use crate::unsubscribe::{UnsubscribeCandidate, UnsubscribeMethod};

/// Fixed POST body mandated by RFC 8058
const ONE_CLICK_BODY: &str = "List-Unsubscribe=One-Click";

const USER_AGENT: &str = concat!("inbox-organizer/", env!("CARGO_PKG_VERSION"));

/// Terminal result of one unsubscribe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed { status: u16 },
    Failed { reason: FailureReason },
    ManualActionRequired { method: UnsubscribeMethod },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Target failed domain-safety validation; never dereferenced
    UnsafeTarget,
    Timeout,
    HttpStatus(u16),
    Request(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Dry-run mode; carries what would have been attempted
    DryRun {
        method: UnsubscribeMethod,
        target: String,
    },
}

impl UnsubscribeOutcome {
    /// Coarse outcome kind used for summary counting
    pub fn kind(&self) -> &'static str {
        match self {
            UnsubscribeOutcome::Unsubscribed { .. } => "unsubscribed",
            UnsubscribeOutcome::Failed { .. } => "failed",
            UnsubscribeOutcome::ManualActionRequired { .. } => "manual action required",
            UnsubscribeOutcome::Skipped { .. } => "skipped (dry run)",
        }
    }
}

impl std::fmt::Display for UnsubscribeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsubscribeOutcome::Unsubscribed { status } => {
                write!(f, "unsubscribed (HTTP {})", status)
            }
            UnsubscribeOutcome::Failed { reason } => write!(f, "failed: {}", reason),
            UnsubscribeOutcome::ManualActionRequired { method } => {
                write!(f, "manual action required ({})", method)
            }
            UnsubscribeOutcome::Skipped {
                reason: SkipReason::DryRun { method, target },
            } => {
                write!(f, "dry run: would unsubscribe via {} to {}", method, target)
            }
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::UnsafeTarget => f.write_str("unsafe target"),
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::HttpStatus(code) => write!(f, "HTTP {}", code),
            FailureReason::Request(message) => f.write_str(message),
        }
    }
}

/// Pure domain-safety check for unsubscribe targets.
///
/// A target passes when it parses as an http(s) URL with a host that does
/// not match any denylist pattern; rejections say why. Kept free of side
/// effects so it can be tested exhaustively against crafted URLs without
/// any network dependency.
pub fn validate_target(target: &str, denylist: &RegexSet) -> Result<()> {
    let parsed = Url::parse(target)
        .map_err(|_| OrganizerError::UnsafeTarget(format!("not a valid URL: {}", target)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(OrganizerError::UnsafeTarget(format!(
            "scheme '{}' is not http(s)",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| OrganizerError::UnsafeTarget("URL has no host".to_string()))?;

    if denylist.is_match(host) {
        return Err(OrganizerError::UnsafeTarget(format!(
            "host '{}' matches the denylist",
            host
        )));
    }

    Ok(())
}

/// Executes selected unsubscribe candidates
pub struct UnsubscribeExecutor {
    http: reqwest::Client,
    timeout: Duration,
    min_interval: Duration,
    dry_run: bool,
    denylist: RegexSet,
    last_request: Mutex<Option<Instant>>,
}

impl UnsubscribeExecutor {
    pub fn new(config: &UnsubscribeConfig, dry_run: bool) -> Result<Self> {
        let denylist = RegexSet::new(&config.denied_host_patterns).map_err(|e| {
            OrganizerError::Config(format!("Invalid denied_host_patterns: {}", e))
        })?;

        // TLS certificate verification stays at the reqwest default (on)
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| OrganizerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            timeout: Duration::from_secs(config.timeout_secs),
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            dry_run,
            denylist,
            last_request: Mutex::new(None),
        })
    }

    /// Execute one candidate to a terminal outcome. Never returns an error:
    /// every failure mode is encoded in the outcome so the run continues.
    pub async fn execute(&self, candidate: &UnsubscribeCandidate) -> UnsubscribeOutcome {
        // Form pages need input we cannot synthesize; mailto would send mail
        // on the user's behalf. Both are handed back for manual action,
        // dry-run or not.
        if matches!(
            candidate.method,
            UnsubscribeMethod::WebForm | UnsubscribeMethod::MailTo
        ) {
            info!(target = %candidate.target, method = %candidate.method,
                "unsubscribe requires manual action");
            return UnsubscribeOutcome::ManualActionRequired {
                method: candidate.method,
            };
        }

        // Validation runs before anything else, dry-run included
        if let Err(e) = validate_target(&candidate.target, &self.denylist) {
            warn!(target = %candidate.target, error = %e,
                "unsubscribe target failed safety validation");
            return UnsubscribeOutcome::Failed {
                reason: FailureReason::UnsafeTarget,
            };
        }

        if self.dry_run {
            info!(target = %candidate.target, method = %candidate.method,
                "dry run: skipping unsubscribe request");
            return UnsubscribeOutcome::Skipped {
                reason: SkipReason::DryRun {
                    method: candidate.method,
                    target: candidate.target.clone(),
                },
            };
        }

        self.pace().await;

        let request = if candidate.method == UnsubscribeMethod::OneClickPost {
            self.http
                .post(&candidate.target)
                .header("List-Unsubscribe", "One-Click")
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(ONE_CLICK_BODY)
        } else {
            self.http.get(&candidate.target)
        };

        match request.timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    info!(target = %candidate.target, status, "unsubscribe succeeded");
                    UnsubscribeOutcome::Unsubscribed { status }
                } else {
                    warn!(target = %candidate.target, status, "unsubscribe rejected");
                    UnsubscribeOutcome::Failed {
                        reason: FailureReason::HttpStatus(status),
                    }
                }
            }
            Err(e) if e.is_timeout() => UnsubscribeOutcome::Failed {
                reason: FailureReason::Timeout,
            },
            Err(e) => UnsubscribeOutcome::Failed {
                reason: FailureReason::Request(e.to_string()),
            },
        }
    }

    /// Enforce the minimum spacing between consecutive live requests
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

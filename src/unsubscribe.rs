//! Unsubscribe signal extraction and eligibility policy
//!
//! Parses `List-Unsubscribe` / `List-Unsubscribe-Post` headers (RFC 2369 /
//! RFC 8058) and, when no header signal exists, scans the body for common
//! unsubscribe link vocabulary. All signals are normalized into
//! [`UnsubscribeCandidate`] values ordered highest-confidence first; the
//! executor only ever sees the first one.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::UnsubscribeConfig;
use crate::models::{Category, Message};

/// How an unsubscribe action would be performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnsubscribeMethod {
    /// RFC 8058 one-click: POST with a fixed body to a header-supplied URL
    OneClickPost,
    /// Plain GET of an unsubscribe URL
    HttpGet,
    /// Link leads to a form page that needs human input
    WebForm,
    /// mailto: address; requires sending mail on the user's behalf
    MailTo,
}

impl std::fmt::Display for UnsubscribeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsubscribeMethod::OneClickPost => f.write_str("one-click"),
            UnsubscribeMethod::HttpGet => f.write_str("http"),
            UnsubscribeMethod::WebForm => f.write_str("web"),
            UnsubscribeMethod::MailTo => f.write_str("mailto"),
        }
    }
}

/// Where the signal was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateSource {
    Header,
    Body,
}

/// One normalized unsubscribe signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeCandidate {
    pub method: UnsubscribeMethod,
    /// URI or mailto address
    pub target: String,
    pub source: CandidateSource,
    /// Raw matched text the candidate was derived from
    pub evidence: String,
}

static ANGLE_URI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]+)>").unwrap());

/// Body link patterns for common unsubscribe vocabulary
static BODY_LINK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)https?://[^\s<>"]+?unsubscribe[^\s<>"]*"#,
        r#"(?i)https?://[^\s<>"]+?opt[_-]?out[^\s<>"]*"#,
        r#"(?i)https?://[^\s<>"]+?stop[_-]?receiving[^\s<>"]*"#,
        r#"(?i)https?://[^\s<>"]+?manage[_-]?preferences[^\s<>"]*"#,
        r#"(?i)https?://[^\s<>"]+?email[_-]?preferences[^\s<>"]*"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// URLs that look like preference-management pages rather than direct
/// unsubscribe actions. Heuristic, not guaranteed.
static FORM_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(manage[_-]?preferences|email[_-]?preferences|preference[_-]?cent(er|re))")
        .unwrap()
});

/// Selection priority: lower ranks are tried first
fn priority_rank(candidate: &UnsubscribeCandidate) -> u8 {
    match (candidate.method, candidate.source) {
        (UnsubscribeMethod::OneClickPost, _) => 0,
        (UnsubscribeMethod::HttpGet, CandidateSource::Header) => 1,
        (UnsubscribeMethod::HttpGet, CandidateSource::Body) => 2,
        (UnsubscribeMethod::WebForm, _) => 2,
        (UnsubscribeMethod::MailTo, _) => 3,
    }
}

/// Extract all unsubscribe candidates from a message, ordered
/// highest-confidence first.
///
/// Header signals take absolute precedence: the body is only scanned when
/// the headers yield nothing. Candidates with identical targets are
/// deduplicated, keeping the highest-priority method.
pub fn extract_candidates(message: &Message) -> Vec<UnsubscribeCandidate> {
    let mut candidates = header_candidates(message);

    if candidates.is_empty() {
        candidates = body_candidates(&message.body);
    }

    // Dedup identical targets, keeping the best method for each
    let mut deduped: Vec<UnsubscribeCandidate> = Vec::new();
    for candidate in candidates {
        if let Some(existing) = deduped.iter_mut().find(|c| c.target == candidate.target) {
            if priority_rank(&candidate) < priority_rank(existing) {
                *existing = candidate;
            }
        } else {
            deduped.push(candidate);
        }
    }

    // Stable sort: body candidates keep document order within their rank
    deduped.sort_by_key(priority_rank);
    deduped
}

/// The single candidate handed to the executor, if any
pub fn select_candidate(message: &Message) -> Option<UnsubscribeCandidate> {
    extract_candidates(message).into_iter().next()
}

fn header_candidates(message: &Message) -> Vec<UnsubscribeCandidate> {
    let mut candidates = Vec::new();

    for value in message.header_values("List-Unsubscribe") {
        for capture in ANGLE_URI_RE.captures_iter(value) {
            let uri = capture[1].trim().to_string();
            let lower = uri.to_lowercase();
            let method = if lower.starts_with("http://") || lower.starts_with("https://") {
                UnsubscribeMethod::HttpGet
            } else if lower.starts_with("mailto:") {
                UnsubscribeMethod::MailTo
            } else {
                continue;
            };
            candidates.push(UnsubscribeCandidate {
                method,
                target: uri,
                source: CandidateSource::Header,
                evidence: capture[0].to_string(),
            });
        }
    }

    // RFC 8058: List-Unsubscribe-Post upgrades the http(s) candidate to a
    // one-click POST
    let one_click = message
        .header_values("List-Unsubscribe-Post")
        .any(|v| v.contains("List-Unsubscribe=One-Click"));
    if one_click {
        if let Some(first_http) = candidates
            .iter_mut()
            .find(|c| c.method == UnsubscribeMethod::HttpGet)
        {
            first_http.method = UnsubscribeMethod::OneClickPost;
        }
    }

    candidates
}

fn body_candidates(body: &str) -> Vec<UnsubscribeCandidate> {
    let mut found: Vec<(usize, UnsubscribeCandidate)> = Vec::new();

    for pattern in BODY_LINK_PATTERNS.iter() {
        for m in pattern.find_iter(body) {
            let target = m
                .as_str()
                .trim_end_matches(['.', ',', ';', ':', ')'])
                .to_string();
            let method = if FORM_HINT_RE.is_match(&target) {
                UnsubscribeMethod::WebForm
            } else {
                UnsubscribeMethod::HttpGet
            };
            found.push((
                m.start(),
                UnsubscribeCandidate {
                    method,
                    target,
                    source: CandidateSource::Body,
                    evidence: m.as_str().to_string(),
                },
            ));
        }
    }

    // Document order
    found.sort_by_key(|(position, _)| *position);
    found.into_iter().map(|(_, candidate)| candidate).collect()
}

/// Eligibility policy, evaluated strictly after classification completes.
///
/// A message is eligible when unsubscribe is enabled and either its final
/// category is in the configured set or the sender contains a configured
/// pattern (case-insensitive substring).
pub fn should_unsubscribe(
    config: &UnsubscribeConfig,
    category: &Category,
    sender: &str,
) -> bool {
    if !config.enabled {
        return false;
    }

    if category.is_in(&config.categories) {
        return true;
    }

    let sender_lower = sender.to_lowercase();
    config
        .sender_patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|pattern| sender_lower.contains(&pattern.to_lowercase()))
}

use serde::{Deserialize, Serialize};

use crate::error::OrganizerError;

/// One fetched inbox message, immutable for the duration of a run.
///
/// Headers are kept as an ordered list of (name, value) pairs because
/// header names may legitimately repeat (e.g. Received, List-Unsubscribe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub label_ids: Vec<String>,
}

impl Message {
    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, matched case-insensitively, in document order
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The text handed to the LLM for classification: sender and subject
    /// framing followed by the plain-text body.
    pub fn classification_content(&self) -> String {
        format!(
            "From: {}\nSubject: {}\n\n{}",
            self.sender, self.subject, self.body
        )
    }
}

/// Classification label assigned by the LLM.
///
/// The model may emit novel strings, so this is an open-set wrapper over
/// trimmed text rather than a closed enum. Comparisons against configured
/// category sets are case-insensitive; display keeps the original casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Wrap raw model output, trimming surrounding whitespace
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used for set-membership checks
    pub fn folded(&self) -> String {
        self.0.to_lowercase()
    }

    /// Case-insensitive membership test against a configured category set
    pub fn is_in(&self, set: &[String]) -> bool {
        set.iter().any(|c| c.eq_ignore_ascii_case(&self.0))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification state for one message.
///
/// `RateLimited` is an intermediate retry state; the categorization engine
/// only ever returns the terminal `Classified` and `Failed` variants.
#[derive(Debug)]
pub enum ClassificationOutcome {
    Classified(Category),
    RateLimited { attempts: u32 },
    Failed(OrganizerError),
}

impl ClassificationOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClassificationOutcome::RateLimited { .. })
    }
}

/// Final action taken on a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// Label with the category and remove from the inbox
    LabelAndArchive,
    /// Move to trash
    Trash,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::LabelAndArchive => f.write_str("labeled & archived"),
            Disposition::Trash => f.write_str("trashed"),
        }
    }
}

/// Label info returned from the mailbox
#[derive(Debug, Clone)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

//! Inbox Organizer
//!
//! Classifies Gmail inbox messages with an LLM and applies a disposition:
//! messages in kept categories are labeled and archived, everything else is
//! trashed, and bulk senders can be unsubscribed from automatically.
//!
//! # Overview
//!
//! - **Classification**: one [`provider::ClassifyProvider`] call per message
//!   (OpenAI or Gemini), driven by the [`categorizer::Categorizer`] retry
//!   engine, which tolerates provider rate limits with bounded exponential
//!   backoff.
//! - **Unsubscribe**: [`unsubscribe`] parses `List-Unsubscribe` headers and
//!   body links into normalized candidates; [`executor::UnsubscribeExecutor`]
//!   performs exactly one of them behind a domain-safety check.
//! - **Disposition**: [`disposition`] decides keep vs. trash from the
//!   configured keep-set; [`pipeline`] runs the whole thing sequentially and
//!   accounts for every fetched message.
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`categorizer`] - classification retry engine with pacing and backoff
//! - [`cli`] - command-line interface
//! - [`config`] - configuration management
//! - [`disposition`] - keep/trash decision and system-label mapping
//! - [`error`] - error types and result alias
//! - [`executor`] - unsubscribe execution with target validation
//! - [`mailbox`] - mailbox trait and the Gmail implementation
//! - [`models`] - core data structures
//! - [`pipeline`] - per-run orchestration and the run summary
//! - [`provider`] - LLM provider adapters (OpenAI, Gemini)
//! - [`unsubscribe`] - unsubscribe signal extraction and eligibility policy

pub mod auth;
pub mod categorizer;
pub mod cli;
pub mod config;
pub mod disposition;
pub mod error;
pub mod executor;
pub mod mailbox;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod unsubscribe;

// Re-export commonly used types for convenience
pub use error::{OrganizerError, Result};

// Core data models
pub use models::{Category, ClassificationOutcome, Disposition, LabelInfo, Message};

// Classification
pub use categorizer::Categorizer;
pub use provider::ClassifyProvider;

// Unsubscribe handling
pub use executor::{UnsubscribeExecutor, UnsubscribeOutcome};
pub use unsubscribe::{UnsubscribeCandidate, UnsubscribeMethod};

// Mailbox collaborator
pub use mailbox::{GmailMailbox, Mailbox};

// Configuration and run summary
pub use config::Config;
pub use pipeline::RunSummary;

// CLI types (for binary usage)
pub use cli::{Cli, Commands};

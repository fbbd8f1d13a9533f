//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::disposition;
use crate::error::Result;
use crate::mailbox::Mailbox;

#[derive(Parser, Debug)]
#[command(name = "inbox-organizer")]
#[command(version)]
#[command(about = "AI-powered Gmail inbox organizer", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".inbox-organizer/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with the Gmail API
    Auth {
        /// Force re-authentication even if a token is cached
        #[arg(long)]
        force: bool,
    },

    /// Classify recent inbox messages and apply dispositions
    Run {
        /// How many recent messages to process (0 processes the whole inbox)
        #[arg(short = 'n', long, default_value_t = 10)]
        max_messages: usize,

        /// Evaluate and log actions without mutating the mailbox or
        /// issuing unsubscribe requests
        #[arg(long)]
        dry_run: bool,

        /// Disable unsubscribe handling for this run
        #[arg(long)]
        no_unsubscribe: bool,
    },

    /// Delete custom labels, keeping the preserved ones
    CleanLabels {
        /// Show what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Generate an example configuration file
    InitConfig {
        /// Path to create the config file at
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Outcome of a label cleanup pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanLabelsReport {
    pub deleted: usize,
    pub preserved: usize,
    pub failed: usize,
}

/// Delete all user labels except preserved ones. System labels are never
/// touched. Individual delete failures are counted, not fatal.
pub async fn clean_labels(
    mailbox: &dyn Mailbox,
    preserve: &[String],
    dry_run: bool,
) -> Result<CleanLabelsReport> {
    let labels = mailbox.list_labels().await?;
    let mut report = CleanLabelsReport::default();

    for label in labels {
        if disposition::is_system_label_id(&label.id) {
            continue;
        }
        if disposition::is_protected(&label.name, preserve) {
            info!(label = %label.name, "preserved");
            report.preserved += 1;
            continue;
        }
        if dry_run {
            info!(label = %label.name, "would delete");
            report.deleted += 1;
            continue;
        }
        match mailbox.delete_label(&label.id).await {
            Ok(()) => {
                info!(label = %label.name, "deleted");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(label = %label.name, error = %e, "failed to delete label");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

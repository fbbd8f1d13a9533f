//! Single-run pipeline: classify, optionally unsubscribe, dispose, account
//!
//! Messages are processed strictly one at a time in fetch order. The
//! mailbox mutation (label/archive/trash) is the final step for each
//! message and is issued at most once, so an interrupted run leaves no
//! partial state. Failures are contained per message; only setup failures
//! (fetch, label listing) abort the run.

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use tracing::{debug, error, info, warn};

use crate::categorizer::Categorizer;
use crate::config::Config;
use crate::disposition;
use crate::error::Result;
use crate::executor::{UnsubscribeExecutor, UnsubscribeOutcome};
use crate::mailbox::Mailbox;
use crate::models::{Category, ClassificationOutcome, Disposition, Message};
use crate::unsubscribe;

/// Per-category keep/trash tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryTally {
    pub kept: usize,
    pub trashed: usize,
}

/// End-of-run accounting. Built incrementally, read once, then discarded.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fetched: usize,
    pub categories: BTreeMap<String, CategoryTally>,
    pub unsubscribe_outcomes: BTreeMap<&'static str, usize>,
    pub skipped_already_labeled: usize,
    /// Messages that took the fallback category after classification failed
    pub classification_failures: usize,
    /// Messages whose final mailbox operation failed
    pub disposition_failures: usize,
    pub dry_run: bool,
}

impl RunSummary {
    fn new(fetched: usize, dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            fetched,
            categories: BTreeMap::new(),
            unsubscribe_outcomes: BTreeMap::new(),
            skipped_already_labeled: 0,
            classification_failures: 0,
            disposition_failures: 0,
            dry_run,
        }
    }

    fn mark_completed(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    fn record_disposition(&mut self, category: &Category, disposition: Disposition) {
        let tally = self
            .categories
            .entry(category.as_str().to_string())
            .or_default();
        match disposition {
            Disposition::LabelAndArchive => tally.kept += 1,
            Disposition::Trash => tally.trashed += 1,
        }
    }

    fn record_unsubscribe(&mut self, outcome: &UnsubscribeOutcome) {
        *self.unsubscribe_outcomes.entry(outcome.kind()).or_insert(0) += 1;
    }

    pub fn kept_total(&self) -> usize {
        self.categories.values().map(|t| t.kept).sum()
    }

    pub fn trashed_total(&self) -> usize {
        self.categories.values().map(|t| t.trashed).sum()
    }

    /// Every fetched message must be accounted for exactly once
    pub fn reconciles(&self) -> bool {
        self.kept_total()
            + self.trashed_total()
            + self.skipped_already_labeled
            + self.disposition_failures
            == self.fetched
    }

    /// Human-readable end-of-run table
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(70);
        let thin = "-".repeat(70);

        let _ = writeln!(out, "{}", rule);
        if self.dry_run {
            let _ = writeln!(out, "CATEGORIZATION RESULTS (DRY RUN)");
        } else {
            let _ = writeln!(out, "CATEGORIZATION RESULTS");
        }
        let _ = writeln!(out, "Run ID: {}", self.run_id);
        if let Some(completed_at) = self.completed_at {
            let _ = writeln!(
                out,
                "Completed: {} ({} seconds)",
                completed_at.format("%Y-%m-%d %H:%M:%S"),
                (completed_at - self.started_at).num_seconds()
            );
        }
        let _ = writeln!(out, "{}", rule);

        if self.categories.is_empty() {
            let _ = writeln!(out, "\nNo emails were processed.");
        } else {
            let _ = writeln!(out, "\nEmails by Category:");
            let _ = writeln!(out, "{}", thin);
            for (category, tally) in &self.categories {
                let (count, action) = if tally.kept > 0 {
                    (tally.kept, "KEPT")
                } else {
                    (tally.trashed, "TRASHED")
                };
                let _ = writeln!(out, "  {:<24} {:>4} emails  ->  {}", category, count, action);
            }
            let _ = writeln!(out, "{}", thin);
        }

        if !self.unsubscribe_outcomes.is_empty() {
            let _ = writeln!(out, "\nUnsubscribe attempts:");
            for (kind, count) in &self.unsubscribe_outcomes {
                let _ = writeln!(out, "  {:<28} {:>4}", kind, count);
            }
        }

        let _ = writeln!(out, "\nTotal fetched:    {} emails", self.fetched);
        if self.skipped_already_labeled > 0 {
            let _ = writeln!(
                out,
                "  Skipped:        {} emails (already labeled)",
                self.skipped_already_labeled
            );
        }
        if self.classification_failures > 0 {
            let _ = writeln!(
                out,
                "  Fallback:       {} emails (classification failed)",
                self.classification_failures
            );
        }
        let _ = writeln!(
            out,
            "  Kept:           {} emails (labeled & archived)",
            self.kept_total()
        );
        let _ = writeln!(
            out,
            "  Trashed:        {} emails (moved to trash)",
            self.trashed_total()
        );
        if self.disposition_failures > 0 {
            let _ = writeln!(
                out,
                "  Failed:         {} emails (mailbox operation failed)",
                self.disposition_failures
            );
        }
        let _ = writeln!(out, "{}", rule);

        out
    }
}

/// Cache of label name -> id, with system-label collision handling
struct LabelCache {
    by_folded_name: HashMap<String, String>,
}

impl LabelCache {
    async fn load(mailbox: &dyn Mailbox) -> Result<Self> {
        let labels = mailbox.list_labels().await?;
        Ok(Self {
            by_folded_name: labels
                .into_iter()
                .map(|l| (l.name.to_lowercase(), l.id))
                .collect(),
        })
    }

    /// Ids of the labels matching the given names (case-insensitive)
    fn ids_for(&self, names: &[String]) -> HashSet<String> {
        names
            .iter()
            .filter_map(|name| self.by_folded_name.get(&name.to_lowercase()).cloned())
            .collect()
    }

    /// Resolve a category name to a label id, creating the label on first
    /// use. Names colliding with reserved system labels map to the system
    /// id instead of creating a custom label.
    async fn ensure(&mut self, mailbox: &dyn Mailbox, name: &str) -> Result<String> {
        if let Some(system_id) = disposition::system_label_id(name) {
            return Ok(system_id.to_string());
        }
        if let Some(id) = self.by_folded_name.get(&name.to_lowercase()) {
            return Ok(id.clone());
        }

        let id = mailbox.create_label(name).await?;
        info!(label = name, id = %id, "created label");
        self.by_folded_name.insert(name.to_lowercase(), id.clone());
        Ok(id)
    }
}

fn subject_display(subject: &str) -> String {
    const MAX: usize = 60;
    if subject.chars().count() <= MAX {
        subject.to_string()
    } else {
        format!("{}...", subject.chars().take(MAX).collect::<String>())
    }
}

/// Process the inbox once: fetch, classify, unsubscribe where eligible,
/// dispose, and account. Per-message failures never abort the run.
pub async fn run(
    mailbox: &dyn Mailbox,
    categorizer: &Categorizer,
    executor: &UnsubscribeExecutor,
    config: &Config,
    max_messages: usize,
) -> Result<RunSummary> {
    let dry_run = config.execution.dry_run;
    let messages = mailbox.fetch_recent(max_messages).await?;
    info!(
        count = messages.len(),
        provider = categorizer.provider_name(),
        dry_run,
        "fetched inbox messages"
    );

    let mut summary = RunSummary::new(messages.len(), dry_run);
    let mut labels = LabelCache::load(mailbox).await?;
    let keep_label_ids = labels.ids_for(&config.categories.keep);

    let progress = ProgressBar::new(messages.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    for (index, message) in messages.iter().enumerate() {
        // Pacing between consecutive classifications, retries included
        if index > 0 {
            categorizer.pace().await;
        }

        if message.label_ids.iter().any(|id| keep_label_ids.contains(id)) {
            summary.skipped_already_labeled += 1;
            debug!(
                subject = %subject_display(&message.subject),
                "already labeled, skipping"
            );
            progress.inc(1);
            continue;
        }

        let category = classify_with_fallback(categorizer, message, config, &mut summary).await;

        // Eligibility uses the final category, never a provisional one
        let unsubscribe_outcome =
            attempt_unsubscribe(executor, message, &category, config, &mut summary).await;

        let final_action = disposition::decide(&category, &config.categories.keep);
        let applied = apply_disposition(
            mailbox,
            &mut labels,
            message,
            &category,
            final_action,
            config,
        )
        .await;

        match applied {
            Ok(()) => summary.record_disposition(&category, final_action),
            Err(e) => {
                error!(message_id = %message.id, error = %e, "disposition failed");
                summary.disposition_failures += 1;
            }
        }

        match &unsubscribe_outcome {
            Some(outcome) => info!(
                subject = %subject_display(&message.subject),
                category = %category,
                action = %final_action,
                unsubscribe = %outcome,
                "processed message"
            ),
            None => info!(
                subject = %subject_display(&message.subject),
                category = %category,
                action = %final_action,
                "processed message"
            ),
        }

        progress.inc(1);
    }

    progress.finish_and_clear();
    summary.mark_completed();
    Ok(summary)
}

/// Classify one message; failures fall back to the configured category so
/// every message still reaches a disposition.
async fn classify_with_fallback(
    categorizer: &Categorizer,
    message: &Message,
    config: &Config,
    summary: &mut RunSummary,
) -> Category {
    match categorizer.classify(&message.classification_content()).await {
        ClassificationOutcome::Classified(category) => category,
        ClassificationOutcome::Failed(e) => {
            warn!(message_id = %message.id, error = %e,
                "classification failed, using fallback category");
            summary.classification_failures += 1;
            Category::new(&config.categories.fallback)
        }
        // classify() only returns terminal outcomes
        ClassificationOutcome::RateLimited { attempts } => {
            warn!(message_id = %message.id, attempts,
                "classification ended mid-retry, using fallback category");
            summary.classification_failures += 1;
            Category::new(&config.categories.fallback)
        }
    }
}

/// Run the unsubscribe policy and, when eligible and a candidate exists,
/// execute exactly that candidate.
async fn attempt_unsubscribe(
    executor: &UnsubscribeExecutor,
    message: &Message,
    category: &Category,
    config: &Config,
    summary: &mut RunSummary,
) -> Option<UnsubscribeOutcome> {
    if !unsubscribe::should_unsubscribe(&config.unsubscribe, category, &message.sender) {
        return None;
    }

    let candidate = match unsubscribe::select_candidate(message) {
        Some(candidate) => candidate,
        None => {
            debug!(message_id = %message.id, "eligible for unsubscribe but no signal found");
            return None;
        }
    };

    let outcome = executor.execute(&candidate).await;
    summary.record_unsubscribe(&outcome);
    Some(outcome)
}

async fn apply_disposition(
    mailbox: &dyn Mailbox,
    labels: &mut LabelCache,
    message: &Message,
    category: &Category,
    action: Disposition,
    config: &Config,
) -> Result<()> {
    if config.execution.dry_run {
        debug!(message_id = %message.id, action = %action, "dry run: mailbox untouched");
        return Ok(());
    }

    match action {
        Disposition::LabelAndArchive => {
            let label_id = labels.ensure(mailbox, category.as_str()).await?;
            mailbox.apply_label(&message.id, &label_id).await?;
            // Archiving removes INBOX; a protected INBOX is left alone
            if !disposition::is_protected("INBOX", &config.labels.preserve) {
                mailbox.archive(&message.id).await?;
            }
            Ok(())
        }
        Disposition::Trash => mailbox.trash(&message.id).await,
    }
}

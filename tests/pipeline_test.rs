//! End-to-end pipeline tests over a scripted in-memory mailbox
//!
//! The LLM provider is a scripted fake and the mailbox records every
//! mutation, so each test can assert both the run summary and the exact
//! mailbox operations that were (or were not) issued.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use inbox_organizer::categorizer::Categorizer;
use inbox_organizer::cli;
use inbox_organizer::config::Config;
use inbox_organizer::error::{OrganizerError, Result};
use inbox_organizer::executor::UnsubscribeExecutor;
use inbox_organizer::mailbox::Mailbox;
use inbox_organizer::models::{Category, LabelInfo, Message};
use inbox_organizer::pipeline;
use inbox_organizer::provider::ClassifyProvider;

use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory mailbox that records every mutation
#[derive(Default)]
struct FakeMailbox {
    messages: Vec<Message>,
    labels: Mutex<Vec<LabelInfo>>,
    created_labels: Mutex<Vec<String>>,
    applied: Mutex<Vec<(String, String)>>,
    archived: Mutex<Vec<String>>,
    trashed: Mutex<Vec<String>>,
    deleted_labels: Mutex<Vec<String>>,
    next_label_id: AtomicUsize,
}

impl FakeMailbox {
    fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            next_label_id: AtomicUsize::new(1),
            ..Default::default()
        }
    }

    fn with_labels(self, labels: Vec<LabelInfo>) -> Self {
        *self.labels.lock().unwrap() = labels;
        self
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Message>> {
        let mut messages = self.messages.clone();
        if limit > 0 {
            messages.truncate(limit);
        }
        Ok(messages)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.labels.lock().unwrap().clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let id = format!("Label_{}", self.next_label_id.fetch_add(1, Ordering::SeqCst));
        self.labels.lock().unwrap().push(LabelInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        self.created_labels.lock().unwrap().push(name.to_string());
        Ok(id)
    }

    async fn delete_label(&self, label_id: &str) -> Result<()> {
        self.deleted_labels.lock().unwrap().push(label_id.to_string());
        Ok(())
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<()> {
        self.applied
            .lock()
            .unwrap()
            .push((message_id.to_string(), label_id.to_string()));
        Ok(())
    }

    async fn archive(&self, message_id: &str) -> Result<()> {
        self.archived.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn trash(&self, message_id: &str) -> Result<()> {
        self.trashed.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

/// Provider that replays a scripted sequence of results
struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<Category>>>,
    calls: Arc<AtomicU32>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<Category>>) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                responses: Mutex::new(responses.into()),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl ClassifyProvider for ScriptedProvider {
    async fn classify(&self, _content: &str) -> Result<Category> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(OrganizerError::Provider("script exhausted".to_string())))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn message(
    id: &str,
    subject: &str,
    sender: &str,
    headers: Vec<(&str, &str)>,
    body: &str,
    label_ids: Vec<&str>,
) -> Message {
    Message {
        id: id.to_string(),
        subject: subject.to_string(),
        sender: sender.to_string(),
        headers: headers
            .into_iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
        body: body.to_string(),
        label_ids: label_ids.into_iter().map(String::from).collect(),
    }
}

fn test_config(dry_run: bool) -> Config {
    let mut config = Config::default();
    config.categories.keep = vec!["Notes".to_string(), "Github".to_string()];
    config.unsubscribe.enabled = true;
    config.unsubscribe.categories = vec!["Promotions".to_string()];
    config.unsubscribe.sender_patterns = vec!["deals@".to_string()];
    // Tests point unsubscribe targets at a local mock server
    config.unsubscribe.denied_host_patterns = Vec::new();
    config.unsubscribe.min_request_interval_ms = 0;
    config.pacing.message_delay_ms = 0;
    config.pacing.base_backoff_ms = 1;
    config.execution.dry_run = dry_run;
    config
}

fn categorizer_for(responses: Vec<Result<Category>>) -> (Categorizer, Arc<AtomicU32>) {
    let (provider, calls) = ScriptedProvider::new(responses);
    (
        Categorizer::new(
            Box::new(provider),
            Duration::from_millis(1),
            Duration::ZERO,
        ),
        calls,
    )
}

#[tokio::test]
async fn kept_category_is_labeled_and_archived() {
    let mailbox = FakeMailbox::new(vec![message(
        "m1",
        "PR review requested",
        "notifications@github.com",
        vec![],
        "Please review this pull request",
        vec!["INBOX"],
    )]);
    let (categorizer, _) = categorizer_for(vec![Ok(Category::new("Github"))]);
    let config = test_config(false);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    assert_eq!(summary.kept_total(), 1);
    assert_eq!(summary.trashed_total(), 0);
    assert!(summary.reconciles());
    // No unsubscribe attempted for a category outside the unsubscribe set
    assert!(summary.unsubscribe_outcomes.is_empty());

    assert_eq!(*mailbox.created_labels.lock().unwrap(), vec!["Github"]);
    assert_eq!(
        *mailbox.applied.lock().unwrap(),
        vec![("m1".to_string(), "Label_1".to_string())]
    );
    assert_eq!(*mailbox.archived.lock().unwrap(), vec!["m1"]);
    assert!(mailbox.trashed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unsubscribed_message_is_still_trashed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/unsub"))
        .and(header("List-Unsubscribe", "One-Click"))
        .and(body_string("List-Unsubscribe=One-Click"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let unsub_header = format!("<{}/unsub>", server.uri());
    let mailbox = FakeMailbox::new(vec![message(
        "m1",
        "Mega sale inside",
        "deals@retailer.com",
        vec![
            ("List-Unsubscribe", unsub_header.as_str()),
            ("List-Unsubscribe-Post", "List-Unsubscribe=One-Click"),
        ],
        "Unrelated body https://retailer.com/unsubscribe/web",
        vec!["INBOX"],
    )]);
    let (categorizer, _) = categorizer_for(vec![Ok(Category::new("Promotions"))]);
    let config = test_config(false);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    // The unsubscribe succeeded, and the disposition is still trash
    assert_eq!(summary.unsubscribe_outcomes.get("unsubscribed"), Some(&1));
    assert_eq!(summary.trashed_total(), 1);
    assert_eq!(summary.kept_total(), 0);
    assert!(summary.reconciles());
    assert_eq!(*mailbox.trashed.lock().unwrap(), vec!["m1"]);
    assert!(mailbox.archived.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rate_limited_classification_recovers_after_backoff() {
    let mailbox = FakeMailbox::new(vec![message(
        "m1",
        "Meeting notes",
        "colleague@example.com",
        vec![],
        "Here are the notes from today",
        vec!["INBOX"],
    )]);
    let (categorizer, calls) = categorizer_for(vec![
        Err(OrganizerError::RateLimited),
        Err(OrganizerError::RateLimited),
        Ok(Category::new("Notes")),
    ]);
    let config = test_config(false);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.kept_total(), 1);
    assert_eq!(summary.classification_failures, 0);
    assert!(summary.reconciles());
    assert_eq!(*mailbox.created_labels.lock().unwrap(), vec!["Notes"]);
    assert_eq!(*mailbox.archived.lock().unwrap(), vec!["m1"]);
}

#[tokio::test]
async fn exhausted_rate_limits_fall_back_and_trash() {
    let mailbox = FakeMailbox::new(vec![message(
        "m1",
        "Whatever this is",
        "someone@example.com",
        vec![],
        "body",
        vec!["INBOX"],
    )]);
    let (categorizer, calls) = categorizer_for(vec![
        Err(OrganizerError::RateLimited),
        Err(OrganizerError::RateLimited),
        Err(OrganizerError::RateLimited),
        Err(OrganizerError::RateLimited),
        Err(OrganizerError::RateLimited),
    ]);
    let config = test_config(false);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    // One initial attempt plus three retries, then the fallback path
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(summary.classification_failures, 1);
    assert_eq!(
        summary.categories.get("Uncategorized").map(|t| t.trashed),
        Some(1)
    );
    assert!(summary.reconciles());
    assert_eq!(*mailbox.trashed.lock().unwrap(), vec!["m1"]);
}

#[tokio::test]
async fn permanent_provider_error_takes_fallback_without_retry() {
    let mailbox = FakeMailbox::new(vec![message(
        "m1",
        "Subject",
        "someone@example.com",
        vec![],
        "body",
        vec!["INBOX"],
    )]);
    let (categorizer, calls) = categorizer_for(vec![Err(OrganizerError::Provider(
        "malformed response".to_string(),
    ))]);
    let config = test_config(false);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.classification_failures, 1);
    assert_eq!(summary.trashed_total(), 1);
    assert!(summary.reconciles());
}

#[tokio::test]
async fn already_labeled_messages_are_skipped() {
    let mailbox = FakeMailbox::new(vec![
        message(
            "m1",
            "Old notes",
            "colleague@example.com",
            vec![],
            "body",
            vec!["INBOX", "Label_7"],
        ),
        message(
            "m2",
            "New notes",
            "colleague@example.com",
            vec![],
            "body",
            vec!["INBOX"],
        ),
    ])
    .with_labels(vec![LabelInfo {
        id: "Label_7".to_string(),
        name: "Notes".to_string(),
    }]);
    let (categorizer, calls) = categorizer_for(vec![Ok(Category::new("Notes"))]);
    let config = test_config(false);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    // m1 never reaches the provider
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.skipped_already_labeled, 1);
    assert_eq!(summary.kept_total(), 1);
    assert!(summary.reconciles());
    // The existing Notes label is reused, not recreated
    assert!(mailbox.created_labels.lock().unwrap().is_empty());
    assert_eq!(
        *mailbox.applied.lock().unwrap(),
        vec![("m2".to_string(), "Label_7".to_string())]
    );
}

#[tokio::test]
async fn dry_run_touches_nothing_but_accounts_everything() {
    let server = MockServer::start().await;
    // No request may reach the unsubscribe endpoint in dry-run mode
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let unsub_header = format!("<{}/unsub>", server.uri());
    let mailbox = FakeMailbox::new(vec![
        message(
            "m1",
            "Mega sale",
            "deals@retailer.com",
            vec![
                ("List-Unsubscribe", unsub_header.as_str()),
                ("List-Unsubscribe-Post", "List-Unsubscribe=One-Click"),
            ],
            "body",
            vec!["INBOX"],
        ),
        message(
            "m2",
            "Notes from standup",
            "colleague@example.com",
            vec![],
            "body",
            vec!["INBOX"],
        ),
    ]);
    let (categorizer, _) = categorizer_for(vec![
        Ok(Category::new("Promotions")),
        Ok(Category::new("Notes")),
    ]);
    let config = test_config(true);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, true).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    // Outcomes are still recorded and reconcile
    assert_eq!(
        summary.unsubscribe_outcomes.get("skipped (dry run)"),
        Some(&1)
    );
    assert_eq!(summary.kept_total(), 1);
    assert_eq!(summary.trashed_total(), 1);
    assert!(summary.reconciles());

    // But the mailbox was never mutated
    assert!(mailbox.created_labels.lock().unwrap().is_empty());
    assert!(mailbox.applied.lock().unwrap().is_empty());
    assert!(mailbox.archived.lock().unwrap().is_empty());
    assert!(mailbox.trashed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn system_label_category_reuses_reserved_id() {
    let mailbox = FakeMailbox::new(vec![message(
        "m1",
        "Obvious junk",
        "junk@example.com",
        vec![],
        "body",
        vec!["INBOX"],
    )]);
    let (categorizer, _) = categorizer_for(vec![Ok(Category::new("Spam"))]);
    let mut config = test_config(false);
    config.categories.keep.push("Spam".to_string());
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    assert_eq!(summary.kept_total(), 1);
    // The reserved SPAM id is used; no custom label is created
    assert!(mailbox.created_labels.lock().unwrap().is_empty());
    assert_eq!(
        *mailbox.applied.lock().unwrap(),
        vec![("m1".to_string(), "SPAM".to_string())]
    );
}

#[tokio::test]
async fn summary_reconciles_over_mixed_run() {
    let mailbox = FakeMailbox::new(vec![
        message("m1", "a", "a@example.com", vec![], "body", vec!["INBOX"]),
        message("m2", "b", "b@example.com", vec![], "body", vec!["INBOX"]),
        message("m3", "c", "c@example.com", vec![], "body", vec!["INBOX"]),
        message("m4", "d", "d@example.com", vec![], "body", vec!["INBOX"]),
    ]);
    let (categorizer, _) = categorizer_for(vec![
        Ok(Category::new("Notes")),
        Ok(Category::new("Promotions")),
        Err(OrganizerError::Provider("boom".to_string())),
        Ok(Category::new("Github")),
    ]);
    let config = test_config(false);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 10)
        .await
        .unwrap();

    assert_eq!(summary.fetched, 4);
    assert_eq!(summary.kept_total(), 2);
    assert_eq!(summary.trashed_total(), 2);
    assert_eq!(summary.classification_failures, 1);
    assert!(summary.reconciles());
}

#[tokio::test]
async fn fetch_limit_caps_processing() {
    let mailbox = FakeMailbox::new(vec![
        message("m1", "a", "a@example.com", vec![], "body", vec!["INBOX"]),
        message("m2", "b", "b@example.com", vec![], "body", vec!["INBOX"]),
        message("m3", "c", "c@example.com", vec![], "body", vec!["INBOX"]),
    ]);
    let (categorizer, calls) = categorizer_for(vec![
        Ok(Category::new("Notes")),
        Ok(Category::new("Notes")),
    ]);
    let config = test_config(false);
    let executor = UnsubscribeExecutor::new(&config.unsubscribe, false).unwrap();

    let summary = pipeline::run(&mailbox, &categorizer, &executor, &config, 2)
        .await
        .unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(summary.reconciles());
}

#[tokio::test]
async fn clean_labels_honors_preserved_and_system_labels() {
    let mailbox = FakeMailbox::new(vec![]).with_labels(vec![
        LabelInfo {
            id: "INBOX".to_string(),
            name: "INBOX".to_string(),
        },
        LabelInfo {
            id: "Label_1".to_string(),
            name: "Family".to_string(),
        },
        LabelInfo {
            id: "Label_2".to_string(),
            name: "Newsletters".to_string(),
        },
    ]);
    let preserve = vec!["family".to_string()];

    let report = cli::clean_labels(&mailbox, &preserve, false).await.unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.preserved, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(*mailbox.deleted_labels.lock().unwrap(), vec!["Label_2"]);
}

#[tokio::test]
async fn clean_labels_dry_run_deletes_nothing() {
    let mailbox = FakeMailbox::new(vec![]).with_labels(vec![LabelInfo {
        id: "Label_1".to_string(),
        name: "Newsletters".to_string(),
    }]);

    let report = cli::clean_labels(&mailbox, &[], true).await.unwrap();

    assert_eq!(report.deleted, 1);
    assert!(mailbox.deleted_labels.lock().unwrap().is_empty());
}

//! Mailbox collaborator interface and the Gmail implementation
//!
//! The pipeline only talks to the narrow [`Mailbox`] trait: fetch recent
//! messages, manage labels, archive, trash. [`GmailMailbox`] implements it
//! over the Gmail API with full-format message parsing (headers plus the
//! first text/plain body part).

use async_trait::async_trait;
use google_gmail1::api::{Label, Message as ApiMessage, MessagePart, ModifyMessageRequest};
use tracing::debug;

use crate::auth::GmailHub;
use crate::error::{OrganizerError, Result};
use crate::models::{LabelInfo, Message};

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// Page size for message listing
const LIST_PAGE_SIZE: u32 = 100;

/// Narrow mailbox interface consumed by the pipeline
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Fetch the most recent inbox messages, newest first. `limit` of 0
    /// fetches everything in the inbox.
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Message>>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new user label, returning its id
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Delete a label by id
    async fn delete_label(&self, label_id: &str) -> Result<()>;

    /// Apply a label to a message
    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<()>;

    /// Archive a message by removing it from the inbox
    async fn archive(&self, message_id: &str) -> Result<()>;

    /// Move a message to trash
    async fn trash(&self, message_id: &str) -> Result<()>;
}

/// Production mailbox backed by the Gmail API
pub struct GmailMailbox {
    hub: GmailHub,
}

impl GmailMailbox {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    /// List inbox message ids with pagination, newest first
    async fn list_inbox_ids(&self, limit: usize) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            if limit > 0 && all_ids.len() >= limit {
                all_ids.truncate(limit);
                break;
            }

            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q("in:inbox")
                .max_results(LIST_PAGE_SIZE);

            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = call.add_scope(MODIFY_SCOPE).doit().await?;

            if let Some(messages) = response.messages {
                for msg_ref in messages {
                    if let Some(id) = msg_ref.id {
                        all_ids.push(id);
                    }
                }
            }

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        if limit > 0 {
            all_ids.truncate(limit);
        }
        Ok(all_ids)
    }

    async fn fetch_full(&self, id: &str) -> Result<Message> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        parse_message(msg)
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Message>> {
        let ids = self.list_inbox_ids(limit).await?;
        debug!("Listed {} inbox messages", ids.len());

        // Sequential fetch preserves newest-first order for the pipeline
        let mut messages = Vec::with_capacity(ids.len());
        for id in &ids {
            messages.push(self.fetch_full(id).await?);
        }
        Ok(messages)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let (_, response) = self
            .hub
            .users()
            .labels_list("me")
            .add_scope(LABELS_SCOPE)
            .doit()
            .await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Listed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let (_, created) = self
            .hub
            .users()
            .labels_create(label, "me")
            .add_scope(LABELS_SCOPE)
            .doit()
            .await?;

        created
            .id
            .ok_or_else(|| OrganizerError::Label("Created label has no ID".to_string()))
    }

    async fn delete_label(&self, label_id: &str) -> Result<()> {
        self.hub
            .users()
            .labels_delete("me", label_id)
            .add_scope(LABELS_SCOPE)
            .doit()
            .await?;

        Ok(())
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<()> {
        let request = ModifyMessageRequest {
            add_label_ids: Some(vec![label_id.to_string()]),
            remove_label_ids: None,
        };

        self.hub
            .users()
            .messages_modify(request, "me", message_id)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(())
    }

    async fn archive(&self, message_id: &str) -> Result<()> {
        let request = ModifyMessageRequest {
            add_label_ids: None,
            remove_label_ids: Some(vec!["INBOX".to_string()]),
        };

        self.hub
            .users()
            .messages_modify(request, "me", message_id)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(())
    }

    async fn trash(&self, message_id: &str) -> Result<()> {
        self.hub
            .users()
            .messages_trash("me", message_id)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(())
    }
}

/// Parse a Gmail API message into the pipeline's Message
fn parse_message(msg: ApiMessage) -> Result<Message> {
    let id = msg
        .id
        .ok_or_else(|| OrganizerError::Mailbox("Message is missing an ID".to_string()))?;

    let label_ids = msg.label_ids.unwrap_or_default();

    let payload = msg
        .payload
        .ok_or_else(|| OrganizerError::Mailbox(format!("Message {} has no payload", id)))?;

    let mut headers: Vec<(String, String)> = Vec::new();
    let mut subject = String::new();
    let mut sender = String::new();

    for header in payload.headers.iter().flatten() {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            match name.to_lowercase().as_str() {
                "subject" => subject = value.clone(),
                "from" => {
                    sender = parse_email_address(value).unwrap_or_else(|| value.clone());
                }
                _ => {}
            }
            headers.push((name.clone(), value.clone()));
        }
    }

    let body = extract_body_text(&payload);

    Ok(Message {
        id,
        subject,
        sender,
        headers,
        body,
        label_ids,
    })
}

/// Pull the address out of a "Name <email@example.com>" From header
fn parse_email_address(header: &str) -> Option<String> {
    let start = header.find('<')?;
    let end = header.find('>')?;
    if end <= start {
        return None;
    }
    Some(header[start + 1..end].trim().to_string())
}

/// Extract the first text/plain body, recursing through multipart nesting
fn extract_body_text(payload: &MessagePart) -> String {
    if let Some(parts) = &payload.parts {
        for part in parts {
            if part.mime_type.as_deref() == Some("text/plain") {
                let text = decode_part_body(part);
                if !text.is_empty() {
                    return text;
                }
            } else if part.parts.is_some() {
                let nested = extract_body_text(part);
                if !nested.is_empty() {
                    return nested;
                }
            }
        }
        String::new()
    } else {
        decode_part_body(payload)
    }
}

fn decode_part_body(part: &MessagePart) -> String {
    part.body
        .as_ref()
        .and_then(|body| body.data.as_ref())
        .map(|data| String::from_utf8_lossy(data).into_owned())
        .unwrap_or_default()
}

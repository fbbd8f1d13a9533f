//! Disposition rules
//!
//! Pure decisions: keep-set membership picks the final action, category
//! names that collide with reserved mailbox labels are redirected to the
//! matching system label id, and protected labels are exempt from every
//! destructive operation.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::models::{Category, Disposition};

/// Gmail system label ids keyed by the names people write for them.
/// These ids are fixed identifiers and cannot be created as custom labels.
static SYSTEM_LABEL_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("spam", "SPAM");
    map.insert("trash", "TRASH");
    map.insert("inbox", "INBOX");
    map.insert("sent", "SENT");
    map.insert("draft", "DRAFT");
    map.insert("drafts", "DRAFT");
    map.insert("important", "IMPORTANT");
    map.insert("starred", "STARRED");
    map.insert("unread", "UNREAD");
    map
});

/// System label ids that must never be deleted
const SYSTEM_LABEL_IDS: &[&str] = &[
    "INBOX", "SPAM", "TRASH", "UNREAD", "STARRED", "IMPORTANT", "SENT", "DRAFT", "CHAT",
];

/// Final action for a classified message. Membership in the keep-set is the
/// only input; unsubscribe outcomes never override it.
pub fn decide(category: &Category, keep: &[String]) -> Disposition {
    if category.is_in(keep) {
        Disposition::LabelAndArchive
    } else {
        Disposition::Trash
    }
}

/// Map a category name onto the reserved system label it collides with,
/// if any (case-insensitive).
pub fn system_label_id(name: &str) -> Option<&'static str> {
    SYSTEM_LABEL_MAP.get(name.to_lowercase().as_str()).copied()
}

/// Whether a label id belongs to the mailbox itself rather than the user
pub fn is_system_label_id(id: &str) -> bool {
    SYSTEM_LABEL_IDS.contains(&id) || id.starts_with("CATEGORY_")
}

/// Whether a label name is configured as protected (case-insensitive)
pub fn is_protected(label_name: &str, preserved: &[String]) -> bool {
    preserved.iter().any(|p| p.eq_ignore_ascii_case(label_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keep_set() -> Vec<String> {
        vec!["Notes".to_string(), "Github".to_string()]
    }

    #[test]
    fn test_keep_category_is_labeled_and_archived() {
        assert_eq!(
            decide(&Category::new("Github"), &keep_set()),
            Disposition::LabelAndArchive
        );
        // Membership is case-insensitive
        assert_eq!(
            decide(&Category::new("notes"), &keep_set()),
            Disposition::LabelAndArchive
        );
    }

    #[test]
    fn test_other_category_is_trashed() {
        assert_eq!(
            decide(&Category::new("Promotions"), &keep_set()),
            Disposition::Trash
        );
        assert_eq!(
            decide(&Category::new("Uncategorized"), &keep_set()),
            Disposition::Trash
        );
    }

    #[test]
    fn test_system_label_collisions_are_redirected() {
        assert_eq!(system_label_id("Trash"), Some("TRASH"));
        assert_eq!(system_label_id("spam"), Some("SPAM"));
        assert_eq!(system_label_id("SPAM"), Some("SPAM"));
        assert_eq!(system_label_id("Drafts"), Some("DRAFT"));
        assert_eq!(system_label_id("Starred"), Some("STARRED"));
    }

    #[test]
    fn test_custom_names_do_not_map_to_system_labels() {
        assert_eq!(system_label_id("Github"), None);
        assert_eq!(system_label_id("Trash Day Reminders"), None);
    }

    #[test]
    fn test_system_label_id_detection() {
        assert!(is_system_label_id("INBOX"));
        assert!(is_system_label_id("TRASH"));
        assert!(is_system_label_id("CATEGORY_PROMOTIONS"));
        assert!(!is_system_label_id("Label_42"));
    }

    #[test]
    fn test_protected_labels_case_insensitive() {
        let preserved = vec!["Receipts".to_string(), "Family".to_string()];
        assert!(is_protected("receipts", &preserved));
        assert!(is_protected("FAMILY", &preserved));
        assert!(!is_protected("Newsletters", &preserved));
    }
}

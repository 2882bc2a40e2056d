//! Conversation history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Coordinator,
    System,
}

/// A validated structured call attached to a confirmed dispatch entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    /// Name of the capability the request was routed to
    pub capability: String,

    /// Arguments as accepted by the capability's schema
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// One append-only record in a conversation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Unique entry ID
    pub id: String,

    pub author: Author,

    /// Text shown to the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Structured call handed to the dispatch sink
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchPayload>,

    pub created_at: DateTime<Utc>,

    /// Marks the interim "routing in progress" entry
    #[serde(default)]
    pub is_transitional: bool,
}

impl ConversationEntry {
    fn new(author: Author, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author,
            text: Some(text.into()),
            dispatch: None,
            created_at: Utc::now(),
            is_transitional: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Author::User, text)
    }

    pub fn coordinator(text: impl Into<String>) -> Self {
        Self::new(Author::Coordinator, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Author::System, text)
    }

    /// Interim entry appended as soon as a target capability is chosen.
    pub fn routing(capability: &str) -> Self {
        Self {
            is_transitional: true,
            ..Self::coordinator(format!(
                "Routing request to specialized agent: {capability}..."
            ))
        }
    }

    /// Confirmed dispatch entry carrying the validated call.
    pub fn dispatched(payload: DispatchPayload, acknowledgement: impl Into<String>) -> Self {
        Self {
            dispatch: Some(payload),
            ..Self::coordinator(acknowledgement)
        }
    }

    pub fn is_dispatch(&self) -> bool {
        self.dispatch.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_get_unique_ids() {
        let a = ConversationEntry::user("hello");
        let b = ConversationEntry::user("hello");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn routing_entry_is_transitional() {
        let entry = ConversationEntry::routing("manage_patient_info");
        assert!(entry.is_transitional);
        assert_eq!(entry.author, Author::Coordinator);
        assert_eq!(
            entry.text.as_deref(),
            Some("Routing request to specialized agent: manage_patient_info...")
        );
        assert!(!entry.is_dispatch());
    }

    #[test]
    fn dispatched_entry_carries_payload() {
        let mut arguments = serde_json::Map::new();
        arguments.insert("query".into(), "Schedule a checkup".into());
        let entry = ConversationEntry::dispatched(
            DispatchPayload {
                capability: "manage_patient_info".into(),
                arguments,
            },
            "received",
        );
        assert!(entry.is_dispatch());
        assert!(!entry.is_transitional);
        assert_eq!(entry.dispatch.unwrap().arguments["query"], "Schedule a checkup");
    }

    #[test]
    fn author_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Author::Coordinator).unwrap(),
            "\"coordinator\""
        );
        let json = serde_json::to_value(ConversationEntry::system("down")).unwrap();
        assert_eq!(json["author"], "system");
        assert!(json.get("dispatch").is_none());
    }
}

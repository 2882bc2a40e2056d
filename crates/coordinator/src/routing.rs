//! Routing inputs and decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single user-authored request, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingUtterance {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl RoutingUtterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// The parsed outcome of one classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Validated call, ready for the dispatch sink
    Dispatch {
        target: String,
        arguments: serde_json::Map<String, serde_json::Value>,
    },

    /// The classifier asked the user for more detail
    Clarification { message: String },
}

impl RoutingDecision {
    pub fn clarification(message: impl Into<String>) -> Self {
        Self::Clarification {
            message: message.into(),
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Dispatch { target, .. } => Some(target),
            Self::Clarification { .. } => None,
        }
    }
}

//! Error types for MediRouter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    /// The classifier could not be reached or answered with a non-success status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The classifier reply broke the single-structured-call contract.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A structured call was present but its arguments failed the schema check.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The downstream agent sink refused or failed the dispatch.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// A submission arrived while the conversation was not idle.
    #[error("Conversation busy: {0}")]
    Busy(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The coordinator already holds as many conversations as it allows.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RouterError {
    /// The failure class recorded in conversation history, if this error is
    /// one the state machine converts into a failed turn.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::Transport(_) => Some(FailureClass::Transport),
            Self::ProtocolViolation(_) => Some(FailureClass::ProtocolViolation),
            Self::Validation(_) => Some(FailureClass::Validation),
            Self::Dispatch(_) => Some(FailureClass::Dispatch),
            _ => None,
        }
    }
}

/// User-facing classification of a failed routing turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Transport,
    ProtocolViolation,
    Validation,
    Dispatch,
}

impl FailureClass {
    /// Message placed in history. Never includes provider or sink diagnostics.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Transport => {
                "System Error: Unable to route request. The routing service is unavailable, please try again."
            }
            Self::ProtocolViolation => {
                "System Error: The coordinator produced an invalid routing decision. Please rephrase your request."
            }
            Self::Validation => {
                "System Error: The routing decision was missing or had invalid details. Please rephrase your request."
            }
            Self::Dispatch => {
                "System Error: The specialized agent could not accept the request. Please try again later."
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

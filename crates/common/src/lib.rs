//! Common types and traits shared across MediRouter crates.
//!
//! This crate provides the error taxonomy, the conversation entry model and
//! the dispatch boundary that the coordinator and its collaborators share.

pub mod error;
pub mod message;
pub mod traits;

pub use error::{FailureClass, Result, RouterError};
pub use message::{Author, ConversationEntry, DispatchPayload};
pub use traits::{DispatchAck, DispatchSink};

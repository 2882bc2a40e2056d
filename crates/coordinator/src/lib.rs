//! Routing coordinator for MediRouter.
//!
//! Every user utterance is classified by a remote model into exactly one of
//! the capabilities in the catalog, or answered with a clarification.
//!
//! # Architecture
//!
//! ```text
//! utterance
//!     │
//!     ▼
//! ┌──────────────────────┐   function declarations   ┌────────────┐
//! │ RoutingRequestClient │ ────────────────────────► │ classifier │
//! └──────────┬───────────┘ ◄──────── reply ───────── └────────────┘
//!            ▼
//!       parser::parse ──► Dispatch ──► DispatchSink ──► agent
//!            │
//!            └──────────► Clarification / failure entry
//! ```
//!
//! [`Conversation`] owns phase and history; [`Coordinator`] hosts many
//! conversations over one set of collaborators.

pub mod catalog;
pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod parser;
pub mod request;
pub mod routing;
pub mod sink;

pub use catalog::{ArgumentKind, ArgumentSpec, CapabilityCatalog, CapabilityDescriptor, CatalogConfig};
pub use config::{AgentEndpointConfig, CoordinatorConfig, RoutingConfig};
pub use conversation::{
    Conversation, ConversationEvent, ConversationPhase, ConversationSnapshot, RoutingContext,
    SubmitOutcome, MAX_INPUT_BYTES,
};
pub use coordinator::Coordinator;
pub use parser::{parse, DEFAULT_CLARIFICATION};
pub use request::{policy_preamble, RoutingRequestClient, DEFAULT_TEMPERATURE};
pub use routing::{RoutingDecision, RoutingUtterance};
pub use sink::{HttpDispatchSink, LoggingDispatchSink, DEFAULT_ACK_MESSAGE};

//! The dispatch boundary towards the specialized agents.
//!
//! Defined in `medirouter-common` so that sinks can live outside the
//! coordinator crate without a circular dependency.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Acknowledgement returned by a sink that accepted a routed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchAck {
    /// Capability that accepted the call
    pub capability: String,

    /// Human-readable confirmation recorded in history
    pub message: String,

    /// Sink-side reference for the accepted work, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Executes a routed call against the agent that owns the capability.
///
/// Implementations return `RouterError::Dispatch` on failure; the
/// coordinator records it in history rather than dropping it.
#[async_trait]
pub trait DispatchSink: Send + Sync {
    async fn dispatch(
        &self,
        capability: &str,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<DispatchAck>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

//! Dispatch sinks that hand routed calls to the specialized agents.

use async_trait::async_trait;
use medirouter_common::{DispatchAck, DispatchSink, Result, RouterError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ACK_MESSAGE: &str = "Agent successfully received the structured command.";

/// Acknowledges every call and logs it. Used when no agent endpoints are
/// configured.
#[derive(Debug, Default, Clone)]
pub struct LoggingDispatchSink;

#[async_trait]
impl DispatchSink for LoggingDispatchSink {
    async fn dispatch(&self, capability: &str, arguments: &Map<String, Value>) -> Result<DispatchAck> {
        info!(
            capability = %capability,
            arguments = %serde_json::Value::Object(arguments.clone()),
            "Dispatching structured command"
        );
        Ok(DispatchAck {
            capability: capability.to_string(),
            message: DEFAULT_ACK_MESSAGE.to_string(),
            reference: None,
        })
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[derive(Serialize)]
struct DispatchRequest<'a> {
    capability: &'a str,
    arguments: &'a Map<String, Value>,
}

#[derive(Deserialize, Default)]
struct DispatchResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reference: Option<String>,
}

/// POSTs `{capability, arguments}` to the endpoint configured for the
/// capability and treats any 2xx as an acknowledgement.
pub struct HttpDispatchSink {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl HttpDispatchSink {
    pub fn new(endpoints: HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoint(&self, capability: &str) -> Option<&str> {
        self.endpoints.get(capability).map(String::as_str)
    }
}

#[async_trait]
impl DispatchSink for HttpDispatchSink {
    async fn dispatch(&self, capability: &str, arguments: &Map<String, Value>) -> Result<DispatchAck> {
        let endpoint = self.endpoint(capability).ok_or_else(|| {
            RouterError::Dispatch(format!("No agent endpoint configured for '{capability}'"))
        })?;

        debug!(capability = %capability, endpoint = %endpoint, "Posting to agent");

        let response = self
            .client
            .post(endpoint)
            .json(&DispatchRequest {
                capability,
                arguments,
            })
            .send()
            .await
            .map_err(|e| RouterError::Dispatch(format!("Agent request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(capability = %capability, status = %status, "Agent rejected dispatch");
            return Err(RouterError::Dispatch(format!(
                "Agent returned {status}: {body}"
            )));
        }

        // An empty or non-JSON body still counts as accepted.
        let body = response.text().await.unwrap_or_default();
        let parsed: DispatchResponse = serde_json::from_str(&body).unwrap_or_default();

        Ok(DispatchAck {
            capability: capability.to_string(),
            message: parsed
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ACK_MESSAGE.to_string()),
            reference: parsed.reference,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

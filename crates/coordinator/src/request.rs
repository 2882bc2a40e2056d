//! Builds and sends one classification request per utterance.

use crate::catalog::CapabilityCatalog;
use crate::routing::RoutingUtterance;
use medirouter_common::{Result, RouterError};
use medirouter_llm::{ChatMessage, LlmClient, LlmRequest, LlmResponse};
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

/// Default sampling temperature. Kept low so routing is repeatable.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

const PREAMBLE_HEADER: &str = "You are the Central Coordinator for a medical system. \
Your job is to route each user request to exactly one of the specialized agents listed below.";

/// Render the policy preamble for a catalog.
///
/// The agent list and the sensitive-data rule are derived from the catalog so
/// the instructions stay in step with the functions actually offered.
pub fn policy_preamble(catalog: &CapabilityCatalog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{PREAMBLE_HEADER}");
    let _ = writeln!(out);
    let _ = writeln!(out, "# OPERATIONAL PROTOCOLS");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "1. **Strict Mode:** Your output must ALWAYS be a single function call selecting one of the \
         available agents. Never call more than one function. Do not produce free text unless the \
         request cannot be routed."
    );
    let _ = writeln!(
        out,
        "2. **Failure Protocol:** If the request is unclear or does not fit any available agent, \
         reply with a short, polite free-text message asking for clarification (for example: \
         \"Please specify what you are looking for. I cannot route this request.\")."
    );
    if let Some(sensitive) = catalog.sensitive_data_capability() {
        let _ = writeln!(
            out,
            "3. **Security Priority:** If the request touches sensitive personal data without \
             sufficient context or permission, do not refuse it. Route it to '{}' so that agent \
             can handle verification.",
            sensitive.name
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "# AVAILABLE AGENTS (FUNCTIONS)");
    let _ = writeln!(out);
    for capability in catalog.list_capabilities() {
        let _ = writeln!(out, "- **{}**: {}", capability.name, capability.description);
    }
    out
}

/// Stateless client that turns an utterance into a classifier request.
///
/// Performs exactly one outbound call; retry policy belongs to the
/// transport wrapped inside the `LlmClient`.
#[derive(Clone)]
pub struct RoutingRequestClient {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl RoutingRequestClient {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn build_request(
        &self,
        utterance: &RoutingUtterance,
        catalog: &CapabilityCatalog,
    ) -> LlmRequest {
        LlmRequest {
            system_prompt: Some(policy_preamble(catalog)),
            messages: vec![ChatMessage::user(utterance.text.clone())],
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
            tools: catalog.function_declarations(),
        }
    }

    /// Send the classification request and return the raw reply.
    ///
    /// Any failure surfaces as `RouterError::Transport`.
    pub async fn classify(
        &self,
        utterance: &RoutingUtterance,
        catalog: &CapabilityCatalog,
    ) -> Result<LlmResponse> {
        let request = self.build_request(utterance, catalog);

        debug!(
            model = %self.llm.model_name(),
            catalog_version = catalog.version(),
            tools = request.tools.len(),
            "Sending classification request"
        );

        self.llm.complete(request).await.map_err(|e| match e {
            RouterError::Transport(_) => e,
            other => RouterError::Transport(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CapturingClient {
        seen: Mutex<Option<LlmRequest>>,
        fail_with: Option<fn() -> RouterError>,
    }

    #[async_trait]
    impl LlmClient for CapturingClient {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            *self.seen.lock().unwrap() = Some(request);
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(LlmResponse::text("capture", "ok")),
            }
        }
        fn model_name(&self) -> &str {
            "capture"
        }
    }

    #[test]
    fn preamble_names_every_capability_and_sensitive_target() {
        let catalog = CapabilityCatalog::medical();
        let preamble = policy_preamble(&catalog);
        for cap in catalog.list_capabilities() {
            assert!(preamble.contains(&cap.name), "missing {}", cap.name);
        }
        assert!(preamble.contains("single function call"));
        assert!(preamble.contains("Route it to 'manage_patient_info'"));
    }

    #[test]
    fn request_offers_catalog_as_tools() {
        let client = RoutingRequestClient::new(Arc::new(CapturingClient {
            seen: Mutex::new(None),
            fail_with: None,
        }));
        let catalog = CapabilityCatalog::medical();
        let request = client.build_request(&RoutingUtterance::new("Draft a referral"), &catalog);

        assert_eq!(request.tools.len(), 4);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content, "Draft a referral");
        assert_eq!(request.temperature, Some(DEFAULT_TEMPERATURE));
        assert!(request.system_prompt.unwrap().contains("Strict Mode"));
    }

    #[tokio::test]
    async fn classify_sends_one_request() {
        let llm = Arc::new(CapturingClient {
            seen: Mutex::new(None),
            fail_with: None,
        });
        let client = RoutingRequestClient::new(llm.clone()).with_temperature(0.0);
        let reply = client
            .classify(&RoutingUtterance::new("hello"), &CapabilityCatalog::medical())
            .await
            .unwrap();

        assert_eq!(reply.content.as_deref(), Some("ok"));
        let seen = llm.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn non_transport_failures_become_transport_errors() {
        let client = RoutingRequestClient::new(Arc::new(CapturingClient {
            seen: Mutex::new(None),
            fail_with: Some(|| RouterError::Config("no key".into())),
        }));
        let err = client
            .classify(&RoutingUtterance::new("hello"), &CapabilityCatalog::medical())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Transport(_)));
    }
}

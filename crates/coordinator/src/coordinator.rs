//! Multi-conversation host.

use crate::catalog::CapabilityCatalog;
use crate::config::CoordinatorConfig;
use crate::conversation::{Conversation, RoutingContext, SubmitOutcome};
use crate::request::RoutingRequestClient;
use crate::sink::{HttpDispatchSink, LoggingDispatchSink};
use medirouter_common::{DispatchSink, Result, RouterError};
use medirouter_llm::{build_llm_client, LlmClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Owns the shared routing collaborators and every open conversation.
///
/// Conversations share the catalog, request client and sink, but no
/// mutable state; each has its own phase and history.
pub struct Coordinator {
    context: Arc<RoutingContext>,
    conversations: RwLock<HashMap<String, Arc<Conversation>>>,
    max_conversations: usize,
}

impl Coordinator {
    pub fn new(context: RoutingContext) -> Self {
        Self {
            context: Arc::new(context),
            conversations: RwLock::new(HashMap::new()),
            max_conversations: crate::config::RoutingConfig::default().max_conversations,
        }
    }

    /// Cap the number of conversations open at once.
    pub fn with_max_conversations(mut self, max: usize) -> Self {
        self.max_conversations = max;
        self
    }

    /// Assemble a coordinator from an already-built LLM client and sink,
    /// with default timeouts.
    pub fn with_components(
        catalog: CapabilityCatalog,
        llm: Arc<dyn LlmClient>,
        sink: Arc<dyn DispatchSink>,
    ) -> Self {
        let routing = crate::config::RoutingConfig::default();
        Self::new(RoutingContext {
            catalog: Arc::new(catalog),
            client: RoutingRequestClient::new(llm).with_temperature(routing.temperature),
            sink,
            classify_timeout: routing.classify_timeout(),
            dispatch_timeout: routing.dispatch_timeout(),
        })
    }

    /// Build every collaborator from configuration.
    ///
    /// Uses the configured catalog when present, the medical catalog
    /// otherwise. With no `[agents.*]` entries, dispatches are only logged.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self> {
        let catalog = match &config.catalog {
            Some(catalog) => CapabilityCatalog::from_config(catalog.clone())?,
            None => CapabilityCatalog::medical(),
        };

        for name in config.agents.keys() {
            if !catalog.contains(name) {
                return Err(RouterError::Config(format!(
                    "Agent endpoint configured for unknown capability '{name}'"
                )));
            }
        }

        let llm = build_llm_client(&config.llm)?;
        let client = RoutingRequestClient::new(llm)
            .with_temperature(config.routing.temperature)
            .with_max_tokens(config.llm.max_tokens);

        let sink: Arc<dyn DispatchSink> = if config.agents.is_empty() {
            Arc::new(LoggingDispatchSink)
        } else {
            Arc::new(HttpDispatchSink::new(
                config.agent_endpoints(),
                config.routing.dispatch_timeout(),
            )?)
        };

        info!(
            provider = %config.llm.provider,
            model = %client.model_name(),
            catalog_version = catalog.version(),
            capabilities = catalog.len(),
            sink = sink.name(),
            "Coordinator initialized"
        );

        Ok(Self::new(RoutingContext {
            catalog: Arc::new(catalog),
            client,
            sink,
            classify_timeout: config.routing.classify_timeout(),
            dispatch_timeout: config.routing.dispatch_timeout(),
        })
        .with_max_conversations(config.routing.max_conversations))
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.context.catalog
    }

    pub fn model_name(&self) -> &str {
        self.context.client.model_name()
    }

    pub fn classify_timeout(&self) -> Duration {
        self.context.classify_timeout
    }

    pub fn max_conversations(&self) -> usize {
        self.max_conversations
    }

    /// Open a new conversation, or fail with `Capacity` once
    /// `max_conversations` are already open.
    pub async fn open_conversation(&self) -> Result<Arc<Conversation>> {
        let mut conversations = self.conversations.write().await;
        if conversations.len() >= self.max_conversations {
            warn!(
                open = conversations.len(),
                max = self.max_conversations,
                "Refusing to open conversation"
            );
            return Err(RouterError::Capacity(format!(
                "{} conversations already open",
                conversations.len()
            )));
        }

        let conversation = Arc::new(Conversation::new(self.context.clone()));
        debug!(conversation_id = %conversation.id(), "Opened conversation");
        conversations.insert(conversation.id().to_string(), conversation.clone());
        Ok(conversation)
    }

    /// Remove a conversation from the registry.
    ///
    /// A turn already in flight still runs to completion; the conversation
    /// just can no longer be looked up.
    pub async fn close_conversation(&self, id: &str) -> Result<()> {
        match self.conversations.write().await.remove(id) {
            Some(_) => {
                debug!(conversation_id = %id, "Closed conversation");
                Ok(())
            }
            None => Err(RouterError::NotFound(format!("conversation {id}"))),
        }
    }

    pub async fn conversation(&self, id: &str) -> Option<Arc<Conversation>> {
        self.conversations.read().await.get(id).cloned()
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Submit to a conversation by id.
    pub async fn submit(&self, id: &str, text: &str) -> Result<SubmitOutcome> {
        let conversation = self
            .conversation(id)
            .await
            .ok_or_else(|| RouterError::NotFound(format!("conversation {id}")))?;
        conversation.submit(text).await
    }
}

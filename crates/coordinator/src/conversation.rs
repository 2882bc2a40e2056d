//! Per-conversation routing state machine.
//!
//! ```text
//!          submit
//!   Idle ─────────► Routing ──Dispatch──► Dispatched ──ack──► Idle
//!    ▲                 │                      │
//!    │                 ├──Clarification──► Clarifying ──────► Idle
//!    │                 │                      │
//!    └──── Failed ◄────┴──────error───────────┘ (sink error)
//! ```
//!
//! The state lock is only held for check-and-append steps; the classifier
//! and sink calls run without it, and a second `submit` observes `Routing`
//! and is rejected as busy.

use crate::catalog::CapabilityCatalog;
use crate::parser;
use crate::request::RoutingRequestClient;
use crate::routing::{RoutingDecision, RoutingUtterance};
use medirouter_common::{
    ConversationEntry, DispatchAck, DispatchPayload, DispatchSink, FailureClass, Result,
    RouterError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// Longest accepted submission, in bytes.
pub const MAX_INPUT_BYTES: usize = 10_000;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Idle,
    Routing,
    Dispatched,
    Clarifying,
    Failed,
}

impl ConversationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Routing => "routing",
            Self::Dispatched => "dispatched",
            Self::Clarifying => "clarifying",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published on every phase change and appended entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConversationEvent {
    PhaseChanged {
        conversation_id: String,
        from: ConversationPhase,
        to: ConversationPhase,
    },
    EntryAppended {
        conversation_id: String,
        entry: ConversationEntry,
    },
}

/// Read-only view handed to presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub id: String,
    pub phase: ConversationPhase,
    pub active_capability: Option<String>,
    pub history: Vec<ConversationEntry>,
}

/// What a completed `submit` produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Dispatched { capability: String, ack: DispatchAck },
    Clarified { message: String },
    Failed { failure: FailureClass },
}

/// Collaborators shared by every conversation of a coordinator.
#[derive(Clone)]
pub struct RoutingContext {
    pub catalog: Arc<CapabilityCatalog>,
    pub client: RoutingRequestClient,
    pub sink: Arc<dyn DispatchSink>,
    pub classify_timeout: Duration,
    pub dispatch_timeout: Duration,
}

struct ConversationState {
    phase: ConversationPhase,
    history: Vec<ConversationEntry>,
    decision: Option<RoutingDecision>,
}

/// One conversation's phase, history and event channel.
///
/// Each turn runs on its own task over shared state, so it always settles
/// back to `Idle`.
pub struct Conversation {
    core: Arc<ConversationCore>,
}

struct ConversationCore {
    id: String,
    context: Arc<RoutingContext>,
    state: Mutex<ConversationState>,
    events: broadcast::Sender<ConversationEvent>,
}

impl Conversation {
    pub fn new(context: Arc<RoutingContext>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), context)
    }

    pub fn with_id(id: impl Into<String>, context: Arc<RoutingContext>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            core: Arc::new(ConversationCore {
                id: id.into(),
                context,
                state: Mutex::new(ConversationState {
                    phase: ConversationPhase::Idle,
                    history: Vec::new(),
                    decision: None,
                }),
                events,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.core.events.subscribe()
    }

    pub async fn phase(&self) -> ConversationPhase {
        self.core.state.lock().await.phase
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        let state = self.core.state.lock().await;
        ConversationSnapshot {
            id: self.core.id.clone(),
            phase: state.phase,
            active_capability: active_capability(&state),
            history: state.history.clone(),
        }
    }

    /// Route one utterance through classify, parse and dispatch.
    ///
    /// Returns `Busy` if a previous submission is still in flight and
    /// `InvalidInput` for empty or oversized text; neither touches history.
    /// Routing failures are not errors here: they are recorded as a system
    /// entry and reported as `SubmitOutcome::Failed`.
    ///
    /// The turn runs on a spawned task. Dropping the returned future does
    /// not abandon it, and a panic inside it is recorded as a failed turn.
    pub async fn submit(&self, text: &str) -> Result<SubmitOutcome> {
        let core = self.core.clone();
        let text = text.to_string();
        // Recovery lives in the outer task so it runs even if nobody awaits it.
        let turn = tokio::spawn(async move {
            let worker = core.clone();
            match tokio::spawn(async move { worker.submit(&text).await }).await {
                Ok(result) => result,
                Err(e) => Ok(core.recover(&e.to_string()).await),
            }
        });
        turn.await
            .map_err(|e| RouterError::Transport(format!("routing task panicked: {e}")))?
    }
}

impl ConversationCore {
    async fn submit(&self, text: &str) -> Result<SubmitOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RouterError::InvalidInput("message is empty".into()));
        }
        if text.len() > MAX_INPUT_BYTES {
            return Err(RouterError::InvalidInput(format!(
                "message is {} bytes, limit is {MAX_INPUT_BYTES}",
                text.len()
            )));
        }

        {
            let mut state = self.state.lock().await;
            if state.phase != ConversationPhase::Idle {
                return Err(RouterError::Busy(format!(
                    "conversation {} is {}",
                    self.id, state.phase
                )));
            }
            self.append(&mut state, ConversationEntry::user(text));
            self.transition(&mut state, ConversationPhase::Routing);
        }

        info!(
            conversation_id = %self.id,
            content_preview = %text.chars().take(50).collect::<String>(),
            "Routing utterance"
        );

        let utterance = RoutingUtterance::new(text);
        match self.decide(&utterance).await {
            Ok(RoutingDecision::Clarification { message }) => Ok(self.clarify(message).await),
            Ok(RoutingDecision::Dispatch { target, arguments }) => {
                Ok(self.dispatch(target, arguments).await)
            }
            Err(e) => {
                let class = e.failure_class().unwrap_or(FailureClass::Transport);
                Ok(self.fail(class, &e).await)
            }
        }
    }

    async fn decide(&self, utterance: &RoutingUtterance) -> Result<RoutingDecision> {
        let ctx = &self.context;
        let reply = tokio::time::timeout(
            ctx.classify_timeout,
            ctx.client.classify(utterance, &ctx.catalog),
        )
        .await
        .map_err(|_| {
            RouterError::Transport(format!(
                "classifier did not answer within {}ms",
                ctx.classify_timeout.as_millis()
            ))
        })??;

        let decision = parser::parse(&reply, &ctx.catalog)?;
        debug!(
            conversation_id = %self.id,
            target = ?decision.target(),
            "Parsed routing decision"
        );
        Ok(decision)
    }

    async fn clarify(&self, message: String) -> SubmitOutcome {
        let mut state = self.state.lock().await;
        state.decision = Some(RoutingDecision::clarification(message.clone()));
        self.transition(&mut state, ConversationPhase::Clarifying);
        self.append(&mut state, ConversationEntry::coordinator(message.clone()));
        self.settle(&mut state);
        SubmitOutcome::Clarified { message }
    }

    async fn dispatch(
        &self,
        target: String,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> SubmitOutcome {
        {
            let mut state = self.state.lock().await;
            state.decision = Some(RoutingDecision::Dispatch {
                target: target.clone(),
                arguments: arguments.clone(),
            });
            self.transition(&mut state, ConversationPhase::Dispatched);
            self.append(&mut state, ConversationEntry::routing(&target));
        }

        let ctx = &self.context;
        let result = tokio::time::timeout(
            ctx.dispatch_timeout,
            ctx.sink.dispatch(&target, &arguments),
        )
        .await
        .unwrap_or_else(|_| {
            Err(RouterError::Dispatch(format!(
                "sink '{}' did not acknowledge within {}ms",
                ctx.sink.name(),
                ctx.dispatch_timeout.as_millis()
            )))
        });

        match result {
            Ok(ack) => {
                info!(
                    conversation_id = %self.id,
                    capability = %target,
                    sink = ctx.sink.name(),
                    "Dispatch acknowledged"
                );
                let payload = DispatchPayload {
                    capability: target.clone(),
                    arguments,
                };
                let mut state = self.state.lock().await;
                self.append(
                    &mut state,
                    ConversationEntry::dispatched(payload, ack.message.clone()),
                );
                self.settle(&mut state);
                SubmitOutcome::Dispatched {
                    capability: target,
                    ack,
                }
            }
            Err(e) => self.fail(FailureClass::Dispatch, &e).await,
        }
    }

    async fn fail(&self, class: FailureClass, cause: &RouterError) -> SubmitOutcome {
        error!(
            conversation_id = %self.id,
            failure = ?class,
            error = %cause,
            "Routing turn failed"
        );
        let mut state = self.state.lock().await;
        self.transition(&mut state, ConversationPhase::Failed);
        self.append(&mut state, ConversationEntry::system(class.user_message()));
        self.settle(&mut state);
        SubmitOutcome::Failed { failure: class }
    }

    /// Close out a turn whose task died before settling.
    ///
    /// Whatever phase the turn reached becomes a failed turn: `Dispatch` if
    /// a dispatch was in flight, `Transport` otherwise.
    async fn recover(&self, cause: &str) -> SubmitOutcome {
        let mut state = self.state.lock().await;
        let class = match state.phase {
            ConversationPhase::Dispatched => FailureClass::Dispatch,
            _ => FailureClass::Transport,
        };
        error!(
            conversation_id = %self.id,
            phase = %state.phase,
            failure = ?class,
            error = %cause,
            "Routing task panicked"
        );
        if state.phase != ConversationPhase::Idle {
            if state.phase != ConversationPhase::Failed {
                self.transition(&mut state, ConversationPhase::Failed);
            }
            self.append(&mut state, ConversationEntry::system(class.user_message()));
            self.settle(&mut state);
        }
        SubmitOutcome::Failed { failure: class }
    }

    /// Return to Idle and drop the turn's decision.
    fn settle(&self, state: &mut ConversationState) {
        state.decision = None;
        self.transition(state, ConversationPhase::Idle);
    }

    fn transition(&self, state: &mut ConversationState, to: ConversationPhase) {
        let from = state.phase;
        if from == to {
            warn!(conversation_id = %self.id, phase = %to, "Ignoring self-transition");
            return;
        }
        state.phase = to;
        // No subscribers is fine.
        let _ = self.events.send(ConversationEvent::PhaseChanged {
            conversation_id: self.id.clone(),
            from,
            to,
        });
    }

    fn append(&self, state: &mut ConversationState, entry: ConversationEntry) {
        state.history.push(entry.clone());
        let _ = self.events.send(ConversationEvent::EntryAppended {
            conversation_id: self.id.clone(),
            entry,
        });
    }
}

fn active_capability(state: &ConversationState) -> Option<String> {
    match (&state.phase, &state.decision) {
        (ConversationPhase::Dispatched, Some(decision)) => decision.target().map(str::to_string),
        _ => None,
    }
}

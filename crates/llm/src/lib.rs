//! Transport to the remote classifier.
//!
//! Provider clients speak each vendor's function-calling wire format and
//! normalize replies into [`LlmResponse`]: free text, structured calls, or
//! both. Retries and concurrency limits are layered on as wrappers.

pub mod client;
pub mod config;
pub mod gemini;
pub mod openai;
pub mod retry;

pub use client::{
    ChatMessage, FunctionCall, FunctionDeclaration, LlmClient, LlmRequest, LlmResponse, Role,
    TokenUsage,
};
pub use config::{LlmConfig, SemaphoredClient, build_llm_client};
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};

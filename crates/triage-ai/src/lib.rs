//! Model-provider boundary for backlog triage.
//!
//! Exposes chat-completion and embedding traits plus an OpenAI-compatible
//! HTTP client implementing both.
mod openai;
mod retry;
mod types;

pub use openai::{OpenAiAuthScheme, OpenAiClient, OpenAiConfig};
pub use retry::{next_backoff_ms, provider_retry_delay_ms, should_retry_status};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, EmbeddingClient, EmbeddingRequest, EmbeddingResponse,
    LlmClient, Message, MessageRole, TriageAiError,
};

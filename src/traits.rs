use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{RunnerRequest, RunnerResponse};

/// A message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String, // "system", "user", "assistant"
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: &str, role: &str, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Token usage statistics from an LLM API response.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: String,
}

/// The LLM's response text, if any, plus usage accounting.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Text-generation provider — sends a chat-style message list to an LLM and
/// gets back text. Planning calls pin a low temperature for determinism;
/// plain conversation uses a higher one.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        temperature: f32,
    ) -> anyhow::Result<ProviderResponse>;
}

/// Append-only conversation persistence. External in production; an
/// in-memory implementation ships in [`crate::store`] for tests and
/// embedding.
///
/// Failures here are the only ones that propagate to the caller as hard
/// errors — no well-formed response is possible without history access.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All prior messages for a conversation, ordered by creation time.
    async fn history(&self, conversation_id: &str) -> anyhow::Result<Vec<Message>>;

    /// Append one message to the log.
    async fn append(&self, message: &Message) -> anyhow::Result<()>;
}

/// The operation-execution collaborator: receives a tool step (with its
/// linear-chain `next_tool` pointer) and runs it against the blockchain
/// backend.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, request: &RunnerRequest) -> anyhow::Result<RunnerResponse>;
}

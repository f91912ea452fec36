//! In-memory conversation store for tests and embedded use. Production
//! deployments implement [`ConversationStore`] over their own database.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::traits::{ConversationStore, Message};

#[derive(Default)]
pub struct InMemoryConversationStore {
    messages: Mutex<Vec<Message>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn history(&self, conversation_id: &str) -> anyhow::Result<Vec<Message>> {
        let messages = self.messages.lock().await;
        Ok(messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn append(&self, message: &Message) -> anyhow::Result<()> {
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}

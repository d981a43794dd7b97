use async_trait::async_trait;
use domain::{ChatMessage, DisplayName, MessageBody, MessageId, RepositoryError, Timestamp};
use tokio::sync::RwLock;

use application::MessageStore;

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    messages: Vec<ChatMessage>,
}

/// 进程内消息存储，未配置数据库时使用
#[derive(Default)]
pub struct MemoryMessageStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(
        &self,
        username: DisplayName,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Result<ChatMessage, RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let message = ChatMessage::new(MessageId::new(inner.next_id), username, body, created_at);
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        let inner = self.inner.read().await;
        let start = inner.messages.len().saturating_sub(limit);
        Ok(inner.messages[start..].to_vec())
    }
}

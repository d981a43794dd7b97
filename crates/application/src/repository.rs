use async_trait::async_trait;
use domain::{ChatMessage, DisplayName, MessageBody, RepositoryError, Timestamp};

/// 追加写入的消息存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 保存消息并分配单调递增的 id
    async fn append(
        &self,
        username: DisplayName,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Result<ChatMessage, RepositoryError>;

    /// 最近的 `limit` 条消息，按 id 升序
    async fn list_recent(&self, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError>;
}

use async_trait::async_trait;
use domain::{ChatMessage, DisplayName, MessageBody};

use crate::error::ApplicationError;

/// 会话视角下的持久化协作方：提交消息、拉取最近消息。
///
/// 进程内由 `ChatService` 实现，远程由 HTTP 客户端实现。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn create_message(
        &self,
        username: &DisplayName,
        body: &MessageBody,
    ) -> Result<ChatMessage, ApplicationError>;

    async fn list_recent_messages(&self, limit: usize)
        -> Result<Vec<ChatMessage>, ApplicationError>;
}

use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChatMessage, DisplayName, MessageBody, CHAT_CHANNEL, MESSAGE_SENT_EVENT};

use crate::{
    backend::ChatBackend, clock::Clock, error::ApplicationError, hub::ChannelHub,
    repository::MessageStore,
};

/// 一次最多返回的历史消息条数
pub const MAX_HISTORY_LIMIT: usize = 100;

pub struct ChatServiceDependencies {
    pub store: Arc<dyn MessageStore>,
    pub hub: Arc<ChannelHub>,
    pub clock: Arc<dyn Clock>,
}

/// 服务端的消息用例：保存消息并广播给频道内所有订阅者
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.deps.hub
    }

    /// 以 `identity` 的身份发送消息。
    ///
    /// 先校验正文，再检查身份；校验失败不会触及存储。
    pub async fn post_message(
        &self,
        identity: Option<&str>,
        body: &str,
    ) -> Result<ChatMessage, ApplicationError> {
        let body = MessageBody::parse(body)?;
        let username = identity
            .and_then(|name| DisplayName::parse(name).ok())
            .ok_or(ApplicationError::Unauthenticated)?;

        self.send(&username, &body).await
    }

    async fn send(
        &self,
        username: &DisplayName,
        body: &MessageBody,
    ) -> Result<ChatMessage, ApplicationError> {
        let message = self
            .deps
            .store
            .append(username.clone(), body.clone(), self.deps.clock.now())
            .await?;

        let payload = serde_json::to_value(&message)
            .map_err(|err| ApplicationError::infrastructure(err.to_string()))?;
        let delivered = self
            .deps
            .hub
            .publish(CHAT_CHANNEL, MESSAGE_SENT_EVENT, payload);

        tracing::info!(
            message_id = %message.id,
            username = %message.username,
            delivered,
            "消息已保存并广播"
        );

        Ok(message)
    }

    /// 最近的消息，按 id 升序；`limit` 超过上限时按上限截断
    pub async fn recent_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, ApplicationError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.deps.store.list_recent(limit).await?)
    }
}

#[async_trait]
impl ChatBackend for ChatService {
    async fn create_message(
        &self,
        username: &DisplayName,
        body: &MessageBody,
    ) -> Result<ChatMessage, ApplicationError> {
        self.send(username, body).await
    }

    async fn list_recent_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        self.recent_messages(limit).await
    }
}

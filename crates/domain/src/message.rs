use serde::{Deserialize, Serialize};

use crate::value_objects::{DisplayName, MessageBody, MessageId, Timestamp};

/// 聊天消息。由持久化层在提交成功时创建，之后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub username: DisplayName,
    pub body: MessageBody,
    pub created_at: Timestamp,
}

impl ChatMessage {
    pub fn new(
        id: MessageId,
        username: DisplayName,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            username,
            body,
            created_at,
        }
    }
}

//! 实时总线的帧格式
//!
//! 客户端和服务端之间以 JSON 文本帧通信，`type` 字段区分帧类型。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::presence::PresenceMember;
use crate::value_objects::DisplayName;

/// 聊天室消息频道（私有频道）
pub const CHAT_CHANNEL: &str = "private-chat";
/// 在线状态频道
pub const PRESENCE_CHANNEL: &str = "presence-chat";
/// 新消息事件名
pub const MESSAGE_SENT_EVENT: &str = "message.sent";
/// 输入中的悄悄话信号名
pub const TYPING_WHISPER: &str = "typing";

const PRESENCE_PREFIX: &str = "presence-";

pub fn is_presence_channel(channel: &str) -> bool {
    channel.starts_with(PRESENCE_PREFIX)
}

/// 悄悄话 `typing` 的载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingWhisper {
    pub username: DisplayName,
}

/// 客户端发往服务端的帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    Whisper {
        channel: String,
        event: String,
        payload: Value,
    },
}

/// 服务端发往客户端的帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Subscribed {
        channel: String,
    },
    Event {
        channel: String,
        event: String,
        payload: Value,
    },
    Whisper {
        channel: String,
        event: String,
        payload: Value,
    },
    Here {
        channel: String,
        members: Vec<PresenceMember>,
    },
    Joining {
        channel: String,
        member: PresenceMember,
    },
    Leaving {
        channel: String,
        member: PresenceMember,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn channel(&self) -> Option<&str> {
        match self {
            ServerFrame::Subscribed { channel }
            | ServerFrame::Event { channel, .. }
            | ServerFrame::Whisper { channel, .. }
            | ServerFrame::Here { channel, .. }
            | ServerFrame::Joining { channel, .. }
            | ServerFrame::Leaving { channel, .. } => Some(channel),
            ServerFrame::Error { .. } => None,
        }
    }
}

/// 传输层连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Initialized,
    Connecting,
    Connected,
    Unavailable,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Initialized => "initialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Unavailable => "unavailable",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

/// 连接状态变化事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub previous: ConnectionState,
    pub current: ConnectionState,
}

impl StateChange {
    pub fn new(previous: ConnectionState, current: ConnectionState) -> Self {
        Self { previous, current }
    }
}

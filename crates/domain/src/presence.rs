use serde::{Deserialize, Serialize};

use crate::value_objects::{DisplayName, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEventType {
    Joined,
    Left,
}

/// 原始的加入/离开信号，在防抖窗口内被聚合后丢弃。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    #[serde(rename = "type")]
    pub event_type: PresenceEventType,
    pub username: DisplayName,
    pub timestamp: Timestamp,
}

impl PresenceEvent {
    pub fn joined(username: DisplayName, timestamp: Timestamp) -> Self {
        Self {
            event_type: PresenceEventType::Joined,
            username,
            timestamp,
        }
    }

    pub fn left(username: DisplayName, timestamp: Timestamp) -> Self {
        Self {
            event_type: PresenceEventType::Left,
            username,
            timestamp,
        }
    }
}

/// 一个防抖窗口的聚合结果。同一名字不会同时出现在 `joined` 和 `left` 中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedPresenceEvent {
    pub joined: Vec<DisplayName>,
    pub left: Vec<DisplayName>,
    pub timestamp: Timestamp,
}

impl AggregatedPresenceEvent {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// 在线频道成员
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceMember {
    pub name: DisplayName,
}

impl PresenceMember {
    pub fn new(name: DisplayName) -> Self {
        Self { name }
    }
}

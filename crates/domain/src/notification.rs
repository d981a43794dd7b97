use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::Timestamp;

/// 提示通知唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NotificationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// 通知来源。同一时刻最多存在一条 `Connection` 通知。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Connection,
    Presence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "success",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        };
        f.write_str(label)
    }
}

/// 可关闭的定时提示。
///
/// `duration_ms == 0` 表示常驻，直到被显式关闭或被同类通知替换。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastNotification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    pub level: NotificationLevel,
    pub timestamp: Timestamp,
    pub duration_ms: u64,
    pub auto_close: bool,
}

impl ToastNotification {
    pub fn new(
        kind: NotificationKind,
        message: impl Into<String>,
        level: NotificationLevel,
        duration_ms: u64,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: NotificationId::generate(),
            kind,
            message: message.into(),
            level,
            timestamp,
            duration_ms,
            auto_close: duration_ms > 0,
        }
    }
}

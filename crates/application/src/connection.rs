//! 连接状态监视
//!
//! 从传输层的 `StateChange` 推导出“连上”/“断开”两种信号，并把它们变成连接类提示。
//! 重复提示的去重由 `NotificationFeed` 的单条连接通知规则保证。

use domain::{ConnectionState, NotificationKind, NotificationLevel, StateChange};
use tokio::time::Instant;

use crate::notifications::NotificationFeed;

pub const ONLINE_MESSAGE: &str = "You're online!";
pub const OFFLINE_MESSAGE: &str = "Connection lost, you're offline";
pub const DEFAULT_ONLINE_TOAST_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    BecameConnected,
    BecameDisconnected,
}

/// 进入 `connected` 为连上，离开 `connected` 为断开，其余变化忽略
pub fn classify(change: StateChange) -> Option<ConnectivitySignal> {
    let was = change.previous == ConnectionState::Connected;
    let is = change.current == ConnectionState::Connected;
    match (was, is) {
        (false, true) => Some(ConnectivitySignal::BecameConnected),
        (true, false) => Some(ConnectivitySignal::BecameDisconnected),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    connected: bool,
    online_toast_ms: u64,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ONLINE_TOAST_MS)
    }
}

impl ConnectionMonitor {
    pub fn new(online_toast_ms: u64) -> Self {
        Self {
            connected: false,
            online_toast_ms,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// 记录信号并推送对应提示
    pub fn report(&mut self, signal: ConnectivitySignal, feed: &mut NotificationFeed, now: Instant) {
        match signal {
            ConnectivitySignal::BecameConnected => {
                self.connected = true;
                tracing::info!("实时连接已就绪");
                feed.push(
                    ONLINE_MESSAGE,
                    NotificationLevel::Success,
                    NotificationKind::Connection,
                    self.online_toast_ms,
                    now,
                );
            }
            ConnectivitySignal::BecameDisconnected => {
                self.connected = false;
                tracing::warn!("实时连接已断开");
                feed.push(
                    OFFLINE_MESSAGE,
                    NotificationLevel::Error,
                    NotificationKind::Connection,
                    0,
                    now,
                );
            }
        }
    }
}

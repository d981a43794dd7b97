//! 提示通知队列
//!
//! 按插入顺序保存；`duration_ms > 0` 的通知到期后自动移除。
//! 同一时刻最多一条连接类通知，新的连接通知会替换旧的。

use std::sync::Arc;
use std::time::Duration;

use domain::{NotificationId, NotificationKind, NotificationLevel, ToastNotification};
use tokio::time::Instant;

use crate::clock::Clock;

pub const DEFAULT_TOAST_DURATION_MS: u64 = 5000;

pub type FeedObserver = Box<dyn FnMut(&[ToastNotification]) + Send>;

pub struct NotificationFeed {
    entries: Vec<ToastNotification>,
    deadlines: Vec<(NotificationId, Instant)>,
    default_duration_ms: u64,
    clock: Arc<dyn Clock>,
    observer: FeedObserver,
}

impl NotificationFeed {
    pub fn new(clock: Arc<dyn Clock>, observer: FeedObserver) -> Self {
        Self::with_default_duration(DEFAULT_TOAST_DURATION_MS, clock, observer)
    }

    pub fn with_default_duration(
        default_duration_ms: u64,
        clock: Arc<dyn Clock>,
        observer: FeedObserver,
    ) -> Self {
        Self {
            entries: Vec::new(),
            deadlines: Vec::new(),
            default_duration_ms,
            clock,
            observer,
        }
    }

    pub fn entries(&self) -> &[ToastNotification] {
        &self.entries
    }

    /// 使用默认时长推送
    pub fn push_default(
        &mut self,
        message: impl Into<String>,
        level: NotificationLevel,
        kind: NotificationKind,
        now: Instant,
    ) -> NotificationId {
        let duration_ms = self.default_duration_ms;
        self.push(message, level, kind, duration_ms, now)
    }

    /// 推送一条通知；`duration_ms == 0` 表示常驻
    pub fn push(
        &mut self,
        message: impl Into<String>,
        level: NotificationLevel,
        kind: NotificationKind,
        duration_ms: u64,
        now: Instant,
    ) -> NotificationId {
        let toast = ToastNotification::new(kind, message, level, duration_ms, self.clock.now());
        let id = toast.id;

        if kind == NotificationKind::Connection {
            let stale: Vec<NotificationId> = self
                .entries
                .iter()
                .filter(|entry| entry.kind == NotificationKind::Connection)
                .map(|entry| entry.id)
                .collect();
            self.entries
                .retain(|entry| entry.kind != NotificationKind::Connection);
            self.deadlines.retain(|(id, _)| !stale.contains(id));
        }

        tracing::debug!(
            notification_id = %id,
            level = %level,
            duration_ms,
            message = %toast.message,
            "推送提示"
        );
        self.entries.push(toast);
        if duration_ms > 0 {
            self.deadlines
                .push((id, now + Duration::from_millis(duration_ms)));
        }

        self.notify();
        id
    }

    /// 立即移除；已不存在时返回 `false`
    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        self.deadlines.retain(|(entry, _)| *entry != id);
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        if self.entries.len() == before {
            return false;
        }
        tracing::debug!(notification_id = %id, "提示已关闭");
        self.notify();
        true
    }

    /// 移除所有到期的通知
    pub fn expire(&mut self, now: Instant) {
        let expired: Vec<NotificationId> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| *deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return;
        }

        self.deadlines.retain(|(id, _)| !expired.contains(id));
        let before = self.entries.len();
        self.entries.retain(|entry| !expired.contains(&entry.id));
        if self.entries.len() != before {
            self.notify();
        }
    }

    /// 最早的到期时间
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().map(|(_, deadline)| *deadline).min()
    }

    fn notify(&mut self) {
        (self.observer)(&self.entries);
    }
}

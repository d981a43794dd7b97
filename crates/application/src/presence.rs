//! 在线状态：加入/离开事件的防抖聚合，以及本地显示的在线名单

use std::time::Duration;

use domain::{
    AggregatedPresenceEvent, DisplayName, PresenceEvent, PresenceEventType, PresenceMember,
    Timestamp,
};
use tokio::time::Instant;

pub const DEFAULT_PRESENCE_DEBOUNCE: Duration = Duration::from_millis(2000);

/// 加入/离开事件聚合器
///
/// 每次 `record` 都会重新计时；只有静默满 `debounce` 之后 `poll` 才会产出结果。
#[derive(Debug)]
pub struct PresenceAggregator {
    pending: Vec<PresenceEvent>,
    debounce: Duration,
    deadline: Option<Instant>,
}

impl Default for PresenceAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PRESENCE_DEBOUNCE)
    }
}

impl PresenceAggregator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            pending: Vec::new(),
            debounce,
            deadline: None,
        }
    }

    pub fn record(&mut self, event: PresenceEvent, now: Instant) {
        tracing::debug!(
            username = %event.username,
            event_type = ?event.event_type,
            "记录在线事件"
        );
        self.pending.push(event);
        self.deadline = Some(now + self.debounce);
    }

    /// 防抖计时器的到期时间；没有待处理事件时为 `None`
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 到期则刷新
    pub fn poll(&mut self, now: Instant, timestamp: Timestamp) -> Option<AggregatedPresenceEvent> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(timestamp),
            _ => None,
        }
    }

    /// 立即聚合并清空缓冲区；完全抵消时返回 `None`
    pub fn flush(&mut self, timestamp: Timestamp) -> Option<AggregatedPresenceEvent> {
        self.deadline = None;
        let events = std::mem::take(&mut self.pending);
        let aggregated = aggregate(&events, timestamp);
        if aggregated.is_empty() {
            tracing::debug!(events = events.len(), "在线事件已全部抵消");
            return None;
        }
        tracing::debug!(
            joined = aggregated.joined.len(),
            left = aggregated.left.len(),
            "在线事件已聚合"
        );
        Some(aggregated)
    }

    /// 取消计时并丢弃缓冲
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }
}

/// 按名字抵消：加入后又离开（或离开后又加入）的名字不出现在结果中
pub fn aggregate(events: &[PresenceEvent], timestamp: Timestamp) -> AggregatedPresenceEvent {
    let mut joined: Vec<DisplayName> = Vec::new();
    let mut left: Vec<DisplayName> = Vec::new();

    for event in events {
        let (opposite, same) = match event.event_type {
            PresenceEventType::Joined => (&mut left, &mut joined),
            PresenceEventType::Left => (&mut joined, &mut left),
        };
        if let Some(index) = opposite.iter().position(|name| name == &event.username) {
            opposite.remove(index);
        } else if !same.contains(&event.username) {
            same.push(event.username.clone());
        }
    }

    AggregatedPresenceEvent {
        joined,
        left,
        timestamp,
    }
}

/// 聚合结果对应的提示文本，最多两条（加入、离开）
pub fn presence_summaries(aggregated: &AggregatedPresenceEvent) -> Vec<String> {
    let mut summaries = Vec::new();
    match aggregated.joined.as_slice() {
        [] => {}
        [only] => summaries.push(format!("{only} joined the room")),
        many => summaries.push(format!("{} users joined the room", many.len())),
    }
    match aggregated.left.as_slice() {
        [] => {}
        [only] => summaries.push(format!("{only} left the room")),
        many => summaries.push(format!("{} users left the room", many.len())),
    }
    summaries
}

/// 本地显示的在线名单，不包含本地用户自己
#[derive(Debug, Clone)]
pub struct OnlineRoster {
    local: DisplayName,
    names: Vec<DisplayName>,
}

impl OnlineRoster {
    pub fn new(local: DisplayName) -> Self {
        Self {
            local,
            names: Vec::new(),
        }
    }

    pub fn names(&self) -> &[DisplayName] {
        &self.names
    }

    pub fn is_local(&self, name: &DisplayName) -> bool {
        &self.local == name
    }

    /// 用初始成员列表替换名单
    pub fn here(&mut self, members: &[PresenceMember]) {
        self.names.clear();
        for member in members {
            if !self.is_local(&member.name) && !self.names.contains(&member.name) {
                self.names.push(member.name.clone());
            }
        }
    }

    /// 返回名单是否变化
    pub fn joining(&mut self, member: &PresenceMember) -> bool {
        if self.is_local(&member.name) || self.names.contains(&member.name) {
            return false;
        }
        self.names.push(member.name.clone());
        true
    }

    pub fn leaving(&mut self, member: &PresenceMember) -> bool {
        let before = self.names.len();
        self.names.retain(|name| name != &member.name);
        self.names.len() != before
    }
}

/// 在线名单文本
pub fn format_online_names(names: &[DisplayName]) -> Option<String> {
    match names {
        [] => None,
        [a] => Some(format!("{a} is online")),
        [a, b] => Some(format!("{a} and {b} are online")),
        [a, b, c] => Some(format!("{a}, {b}, and {c} are online")),
        [a, b, rest @ ..] => Some(format!("{a}, {b}, and {} more are online", rest.len())),
    }
}

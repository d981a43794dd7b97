//! 正在输入的用户集合
//!
//! 每个条目记录最后一次收到输入信号的时间。集合非空时按固定周期清扫，
//! 超过超时时长未刷新的条目被移除；集合清空后清扫自动停止。
//! 计时由调用方驱动：`next_sweep()` 给出下一次清扫时间，到点后调用 `sweep()`。

use std::time::Duration;

use domain::DisplayName;
use tokio::time::Instant;

pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// 名单变化回调，参数是按加入顺序排列的名字列表
pub type NamesRefresher = Box<dyn FnMut(Vec<DisplayName>) + Send>;

#[derive(Debug, Clone)]
struct TypingEntry {
    username: DisplayName,
    last_seen: Instant,
}

pub struct TypingSet {
    active: Vec<TypingEntry>,
    timeout: Duration,
    interval: Duration,
    next_sweep: Option<Instant>,
    refresher: NamesRefresher,
}

impl TypingSet {
    pub fn new(refresher: NamesRefresher) -> Self {
        Self::with_timing(DEFAULT_TYPING_TIMEOUT, DEFAULT_SWEEP_INTERVAL, refresher)
    }

    pub fn with_timing(timeout: Duration, interval: Duration, refresher: NamesRefresher) -> Self {
        Self {
            active: Vec::new(),
            timeout,
            interval,
            next_sweep: None,
            refresher,
        }
    }

    pub fn names(&self) -> Vec<DisplayName> {
        self.active.iter().map(|entry| entry.username.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, name: &DisplayName) -> bool {
        self.active.iter().any(|entry| &entry.username == name)
    }

    /// 标记 `name` 正在输入；已存在时只刷新时间
    pub fn add(&mut self, name: DisplayName, now: Instant) {
        let inserted = match self.active.iter_mut().find(|entry| entry.username == name) {
            Some(entry) => {
                entry.last_seen = now;
                false
            }
            None => {
                tracing::debug!(username = %name, "typing started");
                self.active.push(TypingEntry {
                    username: name,
                    last_seen: now,
                });
                true
            }
        };

        self.watch(now);

        if inserted {
            self.refresh();
        }
    }

    /// 立即移除 `name`，不存在时什么也不做
    pub fn remove(&mut self, name: &DisplayName) {
        let before = self.active.len();
        self.active.retain(|entry| &entry.username != name);
        if self.active.len() == before {
            return;
        }

        if self.active.is_empty() {
            self.unwatch();
        }

        self.refresh();
    }

    /// 下一次清扫的时间；未在清扫时为 `None`
    pub fn next_sweep(&self) -> Option<Instant> {
        self.next_sweep
    }

    pub fn is_watching(&self) -> bool {
        self.next_sweep.is_some()
    }

    /// 停止周期清扫，条目保留
    pub fn unwatch(&mut self) {
        self.next_sweep = None;
    }

    /// 清扫一次：移除 `now - last_seen > timeout` 的条目，只在名单变化时回调
    pub fn sweep(&mut self, now: Instant) {
        let Some(mut deadline) = self.next_sweep else {
            return;
        };

        let timeout = self.timeout;
        let before = self.active.len();
        self.active
            .retain(|entry| now.saturating_duration_since(entry.last_seen) <= timeout);
        let changed = self.active.len() != before;

        if self.active.is_empty() {
            self.unwatch();
        } else {
            // 保持固定节奏，落后时追上
            while deadline <= now {
                deadline += self.interval;
            }
            self.next_sweep = Some(deadline);
        }

        if changed {
            tracing::debug!(remaining = self.active.len(), "typing entries expired");
            self.refresh();
        }
    }

    fn watch(&mut self, now: Instant) {
        if self.next_sweep.is_none() {
            self.next_sweep = Some(now + self.interval);
        }
    }

    fn refresh(&mut self) {
        let names = self.names();
        (self.refresher)(names);
    }
}

/// 输入提示文本
pub fn typing_indicator_text(names: &[DisplayName]) -> Option<String> {
    match names {
        [] => None,
        [only] => Some(format!("{only} is typing...")),
        many => Some(format!("{} folks are typing...", many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn name(value: &str) -> DisplayName {
        DisplayName::parse(value).unwrap()
    }

    fn recording_set() -> (TypingSet, Arc<Mutex<Vec<Vec<DisplayName>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let set = TypingSet::new(Box::new(move |names| sink.lock().unwrap().push(names)));
        (set, calls)
    }

    fn last_call(calls: &Arc<Mutex<Vec<Vec<DisplayName>>>>) -> Option<Vec<DisplayName>> {
        calls.lock().unwrap().last().cloned()
    }

    #[test]
    fn add_notifies_with_plain_list() {
        let (mut set, calls) = recording_set();
        let start = Instant::now();

        set.add(name("alice"), start);
        set.add(name("bob"), start);

        assert_eq!(last_call(&calls), Some(vec![name("alice"), name("bob")]));
        assert!(set.is_watching());
    }

    #[test]
    fn repeated_add_only_refreshes() {
        let (mut set, calls) = recording_set();
        let start = Instant::now();

        set.add(name("alice"), start);
        set.add(name("alice"), start + Duration::from_millis(300));

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(set.names(), vec![name("alice")]);
    }

    #[test]
    fn remove_absent_is_noop() {
        let (mut set, calls) = recording_set();
        set.remove(&name("ghost"));
        assert!(calls.lock().unwrap().is_empty());
        assert!(!set.is_watching());
    }

    #[test]
    fn remove_last_entry_stops_sweep() {
        let (mut set, calls) = recording_set();
        set.add(name("alice"), Instant::now());
        set.remove(&name("alice"));

        assert!(!set.is_watching());
        assert_eq!(last_call(&calls), Some(vec![]));
    }

    #[test]
    fn idle_entry_expires_on_sweep() {
        let (mut set, calls) = recording_set();
        let start = Instant::now();
        set.add(name("alice"), start);

        // 第一次清扫时刚好 1000ms，未超时
        let first = set.next_sweep().unwrap();
        assert_eq!(first, start + Duration::from_millis(1000));
        set.sweep(first);
        assert_eq!(set.names(), vec![name("alice")]);
        assert_eq!(calls.lock().unwrap().len(), 1);

        let second = set.next_sweep().unwrap();
        assert_eq!(second, start + Duration::from_millis(2000));
        set.sweep(second);
        assert!(set.is_empty());
        assert_eq!(last_call(&calls), Some(vec![]));
        assert!(!set.is_watching());
    }

    #[test]
    fn refreshed_every_500ms_never_expires() {
        let (mut set, _calls) = recording_set();
        let start = Instant::now();
        set.add(name("alice"), start);

        for step in 1..=20u64 {
            let now = start + Duration::from_millis(step * 500);
            if let Some(deadline) = set.next_sweep() {
                if deadline <= now {
                    set.sweep(deadline);
                }
            }
            set.add(name("alice"), now);
        }

        assert_eq!(set.names(), vec![name("alice")]);
    }

    #[test]
    fn sweep_without_changes_does_not_notify() {
        let (mut set, calls) = recording_set();
        let start = Instant::now();
        set.add(name("alice"), start);
        set.add(name("alice"), start + Duration::from_millis(900));

        set.sweep(start + Duration::from_millis(1000));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn unwatch_stops_sweeping() {
        let (mut set, calls) = recording_set();
        let start = Instant::now();
        set.add(name("alice"), start);
        set.unwatch();

        set.sweep(start + Duration::from_secs(10));
        assert_eq!(set.names(), vec![name("alice")]);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn observed_list_matches_model_for_mixed_sequence() {
        let (mut set, calls) = recording_set();
        let start = Instant::now();
        let ops: &[(&str, bool)] = &[
            ("alice", true),
            ("bob", true),
            ("alice", false),
            ("carol", true),
            ("bob", true),
            ("dave", false),
            ("bob", false),
            ("alice", true),
        ];

        let mut model: Vec<DisplayName> = Vec::new();
        for (i, (who, add)) in ops.iter().enumerate() {
            let now = start + Duration::from_millis(i as u64 * 10);
            let who = name(who);
            if *add {
                if !model.contains(&who) {
                    model.push(who.clone());
                }
                set.add(who, now);
            } else {
                model.retain(|n| n != &who);
                set.remove(&who);
            }
            assert_eq!(set.names(), model);
        }
        assert_eq!(last_call(&calls), Some(model));
    }

    #[test]
    fn indicator_text() {
        assert_eq!(typing_indicator_text(&[]), None);
        assert_eq!(
            typing_indicator_text(&[name("bob")]).as_deref(),
            Some("bob is typing...")
        );
        assert_eq!(
            typing_indicator_text(&[name("bob"), name("carol")]).as_deref(),
            Some("2 folks are typing...")
        );
    }
}

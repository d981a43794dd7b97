//! 实时传输抽象
//!
//! 会话只依赖 `RealtimeTransport` / `ChannelHandle` / `PresenceChannelHandle`，
//! 具体实现（进程内总线、WebSocket）在构造时选定。两种实现共用 `ChannelRouter`：
//! 它记录频道订阅与回调，把入站 `ServerFrame` 分发给回调，并在重新连上后重新订阅。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::{ClientFrame, ConnectionState, PresenceMember, ServerFrame, StateChange};
use serde_json::Value;
use thiserror::Error;

pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;
pub type SubscribedHandler = Arc<dyn Fn() + Send + Sync>;
pub type MembersHandler = Arc<dyn Fn(Vec<PresenceMember>) + Send + Sync>;
pub type MemberHandler = Arc<dyn Fn(PresenceMember) + Send + Sync>;
pub type StateChangeHandler = Arc<dyn Fn(StateChange) + Send + Sync>;

/// 连接状态监听器的句柄，用于解绑
pub type ListenerId = u64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not connected")]
    Closed,
}

/// 出站帧的去向：一条已建立的连接
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: ClientFrame) -> Result<(), TransportError>;
}

/// 已订阅的频道
pub trait ChannelHandle: Send + Sync {
    fn name(&self) -> &str;
    fn listen(&self, event: &str, handler: EventHandler);
    fn listen_for_whisper(&self, event: &str, handler: EventHandler);
    /// 发送悄悄话，不等待确认，失败只记录日志
    fn whisper(&self, event: &str, payload: Value);
    fn stop_listening(&self, event: &str);
    fn stop_listening_for_whisper(&self, event: &str);
    /// 订阅确认回调；注册时已确认则立即回调一次
    fn subscribed(&self, handler: SubscribedHandler);
    fn unsubscribe(&self);
}

/// 带成员信息的在线频道
pub trait PresenceChannelHandle: ChannelHandle {
    /// 初始成员列表；注册时已收到则立即回调一次
    fn here(&self, handler: MembersHandler);
    fn joining(&self, handler: MemberHandler);
    fn leaving(&self, handler: MemberHandler);
    fn leave(&self);
}

pub trait RealtimeTransport: Send + Sync {
    fn subscribe_private(&self, channel: &str) -> Arc<dyn ChannelHandle>;
    fn subscribe_presence(&self, channel: &str) -> Arc<dyn PresenceChannelHandle>;
    fn on_state_change(&self, handler: StateChangeHandler) -> ListenerId;
    fn unbind_state_change(&self, id: ListenerId);
    fn state(&self) -> ConnectionState;
    fn disconnect(&self);
}

#[derive(Default)]
struct ChannelState {
    presence: bool,
    confirmed: bool,
    members: Option<Vec<PresenceMember>>,
    events: HashMap<String, Vec<EventHandler>>,
    whispers: HashMap<String, Vec<EventHandler>>,
    subscribed: Vec<SubscribedHandler>,
    here: Vec<MembersHandler>,
    joining: Vec<MemberHandler>,
    leaving: Vec<MemberHandler>,
}

struct RouterInner {
    channels: HashMap<String, ChannelState>,
    state: ConnectionState,
    state_handlers: BTreeMap<ListenerId, StateChangeHandler>,
    next_listener: ListenerId,
    sink: Option<Arc<dyn FrameSink>>,
}

/// 频道路由表，两种传输实现的公共部分
#[derive(Clone)]
pub struct ChannelRouter {
    inner: Arc<Mutex<RouterInner>>,
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RouterInner {
                channels: HashMap::new(),
                state: ConnectionState::Initialized,
                state_handlers: BTreeMap::new(),
                next_listener: 1,
                sink: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 连接建立：切到 `connected`，并为所有已登记的频道重新发送订阅
    pub fn attach(&self, sink: Arc<dyn FrameSink>) {
        let channels: Vec<String> = {
            let mut inner = self.lock();
            for channel in inner.channels.values_mut() {
                channel.confirmed = false;
            }
            inner.sink = Some(sink.clone());
            inner.channels.keys().cloned().collect()
        };

        self.set_state(ConnectionState::Connected);

        for channel in channels {
            tracing::debug!(channel = %channel, "重新订阅频道");
            if let Err(err) = sink.send(ClientFrame::Subscribe { channel }) {
                tracing::warn!(error = %err, "订阅帧发送失败");
            }
        }
    }

    /// 连接断开：清掉确认状态和成员列表，切到 `next`
    pub fn detach(&self, next: ConnectionState) {
        {
            let mut inner = self.lock();
            inner.sink = None;
            for channel in inner.channels.values_mut() {
                channel.confirmed = false;
                channel.members = None;
            }
        }
        self.set_state(next);
    }

    pub fn is_attached(&self) -> bool {
        self.lock().sink.is_some()
    }

    pub fn set_state(&self, next: ConnectionState) {
        let (change, handlers) = {
            let mut inner = self.lock();
            if inner.state == next {
                return;
            }
            let change = StateChange::new(inner.state, next);
            inner.state = next;
            let handlers: Vec<_> = inner.state_handlers.values().cloned().collect();
            (change, handlers)
        };

        tracing::debug!(previous = %change.previous, current = %change.current, "连接状态变化");
        for handler in handlers {
            handler(change);
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.lock().channels.keys().cloned().collect()
    }

    /// 把一条入站帧分发给对应频道的回调；回调在锁外执行
    pub fn dispatch(&self, frame: ServerFrame) {
        enum Fire {
            Value(Vec<EventHandler>, Value),
            Unit(Vec<SubscribedHandler>),
            Members(Vec<MembersHandler>, Vec<PresenceMember>),
            Member(Vec<MemberHandler>, PresenceMember),
        }

        if let ServerFrame::Error { message } = &frame {
            tracing::warn!(message = %message, "服务端返回错误帧");
            return;
        }

        let fire = {
            let mut inner = self.lock();
            let Some(name) = frame.channel() else {
                return;
            };
            let Some(channel) = inner.channels.get_mut(name) else {
                tracing::debug!(channel = %name, "丢弃未订阅频道的帧");
                return;
            };

            match frame {
                ServerFrame::Subscribed { .. } => {
                    channel.confirmed = true;
                    Fire::Unit(channel.subscribed.clone())
                }
                ServerFrame::Event { event, payload, .. } => Fire::Value(
                    channel.events.get(&event).cloned().unwrap_or_default(),
                    payload,
                ),
                ServerFrame::Whisper { event, payload, .. } => Fire::Value(
                    channel.whispers.get(&event).cloned().unwrap_or_default(),
                    payload,
                ),
                ServerFrame::Here { members, .. } => {
                    channel.members = Some(members.clone());
                    Fire::Members(channel.here.clone(), members)
                }
                ServerFrame::Joining { member, .. } => {
                    let members = channel.members.get_or_insert_with(Vec::new);
                    if !members.contains(&member) {
                        members.push(member.clone());
                    }
                    Fire::Member(channel.joining.clone(), member)
                }
                ServerFrame::Leaving { member, .. } => {
                    if let Some(members) = channel.members.as_mut() {
                        members.retain(|existing| existing != &member);
                    }
                    Fire::Member(channel.leaving.clone(), member)
                }
                ServerFrame::Error { .. } => return,
            }
        };

        match fire {
            Fire::Value(handlers, payload) => {
                for handler in handlers {
                    handler(payload.clone());
                }
            }
            Fire::Unit(handlers) => {
                for handler in handlers {
                    handler();
                }
            }
            Fire::Members(handlers, members) => {
                for handler in handlers {
                    handler(members.clone());
                }
            }
            Fire::Member(handlers, member) => {
                for handler in handlers {
                    handler(member.clone());
                }
            }
        }
    }

    fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        let sink = self.lock().sink.clone();
        match sink {
            Some(sink) => sink.send(frame),
            None => Err(TransportError::Closed),
        }
    }

    fn register(&self, name: &str, presence: bool) -> RouterChannel {
        let send_subscribe = {
            let mut inner = self.lock();
            let attached = inner.sink.is_some();
            let existed = inner.channels.contains_key(name);
            let channel = inner.channels.entry(name.to_string()).or_default();
            channel.presence |= presence;
            attached && !existed
        };

        if send_subscribe {
            if let Err(err) = self.send(ClientFrame::Subscribe {
                channel: name.to_string(),
            }) {
                tracing::warn!(channel = %name, error = %err, "订阅帧发送失败");
            }
        }

        RouterChannel {
            router: self.clone(),
            name: name.to_string(),
        }
    }

    fn with_channel<R>(&self, name: &str, f: impl FnOnce(&mut ChannelState) -> R) -> Option<R> {
        let mut inner = self.lock();
        inner.channels.get_mut(name).map(f)
    }

    fn remove_channel(&self, name: &str) {
        let removed = self.lock().channels.remove(name).is_some();
        if removed {
            // 连接已断开时服务端自然不再保留订阅
            let _ = self.send(ClientFrame::Unsubscribe {
                channel: name.to_string(),
            });
            tracing::debug!(channel = %name, "退订频道");
        }
    }
}

impl RealtimeTransport for ChannelRouter {
    fn subscribe_private(&self, channel: &str) -> Arc<dyn ChannelHandle> {
        Arc::new(self.register(channel, false))
    }

    fn subscribe_presence(&self, channel: &str) -> Arc<dyn PresenceChannelHandle> {
        Arc::new(self.register(channel, true))
    }

    fn on_state_change(&self, handler: StateChangeHandler) -> ListenerId {
        let mut inner = self.lock();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.state_handlers.insert(id, handler);
        id
    }

    fn unbind_state_change(&self, id: ListenerId) {
        self.lock().state_handlers.remove(&id);
    }

    fn state(&self) -> ConnectionState {
        self.lock().state
    }

    fn disconnect(&self) {
        self.detach(ConnectionState::Disconnected);
    }
}

/// `ChannelRouter` 上某个频道的句柄
pub struct RouterChannel {
    router: ChannelRouter,
    name: String,
}

impl ChannelHandle for RouterChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, event: &str, handler: EventHandler) {
        self.router.with_channel(&self.name, |channel| {
            channel
                .events
                .entry(event.to_string())
                .or_default()
                .push(handler);
        });
    }

    fn listen_for_whisper(&self, event: &str, handler: EventHandler) {
        self.router.with_channel(&self.name, |channel| {
            channel
                .whispers
                .entry(event.to_string())
                .or_default()
                .push(handler);
        });
    }

    fn whisper(&self, event: &str, payload: Value) {
        let frame = ClientFrame::Whisper {
            channel: self.name.clone(),
            event: event.to_string(),
            payload,
        };
        if let Err(err) = self.router.send(frame) {
            tracing::debug!(channel = %self.name, event, error = %err, "悄悄话未发送");
        }
    }

    fn stop_listening(&self, event: &str) {
        self.router.with_channel(&self.name, |channel| {
            channel.events.remove(event);
        });
    }

    fn stop_listening_for_whisper(&self, event: &str) {
        self.router.with_channel(&self.name, |channel| {
            channel.whispers.remove(event);
        });
    }

    fn subscribed(&self, handler: SubscribedHandler) {
        let replay = self
            .router
            .with_channel(&self.name, |channel| {
                channel.subscribed.push(handler.clone());
                channel.confirmed
            })
            .unwrap_or(false);
        if replay {
            handler();
        }
    }

    fn unsubscribe(&self) {
        self.router.remove_channel(&self.name);
    }
}

impl PresenceChannelHandle for RouterChannel {
    fn here(&self, handler: MembersHandler) {
        let replay = self
            .router
            .with_channel(&self.name, |channel| {
                channel.here.push(handler.clone());
                channel.members.clone()
            })
            .flatten();
        if let Some(members) = replay {
            handler(members);
        }
    }

    fn joining(&self, handler: MemberHandler) {
        self.router.with_channel(&self.name, |channel| {
            channel.joining.push(handler);
        });
    }

    fn leaving(&self, handler: MemberHandler) {
        self.router.with_channel(&self.name, |channel| {
            channel.leaving.push(handler);
        });
    }

    fn leave(&self) {
        self.unsubscribe();
    }
}

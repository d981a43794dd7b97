//! 实时聊天会话
//!
//! 一个会话对应一个本地参与者。会话状态只在一个 tokio 任务里修改：
//! 传输层回调把事件投递到事件队列，用户操作经 `SessionHandle` 投递到命令队列，
//! 输入清扫、在线防抖和提示到期三个计时器由各组件给出的截止时间驱动。
//! 观察者回调都在该任务内同步调用。

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use config::RealtimeConfig;
use domain::{
    ChatMessage, DisplayName, MessageBody, NotificationId, NotificationKind, NotificationLevel,
    PresenceEvent, PresenceMember, StateChange, ToastNotification, TypingWhisper, CHAT_CHANNEL,
    MESSAGE_SENT_EVENT, PRESENCE_CHANNEL, TYPING_WHISPER,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use crate::{
    backend::ChatBackend,
    clock::Clock,
    connection::{classify, ConnectionMonitor, ConnectivitySignal},
    error::ApplicationError,
    identity::IdentitySource,
    notifications::NotificationFeed,
    presence::{presence_summaries, OnlineRoster, PresenceAggregator},
    scroll::ScrollViewport,
    transport::{ChannelHandle, ListenerId, PresenceChannelHandle, RealtimeTransport},
    typing::TypingSet,
};

/// 会话计时与阈值参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub typing_timeout: Duration,
    pub typing_sweep_interval: Duration,
    pub presence_debounce: Duration,
    pub presence_toast_ms: u64,
    pub online_toast_ms: u64,
    pub default_toast_ms: u64,
    pub scroll_threshold_px: u32,
    pub history_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl From<&RealtimeConfig> for SessionSettings {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            typing_timeout: config.typing_timeout(),
            typing_sweep_interval: config.typing_sweep_interval(),
            presence_debounce: config.presence_debounce(),
            presence_toast_ms: config.presence_toast_ms,
            online_toast_ms: config.online_toast_ms,
            default_toast_ms: config.default_toast_ms,
            scroll_threshold_px: config.scroll_threshold_px,
            history_limit: config.history_limit,
        }
    }
}

pub struct SessionDependencies {
    pub identity: Arc<dyn IdentitySource>,
    pub backend: Arc<dyn ChatBackend>,
    pub transport: Arc<dyn RealtimeTransport>,
    pub clock: Arc<dyn Clock>,
    pub settings: SessionSettings,
}

/// 会话状态变化的接收方，所有方法都在会话任务内同步调用
pub trait SessionObserver: Send + Sync {
    fn messages_changed(&self, _messages: &[ChatMessage]) {}
    fn typing_changed(&self, _names: &[DisplayName]) {}
    fn online_changed(&self, _names: &[DisplayName]) {}
    fn notifications_changed(&self, _entries: &[ToastNotification]) {}
    fn connection_changed(&self, _connected: bool) {}
    fn scroll_to_bottom(&self) {}
}

/// 不关心任何变化的观察者
#[derive(Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribed,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub username: DisplayName,
    pub state: SessionState,
    pub connected: bool,
    pub messages: Vec<ChatMessage>,
    pub typing: Vec<DisplayName>,
    pub online: Vec<DisplayName>,
    pub notifications: Vec<ToastNotification>,
    pub draft: String,
    pub viewport: ScrollViewport,
}

type Reply<T> = oneshot::Sender<Result<T, ApplicationError>>;

enum Command {
    Typing,
    SetDraft(String),
    Submit(Reply<ChatMessage>),
    Send(MessageBody, Reply<ChatMessage>),
    Dismiss(NotificationId, oneshot::Sender<bool>),
    Viewport(ScrollViewport),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

enum SessionEvent {
    MessageSent(Value),
    Typing(Value),
    Subscribed,
    Here(Vec<PresenceMember>),
    Joining(PresenceMember),
    Leaving(PresenceMember),
    StateChanged(StateChange),
    SendFinished {
        draft: Option<String>,
        result: Result<ChatMessage, ApplicationError>,
        reply: Reply<ChatMessage>,
    },
}

/// 会话的操作入口，可以克隆；全部句柄释放后会话自动拆除
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    fn command(&self, command: Command) -> Result<(), ApplicationError> {
        self.commands
            .send(command)
            .map_err(|_| ApplicationError::SessionClosed)
    }

    /// 本地输入活动，向其他人发送 typing 悄悄话
    pub fn typing(&self) -> Result<(), ApplicationError> {
        self.command(Command::Typing)
    }

    /// 更新草稿，同时算作一次输入活动
    pub fn set_draft(&self, text: impl Into<String>) -> Result<(), ApplicationError> {
        self.command(Command::SetDraft(text.into()))
    }

    /// 发送当前草稿；成功且草稿未被改动时清空草稿
    pub async fn submit(&self) -> Result<ChatMessage, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Submit(reply))?;
        response
            .await
            .map_err(|_| ApplicationError::SessionClosed)?
    }

    /// 直接发送一条消息，不经过草稿
    pub async fn send_message(&self, body: &str) -> Result<ChatMessage, ApplicationError> {
        let body = MessageBody::parse(body)?;
        let (reply, response) = oneshot::channel();
        self.command(Command::Send(body, reply))?;
        response
            .await
            .map_err(|_| ApplicationError::SessionClosed)?
    }

    pub async fn dismiss(&self, id: NotificationId) -> Result<bool, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Dismiss(id, reply))?;
        response.await.map_err(|_| ApplicationError::SessionClosed)
    }

    /// 上报消息列表当前的滚动位置
    pub fn set_viewport(&self, viewport: ScrollViewport) -> Result<(), ApplicationError> {
        self.command(Command::Viewport(viewport))
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Snapshot(reply))?;
        response.await.map_err(|_| ApplicationError::SessionClosed)
    }

    /// 拆除会话并等待完成
    pub async fn shutdown(&self) -> Result<(), ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Shutdown(reply))?;
        response.await.map_err(|_| ApplicationError::SessionClosed)
    }
}

pub struct ChatSession {
    username: DisplayName,
    state: SessionState,
    backend: Arc<dyn ChatBackend>,
    transport: Arc<dyn RealtimeTransport>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn SessionObserver>,
    settings: SessionSettings,
    chat: Arc<dyn ChannelHandle>,
    presence: Arc<dyn PresenceChannelHandle>,
    state_listener: ListenerId,
    messages: Vec<ChatMessage>,
    draft: String,
    /// 正在提交的草稿内容，防止同一份草稿重复发送
    submitting: Option<String>,
    viewport: ScrollViewport,
    typing: TypingSet,
    aggregator: PresenceAggregator,
    roster: OnlineRoster,
    monitor: ConnectionMonitor,
    feed: NotificationFeed,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChatSession {
    /// 读取身份和历史消息，订阅聊天与在线频道，然后在后台运行会话任务。
    ///
    /// 没有显示名称时返回 `Unauthenticated`，不会订阅任何频道。
    pub async fn start(
        deps: SessionDependencies,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<SessionHandle, ApplicationError> {
        let username = deps
            .identity
            .display_name()
            .ok_or(ApplicationError::Unauthenticated)?;

        let mut history = deps
            .backend
            .list_recent_messages(deps.settings.history_limit)
            .await?;
        history.sort_by_key(|message| message.id);
        history.dedup_by_key(|message| message.id);

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let chat = deps.transport.subscribe_private(CHAT_CHANNEL);
        let presence = deps.transport.subscribe_presence(PRESENCE_CHANNEL);
        let state_listener = register_handlers(&deps.transport, &chat, &presence, &events_tx);

        let settings = deps.settings;
        let typing_observer = observer.clone();
        let typing = TypingSet::with_timing(
            settings.typing_timeout,
            settings.typing_sweep_interval,
            Box::new(move |names: Vec<DisplayName>| typing_observer.typing_changed(&names)),
        );
        let feed_observer = observer.clone();
        let feed = NotificationFeed::with_default_duration(
            settings.default_toast_ms,
            deps.clock.clone(),
            Box::new(move |entries: &[ToastNotification]| {
                feed_observer.notifications_changed(entries)
            }),
        );

        let session = ChatSession {
            roster: OnlineRoster::new(username.clone()),
            aggregator: PresenceAggregator::new(settings.presence_debounce),
            monitor: ConnectionMonitor::new(settings.online_toast_ms),
            username,
            state: SessionState::Connecting,
            backend: deps.backend,
            transport: deps.transport,
            clock: deps.clock,
            observer,
            settings,
            chat,
            presence,
            state_listener,
            messages: history,
            draft: String::new(),
            submitting: None,
            viewport: ScrollViewport::default(),
            typing,
            feed,
            commands,
            events,
            events_tx,
        };

        tracing::info!(
            username = %session.username,
            history = session.messages.len(),
            "聊天会话已启动"
        );
        session.observer.messages_changed(&session.messages);
        if !session.messages.is_empty() {
            session.observer.scroll_to_bottom();
        }

        tokio::spawn(session.run());

        Ok(SessionHandle {
            commands: commands_tx,
        })
    }

    async fn run(mut self) {
        let mut shutdown_ack = None;

        loop {
            let typing_deadline = self.typing.next_sweep();
            let presence_deadline = self.aggregator.deadline();
            let toast_deadline = self.feed.next_deadline();

            tokio::select! {
                biased;

                Some(event) = self.events.recv() => self.handle_event(event),
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        shutdown_ack = Some(ack);
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = sleep_until_opt(typing_deadline) => self.typing.sweep(Instant::now()),
                _ = sleep_until_opt(presence_deadline) => self.flush_presence(),
                _ = sleep_until_opt(toast_deadline) => self.feed.expire(Instant::now()),
            }
        }

        self.teardown();
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::MessageSent(payload) => self.on_message_sent(payload),
            SessionEvent::Typing(payload) => self.on_typing(payload),
            SessionEvent::Subscribed => self.on_subscribed(),
            SessionEvent::Here(members) => {
                self.roster.here(&members);
                self.observer.online_changed(self.roster.names());
            }
            SessionEvent::Joining(member) => self.on_presence(member, true),
            SessionEvent::Leaving(member) => self.on_presence(member, false),
            SessionEvent::StateChanged(change) => self.on_state_change(change),
            SessionEvent::SendFinished {
                draft,
                result,
                reply,
            } => self.on_send_finished(draft, result, reply),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Typing => self.whisper_typing(),
            Command::SetDraft(text) => {
                self.draft = text;
                self.whisper_typing();
            }
            Command::Submit(reply) => self.submit_draft(reply),
            Command::Send(body, reply) => self.spawn_send(body, None, reply),
            Command::Dismiss(id, reply) => {
                let _ = reply.send(self.feed.dismiss(id));
            }
            Command::Viewport(viewport) => self.viewport = viewport,
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            // run() 中处理
            Command::Shutdown(_) => {}
        }
    }

    fn submit_draft(&mut self, reply: Reply<ChatMessage>) {
        if self.submitting.as_deref() == Some(self.draft.as_str()) {
            let _ = reply.send(Err(ApplicationError::SubmitPending));
            return;
        }
        match MessageBody::parse(self.draft.as_str()) {
            Ok(body) => {
                self.submitting = Some(self.draft.clone());
                self.spawn_send(body, Some(self.draft.clone()), reply);
            }
            Err(err) => {
                let _ = reply.send(Err(err.into()));
            }
        }
    }

    fn on_message_sent(&mut self, payload: Value) {
        let message: ChatMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "忽略格式错误的消息事件");
                return;
            }
        };

        // 收到消息视为对方已停止输入；两条流之间没有顺序保证
        self.typing.remove(&message.username);
        self.merge_message(message);
    }

    fn on_typing(&mut self, payload: Value) {
        let whisper: TypingWhisper = match serde_json::from_value(payload) {
            Ok(whisper) => whisper,
            Err(err) => {
                tracing::warn!(error = %err, "忽略格式错误的 typing 信号");
                return;
            }
        };
        if whisper.username == self.username {
            return;
        }
        self.typing.add(whisper.username, Instant::now());
    }

    fn on_subscribed(&mut self) {
        if self.state == SessionState::Subscribed {
            return;
        }
        self.state = SessionState::Subscribed;
        tracing::info!(username = %self.username, "频道订阅已确认");
        self.monitor
            .report(ConnectivitySignal::BecameConnected, &mut self.feed, Instant::now());
        self.observer.connection_changed(true);
    }

    fn on_presence(&mut self, member: PresenceMember, joined: bool) {
        if self.roster.is_local(&member.name) {
            return;
        }

        let changed = if joined {
            self.roster.joining(&member)
        } else {
            self.roster.leaving(&member)
        };
        if changed {
            self.observer.online_changed(self.roster.names());
        }

        let timestamp = self.clock.now();
        let event = if joined {
            PresenceEvent::joined(member.name, timestamp)
        } else {
            PresenceEvent::left(member.name, timestamp)
        };
        self.aggregator.record(event, Instant::now());
    }

    fn on_state_change(&mut self, change: StateChange) {
        match classify(change) {
            Some(ConnectivitySignal::BecameDisconnected) => {
                self.state = SessionState::Disconnected;
                self.monitor.report(
                    ConnectivitySignal::BecameDisconnected,
                    &mut self.feed,
                    Instant::now(),
                );
                self.observer.connection_changed(false);
            }
            // 等订阅确认后才算连上
            Some(ConnectivitySignal::BecameConnected) => {
                if self.state == SessionState::Disconnected {
                    self.state = SessionState::Connecting;
                }
            }
            None => {}
        }
    }

    fn on_send_finished(
        &mut self,
        draft: Option<String>,
        result: Result<ChatMessage, ApplicationError>,
        reply: Reply<ChatMessage>,
    ) {
        if draft.is_some() && self.submitting == draft {
            self.submitting = None;
        }
        match result {
            Ok(message) => {
                if draft.is_some_and(|submitted| submitted == self.draft) {
                    self.draft.clear();
                }
                self.merge_message(message.clone());
                let _ = reply.send(Ok(message));
            }
            Err(err) => {
                tracing::warn!(username = %self.username, error = %err, "消息发送失败");
                let _ = reply.send(Err(err));
            }
        }
    }

    /// 按 id 幂等合并；合并前位于底部时才滚动到底部
    fn merge_message(&mut self, message: ChatMessage) {
        if self.messages.iter().any(|existing| existing.id == message.id) {
            tracing::debug!(message_id = %message.id, "重复消息已忽略");
            return;
        }

        let was_at_bottom = self.viewport.is_at_bottom(self.settings.scroll_threshold_px);
        let index = self
            .messages
            .iter()
            .position(|existing| existing.id > message.id)
            .unwrap_or(self.messages.len());
        self.messages.insert(index, message);
        self.observer.messages_changed(&self.messages);

        // 视口由渲染端滚动后重新上报
        if was_at_bottom {
            self.observer.scroll_to_bottom();
        }
    }

    fn flush_presence(&mut self) {
        let Some(aggregated) = self.aggregator.poll(Instant::now(), self.clock.now()) else {
            return;
        };
        let now = Instant::now();
        for summary in presence_summaries(&aggregated) {
            self.feed.push(
                summary,
                NotificationLevel::Info,
                NotificationKind::Presence,
                self.settings.presence_toast_ms,
                now,
            );
        }
    }

    fn whisper_typing(&self) {
        let payload = TypingWhisper {
            username: self.username.clone(),
        };
        match serde_json::to_value(payload) {
            Ok(payload) => self.chat.whisper(TYPING_WHISPER, payload),
            Err(err) => tracing::warn!(error = %err, "typing 信号序列化失败"),
        }
    }

    fn spawn_send(&self, body: MessageBody, draft: Option<String>, reply: Reply<ChatMessage>) {
        let backend = self.backend.clone();
        let username = self.username.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = backend.create_message(&username, &body).await;
            let _ = events.send(SessionEvent::SendFinished {
                draft,
                result,
                reply,
            });
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            username: self.username.clone(),
            state: self.state,
            connected: self.monitor.is_connected(),
            messages: self.messages.clone(),
            typing: self.typing.names(),
            online: self.roster.names().to_vec(),
            notifications: self.feed.entries().to_vec(),
            draft: self.draft.clone(),
            viewport: self.viewport,
        }
    }

    fn teardown(&mut self) {
        self.chat.stop_listening(MESSAGE_SENT_EVENT);
        self.chat.stop_listening_for_whisper(TYPING_WHISPER);
        self.chat.unsubscribe();
        self.presence.leave();
        self.transport.unbind_state_change(self.state_listener);
        self.typing.unwatch();
        self.aggregator.cancel();
        tracing::info!(username = %self.username, "聊天会话已拆除");
    }
}

fn register_handlers(
    transport: &Arc<dyn RealtimeTransport>,
    chat: &Arc<dyn ChannelHandle>,
    presence: &Arc<dyn PresenceChannelHandle>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> ListenerId {
    let tx = events.clone();
    chat.listen(
        MESSAGE_SENT_EVENT,
        Arc::new(move |payload: Value| {
            let _ = tx.send(SessionEvent::MessageSent(payload));
        }),
    );

    let tx = events.clone();
    chat.listen_for_whisper(
        TYPING_WHISPER,
        Arc::new(move |payload: Value| {
            let _ = tx.send(SessionEvent::Typing(payload));
        }),
    );

    let tx = events.clone();
    chat.subscribed(Arc::new(move || {
        let _ = tx.send(SessionEvent::Subscribed);
    }));

    let tx = events.clone();
    presence.here(Arc::new(move |members: Vec<PresenceMember>| {
        let _ = tx.send(SessionEvent::Here(members));
    }));

    let tx = events.clone();
    presence.joining(Arc::new(move |member: PresenceMember| {
        let _ = tx.send(SessionEvent::Joining(member));
    }));

    let tx = events.clone();
    presence.leaving(Arc::new(move |member: PresenceMember| {
        let _ = tx.send(SessionEvent::Leaving(member));
    }));

    let tx = events.clone();
    transport.on_state_change(Arc::new(move |change: StateChange| {
        let _ = tx.send(SessionEvent::StateChanged(change));
    }))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

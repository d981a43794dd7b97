//! 应用层实现。
//!
//! 这里是实时协调的核心：输入状态、在线事件聚合、连接监视、提示队列和聊天会话，
//! 以及它们依赖的外部协作方抽象（消息存储、持久化后端、实时传输、身份来源、时钟）。
//! 服务端使用的进程内总线 `ChannelHub` 和 `ChatService` 也在这里。

pub mod backend;
pub mod clock;
pub mod connection;
pub mod error;
pub mod hub;
pub mod identity;
pub mod notifications;
pub mod presence;
pub mod repository;
pub mod scroll;
pub mod services;
pub mod session;
pub mod transport;
pub mod typing;

pub use backend::ChatBackend;
pub use clock::{Clock, FixedClock, SystemClock};
pub use connection::{ConnectionMonitor, ConnectivitySignal};
pub use error::ApplicationError;
pub use hub::{ChannelHub, ConnectionId};
pub use identity::{IdentitySource, StaticIdentity};
pub use notifications::NotificationFeed;
pub use presence::{format_online_names, OnlineRoster, PresenceAggregator};
pub use repository::MessageStore;
pub use scroll::ScrollViewport;
pub use services::{ChatService, ChatServiceDependencies, MAX_HISTORY_LIMIT};
pub use session::{
    ChatSession, NoopObserver, SessionDependencies, SessionHandle, SessionObserver,
    SessionSettings, SessionSnapshot, SessionState,
};
pub use transport::{
    ChannelHandle, ChannelRouter, FrameSink, PresenceChannelHandle, RealtimeTransport,
    TransportError,
};
pub use typing::{typing_indicator_text, TypingSet};

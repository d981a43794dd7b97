//! 基础设施层实现。
//!
//! 提供消息存储（PostgreSQL / 内存）、远程聊天服务的 HTTP 客户端，
//! 以及 WebSocket 和进程内两种实时传输，实现应用层定义的接口。

pub mod builder;
pub mod http_backend;
pub mod local_transport;
pub mod memory_store;
pub mod migrations;
pub mod pg_store;
pub mod ws_transport;

pub use builder::{build_message_store, ClientInfrastructure, InfrastructureError};
pub use http_backend::{HttpChatBackend, SessionGrant};
pub use local_transport::LocalTransport;
pub use memory_store::MemoryMessageStore;
pub use migrations::MIGRATOR;
pub use pg_store::{create_pg_pool, PgMessageStore};
pub use ws_transport::WsTransport;

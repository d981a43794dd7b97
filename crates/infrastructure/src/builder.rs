use std::sync::Arc;

use application::{
    ChannelHub, ChatBackend, ChatService, ChatServiceDependencies, IdentitySource, MessageStore,
    RealtimeTransport, StaticIdentity, SystemClock,
};
use config::{AppConfig, DatabaseConfig, TransportKind};
use domain::{DisplayName, DomainError, PresenceMember};
use thiserror::Error;

use crate::{
    http_backend::HttpChatBackend,
    local_transport::LocalTransport,
    memory_store::MemoryMessageStore,
    migrations::MIGRATOR,
    pg_store::{create_pg_pool, PgMessageStore},
    ws_transport::WsTransport,
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("chat service error: {0}")]
    Service(#[from] application::ApplicationError),
    #[error("invalid display name: {0}")]
    InvalidName(#[from] DomainError),
}

/// 根据配置选择消息存储：配置了数据库地址时连接 PostgreSQL 并执行迁移，否则使用内存存储
pub async fn build_message_store(
    config: &DatabaseConfig,
) -> Result<Arc<dyn MessageStore>, InfrastructureError> {
    match &config.url {
        Some(url) => {
            let pool = create_pg_pool(url, config.max_connections).await?;
            MIGRATOR.run(&pool).await?;
            tracing::info!("使用 PostgreSQL 消息存储");
            Ok(Arc::new(PgMessageStore::new(pool)))
        }
        None => {
            tracing::info!("未配置数据库，使用内存消息存储");
            Ok(Arc::new(MemoryMessageStore::new()))
        }
    }
}

/// 聊天会话所需的外部协作方
#[derive(Clone)]
pub struct ClientInfrastructure {
    pub identity: Arc<dyn IdentitySource>,
    pub backend: Arc<dyn ChatBackend>,
    pub transport: Arc<dyn RealtimeTransport>,
}

impl ClientInfrastructure {
    /// 按 `client.transport` 选择连接方式：`websocket` 连接远程服务，
    /// `local` 在本进程内启动服务和总线
    pub async fn connect(config: &AppConfig, username: &str) -> Result<Self, InfrastructureError> {
        match config.client.transport {
            TransportKind::Websocket => Self::remote(config, username).await,
            TransportKind::Local => {
                let service = Arc::new(ChatService::new(ChatServiceDependencies {
                    store: build_message_store(&config.database).await?,
                    hub: Arc::new(ChannelHub::new(config.realtime.bus_capacity)),
                    clock: Arc::new(SystemClock),
                }));
                tracing::info!("使用进程内聊天服务");
                Self::local(service, username)
            }
        }
    }

    /// 通过 REST 登记名称，再用签发的令牌建立 WebSocket 连接
    pub async fn remote(config: &AppConfig, username: &str) -> Result<Self, InfrastructureError> {
        let grant = HttpChatBackend::create_session(&config.client.server_url, username).await?;
        let backend = HttpChatBackend::new(&config.client.server_url, &grant.token);
        let transport = WsTransport::connect(
            &config.client.websocket_url(),
            &grant.token,
            config.realtime.reconnect_delay(),
        );

        Ok(Self {
            identity: Arc::new(StaticIdentity::new(grant.username)),
            backend: Arc::new(backend),
            transport,
        })
    }

    /// 直接挂到进程内的服务和总线上
    pub fn local(service: Arc<ChatService>, username: &str) -> Result<Self, InfrastructureError> {
        let name = DisplayName::parse(username)?;
        let transport = LocalTransport::connect(
            service.hub().clone(),
            PresenceMember::new(name.clone()),
        );

        Ok(Self {
            identity: Arc::new(StaticIdentity::new(name)),
            backend: service,
            transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_without_database_url() {
        let store = build_message_store(&DatabaseConfig::default())
            .await
            .unwrap();
        assert!(store.list_recent(10).await.unwrap().is_empty());
    }

    fn service(hub: Arc<ChannelHub>) -> Arc<ChatService> {
        Arc::new(ChatService::new(ChatServiceDependencies {
            store: Arc::new(MemoryMessageStore::new()),
            hub,
            clock: Arc::new(SystemClock),
        }))
    }

    #[tokio::test]
    async fn local_infrastructure_registers_on_hub() {
        let hub = Arc::new(ChannelHub::default());

        let infra = ClientInfrastructure::local(service(hub.clone()), "alice").unwrap();
        assert_eq!(
            infra.identity.display_name().map(|n| n.to_string()),
            Some("alice".to_string())
        );
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn local_infrastructure_rejects_blank_name() {
        let hub = Arc::new(ChannelHub::default());
        let result = ClientInfrastructure::local(service(hub.clone()), "   ");
        assert!(matches!(result, Err(InfrastructureError::InvalidName(_))));
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn local_transport_kind_runs_in_process() {
        let mut config = AppConfig::default();
        config.client.transport = TransportKind::Local;

        let infra = ClientInfrastructure::connect(&config, "alice").await.unwrap();
        let alice = DisplayName::parse("alice").unwrap();
        assert_eq!(infra.identity.display_name(), Some(alice.clone()));

        let body = domain::MessageBody::parse("hello").unwrap();
        let sent = infra.backend.create_message(&alice, &body).await.unwrap();
        let recent = infra.backend.list_recent_messages(10).await.unwrap();
        assert_eq!(recent, vec![sent]);
    }

    #[tokio::test]
    async fn local_transport_kind_rejects_blank_name() {
        let mut config = AppConfig::default();
        config.client.transport = TransportKind::Local;
        let result = ClientInfrastructure::connect(&config, "  ").await;
        assert!(matches!(result, Err(InfrastructureError::InvalidName(_))));
    }
}

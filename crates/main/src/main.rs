//! 主应用程序入口
//!
//! 启动 Axum Web API 服务和实时总线。

use std::sync::Arc;

use application::{ChannelHub, ChatService, ChatServiceDependencies, SystemClock};
use config::AppConfig;
use infrastructure::build_message_store;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;

    let store = build_message_store(&config.database).await?;
    let hub = Arc::new(ChannelHub::new(config.realtime.bus_capacity));

    let chat_service = ChatService::new(ChatServiceDependencies {
        store,
        hub,
        clock: Arc::new(SystemClock),
    });
    let jwt_service = Arc::new(JwtService::new(config.auth.clone()));

    let state = AppState::new(Arc::new(chat_service), jwt_service);

    // 启动 Web 服务器
    let app = router(state);
    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("聊天室服务器启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("收到退出信号，正在关闭");
        })
        .await?;

    Ok(())
}

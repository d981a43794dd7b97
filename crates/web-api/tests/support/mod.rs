#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{ChannelHub, ChatService, ChatServiceDependencies, SystemClock};
use infrastructure::MemoryMessageStore;
use tokio::{net::TcpListener, sync::oneshot, time::sleep};
use web_api::{router, AppState, JwtConfig, JwtService};

pub const TEST_SECRET: &str = "test-secret-key-with-at-least-32-characters";

pub fn app_state() -> AppState {
    let hub = Arc::new(ChannelHub::default());
    let chat_service = ChatService::new(ChatServiceDependencies {
        store: Arc::new(MemoryMessageStore::new()),
        hub,
        clock: Arc::new(SystemClock),
    });

    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: TEST_SECRET.to_string(),
        expiration_hours: 24,
    }));

    AppState::new(Arc::new(chat_service), jwt_service)
}

/// 在随机端口上运行的测试服务器，drop 时关闭
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/v1/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub async fn spawn_server() -> TestServer {
    let state = app_state();
    let app = router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    // allow server to start
    sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        state,
        shutdown: Some(shutdown_tx),
    }
}

/// 登记名称并返回令牌
pub async fn session_token(server: &TestServer, username: &str) -> String {
    let response: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/api/v1/session", server.base_url()))
        .json(&serde_json::json!({ "username": username }))
        .send()
        .await
        .expect("create session")
        .json()
        .await
        .expect("session json");

    response["token"]
        .as_str()
        .expect("token in response")
        .to_string()
}

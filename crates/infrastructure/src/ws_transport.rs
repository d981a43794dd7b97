//! WebSocket 传输实现
//!
//! 后台任务负责建连、收发帧和断线重连；重连成功后 `ChannelRouter` 会重新订阅所有频道。
//! 状态依次为 `connecting` → `connected`，断线后为 `unavailable`，主动断开后为 `disconnected`。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use application::{
    transport::{ListenerId, StateChangeHandler},
    ChannelHandle, ChannelRouter, FrameSink, PresenceChannelHandle, RealtimeTransport,
    TransportError,
};
use domain::{ClientFrame, ConnectionState, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

struct WsSink {
    outbound: mpsc::UnboundedSender<ClientFrame>,
}

impl FrameSink for WsSink {
    fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }
}

enum Ended {
    Shutdown,
    Lost,
}

pub struct WsTransport {
    router: ChannelRouter,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WsTransport {
    /// 启动后台连接任务；`url` 不含查询串，`token` 通过 `?token=` 传递
    pub fn connect(url: &str, token: &str, reconnect_delay: Duration) -> Arc<Self> {
        let router = ChannelRouter::new();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let endpoint = format!("{url}?token={token}");
        let task = tokio::spawn(run(router.clone(), endpoint, reconnect_delay, shutdown_rx));

        Arc::new(Self {
            router,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }
}

async fn run(
    router: ChannelRouter,
    endpoint: String,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        router.set_state(ConnectionState::Connecting);

        match connect_async(endpoint.as_str()).await {
            Ok((stream, _)) => {
                tracing::info!("WebSocket 已连接");
                let (mut write, mut read) = stream.split();
                let (outbound, mut frames) = mpsc::unbounded_channel::<ClientFrame>();
                router.attach(Arc::new(WsSink { outbound }));

                let ended = loop {
                    tokio::select! {
                        Some(frame) = frames.recv() => {
                            let text = match serde_json::to_string(&frame) {
                                Ok(text) => text,
                                Err(err) => {
                                    tracing::warn!(error = %err, "客户端帧序列化失败");
                                    continue;
                                }
                            };
                            if let Err(err) = write.send(WsMessage::Text(text.into())).await {
                                tracing::warn!(error = %err, "WebSocket 发送失败");
                                break Ended::Lost;
                            }
                        }
                        incoming = read.next() => match incoming {
                            Some(Ok(WsMessage::Text(text))) => {
                                match serde_json::from_str::<ServerFrame>(text.as_str()) {
                                    Ok(frame) => router.dispatch(frame),
                                    Err(err) => tracing::warn!(error = %err, "忽略无法解析的服务端帧"),
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break Ended::Lost,
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                tracing::warn!(error = %err, "WebSocket 接收失败");
                                break Ended::Lost;
                            }
                        },
                        _ = shutdown.changed() => break Ended::Shutdown,
                    }
                };

                match ended {
                    Ended::Shutdown => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        router.detach(ConnectionState::Disconnected);
                        return;
                    }
                    Ended::Lost => router.detach(ConnectionState::Unavailable),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "WebSocket 连接失败");
                router.set_state(ConnectionState::Unavailable);
            }
        }

        tracing::info!(delay_ms = reconnect_delay.as_millis() as u64, "准备重连");
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown.changed() => {
                router.detach(ConnectionState::Disconnected);
                return;
            }
        }
    }
}

impl RealtimeTransport for WsTransport {
    fn subscribe_private(&self, channel: &str) -> Arc<dyn ChannelHandle> {
        self.router.subscribe_private(channel)
    }

    fn subscribe_presence(&self, channel: &str) -> Arc<dyn PresenceChannelHandle> {
        self.router.subscribe_presence(channel)
    }

    fn on_state_change(&self, handler: StateChangeHandler) -> ListenerId {
        self.router.on_state_change(handler)
    }

    fn unbind_state_change(&self, id: ListenerId) {
        self.router.unbind_state_change(id)
    }

    fn state(&self) -> ConnectionState {
        self.router.state()
    }

    /// 通知后台任务关闭连接，状态随后变为 `disconnected`
    fn disconnect(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        tracing::debug!("WebSocket 传输已请求断开");
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if self.router.is_attached() {
            return;
        }
        // 未连上时任务可能阻塞在建连上，直接终止
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

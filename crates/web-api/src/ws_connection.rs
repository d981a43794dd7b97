use std::sync::Arc;

use application::{ChannelHub, ConnectionId};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientFrame, DisplayName, PresenceMember, ServerFrame};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

/// WebSocket 连接
///
/// 把一个 WebSocket 挂到实时总线上：客户端帧交给 `ChannelHub` 处理，
/// 总线推送的帧写回客户端；连接断开时从总线注销（在线频道会收到离开通知）。
pub struct WebSocketConnection {
    socket: WebSocket,
    hub: Arc<ChannelHub>,
    name: DisplayName,
    connection_id: ConnectionId,
    frames: mpsc::Receiver<ServerFrame>,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, hub: Arc<ChannelHub>, name: DisplayName) -> Self {
        let (connection_id, frames) = hub.connect(PresenceMember::new(name.clone()));
        tracing::info!(username = %name, connection_id, "WebSocket 连接已建立");

        Self {
            socket,
            hub,
            name,
            connection_id,
            frames,
        }
    }

    /// 运行连接主循环，直到任意一侧结束
    pub async fn run(self) {
        let Self {
            socket,
            hub,
            name,
            connection_id,
            frames,
        } = self;

        let (sender, incoming) = socket.split();
        pump(sender, incoming, &hub, connection_id, frames).await;

        hub.disconnect(connection_id);
        tracing::info!(username = %name, connection_id, "WebSocket连接已断开");
    }
}

/// 在读写两个任务之间转发，任意一侧结束时中止另一侧
async fn pump<S, R, E>(
    mut sender: S,
    mut incoming: R,
    hub: &Arc<ChannelHub>,
    connection_id: ConnectionId,
    mut frames: mpsc::Receiver<ServerFrame>,
) where
    S: Sink<WsMessage> + Unpin + Send + 'static,
    R: Stream<Item = Result<WsMessage, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    // 创建 mpsc channel 来解耦对 sender 的访问
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

    // 发送任务：统一处理所有对 WebSocket sender 的写操作
    let mut send_task = tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                Some(cmd) = cmd_rx.recv() => cmd,
                frame = frames.recv() => match frame {
                    Some(frame) => WsCommand::SendFrame(frame),
                    None => break,
                },
            };

            let message = match outgoing {
                WsCommand::SendFrame(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => WsMessage::Text(json.into()),
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize websocket payload");
                        continue;
                    }
                },
                WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
            };

            if sender.send(message).await.is_err() {
                tracing::warn!("Failed to send websocket message");
                break;
            }
        }
        tracing::info!("WebSocket发送任务结束");
    });

    // 接收任务：处理来自WebSocket客户端的消息
    let mut recv_task = {
        let hub = hub.clone();
        tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if handle_incoming(message, &hub, connection_id, &cmd_tx)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            tracing::info!("WebSocket接收任务结束");
        })
    };

    // 等待任意一个任务完成（连接断开），另一个随之中止
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!("WebSocket发送任务完成");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!("WebSocket接收任务完成");
            send_task.abort();
        }
    }
}

/// 处理来自客户端的消息
async fn handle_incoming(
    message: WsMessage,
    hub: &ChannelHub,
    connection_id: ConnectionId,
    cmd_tx: &mpsc::Sender<WsCommand>,
) -> Result<(), ()> {
    match message {
        WsMessage::Close(_) => {
            tracing::info!("WebSocket收到关闭消息");
            return Err(());
        }
        WsMessage::Ping(data) => {
            if cmd_tx
                .send(WsCommand::SendPong(data.to_vec()))
                .await
                .is_err()
            {
                tracing::warn!("Failed to send pong command");
                return Err(());
            }
        }
        WsMessage::Pong(_) => {}
        WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
            Ok(frame) => hub.handle(connection_id, frame),
            Err(err) => {
                tracing::debug!(error = %err, "无法解析的客户端帧");
                let reply = ServerFrame::Error {
                    message: format!("malformed frame: {err}"),
                };
                if cmd_tx.send(WsCommand::SendFrame(reply)).await.is_err() {
                    return Err(());
                }
            }
        },
        WsMessage::Binary(_) => {
            tracing::debug!("忽略二进制消息");
        }
    }
    Ok(())
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendFrame(ServerFrame),
    SendPong(Vec<u8>),
}

//! 直接挂在进程内 `ChannelHub` 上的传输实现
//!
//! `interrupt()` / `resume()` 模拟断线与重连，供测试和内嵌演示使用。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use application::{
    transport::{ListenerId, StateChangeHandler},
    ChannelHandle, ChannelHub, ChannelRouter, ConnectionId, FrameSink, PresenceChannelHandle,
    RealtimeTransport, TransportError,
};
use domain::{ClientFrame, ConnectionState, PresenceMember};
use tokio::task::JoinHandle;

struct HubSink {
    hub: Arc<ChannelHub>,
    connection: ConnectionId,
}

impl FrameSink for HubSink {
    fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.hub.handle(self.connection, frame);
        Ok(())
    }
}

struct LocalConnection {
    id: ConnectionId,
    pump: JoinHandle<()>,
}

pub struct LocalTransport {
    router: ChannelRouter,
    hub: Arc<ChannelHub>,
    member: PresenceMember,
    connection: Mutex<Option<LocalConnection>>,
}

impl LocalTransport {
    /// 建立连接；需要在 tokio 运行时内调用
    pub fn connect(hub: Arc<ChannelHub>, member: PresenceMember) -> Arc<Self> {
        let transport = Arc::new(Self {
            router: ChannelRouter::new(),
            hub,
            member,
            connection: Mutex::new(None),
        });
        transport.resume();
        transport
    }

    fn lock(&self) -> MutexGuard<'_, Option<LocalConnection>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 重新连上总线并重新订阅所有频道；已连接时什么也不做
    pub fn resume(&self) {
        let mut connection = self.lock();
        if connection.is_some() {
            return;
        }

        self.router.set_state(ConnectionState::Connecting);
        let (id, mut frames) = self.hub.connect(self.member.clone());
        let router = self.router.clone();
        let pump = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                router.dispatch(frame);
            }
        });
        *connection = Some(LocalConnection { id, pump });
        drop(connection);

        tracing::debug!(connection_id = id, username = %self.member.name, "本地传输已连接");
        self.router.attach(Arc::new(HubSink {
            hub: self.hub.clone(),
            connection: id,
        }));
    }

    /// 模拟网络中断：服务端看到连接关闭，本地切到 `unavailable`
    pub fn interrupt(&self) {
        self.close(ConnectionState::Unavailable);
    }

    fn close(&self, next: ConnectionState) {
        let Some(connection) = self.lock().take() else {
            self.router.detach(next);
            return;
        };
        connection.pump.abort();
        self.hub.disconnect(connection.id);
        tracing::debug!(connection_id = connection.id, state = %next, "本地传输已断开");
        self.router.detach(next);
    }
}

impl RealtimeTransport for LocalTransport {
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

    fn disconnect(&self) {
        self.close(ConnectionState::Disconnected);
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.lock().take() {
            connection.pump.abort();
            self.hub.disconnect(connection.id);
        }
    }
}

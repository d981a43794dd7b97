//! 进程内实时总线
//!
//! 每个连接拥有一个有界的出站队列。服务端事件发给频道内所有连接，
//! 悄悄话只转发给发送者以外的连接。在线频道按显示名称计数：
//! 同名的第一个连接加入时广播 `joining`，最后一个离开时广播 `leaving`。

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use domain::{is_presence_channel, ClientFrame, PresenceMember, ServerFrame};
use serde_json::Value;
use tokio::sync::mpsc;

pub type ConnectionId = u64;

pub const DEFAULT_CONNECTION_CAPACITY: usize = 256;

struct Connection {
    member: PresenceMember,
    sender: mpsc::Sender<ServerFrame>,
    channels: HashSet<String>,
}

#[derive(Default)]
struct HubInner {
    next_id: ConnectionId,
    connections: HashMap<ConnectionId, Connection>,
    channels: HashMap<String, BTreeSet<ConnectionId>>,
}

impl HubInner {
    fn member_names_in(&self, channel: &str) -> Vec<PresenceMember> {
        let mut members: Vec<PresenceMember> = Vec::new();
        if let Some(ids) = self.channels.get(channel) {
            for id in ids {
                if let Some(conn) = self.connections.get(id) {
                    if !members.contains(&conn.member) {
                        members.push(conn.member.clone());
                    }
                }
            }
        }
        members
    }

    fn has_other_connection_named(
        &self,
        channel: &str,
        member: &PresenceMember,
        except: ConnectionId,
    ) -> bool {
        self.channels.get(channel).is_some_and(|ids| {
            ids.iter().any(|id| {
                *id != except
                    && self
                        .connections
                        .get(id)
                        .is_some_and(|conn| &conn.member == member)
            })
        })
    }

    fn send_to(&self, id: ConnectionId, frame: ServerFrame) {
        if let Some(conn) = self.connections.get(&id) {
            deliver(id, &conn.sender, frame);
        }
    }

    fn send_to_channel(&self, channel: &str, except: Option<ConnectionId>, frame: &ServerFrame) -> usize {
        let Some(ids) = self.channels.get(channel) else {
            return 0;
        };
        let mut delivered = 0;
        for id in ids {
            if Some(*id) == except {
                continue;
            }
            if let Some(conn) = self.connections.get(id) {
                if deliver(*id, &conn.sender, frame.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// 把连接移出频道，必要时广播 `leaving`
    fn leave_channel(&mut self, id: ConnectionId, channel: &str) {
        let Some(member) = self.connections.get(&id).map(|conn| conn.member.clone()) else {
            return;
        };

        let removed = match self.channels.get_mut(channel) {
            Some(ids) => ids.remove(&id),
            None => false,
        };
        if !removed {
            return;
        }
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.channels.remove(channel);
        }

        if is_presence_channel(channel) && !self.has_other_connection_named(channel, &member, id) {
            tracing::debug!(channel = %channel, username = %member.name, "成员离开在线频道");
            let frame = ServerFrame::Leaving {
                channel: channel.to_string(),
                member,
            };
            self.send_to_channel(channel, None, &frame);
        }

        if self.channels.get(channel).is_some_and(BTreeSet::is_empty) {
            self.channels.remove(channel);
        }
    }
}

fn deliver(id: ConnectionId, sender: &mpsc::Sender<ServerFrame>, frame: ServerFrame) -> bool {
    match sender.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(connection_id = id, "连接出站队列已满，丢弃帧");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// 频道总线
pub struct ChannelHub {
    inner: Mutex<HubInner>,
    capacity: usize,
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_CAPACITY)
    }
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 注册一个连接，返回其 id 和出站帧接收端
    pub fn connect(&self, member: PresenceMember) -> (ConnectionId, mpsc::Receiver<ServerFrame>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        tracing::debug!(connection_id = id, username = %member.name, "总线连接建立");
        inner.connections.insert(
            id,
            Connection {
                member,
                sender,
                channels: HashSet::new(),
            },
        );
        (id, receiver)
    }

    /// 处理一条客户端帧
    pub fn handle(&self, id: ConnectionId, frame: ClientFrame) {
        match frame {
            ClientFrame::Subscribe { channel } => self.subscribe(id, &channel),
            ClientFrame::Unsubscribe { channel } => self.unsubscribe(id, &channel),
            ClientFrame::Whisper {
                channel,
                event,
                payload,
            } => self.whisper(id, &channel, &event, payload),
        }
    }

    pub fn subscribe(&self, id: ConnectionId, channel: &str) {
        let mut inner = self.lock();
        let Some(member) = inner.connections.get(&id).map(|conn| conn.member.clone()) else {
            return;
        };

        let newly_joined = inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(id);
        if let Some(conn) = inner.connections.get_mut(&id) {
            conn.channels.insert(channel.to_string());
        }

        if is_presence_channel(channel) {
            if newly_joined && !inner.has_other_connection_named(channel, &member, id) {
                tracing::debug!(channel = %channel, username = %member.name, "成员加入在线频道");
                let frame = ServerFrame::Joining {
                    channel: channel.to_string(),
                    member: member.clone(),
                };
                inner.send_to_channel(channel, Some(id), &frame);
            }
            let members = inner.member_names_in(channel);
            inner.send_to(
                id,
                ServerFrame::Here {
                    channel: channel.to_string(),
                    members,
                },
            );
        }

        inner.send_to(
            id,
            ServerFrame::Subscribed {
                channel: channel.to_string(),
            },
        );
    }

    pub fn unsubscribe(&self, id: ConnectionId, channel: &str) {
        self.lock().leave_channel(id, channel);
    }

    fn whisper(&self, id: ConnectionId, channel: &str, event: &str, payload: Value) {
        let inner = self.lock();
        let subscribed = inner
            .channels
            .get(channel)
            .is_some_and(|ids| ids.contains(&id));
        if !subscribed {
            inner.send_to(
                id,
                ServerFrame::Error {
                    message: format!("not subscribed to {channel}"),
                },
            );
            return;
        }

        let frame = ServerFrame::Whisper {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        };
        inner.send_to_channel(channel, Some(id), &frame);
    }

    /// 连接关闭：退出所有频道并释放队列
    pub fn disconnect(&self, id: ConnectionId) {
        let mut inner = self.lock();
        let channels: Vec<String> = match inner.connections.get(&id) {
            Some(conn) => conn.channels.iter().cloned().collect(),
            None => return,
        };
        for channel in channels {
            inner.leave_channel(id, &channel);
        }
        inner.connections.remove(&id);
        tracing::debug!(connection_id = id, "总线连接关闭");
    }

    /// 向频道内所有连接发布服务端事件，返回送达的连接数
    pub fn publish(&self, channel: &str, event: &str, payload: Value) -> usize {
        let frame = ServerFrame::Event {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        };
        let delivered = self.lock().send_to_channel(channel, None, &frame);
        tracing::debug!(channel = %channel, event, delivered, "事件已发布");
        delivered
    }

    /// 在线频道的成员，按加入顺序去重
    pub fn members(&self, channel: &str) -> Vec<PresenceMember> {
        self.lock().member_names_in(channel)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }
}

//! 连接中枢
//!
//! 单个 tokio 任务串行处理所有在线状态、限流和广播决策：
//! - 每个连接的事件经同一个 mpsc 通道进入，顺序与客户端发出顺序一致
//! - 被接受的消息按 hub 接受的顺序广播，所有接收方看到相同的相对顺序
//! - 出站队列有界，溢出的连接会被断开，而不是阻塞广播
//!
//! 连接状态机：`Connected(匿名)` --announce--> `Active(identity)` --leave/断开--> `Closed`。

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use domain::{ChatMessage, Identity, MessageContent, MessageStore, Timestamp};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{ApplicationError, SessionError};
use crate::presence::{ConnectionId, PresenceRegistry};
use crate::protocol::{ClientEvent, MessageView, ServerEvent};
use crate::rate_limiter::{RateDecision, RateLimitPolicy, RateLimiter};

#[derive(Debug, Clone)]
pub struct HubSettings {
    /// announce 后回放的历史条数
    pub history_limit: u32,
    /// 每个连接的出站队列容量
    pub outbound_capacity: usize,
    /// hub 入站命令队列容量
    pub command_capacity: usize,
    pub max_message_length: usize,
    pub rate_limit: RateLimitPolicy,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            outbound_capacity: 64,
            command_capacity: 1024,
            max_message_length: domain::DEFAULT_MAX_MESSAGE_LENGTH,
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

pub struct HubDependencies {
    pub store: Arc<dyn MessageStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug)]
pub enum HubCommand {
    Register {
        connection: ConnectionId,
        outbound: mpsc::Sender<ServerEvent>,
    },
    Inbound {
        connection: ConnectionId,
        event: ClientEvent,
    },
    /// 传输层已关闭
    Disconnect { connection: ConnectionId },
    Roster {
        reply: oneshot::Sender<Vec<Identity>>,
    },
    Shutdown,
}

/// 与 hub 通信的句柄，可以任意克隆
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    next_connection: Arc<AtomicU64>,
    outbound_capacity: usize,
}

impl HubHandle {
    async fn send(&self, command: HubCommand) -> Result<(), ApplicationError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ApplicationError::HubUnavailable)
    }

    /// 注册新连接，返回连接标识和它的出站事件队列
    pub async fn connect(
        &self,
    ) -> Result<(ConnectionId, mpsc::Receiver<ServerEvent>), ApplicationError> {
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let (outbound, events) = mpsc::channel(self.outbound_capacity);
        self.send(HubCommand::Register {
            connection,
            outbound,
        })
        .await?;
        Ok((connection, events))
    }

    pub async fn dispatch(
        &self,
        connection: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        self.send(HubCommand::Inbound { connection, event }).await
    }

    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), ApplicationError> {
        self.send(HubCommand::Disconnect { connection }).await
    }

    /// 当前在线名单的拷贝
    pub async fn roster(&self) -> Result<Vec<Identity>, ApplicationError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Roster { reply }).await?;
        rx.await.map_err(|_| ApplicationError::HubUnavailable)
    }

    pub async fn shutdown(&self) -> Result<(), ApplicationError> {
        self.send(HubCommand::Shutdown).await
    }
}

struct Connection {
    identity: Option<Identity>,
    connected_at: Timestamp,
    outbound: mpsc::Sender<ServerEvent>,
}

pub struct ConnectionHub {
    rx: mpsc::Receiver<HubCommand>,
    connections: HashMap<ConnectionId, Connection>,
    presence: PresenceRegistry,
    limiter: RateLimiter,
    settings: HubSettings,
    deps: HubDependencies,
}

impl ConnectionHub {
    pub fn new(settings: HubSettings, deps: HubDependencies) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(settings.command_capacity);
        let handle = HubHandle {
            tx,
            next_connection: Arc::new(AtomicU64::new(1)),
            outbound_capacity: settings.outbound_capacity,
        };
        let hub = Self {
            rx,
            connections: HashMap::new(),
            presence: PresenceRegistry::new(),
            limiter: RateLimiter::new(settings.rate_limit),
            settings,
            deps,
        };
        (hub, handle)
    }

    pub fn spawn(settings: HubSettings, deps: HubDependencies) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(settings, deps);
        (handle, tokio::spawn(hub.run()))
    }

    /// 事件循环，收到 `Shutdown` 或所有句柄都被丢弃后退出
    pub async fn run(mut self) {
        tracing::info!("connection hub started");

        while let Some(command) = self.rx.recv().await {
            if self.handle(command).await.is_break() {
                break;
            }
        }

        // 丢弃出站发送端后，各连接的写任务会自行结束
        let open_connections = self.connections.len();
        self.connections.clear();
        tracing::info!(open_connections, "connection hub stopped");
    }

    async fn handle(&mut self, command: HubCommand) -> ControlFlow<()> {
        match command {
            HubCommand::Register {
                connection,
                outbound,
            } => self.register(connection, outbound),
            HubCommand::Inbound { connection, event } => self.on_event(connection, event).await,
            HubCommand::Disconnect { connection } => self.close(connection, "transport closed"),
            HubCommand::Roster { reply } => {
                let _ = reply.send(self.presence.snapshot());
            }
            HubCommand::Shutdown => {
                tracing::info!("connection hub shutting down");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn register(&mut self, connection: ConnectionId, outbound: mpsc::Sender<ServerEvent>) {
        self.connections.insert(
            connection,
            Connection {
                identity: None,
                connected_at: self.deps.clock.now(),
                outbound,
            },
        );
        tracing::info!(
            connection_id = %connection,
            open_connections = self.connections.len(),
            "connection registered"
        );
    }

    async fn on_event(&mut self, connection: ConnectionId, event: ClientEvent) {
        if !self.connections.contains_key(&connection) {
            tracing::debug!(connection_id = %connection, "event for unknown connection ignored");
            return;
        }

        match event {
            ClientEvent::Announce { username, token } => {
                self.announce(connection, Credentials::new(username, token))
                    .await
            }
            ClientEvent::Send { text } => self.send_message(connection, text).await,
            ClientEvent::Leave => self.close(connection, "client left"),
        }
    }

    async fn announce(&mut self, connection: ConnectionId, credentials: Credentials) {
        if self.identity_of(connection).is_some() {
            self.reject(
                connection,
                SessionError::ProtocolViolation("connection already announced".into()),
            );
            return;
        }

        let identity = match self.deps.credentials.authenticate(&credentials).await {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!(connection_id = %connection, error = %err, "announce rejected");
                self.reject(connection, SessionError::AuthRejected(err.to_string()));
                return;
            }
        };

        if self.presence.contains(&identity) {
            tracing::warn!(
                connection_id = %connection,
                identity = %identity,
                "identity already held by another connection"
            );
            self.reject(connection, SessionError::IdentityTaken(identity));
            return;
        }

        match self.connections.get_mut(&connection) {
            Some(entry) => entry.identity = Some(identity.clone()),
            None => return,
        }
        self.presence.admit(identity.clone(), connection);
        tracing::info!(
            connection_id = %connection,
            identity = %identity,
            online = self.presence.len(),
            "identity announced"
        );

        self.broadcast_roster();
        self.replay_history(connection).await;
    }

    async fn replay_history(&mut self, connection: ConnectionId) {
        // 名单广播时该连接可能因队列溢出已被移除
        if !self.connections.contains_key(&connection) {
            return;
        }

        match self.deps.store.recent(self.settings.history_limit).await {
            Ok(messages) => self.deliver(connection, ServerEvent::history(&messages)),
            Err(err) => {
                tracing::error!(connection_id = %connection, error = %err, "failed to load message history");
                self.reject(
                    connection,
                    SessionError::PersistenceFailure("message history is unavailable".into()),
                );
            }
        }
    }

    async fn send_message(&mut self, connection: ConnectionId, text: String) {
        let Some(identity) = self.identity_of(connection) else {
            self.reject(
                connection,
                SessionError::ProtocolViolation("announce before sending messages".into()),
            );
            return;
        };

        let content = match MessageContent::with_limit(text, self.settings.max_message_length) {
            Ok(content) => content,
            Err(err) => {
                self.reject(connection, SessionError::InvalidMessage(err.to_string()));
                return;
            }
        };

        let now = self.deps.clock.now();
        if let RateDecision::Blocked(reason) = self.limiter.check_and_record(&identity, now) {
            self.reject(connection, SessionError::RateLimited(reason.to_string()));
            return;
        }

        let message = ChatMessage::new(identity, content, now);
        match self.deps.store.append(message).await {
            Ok(stored) => {
                tracing::debug!(
                    connection_id = %connection,
                    message_id = %stored.id,
                    "message accepted"
                );
                self.broadcast(ServerEvent::Message(MessageView::from(&stored)));
            }
            Err(err) => {
                tracing::error!(connection_id = %connection, error = %err, "failed to persist message");
                self.reject(
                    connection,
                    SessionError::PersistenceFailure("message could not be saved".into()),
                );
            }
        }
    }

    fn identity_of(&self, connection: ConnectionId) -> Option<Identity> {
        self.connections
            .get(&connection)
            .and_then(|entry| entry.identity.clone())
    }

    fn reject(&mut self, connection: ConnectionId, error: SessionError) {
        tracing::debug!(connection_id = %connection, code = error.code(), "session error");
        self.deliver(connection, error.to_event());
    }

    /// 发给单个连接
    fn deliver(&mut self, connection: ConnectionId, event: ServerEvent) {
        let Some(entry) = self.connections.get(&connection) else {
            return;
        };
        if let Err(err) = entry.outbound.try_send(event) {
            self.close(connection, overflow_reason(&err));
        }
    }

    /// 发给当前所有打开的连接，包括尚未 announce 的匿名连接
    fn broadcast(&mut self, event: ServerEvent) {
        let mut failed = Vec::new();
        for (connection, entry) in &self.connections {
            if let Err(err) = entry.outbound.try_send(event.clone()) {
                failed.push((*connection, overflow_reason(&err)));
            }
        }

        for (connection, reason) in failed {
            self.close(connection, reason);
        }
    }

    fn broadcast_roster(&mut self) {
        self.broadcast(ServerEvent::roster(self.presence.snapshot()));
    }

    /// 关闭连接并在在线名单变化时广播新名单
    fn close(&mut self, connection: ConnectionId, reason: &'static str) {
        if self.release(connection, reason) {
            self.broadcast_roster();
        }
    }

    /// 移除连接、在线状态和限流状态，返回在线名单是否变化
    fn release(&mut self, connection: ConnectionId, reason: &'static str) -> bool {
        let Some(entry) = self.connections.remove(&connection) else {
            return false;
        };
        let connected_secs = (self.deps.clock.now() - entry.connected_at).whole_seconds();

        let Some(identity) = entry.identity else {
            tracing::info!(connection_id = %connection, reason, connected_secs, "anonymous connection closed");
            return false;
        };

        if self.presence.holder(&identity) == Some(connection) {
            self.presence.evict(&identity);
        }
        self.limiter.forget(&identity);
        tracing::info!(
            connection_id = %connection,
            identity = %identity,
            reason,
            connected_secs,
            online = self.presence.len(),
            "connection closed"
        );
        true
    }
}

fn overflow_reason<T>(err: &TrySendError<T>) -> &'static str {
    match err {
        TrySendError::Full(_) => {
            tracing::warn!("outbound queue full, dropping slow connection");
            "outbound queue overflow"
        }
        TrySendError::Closed(_) => "outbound queue closed",
    }
}

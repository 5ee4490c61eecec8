use std::ops::ControlFlow;

use application::{
    ApplicationError, ClientEvent, ConnectionId, HubHandle, ServerEvent, SessionError,
};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// 单个 WebSocket 连接
///
/// 读任务按到达顺序把客户端事件转交给 hub，写任务负责排空 hub 分配的出站队列。
/// 任意一侧结束即视为连接关闭，随后通知 hub 释放该连接。
pub struct WebSocketConnection {
    socket: WebSocket,
    hub: HubHandle,
    connection: ConnectionId,
    events: mpsc::Receiver<ServerEvent>,
}

impl WebSocketConnection {
    pub async fn open(socket: WebSocket, hub: HubHandle) -> Result<Self, ApplicationError> {
        let (connection, events) = hub.connect().await?;
        tracing::info!(connection_id = %connection, "WebSocket 连接已建立");

        Ok(Self {
            socket,
            hub,
            connection,
            events,
        })
    }

    pub async fn run(self) {
        let Self {
            socket,
            hub,
            connection,
            mut events,
        } = self;
        let (mut sender, mut incoming) = socket.split();

        // 读任务需要直接回写的帧（pong、解析错误）走这个通道
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        let frame = match cmd {
                            WsCommand::SendText(text) => WsMessage::Text(text.into()),
                            WsCommand::SendPong(data) => WsMessage::Pong(data),
                        };
                        if sender.send(frame).await.is_err() {
                            tracing::warn!(connection_id = %connection, "Failed to write frame");
                            break;
                        }
                    }
                    event = events.recv() => {
                        let Some(event) = event else {
                            // hub 已释放该连接：leave、出站队列溢出或停机
                            let _ = sender.send(WsMessage::Close(None)).await;
                            break;
                        };
                        let payload = match event.to_json() {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize websocket payload");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::warn!(connection_id = %connection, "Failed to send event");
                            break;
                        }
                    }
                }
            }
            tracing::debug!(connection_id = %connection, "WebSocket发送任务结束");
        });

        let recv_hub = hub.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if handle_incoming(message, connection, &recv_hub, &cmd_tx)
                    .await
                    .is_break()
                {
                    break;
                }
            }
            tracing::debug!(connection_id = %connection, "WebSocket接收任务结束");
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        // 重复释放在 hub 侧是空操作
        if let Err(err) = hub.disconnect(connection).await {
            tracing::debug!(connection_id = %connection, error = %err, "hub already stopped");
        }
        tracing::info!(connection_id = %connection, "WebSocket连接已断开");
    }
}

async fn handle_incoming(
    message: WsMessage,
    connection: ConnectionId,
    hub: &HubHandle,
    cmd_tx: &mpsc::Sender<WsCommand>,
) -> ControlFlow<()> {
    match message {
        WsMessage::Text(text) => match ClientEvent::from_json(text.as_str()) {
            Ok(event) => {
                if hub.dispatch(connection, event).await.is_err() {
                    tracing::warn!(connection_id = %connection, "hub unavailable, closing connection");
                    return ControlFlow::Break(());
                }
            }
            Err(err) => {
                tracing::debug!(connection_id = %connection, error = %err, "malformed client event");
                return reply_violation(cmd_tx, format!("malformed event: {err}")).await;
            }
        },
        WsMessage::Binary(_) => {
            return reply_violation(cmd_tx, "binary frames are not supported".into()).await;
        }
        WsMessage::Ping(data) => {
            if cmd_tx.send(WsCommand::SendPong(data)).await.is_err() {
                return ControlFlow::Break(());
            }
        }
        WsMessage::Pong(_) => {
            tracing::debug!("收到pong消息");
        }
        WsMessage::Close(_) => {
            tracing::info!(connection_id = %connection, "WebSocket收到关闭消息");
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

async fn reply_violation(cmd_tx: &mpsc::Sender<WsCommand>, reason: String) -> ControlFlow<()> {
    let event = SessionError::ProtocolViolation(reason).to_event();
    match event.to_json() {
        Ok(json) if cmd_tx.send(WsCommand::SendText(json.clone())).await.is_ok() => {
            ControlFlow::Continue(())
        }
        Ok(_) => ControlFlow::Break(()),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize protocol error");
            ControlFlow::Continue(())
        }
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Bytes),
}

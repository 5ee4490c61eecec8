//! 实时通道上的事件定义
//!
//! 线上格式为 JSON 文本帧，用 `type` 字段区分事件，例如
//! `{"type":"send","text":"hi"}`、`{"type":"roster","users":["bob"]}`。

use domain::{ChatMessage, Identity, MessageId, Timestamp};
use serde::{Deserialize, Serialize};

/// 客户端发往服务端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// 绑定身份
    Announce {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// 发送聊天消息
    Send { text: String },
    /// 主动离开，服务端随后关闭连接
    Leave,
}

/// 对外展示的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub sender: Identity,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: Timestamp,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id,
            sender: message.sender.clone(),
            text: message.text.as_str().to_owned(),
            timestamp: message.created_at,
        }
    }
}

impl From<ChatMessage> for MessageView {
    fn from(message: ChatMessage) -> Self {
        Self::from(&message)
    }
}

/// 服务端发往客户端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 完整的在线名单
    Roster { users: Vec<Identity> },
    /// announce 成功后回放的历史消息，从旧到新
    History { messages: Vec<MessageView> },
    Message(MessageView),
    /// 非致命提醒，例如被限流
    Warning { reason: String },
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn roster(users: Vec<Identity>) -> Self {
        ServerEvent::Roster { users }
    }

    pub fn history(messages: &[ChatMessage]) -> Self {
        ServerEvent::History {
            messages: messages.iter().map(MessageView::from).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

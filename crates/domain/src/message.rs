use serde::{Deserialize, Serialize};

use crate::value_objects::{Identity, MessageContent, MessageId, Timestamp};

/// 一条聊天消息，创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: Identity,
    pub text: MessageContent,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl ChatMessage {
    pub fn new(sender: Identity, text: MessageContent, created_at: Timestamp) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            text,
            created_at,
        }
    }
}

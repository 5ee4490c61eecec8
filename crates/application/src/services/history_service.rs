use std::sync::Arc;

use domain::{ChatMessage, MessageStore};

use crate::error::ApplicationError;

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// 历史消息查询，顺序与 `MessageStore::recent` 一致（从旧到新）
#[derive(Clone)]
pub struct ChatHistoryService {
    store: Arc<dyn MessageStore>,
}

impl ChatHistoryService {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub async fn recent(&self, limit: Option<u32>) -> Result<Vec<ChatMessage>, ApplicationError> {
        let limit = clamp_limit(limit);
        Ok(self.store.recent(limit).await?)
    }
}

/// 缺省为 50，最大 100，0 按 1 处理
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

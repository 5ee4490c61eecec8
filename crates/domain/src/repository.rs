use async_trait::async_trait;

use crate::account::Account;
use crate::errors::RepositoryError;
use crate::message::ChatMessage;
use crate::value_objects::{Identity, Timestamp};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 消息持久化接口。所有调用都可能失败或耗时，调用方不能假设同步语义。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化一条消息，成功返回后消息即已落盘
    async fn append(&self, message: ChatMessage) -> RepositoryResult<ChatMessage>;

    /// 最近的 `limit` 条消息，按时间从旧到新排列
    async fn recent(&self, limit: u32) -> RepositoryResult<Vec<ChatMessage>>;

    /// 删除 `created_at < threshold` 的全部消息，返回删除条数
    async fn delete_older_than(&self, threshold: Timestamp) -> RepositoryResult<u64>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// 用户名或注册地址已被占用时返回 `RepositoryError::Conflict`，并指明冲突字段
    async fn create(&self, account: Account) -> RepositoryResult<Account>;
    async fn find_by_username(&self, username: &Identity) -> RepositoryResult<Option<Account>>;
    async fn find_by_ip(&self, ip: &str) -> RepositoryResult<Option<Account>>;
}

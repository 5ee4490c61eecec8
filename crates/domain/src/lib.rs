//! 聊天室核心领域模型
//!
//! 包含在线身份、聊天消息、账号等实体，以及存储接口定义。

pub mod account;
pub mod errors;
pub mod message;
pub mod repository;
pub mod value_objects;

pub use account::Account;
pub use errors::{DomainError, RepositoryError, UniqueKey};
pub use message::ChatMessage;
pub use repository::{AccountRepository, MessageStore, RepositoryResult};
#[cfg(feature = "testing")]
pub use repository::{MockAccountRepository, MockMessageStore};
pub use value_objects::{
    AccountId, Identity, MessageContent, MessageId, PasswordHash, Timestamp,
    DEFAULT_MAX_MESSAGE_LENGTH, MAX_IDENTITY_LENGTH,
};

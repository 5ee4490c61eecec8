//! 领域模型错误定义

use std::fmt;

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("user already exists")]
    UserAlreadyExists,

    /// 同一个 IP 只能注册一个账号
    #[error("address already registered an account")]
    AddressAlreadyRegistered,
}

impl DomainError {
    pub fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// 触发唯一约束的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    Id,
    Username,
    RegisteredIp,
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueKey::Id => f.write_str("id"),
            UniqueKey::Username => f.write_str("username"),
            UniqueKey::RegisteredIp => f.write_str("registered_ip"),
        }
    }
}

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record already exists ({0})")]
    Conflict(UniqueKey),
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

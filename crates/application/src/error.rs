use domain::{DomainError, Identity, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;
use crate::protocol::ServerEvent;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("authentication failed")]
    Authentication,
    /// hub 已停止，命令无法投递
    #[error("connection hub is not running")]
    HubUnavailable,
}

/// 实时会话内的错误，只影响单个连接或单次操作，不会终止 hub
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// 凭据校验失败，连接保持匿名
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    /// 被限流，连接保持活跃
    #[error("{0}")]
    RateLimited(String),
    /// 持久化失败，消息被丢弃且不会广播
    #[error("{0}")]
    PersistenceFailure(String),
    /// 当前状态下不允许的事件
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("identity {0} is already connected")]
    IdentityTaken(Identity),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::AuthRejected(_) => "AUTH_REJECTED",
            SessionError::RateLimited(_) => "RATE_LIMITED",
            SessionError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            SessionError::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            SessionError::IdentityTaken(_) => "IDENTITY_TAKEN",
            SessionError::InvalidMessage(_) => "INVALID_MESSAGE",
        }
    }

    /// 转成发给客户端的事件；限流走 warning，其余走 error
    pub fn to_event(&self) -> ServerEvent {
        match self {
            SessionError::RateLimited(reason) => ServerEvent::Warning {
                reason: reason.clone(),
            },
            other => ServerEvent::Error {
                code: other.code().to_owned(),
                message: other.to_string(),
            },
        }
    }
}

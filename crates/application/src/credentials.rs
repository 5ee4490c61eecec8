use async_trait::async_trait;
use domain::{DomainError, Identity};
use thiserror::Error;

/// announce 事件携带的凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: Option<String>) -> Self {
        Self {
            username: username.into(),
            token,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username: {0}")]
    InvalidIdentity(#[from] DomainError),
    #[error("missing token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token was not issued to {0}")]
    IdentityMismatch(String),
}

/// 凭据校验接口。校验通过的身份会被直接信任，不会再次校验。
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError>;
}

/// 只校验显示名格式，不要求 token
#[derive(Debug, Default, Clone)]
pub struct DisplayNameCredentialStore;

#[async_trait]
impl CredentialStore for DisplayNameCredentialStore {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        Ok(Identity::parse(credentials.username.as_str())?)
    }
}

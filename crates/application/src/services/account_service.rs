use std::sync::Arc;

use domain::{Account, AccountRepository, DomainError, Identity, RepositoryError, UniqueKey};

use crate::{clock::Clock, error::ApplicationError, password::PasswordHasher};

/// bcrypt 只使用前 72 字节
const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Clone)]
pub struct RegisterAccountRequest {
    pub username: String,
    pub password: String,
    /// 客户端地址，拿不到时为 `None`，此时不做同地址限制
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub struct AccountServiceDependencies {
    pub accounts: Arc<dyn AccountRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct AccountService {
    deps: AccountServiceDependencies,
}

impl AccountService {
    pub fn new(deps: AccountServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterAccountRequest) -> Result<Account, ApplicationError> {
        let username = Identity::parse(request.username)?;
        validate_password(&request.password)?;

        if let Some(ip) = request.client_ip.as_deref() {
            if self.deps.accounts.find_by_ip(ip).await?.is_some() {
                tracing::warn!(client_ip = ip, "address already owns an account");
                return Err(DomainError::AddressAlreadyRegistered.into());
            }
        }

        if self
            .deps
            .accounts
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::UserAlreadyExists.into());
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let account = Account::register(
            username,
            password_hash,
            request.client_ip,
            self.deps.clock.now(),
        );

        // 上面的查询和写入之间没有锁，并发注册由存储层的唯一约束判定
        let stored = self
            .deps
            .accounts
            .create(account)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(UniqueKey::RegisteredIp) => {
                    ApplicationError::Domain(DomainError::AddressAlreadyRegistered)
                }
                RepositoryError::Conflict(_) => {
                    ApplicationError::Domain(DomainError::UserAlreadyExists)
                }
                other => other.into(),
            })?;

        tracing::info!(username = %stored.username, account_id = %stored.id, "account registered");
        Ok(stored)
    }

    /// 用户名或密码错误都返回 `Authentication`，不区分具体原因
    pub async fn login(&self, request: LoginRequest) -> Result<Account, ApplicationError> {
        let username =
            Identity::parse(request.username).map_err(|_| ApplicationError::Authentication)?;
        let account = self
            .deps
            .accounts
            .find_by_username(&username)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &account.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::Authentication);
        }

        Ok(account)
    }
}

fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.is_empty() {
        return Err(DomainError::invalid_argument("password", "cannot be empty"));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(DomainError::invalid_argument(
            "password",
            format!("must be at most {MAX_PASSWORD_BYTES} bytes"),
        ));
    }
    Ok(())
}

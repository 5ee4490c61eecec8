use crate::value_objects::{AccountId, Identity, PasswordHash, Timestamp};

/// 已注册账号。用户名在账号存储中唯一。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub username: Identity,
    pub password: PasswordHash,
    /// 注册时的客户端地址，用于限制同一地址重复注册
    pub registered_ip: Option<String>,
    pub created_at: Timestamp,
}

impl Account {
    pub fn register(
        username: Identity,
        password: PasswordHash,
        registered_ip: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: AccountId::new(),
            username,
            password,
            registered_ip,
            created_at: now,
        }
    }
}

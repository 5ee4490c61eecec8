use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Account, AccountId, AccountRepository, ChatMessage, Identity, MessageContent, MessageId,
    MessageStore, PasswordHash, RepositoryError, RepositoryResult, Timestamp, UniqueKey,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(unique_key(db.constraint()))
        }
        _ => RepositoryError::storage(err.to_string()),
    }
}

/// 约束名见 migrations 目录
fn unique_key(constraint: Option<&str>) -> UniqueKey {
    match constraint {
        Some("accounts_username_key") => UniqueKey::Username,
        Some("uniq_accounts_registered_ip") => UniqueKey::RegisteredIp,
        _ => UniqueKey::Id,
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    sender: String,
    text: String,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let sender = Identity::parse(value.sender).map_err(|err| invalid_data(err.to_string()))?;
        // 已落库的消息不再受当前长度上限约束
        let text = MessageContent::with_limit(value.text, usize::MAX)
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(ChatMessage {
            id: MessageId::from(value.id),
            sender,
            text,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AccountRecord {
    id: Uuid,
    username: String,
    password_hash: String,
    registered_ip: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<AccountRecord> for Account {
    type Error = RepositoryError;

    fn try_from(value: AccountRecord) -> Result<Self, Self::Error> {
        let username =
            Identity::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Account {
            id: AccountId::from(value.id),
            username,
            password,
            registered_ip: value.registered_ip,
            created_at: value.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, message: ChatMessage) -> RepositoryResult<ChatMessage> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, sender, text, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sender, text, created_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(message.sender.as_str())
        .bind(message.text.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ChatMessage::try_from(record)
    }

    async fn recent(&self, limit: u32) -> RepositoryResult<Vec<ChatMessage>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, sender, text, created_at
            FROM (
                SELECT seq, id, sender, text, created_at
                FROM messages
                ORDER BY seq DESC
                LIMIT $1
            ) latest
            ORDER BY seq ASC
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn delete_older_than(&self, threshold: Timestamp) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE created_at < $1")
            .bind(threshold)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn create(&self, account: Account) -> RepositoryResult<Account> {
        let record = sqlx::query_as::<_, AccountRecord>(
            r#"
            INSERT INTO accounts (id, username, password_hash, registered_ip, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, password_hash, registered_ip, created_at
            "#,
        )
        .bind(Uuid::from(account.id))
        .bind(account.username.as_str())
        .bind(account.password.as_str())
        .bind(account.registered_ip.as_deref())
        .bind(account.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Account::try_from(record)
    }

    async fn find_by_username(&self, username: &Identity) -> RepositoryResult<Option<Account>> {
        let record = sqlx::query_as::<_, AccountRecord>(
            r#"SELECT id, username, password_hash, registered_ip, created_at FROM accounts WHERE username = $1"#,
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Account::try_from).transpose()
    }

    async fn find_by_ip(&self, ip: &str) -> RepositoryResult<Option<Account>> {
        let record = sqlx::query_as::<_, AccountRecord>(
            r#"SELECT id, username, password_hash, registered_ip, created_at FROM accounts WHERE registered_ip = $1 LIMIT 1"#,
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Account::try_from).transpose()
    }
}

/// Postgres 存储的集合
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub message_store: Arc<PgMessageStore>,
    pub account_repository: Arc<PgAccountRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            message_store: Arc::new(PgMessageStore::new(pool.clone())),
            account_repository: Arc::new(PgAccountRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

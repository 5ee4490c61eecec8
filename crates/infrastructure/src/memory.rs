//! 进程内存储实现
//!
//! 不依赖数据库，用于本地开发（`storage.backend = "memory"`）和集成测试。
//! 重启后数据全部丢失。

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    Account, AccountRepository, ChatMessage, Identity, MessageStore, RepositoryError,
    RepositoryResult, Timestamp, UniqueKey,
};
use tokio::sync::RwLock;

/// 按写入顺序保存消息
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<ChatMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: ChatMessage) -> RepositoryResult<ChatMessage> {
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn recent(&self, limit: u32) -> RepositoryResult<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages[skip..].to_vec())
    }

    async fn delete_older_than(&self, threshold: Timestamp) -> RepositoryResult<u64> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|message| message.created_at >= threshold);
        Ok((before - messages.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryAccountRepository {
    accounts: RwLock<HashMap<Identity, Account>>,
}

impl MemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn create(&self, account: Account) -> RepositoryResult<Account> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.username) {
            return Err(RepositoryError::Conflict(UniqueKey::Username));
        }
        if let Some(ip) = account.registered_ip.as_deref() {
            if accounts
                .values()
                .any(|existing| existing.registered_ip.as_deref() == Some(ip))
            {
                return Err(RepositoryError::Conflict(UniqueKey::RegisteredIp));
            }
        }
        accounts.insert(account.username.clone(), account.clone());
        Ok(account)
    }

    async fn find_by_username(&self, username: &Identity) -> RepositoryResult<Option<Account>> {
        Ok(self.accounts.read().await.get(username).cloned())
    }

    async fn find_by_ip(&self, ip: &str) -> RepositoryResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.registered_ip.as_deref() == Some(ip))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MessageContent, PasswordHash};
    use std::time::Duration;
    use time::macros::datetime;

    fn message(text: &str, at: Timestamp) -> ChatMessage {
        ChatMessage::new(
            Identity::parse("alice").unwrap(),
            MessageContent::new(text).unwrap(),
            at,
        )
    }

    #[tokio::test]
    async fn recent_returns_latest_messages_oldest_first() {
        let store = MemoryMessageStore::new();
        let start = datetime!(2024-03-01 00:00:00 UTC);
        for i in 0..5u64 {
            store
                .append(message(&format!("m{i}"), start + Duration::from_secs(i)))
                .await
                .unwrap();
        }

        let texts: Vec<_> = store
            .recent(3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text.as_str().to_owned())
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
        assert_eq!(store.recent(50).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn delete_older_than_is_strict_and_idempotent() {
        let store = MemoryMessageStore::new();
        let cutoff = datetime!(2024-03-01 12:00:00 UTC);
        store.append(message("old", cutoff - Duration::from_secs(1))).await.unwrap();
        store.append(message("edge", cutoff)).await.unwrap();
        store.append(message("new", cutoff + Duration::from_secs(1))).await.unwrap();

        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 1);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 0);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn accounts_are_unique_by_username_and_searchable_by_ip() {
        let repo = MemoryAccountRepository::new();
        let now = datetime!(2024-03-01 00:00:00 UTC);
        let account = Account::register(
            Identity::parse("alice").unwrap(),
            PasswordHash::new("hash").unwrap(),
            Some("10.0.0.1".into()),
            now,
        );
        repo.create(account.clone()).await.unwrap();

        let duplicate = Account::register(
            Identity::parse("alice").unwrap(),
            PasswordHash::new("other").unwrap(),
            None,
            now,
        );
        assert_eq!(
            repo.create(duplicate).await,
            Err(RepositoryError::Conflict(UniqueKey::Username))
        );

        let same_address = Account::register(
            Identity::parse("bob").unwrap(),
            PasswordHash::new("other").unwrap(),
            Some("10.0.0.1".into()),
            now,
        );
        assert_eq!(
            repo.create(same_address).await,
            Err(RepositoryError::Conflict(UniqueKey::RegisteredIp))
        );

        for name in ["carol", "dave"] {
            let without_address = Account::register(
                Identity::parse(name).unwrap(),
                PasswordHash::new("hash").unwrap(),
                None,
                now,
            );
            repo.create(without_address).await.unwrap();
        }

        assert_eq!(repo.find_by_ip("10.0.0.1").await.unwrap(), Some(account.clone()));
        assert_eq!(repo.find_by_ip("10.0.0.2").await.unwrap(), None);
        assert_eq!(
            repo.find_by_username(&account.username).await.unwrap(),
            Some(account)
        );
    }
}

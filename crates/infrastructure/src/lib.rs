//! 基础设施层实现。
//!
//! 提供 Postgres 与内存两种存储、密码哈希等适配器，实现应用/领域层定义的接口。

pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;

pub use memory::{MemoryAccountRepository, MemoryMessageStore};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{create_pg_pool, PgAccountRepository, PgMessageStore, PgStorage};

//! 应用层实现。
//!
//! 连接中枢（在线名单、限流、广播）、消息保留清理、账号与历史查询用例，
//! 以及对外部适配器（凭据校验、密码哈希、时钟）的抽象。

pub mod clock;
pub mod credentials;
pub mod error;
pub mod hub;
pub mod password;
pub mod presence;
pub mod protocol;
pub mod rate_limiter;
pub mod retention;
pub mod services;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use credentials::{AuthError, CredentialStore, Credentials, DisplayNameCredentialStore};
pub use error::{ApplicationError, SessionError};
pub use hub::{ConnectionHub, HubCommand, HubDependencies, HubHandle, HubSettings};
pub use password::{PasswordHasher, PasswordHasherError};
pub use presence::{ConnectionId, PresenceRegistry};
pub use protocol::{ClientEvent, MessageView, ServerEvent};
pub use rate_limiter::{BlockReason, RateDecision, RateLimitPolicy, RateLimiter};
pub use retention::RetentionSweeper;
pub use services::{
    AccountService, AccountServiceDependencies, ChatHistoryService, LoginRequest,
    RegisterAccountRequest,
};

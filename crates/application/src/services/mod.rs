mod account_service;
mod history_service;

pub use account_service::{
    AccountService, AccountServiceDependencies, LoginRequest, RegisterAccountRequest,
};
pub use history_service::{
    clamp_limit, ChatHistoryService, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};

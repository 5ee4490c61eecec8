use std::sync::Arc;

use application::{AccountService, ChatHistoryService, HubHandle};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub history: ChatHistoryService,
    pub account_service: Arc<AccountService>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        hub: HubHandle,
        history: ChatHistoryService,
        account_service: Arc<AccountService>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            hub,
            history,
            account_service,
            jwt_service,
        }
    }
}

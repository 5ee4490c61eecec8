//! Web API 层。
//!
//! 提供 Axum 路由：账号注册登录、历史消息、在线名单，以及接入连接中枢的 WebSocket 通道。

mod auth;
mod error;
mod middleware;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService, LoginResponse, TokenCredentialStore};
pub use config::JwtConfig;
pub use error::{ApiError, ErrorBody};
pub use middleware::{cors_layer, with_middleware};
pub use routes::router;
pub use state::AppState;
pub use ws_connection::WebSocketConnection;

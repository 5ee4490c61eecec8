use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use application::{LoginRequest, MessageView, RegisterAccountRequest};
use domain::Identity;

use crate::{auth::LoginResponse, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    username: Identity,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OnlineResponse {
    count: usize,
    users: Vec<Identity>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/chat/messages", get(get_history))
        .route("/chat/online", get(online_users))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(payload): Json<CredentialsPayload>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let account = state
        .account_service
        .register(RegisterAccountRequest {
            username: payload.username,
            password: payload.password,
            client_ip: client_ip(&headers, peer),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: account.username,
            message: "account created",
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let account = state
        .account_service
        .login(LoginRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    let token = state.jwt_service.generate_token(&account.username)?;
    Ok(Json(LoginResponse {
        username: account.username,
        token,
    }))
}

async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let messages = state.history.recent(query.limit).await?;
    Ok(Json(messages.iter().map(MessageView::from).collect()))
}

async fn online_users(State(state): State<AppState>) -> Result<Json<OnlineResponse>, ApiError> {
    let users = state.hub.roster().await?;
    Ok(Json(OnlineResponse {
        count: users.len(),
        users,
    }))
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        match WebSocketConnection::open(socket, state.hub).await {
            Ok(connection) => connection.run().await,
            Err(err) => tracing::error!(error = %err, "failed to register websocket connection"),
        }
    })
}

/// 取 `x-forwarded-for` 的第一个地址，没有时用对端地址
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_header_wins_over_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(peer)).as_deref(),
            Some("127.0.0.1")
        );
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}

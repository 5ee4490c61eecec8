#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    AccountService, AccountServiceDependencies, ChatHistoryService, Clock, ConnectionHub,
    CredentialStore, DisplayNameCredentialStore, HubDependencies, HubHandle, HubSettings,
    SystemClock,
};
use domain::MessageStore;
use futures_util::{SinkExt, StreamExt};
use infrastructure::{BcryptPasswordHasher, MemoryAccountRepository, MemoryMessageStore};
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtConfig, JwtService, TokenCredentialStore};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: HubHandle,
    pub store: Arc<MemoryMessageStore>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn ws(&self) -> WsClient {
        let (ws, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("ws connect");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 用内存存储启动完整的服务，监听随机端口
pub async fn spawn_server(require_token: bool) -> TestServer {
    let store = Arc::new(MemoryMessageStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: "integration-test-secret-at-least-32-chars".to_string(),
        expiration_hours: 1,
    }));

    let credentials: Arc<dyn CredentialStore> = if require_token {
        Arc::new(TokenCredentialStore::new(jwt_service.clone()))
    } else {
        Arc::new(DisplayNameCredentialStore)
    };

    let (hub, _hub_task) = ConnectionHub::spawn(
        HubSettings::default(),
        HubDependencies {
            store: store.clone() as Arc<dyn MessageStore>,
            credentials,
            clock: clock.clone(),
        },
    );

    let account_service = AccountService::new(AccountServiceDependencies {
        accounts: Arc::new(MemoryAccountRepository::new()),
        password_hasher: Arc::new(BcryptPasswordHasher::new(Some(4))),
        clock,
    });

    let state = AppState::new(
        hub.clone(),
        ChatHistoryService::new(store.clone()),
        Arc::new(account_service),
        jwt_service,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .ok();
    });

    TestServer {
        addr,
        hub,
        store,
        shutdown: Some(shutdown_tx),
    }
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// 下一个 JSON 事件，跳过控制帧
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("ws error");
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("json event"),
            Message::Close(_) => panic!("socket closed while waiting for event"),
            _ => continue,
        }
    }
}

/// 等待指定类型的事件，中间的其他事件丢弃
pub async fn next_event_of(ws: &mut WsClient, kind: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["type"] == kind {
            return event;
        }
    }
}

/// 服务端关闭连接前最多再读若干帧
pub async fn expect_closed(ws: &mut WsClient) {
    for _ in 0..16 {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return,
            Ok(Some(Ok(_))) => continue,
            Err(_) => panic!("socket was not closed"),
        }
    }
    panic!("socket kept producing frames");
}

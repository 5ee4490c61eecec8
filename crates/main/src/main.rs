//! 主应用程序入口
//!
//! 加载配置，装配存储、连接中枢与保留清理任务，启动 Axum Web 服务。

use std::net::SocketAddr;
use std::sync::Arc;

use application::{
    AccountService, AccountServiceDependencies, ChatHistoryService, Clock, ConnectionHub,
    CredentialStore, DisplayNameCredentialStore, HubDependencies, HubSettings, RateLimitPolicy,
    RetentionSweeper, SystemClock,
};
use config::{AppConfig, StorageBackend};
use domain::{AccountRepository, MessageStore};
use infrastructure::{
    create_pg_pool, BcryptPasswordHasher, MemoryAccountRepository, MemoryMessageStore, PgStorage,
    MIGRATOR,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, with_middleware, AppState, JwtService, TokenCredentialStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置加载完成");

    let (message_store, accounts) = open_storage(&config).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let credentials: Arc<dyn CredentialStore> = if config.auth.require_token {
        Arc::new(TokenCredentialStore::new(jwt_service.clone()))
    } else {
        tracing::warn!("auth.require_token = false，announce 只校验显示名");
        Arc::new(DisplayNameCredentialStore)
    };

    let settings = HubSettings {
        history_limit: config.chat.history_limit,
        outbound_capacity: config.chat.outbound_queue_capacity,
        max_message_length: config.chat.max_message_length,
        rate_limit: RateLimitPolicy {
            max_messages_per_window: config.rate_limit.max_messages,
            window_duration: config.rate_limit.window(),
            block_duration: config.rate_limit.block(),
        },
        ..HubSettings::default()
    };
    let (hub, hub_task) = ConnectionHub::spawn(
        settings,
        HubDependencies {
            store: message_store.clone(),
            credentials,
            clock: clock.clone(),
        },
    );

    let shutdown = CancellationToken::new();
    let sweeper_task = RetentionSweeper::new(
        message_store.clone(),
        clock.clone(),
        config.retention.max_age(),
        config.retention.sweep_interval(),
    )
    .spawn(shutdown.clone());

    let account_service = AccountService::new(AccountServiceDependencies {
        accounts,
        password_hasher: Arc::new(BcryptPasswordHasher::new(config.auth.bcrypt_cost)),
        clock,
    });

    let state = AppState::new(
        hub.clone(),
        ChatHistoryService::new(message_store),
        Arc::new(account_service),
        jwt_service,
    );
    let app = with_middleware(router(state), &config.server.cors_origins);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    tracing::info!("聊天室服务器启动在 http://{}", listener.local_addr()?);

    let graceful = {
        let shutdown = shutdown.clone();
        let hub = hub.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("收到停止信号，开始关闭");
            shutdown.cancel();
            // 关闭中枢后所有 WebSocket 写任务会发送 Close 帧并退出
            if let Err(err) = hub.shutdown().await {
                tracing::warn!(error = %err, "connection hub already stopped");
            }
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful)
    .await?;

    shutdown.cancel();
    let _ = hub.shutdown().await;
    if let Err(err) = hub_task.await {
        tracing::error!(error = %err, "connection hub task failed");
    }
    if let Err(err) = sweeper_task.await {
        tracing::error!(error = %err, "retention sweeper task failed");
    }

    tracing::info!("服务器已停止");
    Ok(())
}

async fn open_storage(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn MessageStore>, Arc<dyn AccountRepository>)> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let pg_pool =
                create_pg_pool(&config.database.url, config.database.max_connections).await?;
            // 运行迁移
            MIGRATOR.run(&pg_pool).await?;
            tracing::info!("数据库迁移完成");

            let storage = PgStorage::new(pg_pool);
            Ok((
                storage.message_store as Arc<dyn MessageStore>,
                storage.account_repository as Arc<dyn AccountRepository>,
            ))
        }
        StorageBackend::Memory => {
            tracing::warn!("使用内存存储，重启后数据全部丢失");
            Ok((
                Arc::new(MemoryMessageStore::new()) as Arc<dyn MessageStore>,
                Arc::new(MemoryAccountRepository::new()) as Arc<dyn AccountRepository>,
            ))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

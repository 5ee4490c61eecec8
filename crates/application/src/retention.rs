use std::sync::Arc;
use std::time::Duration;

use domain::{MessageStore, RepositoryResult};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

/// 定期删除超出保留期限的消息
pub struct RetentionSweeper {
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        max_age: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            max_age,
            interval,
        }
    }

    /// 执行一次清理，返回删除条数
    pub async fn sweep_once(&self) -> RepositoryResult<u64> {
        let threshold = self.clock.now() - self.max_age;
        let removed = self.store.delete_older_than(threshold).await?;
        tracing::info!(removed, threshold = %threshold, "retention sweep finished");
        Ok(removed)
    }

    /// 按固定间隔运行，失败只记录日志，直到 token 被取消
    pub async fn run(self, shutdown: CancellationToken) {
        // 第一次清理在一个完整间隔之后
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            max_age_secs = self.max_age.as_secs(),
            interval_secs = self.interval.as_secs(),
            "retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        tracing::error!(error = %err, "retention sweep failed");
                    }
                }
            }
        }

        tracing::info!("retention sweeper stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

//! 后台过期清理任务
//!
//! 清理任务是一个显式的资源：`spawn` 启动，`stop` 停止并等待任务退出；
//! 句柄被丢弃时同样会发出停止信号，避免遗留定时器。

use crate::authority::NonceAuthority;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 周期性清理过期 nonce 的后台任务句柄
#[derive(Debug)]
pub struct NonceSweeper {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl NonceSweeper {
    /// 启动清理任务
    ///
    /// 必须在 Tokio 运行时内调用。第一次清理发生在 `interval` 之后。
    pub fn spawn(authority: Arc<NonceAuthority>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval 的第一次 tick 立即完成
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Nonce sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        authority.sweep_expired();
                    }
                }
            }
        });

        info!("Background nonce sweeper started (interval: {:?})", interval);

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// 任务是否仍在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 停止清理任务并等待其退出
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!("Nonce sweeper task terminated abnormally: {}", e);
        }
        info!("Background nonce sweeper stopped");
    }
}

impl Drop for NonceSweeper {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

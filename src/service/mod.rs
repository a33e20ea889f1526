//! 服务管理模块
//!
//! 负责 nonce HTTP 服务的生命周期：
//! - 注册 Prometheus 指标
//! - 启动后台过期清理任务
//! - 挂载 HTTP 路由并在收到关闭信号后优雅退出

pub mod trace;

use anyhow::Result;
use axum::Router;
use pedigree_nonce::{
    NonceAuthority, NonceConfig, NonceState, NonceSweeper, create_router, register_nonce_metrics,
};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::info;

use trace::http_trace_layer;

/// Nonce HTTP 服务
pub struct NonceService {
    authority: Arc<NonceAuthority>,
    registry: Registry,
    sweep_interval: Duration,
}

impl NonceService {
    /// 根据配置创建服务，并将 nonce 指标注册到独立的 registry
    pub fn new(config: &NonceConfig) -> Result<Self> {
        Self::with_authority(
            Arc::new(NonceAuthority::new(config)),
            config.sweep_interval(),
        )
    }

    /// 使用已构建的 authority 创建服务
    pub fn with_authority(authority: Arc<NonceAuthority>, sweep_interval: Duration) -> Result<Self> {
        let registry = Registry::new();
        register_nonce_metrics(&registry)
            .map_err(|e| anyhow::anyhow!("Failed to register nonce metrics: {e}"))?;

        Ok(Self {
            authority,
            registry,
            sweep_interval,
        })
    }

    pub fn authority(&self) -> Arc<NonceAuthority> {
        self.authority.clone()
    }

    /// 构建完整路由（含 HTTP 追踪与 CORS）
    pub fn router(&self) -> Router {
        create_router(NonceState::new(
            self.authority.clone(),
            self.registry.clone(),
        ))
        .layer(http_trace_layer())
        .layer(CorsLayer::permissive())
    }

    /// 运行服务直到收到关闭信号
    ///
    /// 清理任务与 HTTP 服务同生命周期：服务退出后清理任务被停止并等待结束
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let sweeper = NonceSweeper::spawn(self.authority.clone(), self.sweep_interval);
        let app = self.router();

        info!("Nonce HTTP service listening on {}", listener.local_addr()?);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Nonce HTTP service shutting down");
            })
            .await;

        sweeper.stop().await;
        result?;
        Ok(())
    }
}

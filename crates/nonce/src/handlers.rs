//! Nonce HTTP 处理器
//!
//! 登录发起端点签发 nonce；登录完成端点在调用身份提供方之前
//! 通过 `/auth/nonce/check` 做非消费性预检

use crate::authority::{IssuedNonce, NonceAuthority};
use crate::error::NonceError;
use crate::metrics::record_outcome;
use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Nonce 服务状态
#[derive(Clone)]
pub struct NonceState {
    pub authority: Arc<NonceAuthority>,
    pub registry: Registry,
}

impl NonceState {
    pub fn new(authority: Arc<NonceAuthority>, registry: Registry) -> Self {
        Self {
            authority,
            registry,
        }
    }
}

/// 预检请求
///
/// 两个字段都可省略：都省略表示本次登录不使用 nonce
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckNonceRequest {
    #[serde(default)]
    pub nonce_id: Option<String>,
    #[serde(default)]
    pub raw_nonce: Option<String>,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_nonces: usize,
}

/// 创建 nonce 路由
pub fn create_router(state: NonceState) -> Router {
    Router::new()
        .route("/auth/nonce", post(issue_nonce))
        .route("/auth/nonce/check", post(check_nonce))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// 签发 nonce
async fn issue_nonce(State(state): State<NonceState>) -> Result<Json<IssuedNonce>, NonceError> {
    let issued = state.authority.issue()?;
    info!("Issued login nonce: nonce_id={}", issued.nonce_id);
    Ok(Json(issued))
}

/// 非消费性预检
///
/// 请求体无法解析（如字段不是字符串）时按 [`NonceError::InvalidFormat`] 处理，
/// 不把反序列化细节返回给客户端
async fn check_nonce(
    State(state): State<NonceState>,
    payload: Result<Json<CheckNonceRequest>, JsonRejection>,
) -> Result<StatusCode, NonceError> {
    let Json(request) = payload.map_err(|rejection| {
        let err = NonceError::InvalidFormat(rejection.body_text());
        record_outcome("check", err.label());
        warn!("Rejected nonce: operation=check, reason={}, detail={}", err.label(), err);
        err
    })?;

    state
        .authority
        .validate_nonce_if_provided(request.raw_nonce.as_deref(), request.nonce_id.as_deref())?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(state): State<NonceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_nonces: state.authority.len(),
    })
}

async fn metrics(State(state): State<NonceState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string())],
            Vec::new(),
        );
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
}

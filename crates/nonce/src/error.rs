//! Nonce 服务错误定义

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// 所有 nonce 失败统一返回给终端用户的提示
pub const LOGIN_FAILED_MESSAGE: &str = "login failed, please retry";

/// Nonce 服务错误类型
///
/// 各错误类型仅用于日志和监控，对外统一返回通用的登录失败提示，
/// 避免攻击者区分 "过期 / 不存在 / 已使用" 等状态。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NonceError {
    /// 参数缺失或为空
    #[error("Invalid nonce format: {0}")]
    InvalidFormat(String),

    /// nonce 与 nonce_id 只提供了其中一个
    #[error("Nonce and nonce id must be supplied together")]
    MalformedPair,

    /// 记录不存在或已过期（刻意合并，防止枚举）
    #[error("Unknown or expired nonce")]
    UnknownOrExpiredNonce,

    /// 重放攻击检测
    #[error("Nonce already used")]
    NonceAlreadyUsed,

    /// 哈希不匹配
    #[error("Nonce does not match the issued value")]
    InvalidNonce,

    /// 系统随机数源不可用
    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// 连续生成了已存在的 nonce_id
    #[error("Could not allocate a unique nonce id after {0} attempts")]
    IdentifierCollision(usize),
}

impl NonceError {
    /// 稳定的错误标签，用于日志字段和指标 label
    pub fn label(&self) -> &'static str {
        match self {
            NonceError::InvalidFormat(_) => "invalid_format",
            NonceError::MalformedPair => "malformed_pair",
            NonceError::UnknownOrExpiredNonce => "unknown_or_expired",
            NonceError::NonceAlreadyUsed => "already_used",
            NonceError::InvalidNonce => "invalid_nonce",
            NonceError::EntropyUnavailable(_) => "entropy_unavailable",
            NonceError::IdentifierCollision(_) => "identifier_collision",
        }
    }

    /// 是否由客户端输入导致（非服务端故障）
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            NonceError::EntropyUnavailable(_) | NonceError::IdentifierCollision(_)
        )
    }
}

impl IntoResponse for NonceError {
    fn into_response(self) -> Response {
        let status = match &self {
            NonceError::InvalidFormat(_) | NonceError::MalformedPair => StatusCode::BAD_REQUEST,
            NonceError::UnknownOrExpiredNonce
            | NonceError::NonceAlreadyUsed
            | NonceError::InvalidNonce => StatusCode::UNAUTHORIZED,
            NonceError::EntropyUnavailable(_) | NonceError::IdentifierCollision(_) => {
                // 不向客户端暴露内部错误详情
                tracing::error!("Internal nonce error: {:?}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": LOGIN_FAILED_MESSAGE,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Nonce 结果类型别名
pub type NonceResult<T> = Result<T, NonceError>;

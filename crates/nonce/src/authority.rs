//! Nonce 签发与校验
//!
//! 生命周期：
//! 1. `issue()` 生成 (nonce_id, raw_nonce, hashed_nonce)，仅保存摘要
//! 2. `check()` 非消费性校验，在调用身份提供方验证之前快速失败
//! 3. `mark_used()` 在完整验证通过后消费 nonce，关闭重放窗口
//! 4. 过期记录在访问时惰性删除，或由后台清理任务批量删除

use crate::clock::{Clock, SystemClock};
use crate::config::NonceConfig;
use crate::digest::{digests_match, sha256_hex};
use crate::error::{NonceError, NonceResult};
use crate::metrics::{NONCES_ACTIVE, NONCES_ISSUED, NONCES_SWEPT, record_outcome};
use crate::rng::{NonceRng, OsNonceRng, random_hex};
use crate::store::{MemoryNonceStore, NonceRecord, NonceStore, UsedTransition};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 原始 nonce 长度（字节，十六进制编码后 64 字符）
pub const RAW_NONCE_BYTES: usize = 32;

/// nonce_id 长度（字节，十六进制编码后 32 字符）
pub const NONCE_ID_BYTES: usize = 16;

/// nonce_id 冲突时的最大重试次数
const MAX_ISSUE_ATTEMPTS: usize = 4;

/// 一次签发的结果
///
/// `raw_nonce` 交给客户端传入原生登录 SDK，`nonce_id` 随登录完成请求回传
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct IssuedNonce {
    pub nonce_id: String,
    pub raw_nonce: String,
    pub hashed_nonce: String,
}

impl fmt::Debug for IssuedNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedNonce")
            .field("nonce_id", &self.nonce_id)
            .field("raw_nonce", &"<redacted>")
            .field("hashed_nonce", &self.hashed_nonce)
            .finish()
    }
}

/// 存储统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NonceStats {
    /// 当前存储中的记录数（包括尚未清理的过期记录）
    pub active: usize,
    pub ttl_secs: u64,
}

/// 单次使用 nonce 的签发与校验中心
pub struct NonceAuthority {
    store: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn NonceRng>,
    ttl: Duration,
}

impl NonceAuthority {
    /// 使用内存存储、系统时钟和操作系统 CSPRNG 创建实例
    pub fn new(config: &NonceConfig) -> Self {
        Self::with_parts(
            Arc::new(MemoryNonceStore::new()),
            Arc::new(SystemClock),
            Arc::new(OsNonceRng),
            config.ttl(),
        )
    }

    /// 注入存储、时钟和随机数源
    pub fn with_parts(
        store: Arc<dyn NonceStore>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn NonceRng>,
        ttl: Duration,
    ) -> Self {
        info!(
            "Nonce authority initialized (backend: {}, ttl: {:?})",
            store.backend_name(),
            ttl
        );
        Self {
            store,
            clock,
            rng,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 签发新的 nonce，使用配置的 TTL
    pub fn issue(&self) -> NonceResult<IssuedNonce> {
        self.issue_with_ttl(self.ttl)
    }

    /// 签发新的 nonce，使用指定 TTL
    ///
    /// # Errors
    /// - [`NonceError::EntropyUnavailable`] 随机数源失败，本次签发中止
    /// - [`NonceError::IdentifierCollision`] 多次生成已存在的 nonce_id
    pub fn issue_with_ttl(&self, ttl: Duration) -> NonceResult<IssuedNonce> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let raw_nonce = random_hex(self.rng.as_ref(), RAW_NONCE_BYTES)?;
            let nonce_id = random_hex(self.rng.as_ref(), NONCE_ID_BYTES)?;
            let hashed_nonce = sha256_hex(&raw_nonce);

            let expires_at_ms = self.clock.now_ms().saturating_add(ttl_ms);
            let record = NonceRecord::new(hashed_nonce.clone(), expires_at_ms);

            if self.store.set_if_absent(&nonce_id, record) {
                NONCES_ISSUED.inc();
                NONCES_ACTIVE.set(gauge_value(self.store.len()));
                debug!("Issued nonce: nonce_id={}, expires_at_ms={}", nonce_id, expires_at_ms);
                return Ok(IssuedNonce {
                    nonce_id,
                    raw_nonce,
                    hashed_nonce,
                });
            }

            warn!("Nonce id collision on attempt {}, regenerating", attempt);
        }

        Err(NonceError::IdentifierCollision(MAX_ISSUE_ATTEMPTS))
    }

    /// 非消费性校验
    ///
    /// 确认 nonce_id 存在、未过期、未使用，且 raw_nonce 的摘要与签发时一致。
    /// 过期记录会在此处被删除。
    pub fn check(&self, nonce_id: &str, raw_nonce: &str) -> NonceResult<()> {
        let result = self.check_inner(nonce_id, raw_nonce);
        self.observe("check", nonce_id, &result);
        result
    }

    fn check_inner(&self, nonce_id: &str, raw_nonce: &str) -> NonceResult<()> {
        if nonce_id.is_empty() {
            return Err(NonceError::InvalidFormat("nonce_id is empty".into()));
        }
        if raw_nonce.is_empty() {
            return Err(NonceError::InvalidFormat("nonce is empty".into()));
        }

        let now_ms = self.clock.now_ms();
        let record = self
            .store
            .get(nonce_id)
            .ok_or(NonceError::UnknownOrExpiredNonce)?;

        if record.is_expired_at(now_ms) {
            if self.store.delete_if_expired(nonce_id, now_ms) {
                NONCES_ACTIVE.set(gauge_value(self.store.len()));
            }
            return Err(NonceError::UnknownOrExpiredNonce);
        }

        if record.used {
            return Err(NonceError::NonceAlreadyUsed);
        }

        if !digests_match(&record.hashed_secret, &sha256_hex(raw_nonce)) {
            return Err(NonceError::InvalidNonce);
        }

        Ok(())
    }

    /// 消费 nonce
    ///
    /// 仅在身份提供方断言已完整验证之后调用。对同一 nonce_id 的第二次调用
    /// 总是返回 [`NonceError::NonceAlreadyUsed`]。
    pub fn mark_used(&self, nonce_id: &str) -> NonceResult<()> {
        let now_ms = self.clock.now_ms();
        let result = match self.store.compare_and_set_used(nonce_id, now_ms) {
            UsedTransition::Marked => Ok(()),
            UsedTransition::Missing => Err(NonceError::UnknownOrExpiredNonce),
            UsedTransition::Expired => {
                NONCES_ACTIVE.set(gauge_value(self.store.len()));
                Err(NonceError::UnknownOrExpiredNonce)
            }
            UsedTransition::AlreadyUsed => Err(NonceError::NonceAlreadyUsed),
        };
        self.observe("mark_used", nonce_id, &result);
        result
    }

    /// 可选校验入口
    ///
    /// - 两者都提供：执行 [`check`](Self::check)
    /// - 只提供一个：[`NonceError::MalformedPair`]
    /// - 都未提供：跳过校验
    pub fn validate_nonce_if_provided(
        &self,
        raw_nonce: Option<&str>,
        nonce_id: Option<&str>,
    ) -> NonceResult<()> {
        match (raw_nonce, nonce_id) {
            (Some(raw_nonce), Some(nonce_id)) => self.check(nonce_id, raw_nonce),
            (None, None) => {
                debug!("No nonce supplied, skipping nonce verification");
                Ok(())
            }
            _ => {
                let err = NonceError::MalformedPair;
                record_outcome("validate", err.label());
                warn!("Rejected nonce: operation=validate, reason={}", err.label());
                Err(err)
            }
        }
    }

    /// 清理所有已过期的记录
    ///
    /// 只删除在本次清理开始时已经过期的记录
    ///
    /// # Returns
    /// 被清理的记录数量
    pub fn sweep_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let removed = self.store.sweep_expired(now_ms);
        let remaining = self.store.len();

        NONCES_SWEPT.inc_by(removed as u64);
        NONCES_ACTIVE.set(gauge_value(remaining));

        if removed > 0 {
            info!(
                "🧹 Cleaned up {} expired nonces ({} remaining)",
                removed, remaining
            );
        }
        removed
    }

    /// 当前存储中的记录数
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> NonceStats {
        NonceStats {
            active: self.store.len(),
            ttl_secs: self.ttl.as_secs(),
        }
    }

    fn observe(&self, operation: &str, nonce_id: &str, result: &NonceResult<()>) {
        match result {
            Ok(()) => {
                record_outcome(operation, "ok");
                debug!("Nonce accepted: operation={}, nonce_id={}", operation, nonce_id);
            }
            Err(e) => {
                record_outcome(operation, e.label());
                warn!(
                    "Rejected nonce: operation={}, nonce_id={}, reason={}",
                    operation,
                    nonce_id,
                    e.label()
                );
            }
        }
    }
}

fn gauge_value(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

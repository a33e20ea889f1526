//! 随机数源抽象
//!
//! 生产环境使用操作系统 CSPRNG；随机数源失败时直接返回错误，
//! 绝不退化为弱随机或全零 nonce。

use crate::error::{NonceError, NonceResult};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// 密码学随机数源，用于生成 nonce 原文和 nonce_id
pub trait NonceRng: Send + Sync {
    /// 填充随机字节，失败时整个签发流程必须中止
    fn fill(&self, dest: &mut [u8]) -> NonceResult<()>;
}

/// 操作系统 CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsNonceRng;

impl NonceRng for OsNonceRng {
    fn fill(&self, dest: &mut [u8]) -> NonceResult<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| NonceError::EntropyUnavailable(e.to_string()))
    }
}

/// 可复现的种子随机数源（用于测试）
pub struct StdNonceRng {
    inner: Mutex<StdRng>,
}

impl StdNonceRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl NonceRng for StdNonceRng {
    fn fill(&self, dest: &mut [u8]) -> NonceResult<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_fill_bytes(dest)
            .map_err(|e| NonceError::EntropyUnavailable(e.to_string()))
    }
}

/// 生成 `len` 字节随机数并编码为小写十六进制
pub(crate) fn random_hex(rng: &dyn NonceRng, len: usize) -> NonceResult<String> {
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)?;
    Ok(hex::encode(bytes))
}

//! Nonce 服务配置
//!
//! TTL 与清理间隔既可以写在 TOML 配置中，也可以通过环境变量覆盖

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 覆盖 [`NonceConfig::ttl_secs`] 的环境变量
pub const TTL_ENV: &str = "PEDIGREE_NONCE_TTL_SECS";

/// 覆盖 [`NonceConfig::sweep_interval_secs`] 的环境变量
pub const SWEEP_INTERVAL_ENV: &str = "PEDIGREE_NONCE_SWEEP_INTERVAL_SECS";

fn default_ttl_secs() -> u64 {
    300 // 5 分钟
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Nonce 服务配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NonceConfig {
    /// 签发后 nonce 的有效期（秒）
    ///
    /// 默认 300 秒
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// 后台清理过期 nonce 的间隔（秒）
    ///
    /// 默认 60 秒
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl NonceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 应用环境变量覆盖
    ///
    /// 环境变量存在但无法解析为正整数时返回错误，而不是静默回退到默认值
    pub fn apply_env_overrides(&mut self) -> Result<(), String> {
        if let Some(ttl) = read_env_secs(TTL_ENV)? {
            self.ttl_secs = ttl;
        }
        if let Some(interval) = read_env_secs(SWEEP_INTERVAL_ENV)? {
            self.sweep_interval_secs = interval;
        }
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.ttl_secs == 0 {
            errors.push("nonce.ttl_secs must be greater than 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            errors.push("nonce.sweep_interval_secs must be greater than 0".to_string());
        }
        if self.ttl_secs > 3600 {
            errors.push(format!(
                "Warning: nonce.ttl_secs = {} keeps login nonces valid for over an hour",
                self.ttl_secs
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn read_env_secs(name: &str) -> Result<Option<u64>, String> {
    match std::env::var(name) {
        Ok(value) => {
            let value = value.trim();
            if value.is_empty() {
                return Ok(None);
            }
            value
                .parse::<u64>()
                .map(Some)
                .map_err(|e| format!("Invalid value for {name}: {value:?} ({e})"))
        }
        Err(_) => Ok(None),
    }
}

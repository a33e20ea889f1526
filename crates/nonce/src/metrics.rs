//! Prometheus 监控指标模块

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// nonce 签发次数
    pub static ref NONCES_ISSUED: IntCounter = IntCounter::with_opts(
        Opts::new("nonces_issued_total", "Total number of login nonces issued")
            .namespace("pedigree")
    ).unwrap();

    /// nonce 校验次数（按操作和结果分组）
    pub static ref NONCE_VERIFICATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("nonce_verifications_total", "Total number of nonce checks and consumptions")
            .namespace("pedigree"),
        &["operation", "outcome"]
    ).unwrap();

    /// 过期清理删除的 nonce 数
    pub static ref NONCES_SWEPT: IntCounter = IntCounter::with_opts(
        Opts::new("nonces_swept_total", "Total number of expired nonces evicted")
            .namespace("pedigree")
    ).unwrap();

    /// 当前存储中的 nonce 数
    pub static ref NONCES_ACTIVE: IntGauge = IntGauge::with_opts(
        Opts::new("nonces_active", "Number of nonce records currently held")
            .namespace("pedigree")
    ).unwrap();
}

/// 注册 nonce metrics 到指定 registry
pub fn register_nonce_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(NONCES_ISSUED.clone()))?;
    registry.register(Box::new(NONCE_VERIFICATIONS.clone()))?;
    registry.register(Box::new(NONCES_SWEPT.clone()))?;
    registry.register(Box::new(NONCES_ACTIVE.clone()))?;
    Ok(())
}

pub(crate) fn record_outcome(operation: &str, outcome: &str) {
    NONCE_VERIFICATIONS
        .with_label_values(&[operation, outcome])
        .inc();
}

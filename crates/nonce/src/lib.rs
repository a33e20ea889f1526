//! Pedigree login nonce service
//!
//! 为 "Sign in with Apple" 等联合登录流程提供单次使用 nonce：
//! 1. 签发密码学随机、带有效期的 nonce，并与不透明的 nonce_id 绑定
//! 2. 常量时间校验客户端回传的原始 nonce
//! 3. 登录成功后消费 nonce，阻断重放
//! 4. 后台定期清理过期记录

pub mod authority;
pub mod clock;
pub mod config;
pub mod digest;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod rng;
pub mod store;
pub mod sweeper;

// Re-export commonly used items
pub use authority::{IssuedNonce, NONCE_ID_BYTES, NonceAuthority, NonceStats, RAW_NONCE_BYTES};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NonceConfig;
pub use error::{LOGIN_FAILED_MESSAGE, NonceError, NonceResult};
pub use handlers::{CheckNonceRequest, HealthResponse, NonceState, create_router};
pub use metrics::register_nonce_metrics;
pub use rng::{NonceRng, OsNonceRng, StdNonceRng};
pub use store::{MemoryNonceStore, NonceRecord, NonceStore, UsedTransition};
pub use sweeper::NonceSweeper;

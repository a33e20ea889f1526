//! # pedigree
//!
//! 宠物繁育登记系统的登录 nonce 服务

pub mod config;
pub mod service;

// Re-export commonly used types
pub use config::PedigreeConfig;
pub use service::NonceService;

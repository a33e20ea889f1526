//! Nonce 存储模块
//!
//! # 设计
//!
//! - `NonceStore` trait 定义存储能力：查询、不存在时插入、原子标记已使用、
//!   过期删除、批量清理
//! - `MemoryNonceStore` 是默认的单进程内存实现
//! - 多实例部署可以基于带原生 TTL 和原子 CAS 的外部 KV 存储实现同一 trait，
//!   `NonceAuthority` 的算法无需改动

pub mod memory;

pub use memory::MemoryNonceStore;

/// 单个 nonce 的存储记录
///
/// 只保存原始 nonce 的摘要，从不保存原始值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRecord {
    /// 原始 nonce 的 SHA-256 十六进制摘要，创建后不可变
    pub hashed_secret: String,
    /// 过期时间（Unix 毫秒）
    pub expires_at_ms: i64,
    /// 是否已被消费，只能从 false 变为 true
    pub used: bool,
}

impl NonceRecord {
    pub fn new(hashed_secret: String, expires_at_ms: i64) -> Self {
        Self {
            hashed_secret,
            expires_at_ms,
            used: false,
        }
    }

    /// 记录在 `now_ms` 时刻是否已过期
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms < now_ms
    }
}

/// 原子消费操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsedTransition {
    /// 本次调用将 `used` 从 false 置为 true
    Marked,
    /// 该 id 下没有记录
    Missing,
    /// 记录已过期，本次调用将其删除
    Expired,
    /// 记录已被消费
    AlreadyUsed,
}

/// Nonce 存储后端抽象接口
///
/// 所有方法都是同步的：实现不得在调用方路径上执行阻塞 I/O。
/// 同一 key 上的所有修改必须互斥。
pub trait NonceStore: Send + Sync {
    /// 查询记录快照
    fn get(&self, nonce_id: &str) -> Option<NonceRecord>;

    /// 仅当 key 不存在时插入
    ///
    /// # Returns
    /// * `true` - 插入成功
    /// * `false` - key 已存在，存储未被修改
    fn set_if_absent(&self, nonce_id: &str, record: NonceRecord) -> bool;

    /// 原子地将记录标记为已使用
    ///
    /// 过期检查、已使用检查与标记必须在同一临界区内完成，
    /// 并发调用同一 key 时最多只有一次返回 [`UsedTransition::Marked`]
    fn compare_and_set_used(&self, nonce_id: &str, now_ms: i64) -> UsedTransition;

    /// 若记录在 `now_ms` 时已过期则删除
    ///
    /// # Returns
    /// 是否删除了记录
    fn delete_if_expired(&self, nonce_id: &str, now_ms: i64) -> bool;

    /// 删除所有在 `now_ms` 时已过期的记录
    ///
    /// # Returns
    /// 被清理的记录数量
    fn sweep_expired(&self, now_ms: i64) -> usize;

    /// 当前存储中的记录数（包括已过期但尚未清理的）
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 后端名称
    fn backend_name(&self) -> &'static str;
}

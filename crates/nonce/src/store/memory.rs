//! 内存 Nonce 存储实现
//!
//! 单进程、无持久化：进程重启后所有 nonce 失效

use super::{NonceRecord, NonceStore, UsedTransition};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 基于 `Mutex<HashMap>` 的 nonce 存储
///
/// 所有操作在同一把短持有的锁内完成；登录流量下整表锁已经足够
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    records: Mutex<HashMap<String, NonceRecord>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Records are plain values, a panicking holder cannot leave one half-written.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, NonceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NonceStore for MemoryNonceStore {
    fn get(&self, nonce_id: &str) -> Option<NonceRecord> {
        self.lock().get(nonce_id).cloned()
    }

    fn set_if_absent(&self, nonce_id: &str, record: NonceRecord) -> bool {
        match self.lock().entry(nonce_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    fn compare_and_set_used(&self, nonce_id: &str, now_ms: i64) -> UsedTransition {
        let mut records = self.lock();
        let Some(record) = records.get_mut(nonce_id) else {
            return UsedTransition::Missing;
        };

        if record.is_expired_at(now_ms) {
            records.remove(nonce_id);
            return UsedTransition::Expired;
        }

        if record.used {
            return UsedTransition::AlreadyUsed;
        }

        record.used = true;
        UsedTransition::Marked
    }

    fn delete_if_expired(&self, nonce_id: &str, now_ms: i64) -> bool {
        let mut records = self.lock();
        match records.get(nonce_id) {
            Some(record) if record.is_expired_at(now_ms) => {
                records.remove(nonce_id);
                true
            }
            _ => false,
        }
    }

    fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now_ms));
        before - records.len()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn backend_name(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at_ms: i64) -> NonceRecord {
        NonceRecord::new("a".repeat(64), expires_at_ms)
    }

    #[test]
    fn test_set_if_absent() {
        let store = MemoryNonceStore::new();
        assert!(store.set_if_absent("id", record(100)));
        assert!(!store.set_if_absent("id", record(999)));

        // 重复插入不会覆盖原记录
        assert_eq!(store.get("id").unwrap().expires_at_ms, 100);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compare_and_set_used_transitions() {
        let store = MemoryNonceStore::new();
        store.set_if_absent("id", record(100));

        assert_eq!(store.compare_and_set_used("missing", 50), UsedTransition::Missing);
        assert_eq!(store.compare_and_set_used("id", 50), UsedTransition::Marked);
        assert_eq!(store.compare_and_set_used("id", 50), UsedTransition::AlreadyUsed);
        assert!(store.get("id").unwrap().used);

        // 已使用的记录过期后同样会被删除
        assert_eq!(store.compare_and_set_used("id", 101), UsedTransition::Expired);
        assert!(store.get("id").is_none());
    }

    #[test]
    fn test_delete_if_expired_keeps_live_records() {
        let store = MemoryNonceStore::new();
        store.set_if_absent("id", record(100));

        assert!(!store.delete_if_expired("id", 100));
        assert!(store.get("id").is_some());
        assert!(store.delete_if_expired("id", 101));
        assert!(store.is_empty());
        assert!(!store.delete_if_expired("id", 101));
    }

    #[test]
    fn test_sweep_expired() {
        let store = MemoryNonceStore::new();
        store.set_if_absent("old-1", record(10));
        store.set_if_absent("old-2", record(20));
        store.set_if_absent("fresh", record(1_000));

        assert_eq!(store.sweep_expired(500), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());
        assert_eq!(store.sweep_expired(500), 0);
        assert_eq!(store.backend_name(), "Memory");
    }
}

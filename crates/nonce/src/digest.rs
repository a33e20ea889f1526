//! SHA-256 摘要与常量时间比较

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 摘要的十六进制长度
pub const DIGEST_HEX_LEN: usize = 64;

/// 计算 `input` 的 SHA-256 摘要（小写十六进制）
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// 常量时间比较两个摘要
///
/// 长度不等直接判定为不匹配，不再读取任何字节；
/// 长度相等时比较耗时与首个差异位置无关。
pub fn digests_match(expected: &str, candidate: &str) -> bool {
    let expected = expected.as_bytes();
    let candidate = candidate.as_bytes();
    if expected.len() != candidate.len() {
        return false;
    }
    expected.ct_eq(candidate).into()
}

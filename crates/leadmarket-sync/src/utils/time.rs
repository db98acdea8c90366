//! 时间处理工具模块
//!
//! - **存储层**: 所有时间字段使用 UTC 毫秒时间戳
//! - **业务层**: 统一通过 [`now_millis`] 生成时间，避免各模块各自取时

use chrono::Utc;

/// 当前 UTC 毫秒时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 判断写入于 `timestamp` 且 TTL 为 `ttl_ms` 的数据在 `now` 时刻是否已过期
///
/// `ttl_ms` 为 None 表示永不过期；恰好等于 TTL 时仍视为有效（严格大于才过期）。
pub fn is_expired_at(timestamp: i64, ttl_ms: Option<u64>, now: i64) -> bool {
    match ttl_ms {
        // 超过 i64::MAX 的 TTL 按 i64::MAX 处理，不能回绕成负数
        Some(ttl) => now.saturating_sub(timestamp) > i64::try_from(ttl).unwrap_or(i64::MAX),
        None => false,
    }
}

/// 使用当前时间判断是否过期
pub fn is_expired(timestamp: i64, ttl_ms: Option<u64>) -> bool {
    is_expired_at(timestamp, ttl_ms, now_millis())
}

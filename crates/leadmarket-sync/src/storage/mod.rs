//! 存储模块 - 离线同步核心的本地持久化层
//!
//! 分层结构：
//! - [`KeyValueStorage`]: 平台 KV 原语（字符串值），队列与缓存都只通过它读写
//! - [`kv::KvStore`]: 基于 sled 的持久化实现
//! - [`memory::MemoryStorage`]: 纯内存实现（测试、临时会话）
//! - [`queue::QueueStore`]: 待同步写操作的持久化队列
//! - [`cache::CacheStore`]: 带 TTL 的读结果快照缓存

use async_trait::async_trait;

use crate::error::Result;

pub mod cache;
pub mod kv;
pub mod memory;
pub mod queue;

pub use cache::{CacheEntry, CacheMetadata, CacheStore};
pub use kv::KvStore;
pub use memory::MemoryStorage;
pub use queue::{ApplyOutcome, QueueEntry, QueuePriority, QueueStats, QueueStore};

/// 平台本地 KV 存储抽象
///
/// 值一律为字符串（JSON 编码），与移动端 AsyncStorage 一类的原语保持一致；
/// 不要求实现方提供 "列出所有键" 的能力。
#[async_trait]
pub trait KeyValueStorage: Send + Sync + std::fmt::Debug {
    /// 读取键值，不存在时返回 None
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// 写入键值（覆盖）
    async fn set_item(&self, key: &str, value: String) -> Result<()>;

    /// 删除键值，键不存在不算错误
    async fn remove_item(&self, key: &str) -> Result<()>;
}

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};
use crate::handler::HandlerLookup;
use crate::storage::KeyValueStorage;

pub mod entry;
pub mod priority;
pub mod retry_policy;

// 重新导出核心类型
pub use entry::{generate_entry_id, sort_queue, QueueEntry};
pub use priority::QueuePriority;
pub use retry_policy::{ApplyOutcome, RetryPolicy};

/// 队列统计信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub count_by_priority: BTreeMap<QueuePriority, usize>,
    /// 入队时间最早的条目，队列为空时为 None
    pub oldest_entry: Option<QueueEntry>,
}

/// 持久化的离线写操作队列
///
/// 整个队列以 JSON 数组存放在一个键下，始终按 (priority desc, createdAt asc) 排序。
/// 所有 读-改-写 操作由内部互斥锁串行化，多线程运行时下也不会互相覆盖。
#[derive(Debug)]
pub struct QueueStore {
    storage: Arc<dyn KeyValueStorage>,
    queue_key: String,
    write_lock: Mutex<()>,
}

impl QueueStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, queue_key: impl Into<String>) -> Self {
        Self {
            storage,
            queue_key: queue_key.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    async fn load(&self) -> Result<Vec<QueueEntry>> {
        match self.storage.get_item(&self.queue_key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| SyncError::Serialization(format!("解析队列失败: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    async fn persist(&self, entries: &[QueueEntry]) -> Result<()> {
        let raw = serde_json::to_string(entries)
            .map_err(|e| SyncError::Serialization(format!("序列化队列失败: {}", e)))?;
        self.storage.set_item(&self.queue_key, raw).await
    }

    /// 入队，返回新条目 ID
    ///
    /// 存储失败直接向上返回。
    pub async fn enqueue(
        &self,
        mutation_type: &str,
        payload: Value,
        priority: QueuePriority,
    ) -> Result<String> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        let entry = QueueEntry::new(mutation_type, payload, priority);
        let id = entry.id.clone();
        entries.push(entry);
        sort_queue(&mut entries);
        self.persist(&entries).await?;

        debug!("条目已入队: id={}, type={}, 当前队列大小: {}", id, mutation_type, entries.len());
        Ok(id)
    }

    /// 按队列顺序返回全部待同步条目
    pub async fn list(&self) -> Result<Vec<QueueEntry>> {
        self.load().await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.load().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.load().await?.is_empty())
    }

    /// 删除指定条目，返回是否真的删除了
    ///
    /// ID 不存在返回 false 且不写存储；存储失败记录日志后返回 false。
    pub async fn remove(&self, id: &str) -> bool {
        match self.try_remove(id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("删除队列条目失败: id={}, error={}", id, e);
                false
            }
        }
    }

    async fn try_remove(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.persist(&entries).await?;
        Ok(true)
    }

    /// 清空队列
    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        match self.storage.remove_item(&self.queue_key).await {
            Ok(()) => {
                info!("离线队列已清空");
                true
            }
            Err(e) => {
                error!("清空离线队列失败: {}", e);
                false
            }
        }
    }

    /// 队列统计
    pub async fn stats(&self) -> Result<QueueStats> {
        let entries = self.load().await?;

        let mut count_by_priority = BTreeMap::new();
        for entry in &entries {
            *count_by_priority.entry(entry.priority).or_insert(0) += 1;
        }

        let oldest_entry = entries.iter().min_by_key(|entry| entry.created_at).cloned();

        Ok(QueueStats {
            total: entries.len(),
            count_by_priority,
            oldest_entry,
        })
    }

    /// 用对应 handler 应用一个条目
    ///
    /// - 成功：移除条目，返回 `Applied`
    /// - 失败（包括没有注册 handler）：持久化的 retries 加 1；
    ///   达到 `max_retries` 时丢弃条目返回 `Dropped`，否则保留返回 `Retrying`
    ///
    /// handler 调用期间不持有队列写锁。
    pub async fn apply_one(
        &self,
        entry: &QueueEntry,
        handlers: &dyn HandlerLookup,
        max_retries: u32,
    ) -> ApplyOutcome {
        let result = match handlers.handler_for(&entry.mutation_type) {
            Some(handler) => handler.apply(&entry.payload).await,
            None => Err(SyncError::HandlerNotFound(entry.mutation_type.clone())),
        };

        match result {
            Ok(()) => {
                if !self.remove(&entry.id).await {
                    debug!("条目应用成功，但已不在队列中: id={}", entry.id);
                }
                ApplyOutcome::Applied
            }
            Err(e) => {
                let error = e.to_string();
                let policy = RetryPolicy::new(max_retries);
                match self.record_failure(&entry.id, &policy).await {
                    Ok(Some((retries, true))) => {
                        warn!(
                            "条目重试次数耗尽，已丢弃: id={}, type={}, retries={}, error={}",
                            entry.id, entry.mutation_type, retries, error
                        );
                        ApplyOutcome::Dropped { retries, error }
                    }
                    Ok(Some((retries, false))) => {
                        debug!(
                            "条目应用失败，等待下次重试: id={}, retries={}/{}, error={}",
                            entry.id, retries, max_retries, error
                        );
                        ApplyOutcome::Retrying { retries, error }
                    }
                    Ok(None) => {
                        debug!("条目应用失败，且已不在队列中: id={}", entry.id);
                        ApplyOutcome::Dropped {
                            retries: entry.retries,
                            error,
                        }
                    }
                    Err(storage_err) => {
                        error!("记录重试次数失败: id={}, error={}", entry.id, storage_err);
                        ApplyOutcome::Retrying {
                            retries: entry.retries + 1,
                            error,
                        }
                    }
                }
            }
        }
    }

    /// retries 加 1 并持久化；返回 (新的 retries, 是否已丢弃)，条目不存在返回 None
    async fn record_failure(&self, id: &str, policy: &RetryPolicy) -> Result<Option<(u32, bool)>> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            return Ok(None);
        };

        entries[index].retries += 1;
        let retries = entries[index].retries;
        let exhausted = policy.is_exhausted(retries);
        if exhausted {
            entries.remove(index);
        }
        self.persist(&entries).await?;

        Ok(Some((retries, exhausted)))
    }
}

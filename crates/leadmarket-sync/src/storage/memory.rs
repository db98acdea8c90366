use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, SyncError};
use crate::storage::KeyValueStorage;

/// 基于内存的 KV 存储实现
///
/// 进程退出即丢失，用于测试和不需要持久化的临时会话。
/// 支持注入读写失败，用来验证上层对存储故障的降级行为。
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的读取全部返回存储错误
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 之后的写入 / 删除全部返回存储错误
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// 直接读取原始字符串（不经过队列 / 缓存层）
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.items.read().await.get(key).cloned()
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Storage("memory storage: write failure injected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Storage("memory storage: read failure injected".to_string()));
        }
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<()> {
        self.check_write()?;
        self.items.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.check_write()?;
        self.items.write().await.remove(key);
        Ok(())
    }
}

//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 本模块提供：
//! - [`KeyValueStorage`] 的持久化实现
//! - 按账号隔离的命名空间（每个命名空间一个 sled Tree）
//! - 写入后异步落盘，保证离线队列在进程被杀后仍然存在

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sled::{Db, Tree};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::storage::KeyValueStorage;

/// KV 存储组件
#[derive(Debug, Clone)]
pub struct KvStore {
    base_path: PathBuf,
    /// 主数据库实例
    db: Arc<Db>,
    /// 当前命名空间的 Tree
    tree: Tree,
    namespace: String,
}

impl KvStore {
    /// 打开（或创建）`base_path/kv` 下的 sled 数据库，并切到指定命名空间
    pub async fn open(base_path: &Path, namespace: &str) -> Result<Self> {
        let base_path = base_path.to_path_buf();
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| SyncError::Io(format!("创建 KV 存储目录失败: {}", e)))?;

        // 同一目录的旧实例可能刚释放文件锁，重试多次带退避
        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            SyncError::Storage(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        let tree = Self::open_tree(&db, namespace)?;
        info!("KV 存储已打开: path={}, namespace={}", kv_path.display(), namespace);

        Ok(Self {
            base_path,
            db: Arc::new(db),
            tree,
            namespace: namespace.to_string(),
        })
    }

    fn tree_name(namespace: &str) -> String {
        format!("ns_{}", namespace)
    }

    fn open_tree(db: &Db, namespace: &str) -> Result<Tree> {
        db.open_tree(Self::tree_name(namespace))
            .map_err(|e| SyncError::Storage(format!("打开命名空间 Tree 失败: {}", e)))
    }

    /// 基于同一个数据库打开另一个命名空间（账号切换）
    pub fn with_namespace(&self, namespace: &str) -> Result<Self> {
        let tree = Self::open_tree(&self.db, namespace)?;
        Ok(Self {
            base_path: self.base_path.clone(),
            db: self.db.clone(),
            tree,
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 当前命名空间内的键数量
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }

    /// 删除整个命名空间（账号登出时清理本地数据）
    pub fn drop_namespace(&self) -> Result<bool> {
        let dropped = self
            .db
            .drop_tree(Self::tree_name(&self.namespace))
            .map_err(|e| SyncError::Storage(format!("删除命名空间 Tree 失败: {}", e)))?;
        debug!("命名空间已删除: {} (existed={})", self.namespace, dropped);
        Ok(dropped)
    }

    async fn flush(&self) -> Result<()> {
        self.tree
            .flush_async()
            .await
            .map_err(|e| SyncError::Storage(format!("落盘失败: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for KvStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .tree
            .get(key)
            .map_err(|e| SyncError::Storage(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(bytes) => {
                let value = String::from_utf8(bytes.to_vec())
                    .map_err(|e| SyncError::Serialization(format!("值不是合法 UTF-8: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: String) -> Result<()> {
        self.tree
            .insert(key, value.into_bytes())
            .map_err(|e| SyncError::Storage(format!("设置键值对失败: {}", e)))?;
        self.flush().await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.tree
            .remove(key)
            .map_err(|e| SyncError::Storage(format!("删除键值对失败: {}", e)))?;
        self.flush().await
    }
}

/// 常用的键名常量
pub mod keys {
    /// 离线写操作队列（单键，JSON 数组）
    pub const SYNC_QUEUE: &str = "sync_queue";
    /// 缓存条目前缀（`cache_` + 逻辑键）
    pub const CACHE_PREFIX: &str = "cache_";
    /// 缓存元数据（单键，逻辑键 -> {timestamp, ttl}）
    pub const CACHE_METADATA: &str = "cache_metadata";
}

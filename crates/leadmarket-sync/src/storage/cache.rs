//! 读结果快照缓存
//!
//! 每个逻辑 key 存一条 `<prefix><key>`，另有一个元数据键记录所有 key 的写入时间和 TTL，
//! 这样不需要 KV 后端支持 "列出所有键" 也能统计大小和批量清理。
//! 过期条目只在读取时（或 [`CacheStore::cleanup_expired`]）惰性删除。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};
use crate::storage::KeyValueStorage;
use crate::utils::{is_expired, now_millis};

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    /// 写入时间（UTC 毫秒）
    pub timestamp: i64,
    /// 有效期（毫秒），None 表示永不过期
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self) -> bool {
        is_expired(self.timestamp, self.ttl)
    }
}

/// 元数据表中的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl CacheMetadata {
    pub fn is_expired(&self) -> bool {
        is_expired(self.timestamp, self.ttl)
    }
}

type MetadataMap = BTreeMap<String, CacheMetadata>;

/// 带 TTL 的键值缓存
#[derive(Debug)]
pub struct CacheStore {
    storage: Arc<dyn KeyValueStorage>,
    prefix: String,
    metadata_key: String,
    /// 串行化元数据表的 读-改-写
    write_lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        prefix: impl Into<String>,
        metadata_key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
            metadata_key: metadata_key.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn load_metadata(&self) -> Result<MetadataMap> {
        match self.storage.get_item(&self.metadata_key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(MetadataMap::new()),
        }
    }

    async fn save_metadata(&self, metadata: &MetadataMap) -> Result<()> {
        if metadata.is_empty() {
            return self.storage.remove_item(&self.metadata_key).await;
        }
        let raw = serde_json::to_string(metadata)?;
        self.storage.set_item(&self.metadata_key, raw).await
    }

    /// 写入缓存
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Option<u64>) -> bool {
        match self.try_set(key, data, ttl).await {
            Ok(()) => {
                debug!("缓存已写入: key={}, ttl={:?}", key, ttl);
                true
            }
            Err(e) => {
                error!("写入缓存失败: key={}, error={}", key, e);
                false
            }
        }
    }

    async fn try_set<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Option<u64>) -> Result<()> {
        let timestamp = now_millis();
        let raw = serde_json::to_string(&CacheEntry {
            key: key.to_string(),
            data,
            timestamp,
            ttl,
        })?;

        // 元数据先于条目写入，存储里的每个条目都能从元数据枚举到
        let _guard = self.write_lock.lock().await;
        let mut metadata = self.load_metadata().await?;
        metadata.insert(key.to_string(), CacheMetadata { timestamp, ttl });
        self.save_metadata(&metadata).await?;

        self.storage.set_item(&self.entry_key(key), raw).await
    }

    /// 读取缓存，不存在、已过期或无法解析时返回 None
    ///
    /// 读到过期条目会顺手删掉。
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = match self.read_entry(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("读取缓存失败: key={}, error={}", key, e);
                return None;
            }
        };

        if entry.is_expired() {
            debug!("缓存已过期: key={}", key);
            self.remove(key).await;
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("缓存数据类型不匹配: key={}, error={}", key, e);
                None
            }
        }
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry<Value>>> {
        match self.storage.get_item(&self.entry_key(key)).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                SyncError::Serialization(format!("解析缓存条目失败: {}", e))
            }),
            None => Ok(None),
        }
    }

    /// 删除单个 key
    pub async fn remove(&self, key: &str) -> bool {
        let _guard = self.write_lock.lock().await;
        match self.remove_locked(&[key.to_string()]).await {
            Ok(()) => true,
            Err(e) => {
                error!("删除缓存失败: key={}, error={}", key, e);
                false
            }
        }
    }

    /// 调用方需持有 write_lock
    async fn remove_locked(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.storage.remove_item(&self.entry_key(key)).await?;
        }
        let mut metadata = self.load_metadata().await?;
        for key in keys {
            metadata.remove(key);
        }
        self.save_metadata(&metadata).await
    }

    /// 清空所有缓存
    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        let result = async {
            let metadata = self.load_metadata().await?;
            for key in metadata.keys() {
                self.storage.remove_item(&self.entry_key(key)).await?;
            }
            self.storage.remove_item(&self.metadata_key).await?;
            Ok::<usize, SyncError>(metadata.len())
        }
        .await;

        match result {
            Ok(count) => {
                info!("缓存已清空: {} 项", count);
                true
            }
            Err(e) => {
                error!("清空缓存失败: {}", e);
                false
            }
        }
    }

    /// 当前缓存占用的字节数（所有条目序列化后的长度之和）
    pub async fn size(&self) -> u64 {
        let metadata = match self.load_metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("读取缓存元数据失败: {}", e);
                return 0;
            }
        };

        let mut total = 0u64;
        for key in metadata.keys() {
            match self.storage.get_item(&self.entry_key(key)).await {
                Ok(Some(raw)) => total += raw.len() as u64,
                Ok(None) => {}
                Err(e) => warn!("读取缓存条目失败: key={}, error={}", key, e),
            }
        }
        total
    }

    /// 元数据中记录的所有逻辑 key
    pub async fn keys(&self) -> Vec<String> {
        match self.load_metadata().await {
            Ok(metadata) => metadata.into_keys().collect(),
            Err(e) => {
                warn!("读取缓存元数据失败: {}", e);
                Vec::new()
            }
        }
    }

    /// 删除所有已过期的条目，返回删除数量
    pub async fn cleanup_expired(&self) -> usize {
        let _guard = self.write_lock.lock().await;
        let result = async {
            let metadata = self.load_metadata().await?;
            let expired: Vec<String> = metadata
                .iter()
                .filter(|(_, meta)| meta.is_expired())
                .map(|(key, _)| key.clone())
                .collect();
            if !expired.is_empty() {
                self.remove_locked(&expired).await?;
            }
            Ok::<usize, SyncError>(expired.len())
        }
        .await;

        match result {
            Ok(count) => {
                if count > 0 {
                    debug!("已清理 {} 个过期缓存", count);
                }
                count
            }
            Err(e) => {
                warn!("清理过期缓存失败: {}", e);
                0
            }
        }
    }
}

//! 同步核心配置

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache_strategy::CacheStrategy;
use crate::error::{Result, SyncError};
use crate::storage::kv::keys;

/// 持久化使用的键名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// 离线队列
    pub sync_queue: String,
    /// 缓存条目前缀
    pub cache_prefix: String,
    /// 缓存元数据表
    pub cache_metadata: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            sync_queue: keys::SYNC_QUEUE.to_string(),
            cache_prefix: keys::CACHE_PREFIX.to_string(),
            cache_metadata: keys::CACHE_METADATA.to_string(),
        }
    }
}

/// 同步核心配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 数据存储目录
    pub data_dir: PathBuf,
    /// 存储命名空间（通常是账号 ID，不同账号互不可见）
    pub storage_namespace: String,
    /// 失败多少次后丢弃条目
    pub max_retries: u32,
    /// drain 时相邻两条之间的间隔（毫秒）
    pub drain_item_delay_ms: u64,
    /// 定时同步周期（毫秒）
    pub auto_sync_interval_ms: u64,
    pub default_cache_strategy: CacheStrategy,
    /// 默认缓存 TTL（毫秒），None 表示不过期
    pub default_cache_ttl_ms: Option<u64>,
    /// 事件广播缓冲大小
    pub event_channel_capacity: usize,
    pub storage_keys: StorageKeys,
    /// 调试模式
    pub debug_mode: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./leadmarket_data"),
            storage_namespace: "default".to_string(),
            max_retries: 3,
            drain_item_delay_ms: 100,
            auto_sync_interval_ms: 30_000,
            default_cache_strategy: CacheStrategy::NetworkFirst,
            default_cache_ttl_ms: Some(5 * 60 * 1000),
            event_channel_capacity: 256,
            storage_keys: StorageKeys::default(),
            debug_mode: false,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// 从 JSON 文件加载，缺省字段取默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("解析配置文件失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(SyncError::Config("max_retries 必须大于 0".to_string()));
        }
        if self.auto_sync_interval_ms == 0 {
            return Err(SyncError::Config("auto_sync_interval_ms 必须大于 0".to_string()));
        }
        if self.storage_namespace.is_empty() {
            return Err(SyncError::Config("storage_namespace 不能为空".to_string()));
        }
        Ok(())
    }

    pub fn drain_item_delay(&self) -> Duration {
        Duration::from_millis(self.drain_item_delay_ms)
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_millis(self.auto_sync_interval_ms)
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn storage_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.config.storage_namespace = namespace.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn drain_item_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.drain_item_delay_ms = delay_ms;
        self
    }

    pub fn auto_sync_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.auto_sync_interval_ms = interval_ms;
        self
    }

    pub fn default_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.config.default_cache_strategy = strategy;
        self
    }

    pub fn default_cache_ttl_ms(mut self, ttl_ms: Option<u64>) -> Self {
        self.config.default_cache_ttl_ms = ttl_ms;
        self
    }

    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
        self.config.storage_keys = keys;
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    /// 构建并校验
    pub fn build(self) -> Result<SyncConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.drain_item_delay(), Duration::from_millis(100));
        assert_eq!(config.auto_sync_interval(), Duration::from_secs(30));
        assert_eq!(config.default_cache_strategy, CacheStrategy::NetworkFirst);
        assert_eq!(config.default_cache_ttl_ms, Some(300_000));
        assert_eq!(config.storage_keys.sync_queue, "sync_queue");
        assert_eq!(config.storage_keys.cache_prefix, "cache_");
        assert_eq!(config.storage_keys.cache_metadata, "cache_metadata");
    }

    #[test]
    fn test_builder_validates() {
        let config = SyncConfig::builder()
            .data_dir("/tmp/lm")
            .storage_namespace("user_42")
            .max_retries(5)
            .drain_item_delay_ms(0)
            .build()
            .unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.storage_namespace, "user_42");

        assert!(matches!(
            SyncConfig::builder().max_retries(0).build(),
            Err(SyncError::Config(_))
        ));
        assert!(SyncConfig::builder().auto_sync_interval_ms(0).build().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"storage_namespace": "acct", "max_retries": 4, "default_cache_strategy": "CACHE_FIRST"}}"#
        )
        .unwrap();

        let config = SyncConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.storage_namespace, "acct");
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.default_cache_strategy, CacheStrategy::CacheFirst);
        // 缺省字段取默认值
        assert_eq!(config.drain_item_delay_ms, 100);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{"max_retries": 0}}"#).unwrap();
        assert!(SyncConfig::from_json_file(bad.path()).is_err());
    }
}

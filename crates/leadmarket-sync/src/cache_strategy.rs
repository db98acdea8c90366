//! 缓存策略执行器
//!
//! 把一次远端读取包在四种一致性策略之一里，读写都走 [`CacheStore`]。

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::storage::CacheStore;

/// 缓存一致性策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStrategy {
    /// 只读缓存，从不请求网络
    CacheOnly,
    /// 只走网络，成功后写缓存
    NetworkOnly,
    /// 先走网络，失败时回退到有效缓存
    #[default]
    NetworkFirst,
    /// 有效缓存直接返回，同时后台刷新
    CacheFirst,
}

impl CacheStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::CacheOnly => "CACHE_ONLY",
            CacheStrategy::NetworkOnly => "NETWORK_ONLY",
            CacheStrategy::NetworkFirst => "NETWORK_FIRST",
            CacheStrategy::CacheFirst => "CACHE_FIRST",
        }
    }
}

impl std::fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 缓存策略执行器
#[derive(Debug, Clone)]
pub struct CacheExecutor {
    cache: Arc<CacheStore>,
    default_strategy: CacheStrategy,
    /// `with_cache` 未指定 TTL 时使用
    default_ttl: Option<u64>,
}

impl CacheExecutor {
    pub fn new(cache: Arc<CacheStore>, default_strategy: CacheStrategy, default_ttl: Option<u64>) -> Self {
        Self {
            cache,
            default_strategy,
            default_ttl,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn default_strategy(&self) -> CacheStrategy {
        self.default_strategy
    }

    /// 按指定策略读取 `key`
    ///
    /// `fetch` 最多被调用一次；`ttl` 为 None 时使用执行器的默认 TTL。
    /// `CacheFirst` 命中缓存时 `fetch` 的 future 会被 spawn 到后台，失败只记日志。
    pub async fn with_cache<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        strategy: CacheStrategy,
        ttl: Option<u64>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let ttl = ttl.or(self.default_ttl);
        debug!("with_cache: key={}, strategy={}", key, strategy);

        match strategy {
            CacheStrategy::CacheOnly => self
                .cache
                .get::<T>(key)
                .await
                .ok_or_else(|| SyncError::CacheMiss(key.to_string())),

            CacheStrategy::NetworkOnly => self.fetch_and_store(key, fetch, ttl).await,

            CacheStrategy::NetworkFirst => match fetch().await {
                Ok(data) => {
                    self.cache.set(key, &data, ttl).await;
                    Ok(data)
                }
                Err(e) => {
                    warn!("网络读取失败，尝试回退到缓存: key={}, error={}", key, e);
                    match self.cache.get::<T>(key).await {
                        Some(cached) => Ok(cached),
                        None => Err(e),
                    }
                }
            },

            CacheStrategy::CacheFirst => match self.cache.get::<T>(key).await {
                Some(cached) => {
                    self.spawn_refresh(key, fetch(), ttl);
                    Ok(cached)
                }
                None => self.fetch_and_store(key, fetch, ttl).await,
            },
        }
    }

    /// 使用默认策略和默认 TTL
    pub async fn with_default_cache<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.with_cache(key, fetch, self.default_strategy, None).await
    }

    async fn fetch_and_store<T, F, Fut>(&self, key: &str, fetch: F, ttl: Option<u64>) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let data = fetch().await?;
        self.cache.set(key, &data, ttl).await;
        Ok(data)
    }

    fn spawn_refresh<T, Fut>(&self, key: &str, fut: Fut, ttl: Option<u64>)
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let data = match fut.await.and_then(|data| Ok(serde_json::to_value(data)?)) {
                Ok(data) => data,
                Err(e) => {
                    warn!("后台刷新缓存失败: key={}, error={}", key, e);
                    return;
                }
            };
            if cache.set(&key, &data, ttl).await {
                debug!("后台刷新缓存完成: key={}", key);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn create_executor() -> CacheExecutor {
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(CacheStore::new(storage, "cache_", "cache_metadata"));
        CacheExecutor::new(cache, CacheStrategy::NetworkFirst, Some(60_000))
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        result: Result<String>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<String>> + Send>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_cache_only_never_fetches() {
        let executor = create_executor();
        let calls = Arc::new(AtomicUsize::new(0));

        let err = executor
            .with_cache("k", counting_fetch(&calls, Ok("net".into())), CacheStrategy::CacheOnly, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::CacheMiss(ref key) if key == "k"));

        executor.cache().set("k", &"cached", None).await;
        let value = executor
            .with_cache("k", counting_fetch(&calls, Ok("net".into())), CacheStrategy::CacheOnly, None)
            .await
            .unwrap();
        assert_eq!(value, "cached");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache() {
        let executor = create_executor();
        let calls = Arc::new(AtomicUsize::new(0));

        let value = executor
            .with_cache("k", counting_fetch(&calls, Ok("v1".into())), CacheStrategy::NetworkFirst, None)
            .await
            .unwrap();
        assert_eq!(value, "v1");

        let value = executor
            .with_cache(
                "k",
                counting_fetch(&calls, Err(SyncError::remote("offline"))),
                CacheStrategy::NetworkFirst,
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_network_first_without_cache_propagates() {
        let executor = create_executor();
        let calls = Arc::new(AtomicUsize::new(0));
        let err = executor
            .with_cache(
                "missing",
                counting_fetch(&calls, Err(SyncError::remote("boom"))),
                CacheStrategy::NetworkFirst,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote(ref msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn test_network_only_propagates_even_with_cache() {
        let executor = create_executor();
        let calls = Arc::new(AtomicUsize::new(0));
        executor.cache().set("k", &"cached", None).await;

        let err = executor
            .with_cache(
                "k",
                counting_fetch(&calls, Err(SyncError::remote("down"))),
                CacheStrategy::NetworkOnly,
                None,
            )
            .await;
        assert!(err.is_err());

        let value = executor
            .with_cache("k", counting_fetch(&calls, Ok("fresh".into())), CacheStrategy::NetworkOnly, None)
            .await
            .unwrap();
        assert_eq!(value, "fresh");
        assert_eq!(executor.cache().get::<String>("k").await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_cache_first_returns_cached_and_refreshes() {
        let executor = create_executor();
        let calls = Arc::new(AtomicUsize::new(0));

        // 无缓存时等同 NetworkOnly
        let value = executor
            .with_cache("k", counting_fetch(&calls, Ok("v1".into())), CacheStrategy::CacheFirst, None)
            .await
            .unwrap();
        assert_eq!(value, "v1");

        let value = executor
            .with_cache("k", counting_fetch(&calls, Ok("v2".into())), CacheStrategy::CacheFirst, None)
            .await
            .unwrap();
        assert_eq!(value, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let mut refreshed = None;
        for _ in 0..50 {
            refreshed = executor.cache().get::<String>("k").await;
            if refreshed.as_deref() == Some("v2") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(refreshed.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_cache_first_refresh_failure_keeps_cache() {
        let executor = create_executor();
        let calls = Arc::new(AtomicUsize::new(0));
        executor.cache().set("k", &"old", None).await;

        let value = executor
            .with_cache(
                "k",
                counting_fetch(&calls, Err(SyncError::remote("down"))),
                CacheStrategy::CacheFirst,
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, "old");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(executor.cache().get::<String>("k").await.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_default_strategy_and_ttl() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(CacheStore::new(storage, "cache_", "cache_metadata"));
        let executor = CacheExecutor::new(cache, CacheStrategy::CacheOnly, Some(1));
        executor.cache().set("k", &5u32, Some(60_000)).await;

        let value: u32 = executor
            .with_default_cache("k", || async { Ok(9u32) })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(CacheStrategy::default(), CacheStrategy::NetworkFirst);
        assert_eq!(serde_json::to_string(&CacheStrategy::CacheFirst).unwrap(), "\"CACHE_FIRST\"");
    }
}

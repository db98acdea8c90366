//! 同步核心主入口
//!
//! 分层结构：
//! ```text
//! SyncContext
//!   ├── KeyValueStorage (sled / 内存)
//!   ├── QueueStore + CacheStore (存储层)
//!   ├── CacheExecutor (读策略层)
//!   ├── ConnectivityObserver (网络层)
//!   ├── EventManager (事件层)
//!   ├── SyncCoordinator (同步层)
//!   └── LifecycleManager (生命周期)
//! ```
//!
//! 进程启动时构建一次，显式传给需要的模块，不使用全局单例。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::cache_strategy::{CacheExecutor, CacheStrategy};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::events::{EventManager, SyncEvent};
use crate::handler::MutationHandler;
use crate::lifecycle::{LifecycleManager, SyncLifecycleHook};
use crate::logging::init_logging;
use crate::mutation::{Mutation, MutationPayload};
use crate::network::{ConnectivityObserver, ConnectivityProvider};
use crate::remote::{register_remote_handlers, RemoteMutator};
use crate::storage::queue::{QueuePriority, RetryPolicy};
use crate::storage::{CacheStore, KeyValueStorage, KvStore, QueueStore};
use crate::sync::{DrainResult, SyncCoordinator};
use crate::version::SDK_VERSION;

/// 同步核心上下文
pub struct SyncContext {
    config: SyncConfig,
    storage: Arc<dyn KeyValueStorage>,
    queue: Arc<QueueStore>,
    cache: Arc<CacheStore>,
    executor: CacheExecutor,
    observer: Arc<ConnectivityObserver>,
    events: Arc<EventManager>,
    coordinator: Arc<SyncCoordinator>,
    lifecycle: RwLock<LifecycleManager>,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl SyncContext {
    /// 使用 sled 持久化存储初始化（`data_dir/kv`，按 `storage_namespace` 隔离）
    pub async fn initialize(
        config: SyncConfig,
        provider: Arc<dyn ConnectivityProvider>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let storage = KvStore::open(&config.data_dir, &config.storage_namespace).await?;
        Self::with_storage(config, Arc::new(storage), provider).await
    }

    /// 使用指定的存储后端初始化
    pub async fn with_storage(
        config: SyncConfig,
        storage: Arc<dyn KeyValueStorage>,
        provider: Arc<dyn ConnectivityProvider>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        if config.debug_mode && init_logging(true) {
            debug!("debug_mode 已开启，安装 DEBUG 日志输出");
        }
        info!("正在初始化同步核心 v{}...", SDK_VERSION);

        // === 第1层：存储 ===
        let keys = &config.storage_keys;
        let queue = Arc::new(QueueStore::new(storage.clone(), keys.sync_queue.clone()));
        let cache = Arc::new(CacheStore::new(
            storage.clone(),
            keys.cache_prefix.clone(),
            keys.cache_metadata.clone(),
        ));
        let executor = CacheExecutor::new(
            cache.clone(),
            config.default_cache_strategy,
            config.default_cache_ttl_ms,
        );

        // === 第2层：网络 ===
        let observer = Arc::new(ConnectivityObserver::new(provider));
        observer.start().await?;

        // === 第3层：事件 ===
        let events = Arc::new(EventManager::new(config.event_channel_capacity));

        // === 第4层：同步协调器 ===
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            cache.clone(),
            observer.clone(),
            events.clone(),
            RetryPolicy::new(config.max_retries),
            config.drain_item_delay(),
        ));

        // === 第5层：生命周期 ===
        let mut lifecycle = LifecycleManager::new();
        lifecycle.register_hook(Arc::new(SyncLifecycleHook::new(
            coordinator.clone(),
            config.auto_sync_interval(),
        )));

        let pending = queue.len().await.unwrap_or(0);
        info!("同步核心初始化完成，待同步条目: {}", pending);

        Ok(Arc::new(Self {
            config,
            storage,
            queue,
            cache,
            executor,
            observer,
            events,
            coordinator,
            lifecycle: RwLock::new(lifecycle),
        }))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<QueueStore> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn executor(&self) -> &CacheExecutor {
        &self.executor
    }

    pub fn observer(&self) -> &Arc<ConnectivityObserver> {
        &self.observer
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    // ========== handler ==========

    pub fn register_handler(&self, mutation_type: &str, handler: Arc<dyn MutationHandler>) {
        self.coordinator.register_handler(mutation_type, handler);
    }

    pub fn register_typed<M, F, Fut>(&self, f: F)
    where
        M: MutationPayload,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.coordinator.register_typed::<M, F, Fut>(f);
    }

    /// 把四种内置写操作接到同一个后端实现上
    pub fn register_remote<R: RemoteMutator + 'static>(&self, remote: Arc<R>) {
        register_remote_handlers(&self.coordinator, remote);
    }

    pub fn unregister_handler(&self, mutation_type: &str) -> bool {
        self.coordinator.unregister_handler(mutation_type)
    }

    // ========== 写 ==========

    /// 离线（或强制离线）时入队并返回条目 id；在线时返回 None
    ///
    /// `priority` 为 None 时使用该类型注册的默认优先级。
    pub async fn enqueue_if_offline(
        &self,
        mutation_type: &str,
        payload: Value,
        force_offline: bool,
        priority: Option<QueuePriority>,
    ) -> Result<Option<String>> {
        self.coordinator
            .enqueue_if_offline(mutation_type, payload, force_offline, priority)
            .await
    }

    pub async fn enqueue_mutation_if_offline(
        &self,
        mutation: Mutation,
        force_offline: bool,
    ) -> Result<Option<String>> {
        self.coordinator
            .enqueue_mutation_if_offline(mutation, force_offline)
            .await
    }

    // ========== 读 ==========

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
        self.executor.with_cache(key, fetch, strategy, ttl).await
    }

    pub async fn with_default_cache<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.executor.with_default_cache(key, fetch).await
    }

    // ========== 同步 ==========

    pub async fn is_online(&self) -> bool {
        self.observer.is_online().await
    }

    pub async fn drain_queue(&self) -> DrainResult {
        self.coordinator.drain_queue().await
    }

    pub async fn force_sync(&self) -> DrainResult {
        self.coordinator.force_sync().await
    }

    /// 按配置的周期启动定时同步
    pub fn start_auto_sync(&self) {
        self.coordinator.start_auto_sync(self.config.auto_sync_interval());
    }

    pub fn start_auto_sync_with_interval(&self, interval: Duration) {
        self.coordinator.start_auto_sync(interval);
    }

    pub fn stop_auto_sync(&self) {
        self.coordinator.stop_auto_sync();
    }

    /// 网络恢复时自动同步
    pub async fn start_connectivity_watch(&self) {
        self.coordinator.start_connectivity_watch().await;
    }

    pub fn stop_connectivity_watch(&self) {
        self.coordinator.stop_connectivity_watch();
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    // ========== 生命周期 ==========

    pub async fn on_app_foreground(&self) -> Result<()> {
        self.lifecycle.read().await.notify_foreground().await
    }

    pub async fn on_app_background(&self) -> Result<()> {
        self.lifecycle.read().await.notify_background().await
    }

    /// 注册宿主自己的生命周期 Hook
    pub async fn register_lifecycle_hook(&self, hook: Arc<dyn crate::lifecycle::LifecycleHook>) {
        self.lifecycle.write().await.register_hook(hook);
    }

    /// 停止所有后台任务
    pub async fn shutdown(&self) {
        info!("正在关闭同步核心...");
        self.coordinator.stop_auto_sync();
        self.coordinator.stop_connectivity_watch();
        self.observer.stop().await;
        info!("同步核心已关闭");
    }
}

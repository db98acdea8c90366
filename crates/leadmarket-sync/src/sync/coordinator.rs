use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::events::{EventManager, SyncEvent};
use crate::handler::MutationHandler;
use crate::mutation::{typed_handler, Mutation, MutationPayload};
use crate::network::ConnectivityObserver;
use crate::storage::queue::RetryPolicy;
use crate::storage::{ApplyOutcome, CacheStore, QueueEntry, QueuePriority, QueueStore};
use crate::sync::registry::HandlerRegistry;

/// 一轮 drain 的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainResult {
    /// 成功应用的条目数
    pub processed: usize,
    /// 本轮失败的条目数（包括被丢弃的）
    pub failed: usize,
}

/// drain 结束时释放 "正在 drain" 标记
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 同步协调器
///
/// 持有 handler 注册表，在线时把离线队列逐条应用到远端。
/// 同一进程内同一时刻最多只有一轮 drain。
#[derive(Debug)]
pub struct SyncCoordinator {
    queue: Arc<QueueStore>,
    cache: Arc<CacheStore>,
    observer: Arc<ConnectivityObserver>,
    events: Arc<EventManager>,
    registry: HandlerRegistry,
    retry_policy: RetryPolicy,
    /// 相邻两条之间的间隔，避免瞬间打满后端
    item_delay: Duration,
    draining: AtomicBool,
    auto_sync: Mutex<Option<JoinHandle<()>>>,
    connectivity_watch: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        queue: Arc<QueueStore>,
        cache: Arc<CacheStore>,
        observer: Arc<ConnectivityObserver>,
        events: Arc<EventManager>,
        retry_policy: RetryPolicy,
        item_delay: Duration,
    ) -> Self {
        Self {
            queue,
            cache,
            observer,
            events,
            registry: HandlerRegistry::new(),
            retry_policy,
            item_delay,
            draining: AtomicBool::new(false),
            auto_sync: Mutex::new(None),
            connectivity_watch: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &Arc<QueueStore> {
        &self.queue
    }

    pub fn observer(&self) -> &Arc<ConnectivityObserver> {
        &self.observer
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    // ========== handler 注册 ==========

    pub fn register_handler(&self, mutation_type: &str, handler: Arc<dyn MutationHandler>) {
        self.registry.register(mutation_type, handler);
    }

    /// 注册 `M::TYPE` 的强类型 handler，并启用入队前的 payload 校验
    pub fn register_typed<M, F, Fut>(&self, f: F)
    where
        M: MutationPayload,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.registry.register_typed::<M>(typed_handler::<M, F, Fut>(f));
    }

    /// 注册 `M::TYPE` 的 schema，handler 使用已有的实现
    pub fn register_typed_handler<M: MutationPayload>(&self, handler: Arc<dyn MutationHandler>) {
        self.registry.register_typed::<M>(handler);
    }

    pub fn unregister_handler(&self, mutation_type: &str) -> bool {
        self.registry.unregister(mutation_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.registry.types()
    }

    // ========== 入队 ==========

    /// 离线时入队，在线时返回 None 由调用方直接请求远端
    ///
    /// `force_offline` 为 true 时无论网络状态都入队。
    /// `priority` 为 None 时使用注册时的默认优先级。
    pub async fn enqueue_if_offline(
        &self,
        mutation_type: &str,
        payload: Value,
        force_offline: bool,
        priority: Option<QueuePriority>,
    ) -> Result<Option<String>> {
        if !force_offline && self.observer.is_online().await {
            return Ok(None);
        }

        self.registry.validate(mutation_type, &payload)?;
        let priority = priority.unwrap_or_else(|| self.registry.default_priority(mutation_type));

        let id = self.queue.enqueue(mutation_type, payload, priority).await?;
        self.events
            .emit(SyncEvent::Enqueued {
                id: id.clone(),
                mutation_type: mutation_type.to_string(),
                priority,
            })
            .await;
        Ok(Some(id))
    }

    /// 强类型版本的 [`Self::enqueue_if_offline`]
    pub async fn enqueue_mutation_if_offline(
        &self,
        mutation: Mutation,
        force_offline: bool,
    ) -> Result<Option<String>> {
        let (mutation_type, payload, priority) = mutation.into_parts()?;
        self.enqueue_if_offline(mutation_type, payload, force_offline, Some(priority))
            .await
    }

    // ========== drain ==========

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// 把当前队列逐条应用到远端
    ///
    /// 离线或已有一轮 drain 在进行时直接返回全 0。
    #[instrument(skip(self))]
    pub async fn drain_queue(&self) -> DrainResult {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("已有 drain 在进行，跳过");
            return DrainResult::default();
        }
        let _guard = DrainGuard(&self.draining);

        if !self.observer.is_online().await {
            debug!("当前离线，跳过 drain");
            return DrainResult::default();
        }

        let entries = match self.queue.list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("读取离线队列失败: {}", e);
                return DrainResult::default();
            }
        };
        if entries.is_empty() {
            self.cache.cleanup_expired().await;
            return DrainResult::default();
        }

        info!("开始 drain: {} 条待同步", entries.len());
        let mut result = DrainResult::default();

        for (index, entry) in entries.iter().enumerate() {
            if index > 0 && !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }

            let outcome = self
                .queue
                .apply_one(entry, &self.registry, self.retry_policy.max_retries)
                .await;
            if outcome.is_applied() {
                result.processed += 1;
            } else {
                result.failed += 1;
            }
            self.emit_outcome(entry, outcome).await;
        }

        let cleaned = self.cache.cleanup_expired().await;
        info!(
            "drain 完成: processed={}, failed={}, 清理过期缓存 {} 项",
            result.processed, result.failed, cleaned
        );
        self.events
            .emit(SyncEvent::DrainCompleted {
                processed: result.processed,
                failed: result.failed,
            })
            .await;
        result
    }

    async fn emit_outcome(&self, entry: &QueueEntry, outcome: ApplyOutcome) {
        let event = match outcome {
            ApplyOutcome::Applied => SyncEvent::EntryApplied {
                id: entry.id.clone(),
                mutation_type: entry.mutation_type.clone(),
            },
            ApplyOutcome::Retrying { retries, error } => SyncEvent::EntryRetrying {
                id: entry.id.clone(),
                mutation_type: entry.mutation_type.clone(),
                retries,
                error,
            },
            ApplyOutcome::Dropped { retries, error } => {
                let mut dropped = entry.clone();
                dropped.retries = retries;
                SyncEvent::EntryDropped { entry: dropped, error }
            }
        };
        self.events.emit(event).await;
    }

    /// 立即 drain 一次（"立即同步" 按钮）
    pub async fn force_sync(&self) -> DrainResult {
        info!("手动触发同步");
        self.drain_queue().await
    }

    // ========== 定时同步 ==========

    /// 启动定时 drain，已在运行时先停掉旧的
    ///
    /// 第一次 drain 发生在一个周期之后。任务只持有弱引用，协调器释放后自动退出。
    pub fn start_auto_sync(self: &Arc<Self>, period: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                let result = coordinator.drain_queue().await;
                if result.processed + result.failed > 0 {
                    debug!("定时同步: {:?}", result);
                }
            }
        });

        if let Some(old) = self.auto_sync.lock().replace(handle) {
            old.abort();
            debug!("旧的定时同步任务已替换");
        }
        info!("定时同步已启动: 周期 {:?}", period);
    }

    pub fn stop_auto_sync(&self) {
        if let Some(handle) = self.auto_sync.lock().take() {
            handle.abort();
            info!("定时同步已停止");
        }
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.auto_sync
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // ========== 网络恢复时同步 ==========

    /// 监听连通性，每次从离线变为在线时 drain 一次
    pub async fn start_connectivity_watch(self: &Arc<Self>) {
        let mut receiver = self.observer.subscribe_channel();
        let mut was_online = self.observer.is_online().await;
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let state = match receiver.recv().await {
                    Ok(state) => state,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("连通性事件积压，跳过 {} 条", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator
                    .events
                    .emit(SyncEvent::ConnectivityChanged { state })
                    .await;

                let online = state.is_online();
                if online && !was_online {
                    info!("网络已恢复，开始同步离线队列");
                    coordinator.drain_queue().await;
                }
                was_online = online;
            }
        });

        if let Some(old) = self.connectivity_watch.lock().replace(handle) {
            old.abort();
        }
    }

    pub fn stop_connectivity_watch(&self) {
        if let Some(handle) = self.connectivity_watch.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.auto_sync.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.connectivity_watch.get_mut().take() {
            handle.abort();
        }
    }
}

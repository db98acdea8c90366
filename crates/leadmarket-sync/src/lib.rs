//! LeadMarket Sync - 离线优先的同步核心
//!
//! 为服务需求撮合市场的客户端提供：
//! - 离线写操作队列：持久化、按优先级排序、有限重试
//! - 带 TTL 的读缓存和四种一致性策略
//! - 网络恢复 / 定时 / 手动触发的队列同步（单飞）
//! - 连通性观察与事件广播
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leadmarket_sync::{
//!     CacheStrategy, ManualConnectivityProvider, Mutation, ProfileUpdate, SyncConfig, SyncContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> leadmarket_sync::Result<()> {
//!     let config = SyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .storage_namespace("user_42")
//!         .build()?;
//!
//!     // 平台层把 NetInfo 一类的回调推给 provider
//!     let connectivity = Arc::new(ManualConnectivityProvider::new(false));
//!     let ctx = SyncContext::initialize(config, connectivity.clone()).await?;
//!
//!     // 每次启动都要重新注册 handler
//!     ctx.register_typed(|update: ProfileUpdate| async move {
//!         println!("PATCH /profiles/{}", update.user_id);
//!         Ok(())
//!     });
//!
//!     // 离线时入队，在线时返回 None，由调用方直接请求后端
//!     let queued = ctx
//!         .enqueue_mutation_if_offline(
//!             Mutation::UpdateProfile(ProfileUpdate {
//!                 user_id: "user_42".into(),
//!                 bio: Some("Licensed plumber".into()),
//!                 ..Default::default()
//!             }),
//!             false,
//!         )
//!         .await?;
//!     println!("queued: {:?}", queued);
//!
//!     // 网络恢复后 drain
//!     connectivity.set_online(true);
//!     let result = ctx.force_sync().await;
//!     println!("processed={}, failed={}", result.processed, result.failed);
//!
//!     // 读请求走缓存策略
//!     let leads: Vec<String> = ctx
//!         .with_cache("leads:open", || async { Ok(vec![]) }, CacheStrategy::CacheFirst, None)
//!         .await?;
//!     println!("{} leads", leads.len());
//!
//!     ctx.shutdown().await;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod cache_strategy;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod handler;
pub mod lifecycle;
pub mod logging;
pub mod mutation;
pub mod network;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;

// 重新导出核心类型，方便使用
pub use cache_strategy::{CacheExecutor, CacheStrategy};
pub use config::{StorageKeys, SyncConfig, SyncConfigBuilder};
pub use context::SyncContext;
pub use error::{Result, SyncError};
pub use events::{EventManager, EventStats, SyncEvent};
pub use handler::{handler_fn, HandlerLookup, MutationHandler};
pub use lifecycle::{LifecycleHook, LifecycleManager, SyncLifecycleHook};
pub use logging::init_logging;
pub use mutation::{
    typed_handler, validate_payload, ChatMessageDraft, Mutation, MutationPayload, ProfileUpdate,
    ProposalDraft, ServiceRequestDraft,
};
pub use network::{
    ConnectionType, ConnectivityObserver, ConnectivityProvider, ConnectivityState,
    ConnectivitySubscription, ManualConnectivityProvider,
};
pub use remote::{register_remote_handlers, RemoteHandler, RemoteMutator};
pub use storage::{
    ApplyOutcome, CacheEntry, CacheStore, KeyValueStorage, KvStore, MemoryStorage, QueueEntry,
    QueuePriority, QueueStats, QueueStore,
};
pub use sync::{DrainResult, HandlerRegistry, SyncCoordinator};
pub use version::SDK_VERSION;

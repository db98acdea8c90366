//! 生命周期管理
//!
//! 管理 App 前后台切换等一级生命周期事件，统一触发各模块的状态切换。

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// 生命周期回调 Hook
///
/// 各模块通过实现此 trait 来响应生命周期变化
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// App 切换到后台时调用
    async fn on_background(&self) -> Result<()>;

    /// App 切换到前台时调用
    async fn on_foreground(&self) -> Result<()>;
}

/// 生命周期管理器
#[derive(Default)]
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 通知所有 Hook：App 切换到后台
    ///
    /// 按注册顺序执行，某个 Hook 失败会记录错误但继续执行其他 Hook，最后返回第一个错误
    pub async fn notify_background(&self) -> Result<()> {
        info!("通知所有模块：App 切换到后台");

        let mut first_error = None;
        let mut failed = 0usize;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_background().await {
                warn!("Hook #{} 后台切换失败: {}", index, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            warn!("{} 个模块后台切换失败，但所有模块都已尝试执行", failed);
            return Err(e);
        }
        info!("所有模块后台切换完成");
        Ok(())
    }

    /// 通知所有 Hook：App 切换到前台
    pub async fn notify_foreground(&self) -> Result<()> {
        info!("通知所有模块：App 切换到前台");

        let mut first_error = None;
        let mut failed = 0usize;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_foreground().await {
                warn!("Hook #{} 前台切换失败: {}", index, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            warn!("{} 个模块前台切换失败，但所有模块都已尝试执行", failed);
            return Err(e);
        }
        info!("所有模块前台切换完成");
        Ok(())
    }
}

// 同步模块 Hook（SyncContext 初始化时自动注册）
mod sync_hook;
pub use sync_hook::SyncLifecycleHook;

//! 同步模块生命周期 Hook
//!
//! 回到前台时恢复定时同步并立即同步一次，进入后台时停掉定时器。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::lifecycle::LifecycleHook;
use crate::sync::SyncCoordinator;

pub struct SyncLifecycleHook {
    coordinator: Arc<SyncCoordinator>,
    interval: Duration,
}

impl SyncLifecycleHook {
    pub fn new(coordinator: Arc<SyncCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }
}

#[async_trait]
impl LifecycleHook for SyncLifecycleHook {
    async fn on_background(&self) -> Result<()> {
        info!("[Sync Hook] App 切换到后台，停止定时同步");
        self.coordinator.stop_auto_sync();
        Ok(())
    }

    async fn on_foreground(&self) -> Result<()> {
        info!("[Sync Hook] App 回到前台，恢复定时同步");
        self.coordinator.start_auto_sync(self.interval);
        let result = self.coordinator.force_sync().await;
        info!(
            "[Sync Hook] 前台同步完成: processed={}, failed={}",
            result.processed, result.failed
        );
        Ok(())
    }
}

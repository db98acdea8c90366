//! 网络连通性观察
//!
//! 平台层（Android/iOS/Web 宿主）实现 [`ConnectivityProvider`]，
//! [`ConnectivityObserver`] 在其上提供在线判断、状态快照和订阅。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

pub mod manual;

pub use manual::ManualConnectivityProvider;

/// 网络类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Bluetooth,
    Wimax,
    Vpn,
    Other,
    None,
    #[default]
    Unknown,
}

/// 连通性快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityState {
    pub is_connected: bool,
    /// None 表示平台还不知道能否访问互联网
    pub is_internet_reachable: Option<bool>,
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
}

impl ConnectivityState {
    pub fn online(connection_type: ConnectionType) -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
            connection_type,
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
            connection_type: ConnectionType::None,
        }
    }

    /// 已连接，且可达性不是明确的 false（未知按在线处理）
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Some(false)
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: None,
            connection_type: ConnectionType::Unknown,
        }
    }
}

/// 平台连通性来源（由宿主实现）
#[async_trait]
pub trait ConnectivityProvider: Send + Sync + std::fmt::Debug {
    /// 查询当前状态
    async fn current_state(&self) -> ConnectivityState;

    /// 开始监听状态变化
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<ConnectivityState>>;

    /// 停止监听
    async fn stop_monitoring(&self);
}

/// 连通性观察者
#[derive(Debug)]
pub struct ConnectivityObserver {
    provider: Arc<dyn ConnectivityProvider>,
    state_sender: broadcast::Sender<ConnectivityState>,
    last_known: Arc<RwLock<Option<ConnectivityState>>>,
    forward_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityObserver {
    pub fn new(provider: Arc<dyn ConnectivityProvider>) -> Self {
        Self::with_capacity(provider, 64)
    }

    pub fn with_capacity(provider: Arc<dyn ConnectivityProvider>, capacity: usize) -> Self {
        let (state_sender, _) = broadcast::channel(capacity.max(1));
        Self {
            provider,
            state_sender,
            last_known: Arc::new(RwLock::new(None)),
            forward_task: parking_lot::Mutex::new(None),
        }
    }

    /// 启动监听：把平台推送的状态转发给所有订阅者
    ///
    /// 重复调用会替换之前的转发任务。
    pub async fn start(&self) -> Result<()> {
        let mut receiver = self.provider.start_monitoring().await?;
        let state_sender = self.state_sender.clone();
        let last_known = self.last_known.clone();

        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(state) => {
                        *last_known.write().await = Some(state);
                        debug!("连通性变化: online={}, type={:?}", state.is_online(), state.connection_type);
                        // 没有订阅者时 send 失败属正常情况
                        let _ = state_sender.send(state);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("连通性事件积压，跳过 {} 条", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(old) = self.forward_task.lock().replace(handle) {
            old.abort();
        }
        info!("连通性监听已启动");
        Ok(())
    }

    /// 停止监听
    pub async fn stop(&self) {
        if let Some(handle) = self.forward_task.lock().take() {
            handle.abort();
        }
        self.provider.stop_monitoring().await;
        info!("连通性监听已停止");
    }

    /// 当前是否在线（向平台查询一次）
    pub async fn is_online(&self) -> bool {
        self.get_state().await.is_online()
    }

    /// 当前连通性快照
    pub async fn get_state(&self) -> ConnectivityState {
        self.provider.current_state().await
    }

    /// 最近一次推送的状态，尚未收到推送时为 None
    pub async fn last_known_state(&self) -> Option<ConnectivityState> {
        *self.last_known.read().await
    }

    /// 原始广播接收端
    pub fn subscribe_channel(&self) -> broadcast::Receiver<ConnectivityState> {
        self.state_sender.subscribe()
    }

    /// 注册回调，每次推送都会调用（不去重）
    ///
    /// 返回的句柄 drop 或调用 `unsubscribe` 后回调停止。
    pub fn subscribe<F>(&self, callback: F) -> ConnectivitySubscription
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        let mut receiver = self.state_sender.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(state) => callback(state),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        ConnectivitySubscription { handle: Some(handle) }
    }
}

impl Drop for ConnectivityObserver {
    fn drop(&mut self) {
        if let Some(handle) = self.forward_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// 订阅句柄
#[derive(Debug)]
pub struct ConnectivitySubscription {
    handle: Option<JoinHandle<()>>,
}

impl ConnectivitySubscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ConnectivitySubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::network::{ConnectionType, ConnectivityProvider, ConnectivityState};

/// 由宿主手动推送状态的连通性来源
///
/// 用于把平台回调（NetInfo / ConnectivityManager 等）桥接进来，也用作测试替身。
#[derive(Debug, Clone)]
pub struct ManualConnectivityProvider {
    state: Arc<RwLock<ConnectivityState>>,
    sender: Arc<RwLock<Option<broadcast::Sender<ConnectivityState>>>>,
}

impl ManualConnectivityProvider {
    pub fn new(online: bool) -> Self {
        Self::with_state(Self::state_for(online))
    }

    pub fn with_state(state: ConnectivityState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            sender: Arc::new(RwLock::new(None)),
        }
    }

    fn state_for(online: bool) -> ConnectivityState {
        if online {
            ConnectivityState::online(ConnectionType::Wifi)
        } else {
            ConnectivityState::offline()
        }
    }

    /// 更新状态，监听中时推送给观察者
    pub fn set_state(&self, state: ConnectivityState) {
        *self.state.write() = state;
        if let Some(sender) = self.sender.read().as_ref() {
            if sender.send(state).is_err() {
                debug!("连通性状态无人接收");
            }
        }
    }

    pub fn set_online(&self, online: bool) {
        self.set_state(Self::state_for(online));
    }

    pub fn is_monitoring(&self) -> bool {
        self.sender.read().is_some()
    }
}

impl Default for ManualConnectivityProvider {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConnectivityProvider for ManualConnectivityProvider {
    async fn current_state(&self) -> ConnectivityState {
        *self.state.read()
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<ConnectivityState>> {
        let mut sender = self.sender.write();
        let receiver = match sender.as_ref() {
            Some(existing) => existing.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(16);
                *sender = Some(tx);
                rx
            }
        };
        Ok(receiver)
    }

    async fn stop_monitoring(&self) {
        *self.sender.write() = None;
    }
}

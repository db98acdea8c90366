//! 后端写能力的适配层
//!
//! 宿主只需要实现一个 [`RemoteMutator`]（通常是对后端 RPC / REST 的薄封装），
//! [`register_remote_handlers`] 会把四种内置写操作都接到它上面。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::handler::MutationHandler;
use crate::mutation::{ChatMessageDraft, MutationPayload, ProfileUpdate, ProposalDraft, ServiceRequestDraft};
use crate::sync::SyncCoordinator;

/// 后端提供的写能力
#[async_trait]
pub trait RemoteMutator: Send + Sync {
    async fn apply(&self, mutation_type: &str, payload: &Value) -> Result<()>;
}

/// 把某一个 type 的条目转发给 [`RemoteMutator`]
pub struct RemoteHandler<R: ?Sized> {
    mutation_type: String,
    remote: Arc<R>,
}

impl<R: RemoteMutator + ?Sized> RemoteHandler<R> {
    pub fn new(mutation_type: impl Into<String>, remote: Arc<R>) -> Self {
        Self {
            mutation_type: mutation_type.into(),
            remote,
        }
    }
}

#[async_trait]
impl<R: RemoteMutator + ?Sized> MutationHandler for RemoteHandler<R> {
    async fn apply(&self, payload: &Value) -> Result<()> {
        debug!("转发到远端: type={}", self.mutation_type);
        self.remote.apply(&self.mutation_type, payload).await
    }
}

fn register_one<M: MutationPayload, R: RemoteMutator + ?Sized + 'static>(
    coordinator: &SyncCoordinator,
    remote: &Arc<R>,
) {
    coordinator.register_typed_handler::<M>(Arc::new(RemoteHandler::new(M::TYPE, remote.clone())));
}

/// 把四种内置写操作注册到同一个远端实现上（带 payload 校验）
pub fn register_remote_handlers<R: RemoteMutator + ?Sized + 'static>(
    coordinator: &SyncCoordinator,
    remote: Arc<R>,
) {
    register_one::<ServiceRequestDraft, R>(coordinator, &remote);
    register_one::<ChatMessageDraft, R>(coordinator, &remote);
    register_one::<ProposalDraft, R>(coordinator, &remote);
    register_one::<ProfileUpdate, R>(coordinator, &remote);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::events::EventManager;
    use crate::mutation::BUILTIN_MUTATION_TYPES;
    use crate::network::{ConnectivityObserver, ManualConnectivityProvider};
    use crate::storage::queue::RetryPolicy;
    use crate::storage::{CacheStore, MemoryStorage, QueueStore};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRemote {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl RemoteMutator for RecordingRemote {
        async fn apply(&self, mutation_type: &str, payload: &Value) -> Result<()> {
            if payload.get("fail").is_some() {
                return Err(SyncError::remote("rejected"));
            }
            self.calls.lock().push((mutation_type.to_string(), payload.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_remote_handler_forwards_type() {
        let remote = Arc::new(RecordingRemote::default());
        let handler = RemoteHandler::new("update_profile", remote.clone());

        handler.apply(&json!({"userId": "u1"})).await.unwrap();
        assert!(handler.apply(&json!({"fail": true})).await.is_err());

        let calls = remote.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "update_profile");
    }

    #[tokio::test]
    async fn test_register_remote_handlers() {
        let storage = Arc::new(MemoryStorage::new());
        let coordinator = SyncCoordinator::new(
            Arc::new(QueueStore::new(storage.clone(), "sync_queue")),
            Arc::new(CacheStore::new(storage, "cache_", "cache_metadata")),
            Arc::new(ConnectivityObserver::new(Arc::new(ManualConnectivityProvider::new(true)))),
            Arc::new(EventManager::new(16)),
            RetryPolicy::default(),
            Duration::ZERO,
        );
        register_remote_handlers(&coordinator, Arc::new(RecordingRemote::default()));

        let mut expected: Vec<String> = BUILTIN_MUTATION_TYPES.iter().map(|t| t.to_string()).collect();
        expected.sort();
        assert_eq!(coordinator.registered_types(), expected);
    }
}

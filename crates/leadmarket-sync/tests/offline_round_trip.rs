//! 端到端：离线入队 -> 网络恢复 -> drain

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadmarket_sync::{
    handler_fn, CacheStrategy, ChatMessageDraft, DrainResult, ManualConnectivityProvider,
    MemoryStorage, Mutation, ProposalDraft, RemoteMutator, SyncConfig, SyncContext, SyncError,
    SyncEvent,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

fn config(dir: &TempDir) -> SyncConfig {
    SyncConfig::builder()
        .data_dir(dir.path())
        .storage_namespace("client_7")
        .drain_item_delay_ms(0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn offline_round_trip() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let connectivity = Arc::new(ManualConnectivityProvider::new(false));
    let ctx = SyncContext::initialize(config(&dir), connectivity.clone()).await?;

    assert!(!ctx.is_online().await);
    let id = ctx.enqueue_if_offline("X", json!({"a": 1}), false, None).await?;
    assert!(id.is_some());

    let entries = ctx.queue().list().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].mutation_type, "X");

    connectivity.set_online(true);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    ctx.register_handler(
        "X",
        handler_fn(move |payload| {
            let counter = counter.clone();
            async move {
                assert_eq!(payload, json!({"a": 1}));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    );

    let result = ctx.drain_queue().await;
    assert_eq!(result, DrainResult { processed: 1, failed: 0 });
    assert!(ctx.queue().list().await?.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    ctx.shutdown().await;
    Ok(())
}

#[derive(Default)]
struct FlakyBackend {
    applied: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl RemoteMutator for FlakyBackend {
    async fn apply(&self, mutation_type: &str, payload: &Value) -> leadmarket_sync::Result<()> {
        if mutation_type == "create_proposal" && payload["creditsSpent"].as_u64() == Some(0) {
            return Err(SyncError::remote("proposal requires credits"));
        }
        self.applied.lock().push((mutation_type.to_string(), payload.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn remote_backend_with_priorities_and_drops() -> anyhow::Result<()> {
    let connectivity = Arc::new(ManualConnectivityProvider::new(false));
    let ctx = SyncContext::with_storage(
        SyncConfig::builder().drain_item_delay_ms(0).max_retries(1).build()?,
        Arc::new(MemoryStorage::new()),
        connectivity.clone(),
    )
    .await?;
    let backend = Arc::new(FlakyBackend::default());
    ctx.register_remote(backend.clone());
    let mut events = ctx.subscribe_events();

    ctx.enqueue_mutation_if_offline(
        Mutation::SendMessage(ChatMessageDraft {
            conversation_id: "conv-1".into(),
            sender_id: "pro-3".into(),
            content: "Available Thursday".into(),
            attachments: vec![],
        }),
        false,
    )
    .await?;
    ctx.enqueue_mutation_if_offline(
        Mutation::CreateProposal(ProposalDraft {
            lead_id: "lead-5".into(),
            professional_id: "pro-3".into(),
            price: 180.0,
            message: "Fixed price".into(),
            credits_spent: 0,
        }),
        false,
    )
    .await?;

    // 未知结构在入队时就被拒绝
    let err = ctx
        .enqueue_if_offline("create_service_request", json!({"title": 3}), false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidPayload { .. }));

    let order: Vec<String> = ctx.queue().list().await?.into_iter().map(|e| e.mutation_type).collect();
    assert_eq!(order, vec!["create_proposal", "send_message"]);

    connectivity.set_online(true);
    let result = ctx.force_sync().await;
    assert_eq!(result, DrainResult { processed: 1, failed: 1 });
    assert!(ctx.queue().list().await?.is_empty());
    assert_eq!(backend.applied.lock().len(), 1);

    let mut dropped = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::EntryDropped { entry, .. } = event {
            dropped.push(entry.mutation_type);
        }
    }
    assert_eq!(dropped, vec!["create_proposal"]);
    Ok(())
}

#[tokio::test]
async fn reconnect_triggers_drain() -> anyhow::Result<()> {
    let connectivity = Arc::new(ManualConnectivityProvider::new(false));
    let ctx = SyncContext::with_storage(
        SyncConfig::builder().drain_item_delay_ms(0).build()?,
        Arc::new(MemoryStorage::new()),
        connectivity.clone(),
    )
    .await?;
    ctx.register_handler("ping", handler_fn(|_| async { Ok(()) }));
    ctx.enqueue_if_offline("ping", json!(null), false, None).await?;
    ctx.start_connectivity_watch().await;

    connectivity.set_online(true);
    let mut drained = false;
    for _ in 0..100 {
        if ctx.queue().list().await?.is_empty() {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(drained);
    ctx.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn cached_reads_survive_outage() -> anyhow::Result<()> {
    let connectivity = Arc::new(ManualConnectivityProvider::new(true));
    let ctx = SyncContext::with_storage(
        SyncConfig::default(),
        Arc::new(MemoryStorage::new()),
        connectivity,
    )
    .await?;

    let fresh: Vec<String> = ctx
        .with_cache("leads:open", || async { Ok(vec!["lead-1".to_string()]) }, CacheStrategy::NetworkFirst, None)
        .await?;
    assert_eq!(fresh, vec!["lead-1"]);

    let fallback: Vec<String> = ctx
        .with_cache(
            "leads:open",
            || async { Err(SyncError::remote("timeout")) },
            CacheStrategy::NetworkFirst,
            None,
        )
        .await?;
    assert_eq!(fallback, fresh);

    let err = ctx
        .with_cache::<Vec<String>, _, _>("leads:closed", || async { Ok(vec![]) }, CacheStrategy::CacheOnly, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::CacheMiss(_)));
    Ok(())
}

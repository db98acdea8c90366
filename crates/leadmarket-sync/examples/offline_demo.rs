//! 离线同步演示
//!
//! 模拟网络断开时提交报价和发消息，恢复网络后自动同步。

use std::sync::Arc;

use async_trait::async_trait;
use leadmarket_sync::{
    init_logging, ChatMessageDraft, ManualConnectivityProvider, Mutation, ProposalDraft,
    RemoteMutator, SyncConfig, SyncContext, SyncEvent,
};
use serde_json::Value;
use tokio::time::{sleep, Duration};

/// 假后端：打印收到的写操作
struct PrintingBackend;

#[async_trait]
impl RemoteMutator for PrintingBackend {
    async fn apply(&self, mutation_type: &str, payload: &Value) -> leadmarket_sync::Result<()> {
        println!("  -> backend.{}({})", mutation_type, payload);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SyncConfig::builder()
        .data_dir(std::env::temp_dir().join("leadmarket_offline_demo"))
        .storage_namespace("pro_3")
        .debug_mode(false)
        .build()?;
    init_logging(config.debug_mode);

    println!("========================================");
    println!("离线同步演示");
    println!("========================================\n");

    let connectivity = Arc::new(ManualConnectivityProvider::new(false));
    let ctx = SyncContext::initialize(config, connectivity.clone()).await?;
    ctx.register_remote(Arc::new(PrintingBackend));

    let mut events = ctx.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::EntryDropped { entry, error } => {
                    println!("  !! 已丢弃 {}: {}", entry.mutation_type, error)
                }
                SyncEvent::DrainCompleted { processed, failed } => {
                    println!("  == drain 完成: processed={}, failed={}", processed, failed)
                }
                other => println!("  .. {}", other.event_type()),
            }
        }
    });
    ctx.start_connectivity_watch().await;

    // === 1. 离线提交 ===
    println!("1. 网络断开，提交报价和消息");
    ctx.enqueue_mutation_if_offline(
        Mutation::SendMessage(ChatMessageDraft {
            conversation_id: "conv-12".into(),
            sender_id: "pro_3".into(),
            content: "I can come by tomorrow at 9".into(),
            attachments: vec![],
        }),
        false,
    )
    .await?;
    ctx.enqueue_mutation_if_offline(
        Mutation::CreateProposal(ProposalDraft {
            lead_id: "lead-88".into(),
            professional_id: "pro_3".into(),
            price: 320.0,
            message: "Includes parts".into(),
            credits_spent: 2,
        }),
        false,
    )
    .await?;

    let stats = ctx.queue().stats().await?;
    println!("   队列: {} 条 {:?}\n", stats.total, stats.count_by_priority);

    // === 2. 恢复网络 ===
    println!("2. 网络恢复");
    connectivity.set_online(true);
    sleep(Duration::from_millis(500)).await;

    println!("\n   剩余: {} 条", ctx.queue().len().await?);
    ctx.shutdown().await;
    Ok(())
}

//! 事件系统模块 - 向 UI 层广播同步过程中的事件
//!
//! 功能包括：
//! - 入队 / 应用成功 / 等待重试 / 丢弃 事件
//! - 一轮 drain 结束的汇总
//! - 连通性变化
//! - 广播订阅和按类型注册监听器

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::network::ConnectivityState;
use crate::storage::{QueueEntry, QueuePriority};
use crate::utils::now_millis;

/// 同步事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// 写操作已进入离线队列
    Enqueued {
        id: String,
        mutation_type: String,
        priority: QueuePriority,
    },
    /// 队列条目已成功应用到远端
    EntryApplied { id: String, mutation_type: String },
    /// 应用失败，条目保留等待下一轮
    EntryRetrying {
        id: String,
        mutation_type: String,
        retries: u32,
        error: String,
    },
    /// 重试次数耗尽，条目已从队列删除
    ///
    /// 携带完整条目，宿主可以据此提示用户或自行保存。
    EntryDropped { entry: QueueEntry, error: String },
    /// 一轮 drain 完成
    DrainCompleted { processed: usize, failed: usize },
    /// 连通性变化
    ConnectivityChanged { state: ConnectivityState },
}

impl SyncEvent {
    /// 事件类型名，用于监听器分组和统计
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::Enqueued { .. } => "enqueued",
            SyncEvent::EntryApplied { .. } => "entry_applied",
            SyncEvent::EntryRetrying { .. } => "entry_retrying",
            SyncEvent::EntryDropped { .. } => "entry_dropped",
            SyncEvent::DrainCompleted { .. } => "drain_completed",
            SyncEvent::ConnectivityChanged { .. } => "connectivity_changed",
        }
    }

    /// 关联的队列条目 ID
    pub fn entry_id(&self) -> Option<&str> {
        match self {
            SyncEvent::Enqueued { id, .. }
            | SyncEvent::EntryApplied { id, .. }
            | SyncEvent::EntryRetrying { id, .. } => Some(id),
            SyncEvent::EntryDropped { entry, .. } => Some(&entry.id),
            _ => None,
        }
    }
}

type EventListener = Box<dyn Fn(&SyncEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub listener_count: usize,
    /// 最后事件时间（毫秒）
    pub last_event_time: Option<i64>,
}

/// 事件管理器
pub struct EventManager {
    sender: broadcast::Sender<SyncEvent>,
    /// 事件类型 -> 监听器，"*" 表示所有事件
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type().to_string()).or_insert(0) += 1;
            stats.last_event_time = Some(now_millis());
        }

        // 没有订阅者时 send 会失败，属正常场景（无 UI 的宿主）
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners = self.listeners.read().await;
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 添加事件监听器，`event_type` 传 "*" 监听全部
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(event_type.to_string())
            .or_insert_with(Vec::new)
            .push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    pub async fn clear_listeners(&self) {
        let mut listeners = self.listeners.write().await;
        listeners.clear();

        let mut stats = self.stats.write().await;
        stats.listener_count = 0;

        info!("Cleared all event listeners");
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn applied(id: &str) -> SyncEvent {
        SyncEvent::EntryApplied {
            id: id.to_string(),
            mutation_type: "send_message".to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_manager() {
        let manager = EventManager::new(100);
        let mut receiver = manager.subscribe();

        manager.emit(applied("e1")).await;

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "entry_applied");
        assert_eq!(received.entry_id(), Some("e1"));

        let stats = manager.get_stats().await;
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.events_by_type.get("entry_applied"), Some(&1));
        assert!(stats.last_event_time.is_some());
    }

    #[tokio::test]
    async fn test_event_listeners() {
        let manager = EventManager::new(100);
        let typed = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));

        let typed_clone = typed.clone();
        manager
            .add_listener("drain_completed", move |_event| {
                typed_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        let all_clone = all.clone();
        manager
            .add_listener("*", move |_event| {
                all_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(manager.get_stats().await.listener_count, 2);

        manager.emit(applied("e1")).await;
        manager.emit(SyncEvent::DrainCompleted { processed: 1, failed: 0 }).await;

        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);

        manager.clear_listeners().await;
        manager.emit(applied("e2")).await;
        assert_eq!(all.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_event_carries_entry() {
        let entry = QueueEntry::new("create_proposal", json!({"leadId": "l1"}), QueuePriority::CRITICAL);
        let event = SyncEvent::EntryDropped {
            entry: entry.clone(),
            error: "Remote error: insufficient credits".to_string(),
        };
        assert_eq!(event.entry_id(), Some(entry.id.as_str()));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "entry_dropped");
        assert_eq!(value["entry"]["type"], "create_proposal");
    }
}

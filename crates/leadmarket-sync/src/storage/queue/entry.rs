use std::cmp::Ordering;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::queue::priority::QueuePriority;
use crate::utils::now_millis;

/// 待同步的写操作
///
/// 持久化格式为 camelCase JSON，`type` 字段决定由哪个 handler 应用；
/// payload 原样存取，队列本身不校验其结构。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub mutation_type: String,
    pub payload: Value,
    /// 入队时间（UTC 毫秒）
    pub created_at: i64,
    /// 已失败的应用次数
    pub retries: u32,
    pub priority: QueuePriority,
}

impl QueueEntry {
    /// 创建新的队列条目
    pub fn new(mutation_type: impl Into<String>, payload: Value, priority: QueuePriority) -> Self {
        Self {
            id: generate_entry_id(),
            mutation_type: mutation_type.into(),
            payload,
            created_at: now_millis(),
            retries: 0,
            priority,
        }
    }

    /// 队列排序规则
    ///
    /// 1. 优先级高的排前面
    /// 2. 相同优先级下，入队早的排前面
    pub fn cmp_queue_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
    }

    /// 获取条目年龄 (毫秒)
    pub fn age_ms(&self) -> i64 {
        now_millis().saturating_sub(self.created_at)
    }

    /// 获取条目的详细信息字符串
    pub fn details(&self) -> String {
        format!(
            "QueueEntry(id={}, type={}, priority={}, retries={}, age={}ms)",
            self.id,
            self.mutation_type,
            self.priority,
            self.retries,
            self.age_ms()
        )
    }
}

/// 按队列规则排序（稳定排序，完全相同的键保持插入顺序）
pub fn sort_queue(entries: &mut [QueueEntry]) {
    entries.sort_by(|a, b| a.cmp_queue_order(b));
}

/// 生成条目 ID：毫秒时间戳 + 9 位随机小写字母数字
///
/// 大致按时间有序，且不依赖中心化序列。
pub fn generate_entry_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{}-{}", now_millis(), suffix)
}

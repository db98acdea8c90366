use serde::{Deserialize, Serialize};
use std::fmt;

/// 队列优先级
///
/// 数值越大越紧急。业务上目前只用到 0-2，但设计上不设上限，
/// 调用方可以直接构造 `QueuePriority(n)`。
///
/// - Normal (0): 普通写操作（资料更新等）
/// - High (1): 用户直接感知的操作（发消息、发布需求）
/// - Critical (2): 涉及积分扣减等必须尽快落地的操作（提交报价）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct QueuePriority(pub u32);

impl QueuePriority {
    pub const NORMAL: QueuePriority = QueuePriority(0);
    pub const HIGH: QueuePriority = QueuePriority(1);
    pub const CRITICAL: QueuePriority = QueuePriority(2);

    /// 获取优先级的数值
    pub fn value(&self) -> u32 {
        self.0
    }

    /// 获取优先级的英文名称
    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "normal",
            1 => "high",
            2 => "critical",
            _ => "custom",
        }
    }

    /// 检查是否为高优先级（High 及以上）
    pub fn is_high_priority(&self) -> bool {
        *self >= QueuePriority::HIGH
    }

    /// 检查 self 是否比 other 更紧急
    pub fn is_more_urgent_than(&self, other: QueuePriority) -> bool {
        self.0 > other.0
    }
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl From<u32> for QueuePriority {
    fn from(value: u32) -> Self {
        QueuePriority(value)
    }
}

impl From<QueuePriority> for u32 {
    fn from(priority: QueuePriority) -> Self {
        priority.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(QueuePriority::CRITICAL > QueuePriority::HIGH);
        assert!(QueuePriority::HIGH > QueuePriority::NORMAL);
        assert!(QueuePriority(7).is_more_urgent_than(QueuePriority::CRITICAL));
        assert_eq!(QueuePriority::default(), QueuePriority::NORMAL);
    }

    #[test]
    fn test_priority_helpers() {
        assert!(QueuePriority::CRITICAL.is_high_priority());
        assert!(QueuePriority::HIGH.is_high_priority());
        assert!(!QueuePriority::NORMAL.is_high_priority());
        assert_eq!(QueuePriority(9).name(), "custom");
        assert_eq!(QueuePriority::HIGH.to_string(), "high(1)");
    }

    #[test]
    fn test_priority_serializes_as_plain_integer() {
        assert_eq!(serde_json::to_string(&QueuePriority::CRITICAL).unwrap(), "2");
        let p: QueuePriority = serde_json::from_str("5").unwrap();
        assert_eq!(p, QueuePriority(5));
    }
}

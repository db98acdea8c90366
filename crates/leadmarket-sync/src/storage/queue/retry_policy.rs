use serde::{Deserialize, Serialize};

/// 重试策略配置
///
/// 失败的条目不会无限重试：累计失败次数达到 `max_retries` 时直接丢弃，
/// 防止一个永久失败的 handler 让队列无限增长。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// 失败次数达到上限后放弃
    pub fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}

/// 单个条目应用一次的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    /// 远端应用成功，条目已移除
    Applied,
    /// 失败，条目保留等待下一轮
    Retrying { retries: u32, error: String },
    /// 失败次数耗尽，条目已被丢弃
    Dropped { retries: u32, error: String },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, ApplyOutcome::Dropped { .. })
    }

    /// 失败时的错误信息
    pub fn error(&self) -> Option<&str> {
        match self {
            ApplyOutcome::Applied => None,
            ApplyOutcome::Retrying { error, .. } | ApplyOutcome::Dropped { error, .. } => {
                Some(error.as_str())
            }
        }
    }
}

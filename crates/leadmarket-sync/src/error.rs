use thiserror::Error;

/// 同步核心的统一错误类型
#[derive(Debug, Error)]
pub enum SyncError {
    /// 本地 KV 存储读写失败
    #[error("Storage error: {0}")]
    Storage(String),

    /// 序列化 / 反序列化失败
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    /// CacheOnly 策略下缓存不存在或已过期
    #[error("Not found in cache: {0}")]
    CacheMiss(String),

    /// 远端（后端）返回的错误，由 handler / fetch 抛出
    #[error("Remote error: {0}")]
    Remote(String),

    /// 队列条目的 type 没有注册 handler
    #[error("No handler registered for mutation type: {0}")]
    HandlerNotFound(String),

    /// payload 与已注册的 schema 不匹配
    #[error("Invalid payload for {mutation_type}: {reason}")]
    InvalidPayload {
        mutation_type: String,
        reason: String,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        SyncError::Io(error.to_string())
    }
}

impl From<sled::Error> for SyncError {
    fn from(error: sled::Error) -> Self {
        SyncError::Storage(error.to_string())
    }
}

impl SyncError {
    /// 便捷构造远端错误（handler / fetch 适配层使用）
    pub fn remote<S: Into<String>>(message: S) -> Self {
        SyncError::Remote(message.into())
    }

    /// 是否为存储层错误
    pub fn is_storage_error(&self) -> bool {
        matches!(self, SyncError::Storage(_) | SyncError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

//! 离线队列同步模块
//!
//! 职责：
//! - 管理 mutation type -> handler 的内存注册表
//! - 在线时 drain 离线队列（单飞，逐条应用，有限重试）
//! - 定时同步与网络恢复时同步
//! - 入队前的 payload 校验

pub mod coordinator;
pub mod registry;

pub use coordinator::{DrainResult, SyncCoordinator};
pub use registry::HandlerRegistry;

//! 日志初始化
//!
//! 库本身只通过 `tracing` 宏打日志；宿主如果没有自己的 subscriber，可以调用
//! [`init_logging`] 装一个默认的 fmt 输出。

use tracing::Level;

/// 安装全局 fmt subscriber
///
/// `debug_mode` 为 true 时输出 DEBUG 级别。已经装过 subscriber 时返回 false，不会 panic。
pub fn init_logging(debug_mode: bool) -> bool {
    let level = if debug_mode { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}

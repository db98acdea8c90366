//! Mutation handler 抽象
//!
//! handler 负责把某一种 `type` 的队列条目真正写到远端。它们闭包捕获的是活的
//! 后端连接对象，无法序列化，所以只存在于内存注册表中，每次进程启动都要重新注册。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// 把一条队列 payload 应用到远端
///
/// 返回 Err 即视为本次应用失败，由队列的有限重试机制接管。
#[async_trait]
pub trait MutationHandler: Send + Sync {
    async fn apply(&self, payload: &Value) -> Result<()>;
}

/// 按 mutation type 查找 handler
pub trait HandlerLookup: Send + Sync {
    fn handler_for(&self, mutation_type: &str) -> Option<Arc<dyn MutationHandler>>;
}

impl HandlerLookup for HashMap<String, Arc<dyn MutationHandler>> {
    fn handler_for(&self, mutation_type: &str) -> Option<Arc<dyn MutationHandler>> {
        self.get(mutation_type).cloned()
    }
}

/// 闭包形式的 handler
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> MutationHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn apply(&self, payload: &Value) -> Result<()> {
        (self.f)(payload.clone()).await
    }
}

/// 用闭包构造 handler
///
/// ```rust,no_run
/// use leadmarket_sync::handler::handler_fn;
///
/// let handler = handler_fn(|payload| async move {
///     println!("apply {}", payload);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MutationHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::handler::{HandlerLookup, MutationHandler};
use crate::mutation::{validate_payload, MutationPayload};
use crate::storage::QueuePriority;

type PayloadValidator = fn(&Value) -> Result<()>;

struct RegisteredHandler {
    handler: Arc<dyn MutationHandler>,
    validator: Option<PayloadValidator>,
    default_priority: QueuePriority,
}

/// mutation type -> handler 的内存注册表
///
/// 不持久化，每次进程启动都需要在 drain 之前重新注册。
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, RegisteredHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册不带 schema 的 handler，已存在时覆盖
    pub fn register(&self, mutation_type: &str, handler: Arc<dyn MutationHandler>) {
        self.insert(
            mutation_type,
            RegisteredHandler {
                handler,
                validator: None,
                default_priority: QueuePriority::NORMAL,
            },
        );
    }

    /// 注册 `M::TYPE` 的 handler，同时安装 `M` 的 payload 校验
    pub fn register_typed<M: MutationPayload>(&self, handler: Arc<dyn MutationHandler>) {
        self.insert(
            M::TYPE,
            RegisteredHandler {
                handler,
                validator: Some(validate_payload::<M> as PayloadValidator),
                default_priority: M::default_priority(),
            },
        );
    }

    fn insert(&self, mutation_type: &str, entry: RegisteredHandler) {
        let replaced = self
            .handlers
            .write()
            .insert(mutation_type.to_string(), entry)
            .is_some();
        if replaced {
            info!("handler 已替换: type={}", mutation_type);
        } else {
            debug!("handler 已注册: type={}", mutation_type);
        }
    }

    pub fn unregister(&self, mutation_type: &str) -> bool {
        self.handlers.write().remove(mutation_type).is_some()
    }

    pub fn contains(&self, mutation_type: &str) -> bool {
        self.handlers.read().contains_key(mutation_type)
    }

    /// 已注册的 type，按字母序
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// 按注册时的 schema 校验 payload；未注册或没有 schema 的 type 直接通过
    pub fn validate(&self, mutation_type: &str, payload: &Value) -> Result<()> {
        let validator = self
            .handlers
            .read()
            .get(mutation_type)
            .and_then(|entry| entry.validator);
        match validator {
            Some(validate) => validate(payload),
            None => Ok(()),
        }
    }

    pub fn default_priority(&self, mutation_type: &str) -> QueuePriority {
        self.handlers
            .read()
            .get(mutation_type)
            .map(|entry| entry.default_priority)
            .unwrap_or_default()
    }
}

impl HandlerLookup for HandlerRegistry {
    fn handler_for(&self, mutation_type: &str) -> Option<Arc<dyn MutationHandler>> {
        self.handlers
            .read()
            .get(mutation_type)
            .map(|entry| entry.handler.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::handler::handler_fn;
    use crate::mutation::ProposalDraft;
    use serde_json::json;

    fn noop() -> Arc<dyn MutationHandler> {
        handler_fn(|_| async { Ok(()) })
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = HandlerRegistry::new();
        registry.register("b", noop());
        registry.register("a", noop());
        assert_eq!(registry.types(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.handler_for("a").is_some());

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.handler_for("a").is_none());
    }

    #[test]
    fn test_typed_registration_validates() {
        let registry = HandlerRegistry::new();
        registry.register_typed::<ProposalDraft>(noop());
        assert!(registry.contains("create_proposal"));
        assert_eq!(registry.default_priority("create_proposal"), QueuePriority::CRITICAL);
        assert_eq!(registry.default_priority("anything_else"), QueuePriority::NORMAL);

        let err = registry.validate("create_proposal", &json!({"price": "free"})).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload { .. }));
        // 无 schema 的 type 不做校验
        assert!(registry.validate("custom", &json!(42)).is_ok());
    }
}

//! 市场业务的写操作目录
//!
//! 队列里的 payload 是不透明 JSON，这里给每种 `type` 定义对应的强类型结构，
//! 用于入队前校验和 typed handler 的反序列化。

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::handler::MutationHandler;
use crate::storage::QueuePriority;

/// 一种可入队写操作的 payload
pub trait MutationPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 队列条目上的 `type` 标签
    const TYPE: &'static str;

    fn default_priority() -> QueuePriority {
        QueuePriority::NORMAL
    }
}

/// 客户发布服务需求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequestDraft {
    pub client_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl MutationPayload for ServiceRequestDraft {
    const TYPE: &'static str = "create_service_request";

    fn default_priority() -> QueuePriority {
        QueuePriority::HIGH
    }
}

/// 会话内发送消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDraft {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl MutationPayload for ChatMessageDraft {
    const TYPE: &'static str = "send_message";

    fn default_priority() -> QueuePriority {
        QueuePriority::HIGH
    }
}

/// 服务商对某个 lead 提交报价（扣减积分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    pub lead_id: String,
    pub professional_id: String,
    pub price: f64,
    pub message: String,
    pub credits_spent: u32,
}

impl MutationPayload for ProposalDraft {
    const TYPE: &'static str = "create_proposal";

    fn default_priority() -> QueuePriority {
        QueuePriority::CRITICAL
    }
}

/// 资料更新，只提交有值的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl MutationPayload for ProfileUpdate {
    const TYPE: &'static str = "update_profile";
}

/// 所有内置写操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Mutation {
    CreateServiceRequest(ServiceRequestDraft),
    SendMessage(ChatMessageDraft),
    CreateProposal(ProposalDraft),
    UpdateProfile(ProfileUpdate),
}

/// 内置写操作的全部 type 标签
pub const BUILTIN_MUTATION_TYPES: [&str; 4] = [
    ServiceRequestDraft::TYPE,
    ChatMessageDraft::TYPE,
    ProposalDraft::TYPE,
    ProfileUpdate::TYPE,
];

impl Mutation {
    pub fn mutation_type(&self) -> &'static str {
        match self {
            Mutation::CreateServiceRequest(_) => ServiceRequestDraft::TYPE,
            Mutation::SendMessage(_) => ChatMessageDraft::TYPE,
            Mutation::CreateProposal(_) => ProposalDraft::TYPE,
            Mutation::UpdateProfile(_) => ProfileUpdate::TYPE,
        }
    }

    pub fn default_priority(&self) -> QueuePriority {
        match self {
            Mutation::CreateServiceRequest(_) => ServiceRequestDraft::default_priority(),
            Mutation::SendMessage(_) => ChatMessageDraft::default_priority(),
            Mutation::CreateProposal(_) => ProposalDraft::default_priority(),
            Mutation::UpdateProfile(_) => ProfileUpdate::default_priority(),
        }
    }

    /// 拆成队列条目需要的 (type, payload, priority)
    pub fn into_parts(self) -> Result<(&'static str, Value, QueuePriority)> {
        let mutation_type = self.mutation_type();
        let priority = self.default_priority();
        let payload = match self {
            Mutation::CreateServiceRequest(p) => serde_json::to_value(p)?,
            Mutation::SendMessage(p) => serde_json::to_value(p)?,
            Mutation::CreateProposal(p) => serde_json::to_value(p)?,
            Mutation::UpdateProfile(p) => serde_json::to_value(p)?,
        };
        Ok((mutation_type, payload, priority))
    }
}

/// 把 payload 解析成 `M`
pub fn decode_payload<M: MutationPayload>(payload: &Value) -> Result<M> {
    M::deserialize(payload).map_err(|e| SyncError::InvalidPayload {
        mutation_type: M::TYPE.to_string(),
        reason: e.to_string(),
    })
}

/// 校验 payload 是否符合 `M` 的结构
pub fn validate_payload<M: MutationPayload>(payload: &Value) -> Result<()> {
    decode_payload::<M>(payload).map(|_| ())
}

/// 先反序列化为 `M` 再交给闭包的 handler
pub struct TypedHandler<M, F> {
    f: F,
    _marker: PhantomData<fn(M)>,
}

#[async_trait]
impl<M, F, Fut> MutationHandler for TypedHandler<M, F>
where
    M: MutationPayload,
    F: Fn(M) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn apply(&self, payload: &Value) -> Result<()> {
        let typed = decode_payload::<M>(payload)?;
        (self.f)(typed).await
    }
}

pub fn typed_handler<M, F, Fut>(f: F) -> Arc<dyn MutationHandler>
where
    M: MutationPayload,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(TypedHandler {
        f,
        _marker: PhantomData,
    })
}

//! Wire types for the HTTP surface.

use std::collections::BTreeMap;

use cortex_abstraction::{
    ContentBlock, Message, ModelRequest, Role, StopReason, SystemBlock, ToolChoice, ToolDefinition,
};
use serde::{Deserialize, Serialize};

use crate::router::{ExpertSummary, RoutedResponse};

/// Message content: either a bare string or a list of blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    /// Shorthand for one text block.
    Text(String),
    /// Explicit blocks.
    Blocks(Vec<ContentBlock>),
}

/// One inbound message. Unknown roles are treated as the user.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    /// Wire role name.
    pub role: String,
    /// Message content.
    pub content: ChatContent,
}

/// System instructions: a bare string or a list of blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatSystem {
    /// Single instruction.
    Text(String),
    /// Ordered blocks.
    Blocks(Vec<SystemBlock>),
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Ordered conversation.
    pub messages: Vec<ChatMessage>,
    /// Optional system instructions.
    #[serde(default)]
    pub system: Option<ChatSystem>,
    /// Tools the model may call.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Tool constraint.
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    /// Output limit.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    /// Converts to a model request. Empty text blocks are dropped, then any
    /// message left without content.
    #[must_use]
    pub fn into_model_request(self) -> ModelRequest {
        let messages = self
            .messages
            .into_iter()
            .filter_map(|m| {
                let content: Vec<ContentBlock> = match m.content {
                    ChatContent::Text(text) => vec![ContentBlock::text(text)],
                    ChatContent::Blocks(blocks) => blocks,
                }
                .into_iter()
                .filter(|b| b.as_text().is_none_or(|t| !t.trim().is_empty()))
                .collect();
                (!content.is_empty()).then(|| Message { role: Role::from_wire(&m.role), content })
            })
            .collect();

        let system = match self.system {
            None => Vec::new(),
            Some(ChatSystem::Text(text)) => vec![SystemBlock::new(text)],
            Some(ChatSystem::Blocks(blocks)) => blocks,
        }
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();

        ModelRequest {
            messages,
            system,
            tools: self.tools,
            tool_choice: self.tool_choice,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Token usage with the estimated cost.
#[derive(Debug, Clone, Serialize)]
pub struct ChatUsage {
    /// Input tokens.
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
}

/// How the request was routed.
#[derive(Debug, Clone, Serialize)]
pub struct RouteMetadata {
    /// Expert that answered, empty when routing was bypassed.
    pub expert_used: String,
    /// Confidence of the terminal decision.
    pub confidence: f64,
    /// Whether the request left the entry expert.
    pub escalated: bool,
    /// Last escalation target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_to: Option<String>,
    /// Experts visited, entry first.
    pub escalation_path: Vec<String>,
    /// Request wall-clock time, human readable.
    pub duration: String,
}

/// Body of a successful `POST /chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Response id.
    pub id: String,
    /// Model that answered.
    pub model: String,
    /// Expert that answered.
    pub expert: String,
    /// Always "assistant".
    pub role: Role,
    /// Response blocks.
    pub content: Vec<ContentBlock>,
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Token usage.
    pub usage: ChatUsage,
    /// Routing details.
    pub metadata: RouteMetadata,
}

impl From<RoutedResponse> for ChatResponse {
    fn from(routed: RoutedResponse) -> Self {
        let escalated = routed.escalated();
        let escalated_to = routed.escalated_to().map(ToString::to_string);
        let expert = routed.expert.unwrap_or_default();
        let response = routed.response;

        Self {
            id: response.id,
            model: response.model,
            expert: expert.clone(),
            role: response.role,
            content: response.content,
            stop_reason: response.stop_reason,
            usage: ChatUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
                cost_usd: response.usage.cost_usd,
            },
            metadata: RouteMetadata {
                expert_used: expert,
                confidence: routed.confidence,
                escalated,
                escalated_to,
                escalation_path: routed.escalation_path,
                duration: format!("{:?}", routed.duration),
            },
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy".
    pub status: &'static str,
    /// Always "ready".
    pub cortex: &'static str,
}

/// Body of `GET /experts`.
#[derive(Debug, Clone, Serialize)]
pub struct ExpertsResponse {
    /// Active experts in ladder order.
    pub experts: Vec<ExpertSummary>,
    /// Whether routing is enabled.
    pub enabled: bool,
}

/// Error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error details.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable category.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Extra context, such as the escalation path of a loop.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<&'static str, serde_json::Value>,
}

//! Model service abstraction for Cortex.
//!
//! This crate defines the provider-agnostic request/response types and the
//! [`ModelService`] trait that every model backend implements. Vendor wire
//! formats never leave the service implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Represents an error that can occur when calling a model service.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// The request could not be sent or the connection failed mid-flight.
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The provider rejected the request (4xx other than rate limiting).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// The provider is rate limiting this client.
    #[error("Rate limited by '{provider}'{}", .message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    RateLimited {
        /// The provider name (e.g., "anthropic").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The provider failed with a server-side (5xx) status.
    #[error("Server Error ({status}): {message}")]
    ServerError {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body or summary.
        message: String,
    },

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The model provider is not supported or configured.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// No API key was configured for the provider backing a model.
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// The retry budget was exhausted.
    #[error("Request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Display form of the final error.
        last_error: String,
    },

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

impl ModelError {
    /// Whether a retry with backoff could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestError(_) | Self::RateLimited { .. } | Self::ServerError { .. }
        )
    }
}

/// The author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Human / client authored.
    User,
    /// Model authored.
    Assistant,
}

impl Role {
    /// Parses a wire role name. Unknown names map to [`Role::User`].
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }

    /// Returns the wire role name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// A tool invocation requested by the model.
    ToolUse {
        /// Tool call identifier.
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments.
        #[serde(default)]
        input: Value,
    },
    /// The result of a tool invocation, supplied by the client.
    ToolResult {
        /// Identifier of the tool call this answers.
        tool_use_id: String,
        /// Tool output.
        #[serde(default)]
        content: String,
        /// Whether the tool failed.
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    /// Creates a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text of a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Returns the wire type name of this block.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
        }
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Creates a user message holding a single text block.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::text(text)] }
    }

    /// Creates an assistant message holding a single text block.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: vec![ContentBlock::text(text)] }
    }
}

/// A system instruction block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBlock {
    /// Instruction text.
    pub text: String,
}

impl SystemBlock {
    /// Creates a system block.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// JSON schema of the tool input.
    #[serde(default)]
    pub input_schema: Value,
}

/// Constraint on how the model uses tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// The model must call some tool.
    Any,
    /// The model must not call tools.
    None,
    /// The model must call the named tool.
    Tool {
        /// Tool name.
        name: String,
    },
}

/// A provider-agnostic model request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Ordered conversation.
    pub messages: Vec<Message>,
    /// Ordered system blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    /// Tools available to the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Optional tool constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Maximum number of tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ModelRequest {
    /// Creates a request with a single user text message.
    #[must_use]
    pub fn from_user_text(text: impl Into<String>) -> Self {
        Self { messages: vec![Message::user(text)], ..Self::default() }
    }

    /// Returns the first text block authored by the user, if any.
    #[must_use]
    pub fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .flat_map(|m| m.content.iter())
            .find_map(ContentBlock::as_text)
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the turn.
    #[default]
    EndTurn,
    /// The output token limit was hit.
    MaxTokens,
    /// A stop sequence was produced.
    StopSequence,
    /// The model wants to call a tool.
    ToolUse,
    /// The model declined to answer.
    Refusal,
}

/// Token usage for a request.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of input tokens.
    pub input_tokens: u64,
    /// Number of output tokens.
    pub output_tokens: u64,
    /// Provider-reported cost in USD, when known.
    #[serde(default)]
    pub cost_usd: f64,
}

impl Usage {
    /// Adds another usage record into this one.
    pub fn add(&mut self, other: &Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost_usd += other.cost_usd;
    }
}

/// A provider-agnostic model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Provider response identifier.
    pub id: String,
    /// Model that produced the response.
    pub model: String,
    /// Always the assistant for model output.
    pub role: Role,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Token usage.
    pub usage: Usage,
}

/// A model backend.
///
/// All services must be `Send + Sync` so a single instance can serve
/// concurrent requests.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Sends a request to the model and waits for the full response.
    ///
    /// # Errors
    /// Returns a `ModelError` if the call fails.
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Returns the size of the model's context window in tokens.
    fn token_context_window(&self) -> usize;

    /// Returns the ID of the backing model.
    fn model_id(&self) -> &str;
}

//! Model service implementations and routing for Cortex.
//!
//! This crate maps model names to [`ModelService`] instances. Vendor clients
//! are plugged in through [`ServiceBuilder`]; the crate itself ships only the
//! deterministic [`MockModel`] used for dry runs and tests.
//!
//! # Components
//!
//! - **ModelRouter**: provider detection, credential checks, instance cache
//! - **RetryingService**: exponential backoff and truncation recovery
//! - **MockModel**: echo backend with word-count token usage

pub mod retry;
pub mod router;

use async_trait::async_trait;
use cortex_abstraction::{
    ContentBlock, ModelError, ModelRequest, ModelResponse, ModelService, Role, StopReason, Usage,
};
use tracing::debug;

pub use retry::{RetryPolicy, RetryingService};
pub use router::{
    MockServiceBuilder, ModelRouter, Provider, ProviderEndpoints, ProviderKeys, RouterSettings,
    ServiceBuilder, ServiceConfig, detect_provider,
};

/// Context window reported by [`MockModel`].
pub const MOCK_CONTEXT_WINDOW: usize = 200_000;

/// A mock implementation of [`ModelService`] for testing and dry runs.
#[derive(Debug, Default)]
pub struct MockModel {
    id: String,
}

impl MockModel {
    /// Creates a new `MockModel` with the given ID.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id }
    }
}

#[async_trait]
impl ModelService for MockModel {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            message_count = request.messages.len(),
            system_blocks = request.system.len(),
            "MockModel generating completion"
        );

        let prompt = request.first_user_text().unwrap_or_default();
        let response_content = format!("Mock response from {}: {prompt}", self.id);

        let input_tokens = request
            .system
            .iter()
            .map(|s| count_tokens(&s.text))
            .chain(
                request
                    .messages
                    .iter()
                    .flat_map(|m| m.content.iter())
                    .filter_map(ContentBlock::as_text)
                    .map(count_tokens),
            )
            .sum();
        let output_tokens = count_tokens(&response_content);

        Ok(ModelResponse {
            id: format!("mock-{}", uuid::Uuid::new_v4()),
            model: self.id.clone(),
            role: Role::Assistant,
            content: vec![ContentBlock::text(response_content)],
            stop_reason: StopReason::EndTurn,
            usage: Usage { input_tokens, output_tokens, cost_usd: 0.0 },
        })
    }

    fn token_context_window(&self) -> usize {
        MOCK_CONTEXT_WINDOW
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Count tokens in a string (simplified: word count).
fn count_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

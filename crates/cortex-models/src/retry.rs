//! Retry decorator for model services.
//!
//! Wraps any [`ModelService`] with exponential backoff on transient failures
//! and a single re-issue with a larger output budget when a response is cut
//! off by the token limit. Usage from the truncated attempt is folded into
//! the final response.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cortex_abstraction::{ModelError, ModelRequest, ModelResponse, ModelService, StopReason};
use rand::Rng;
use tracing::{info, warn};

/// Output budget used when a response stops on `max_tokens`.
pub const LARGER_MAX_TOKENS: u32 = 128 * 1024;

/// Retry behaviour for [`RetryingService`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before each retry; the last entry repeats once exhausted.
    pub backoff: Vec<Duration>,
    /// Upper bound on random jitter added to each delay.
    pub jitter: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Output budget for the truncation retry.
    pub larger_max_tokens: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: vec![
                Duration::from_secs(15),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
            jitter: Duration::from_secs(1),
            max_attempts: 10,
            larger_max_tokens: LARGER_MAX_TOKENS,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries transient failures.
    #[must_use]
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Returns the delay before retry number `retry` (0-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self
            .backoff
            .get(retry as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default();

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// A [`ModelService`] that retries its inner service.
pub struct RetryingService {
    inner: Arc<dyn ModelService>,
    policy: RetryPolicy,
}

impl RetryingService {
    /// Wraps `inner` with the given policy.
    #[must_use]
    pub fn new(inner: Arc<dyn ModelService>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the active retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl ModelService for RetryingService {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut current: Cow<'_, ModelRequest> = Cow::Borrowed(request);
        let mut truncated_usage = None;
        let mut attempt = 0u32;
        let mut retries = 0u32;

        loop {
            attempt += 1;
            match self.inner.complete(&current).await {
                Ok(mut response) => {
                    if response.stop_reason == StopReason::MaxTokens
                        && truncated_usage.is_none()
                        && attempt < max_attempts
                    {
                        info!(
                            model_id = %self.inner.model_id(),
                            max_tokens = self.policy.larger_max_tokens,
                            "Response truncated, retrying with larger output budget"
                        );
                        truncated_usage = Some(response.usage);
                        let mut larger = current.into_owned();
                        larger.max_tokens = Some(self.policy.larger_max_tokens);
                        current = Cow::Owned(larger);
                        continue;
                    }

                    if let Some(partial) = truncated_usage {
                        response.usage.add(&partial);
                    }
                    return Ok(response);
                }
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    if attempt >= max_attempts {
                        return Err(ModelError::RetriesExhausted {
                            attempts: attempt,
                            last_error: error.to_string(),
                        });
                    }

                    let delay = self.policy.delay_for(retries);
                    retries += 1;
                    warn!(
                        model_id = %self.inner.model_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Model request failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn token_context_window(&self) -> usize {
        self.inner.token_context_window()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

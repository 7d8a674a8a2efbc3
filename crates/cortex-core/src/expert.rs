//! Experts: a profile bound to a tier policy.

use std::time::Instant;

use chrono::Utc;
use cortex_abstraction::{ModelError, ModelRequest, ModelResponse, ModelService, SystemBlock};
use tracing::{debug, info};

use crate::complexity::{ComplexityEstimator, truncate};
use crate::error::Result;
use crate::performance::PerformanceLog;
use crate::policy::{ExpertDecision, PolicyInput, PolicyKind, TierPolicy};
use crate::registry::ExpertProfile;

/// Characters of user text kept as the task description.
pub const TASK_DESCRIPTION_CHARS: usize = 100;

/// Result of one execution: the log is produced whether or not the call
/// succeeded so the caller can persist it before surfacing an error.
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Performance record of the attempt.
    pub log: PerformanceLog,
    /// Model response or error.
    pub result: std::result::Result<ModelResponse, ModelError>,
}

/// A profile bound to its tier policy and ladder position.
#[derive(Debug)]
pub struct Expert {
    profile: ExpertProfile,
    policy: Box<dyn TierPolicy>,
    next_tier: Option<String>,
    confidence_threshold: f64,
    escalation_threshold: f64,
    estimator: ComplexityEstimator,
}

impl Expert {
    /// Creates an expert. Thresholds missing from the profile take the
    /// given defaults.
    #[must_use]
    pub fn new(
        profile: ExpertProfile,
        policy: PolicyKind,
        next_tier: Option<String>,
        default_confidence_threshold: f64,
        default_escalation_threshold: f64,
    ) -> Self {
        let confidence_threshold =
            profile.confidence_threshold.unwrap_or(default_confidence_threshold);
        let escalation_threshold =
            profile.elite_complexity_threshold.unwrap_or(default_escalation_threshold);
        Self {
            profile,
            policy: policy.policy(),
            next_tier,
            confidence_threshold,
            escalation_threshold,
            estimator: ComplexityEstimator::new(),
        }
    }

    /// Expert name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// Backing model id.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.profile.model
    }

    /// Full profile.
    #[must_use]
    pub fn profile(&self) -> &ExpertProfile {
        &self.profile
    }

    /// Policy this expert runs.
    #[must_use]
    pub fn policy_kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    /// Next tier up the ladder, before any profile override.
    #[must_use]
    pub fn next_tier(&self) -> Option<&str> {
        self.next_tier.as_deref()
    }

    /// Decides whether to handle `request` or escalate it.
    ///
    /// # Errors
    ///
    /// Evaluation is currently infallible; the error path is reserved for
    /// policies that consult a model.
    pub fn evaluate(&self, request: &ModelRequest) -> Result<ExpertDecision> {
        let text = request.first_user_text().filter(|t| !t.trim().is_empty());
        let complexity = text.map_or(0.0, |t| self.estimator.score(t));
        let target = self.profile.escalate_to.as_deref().or(self.next_tier.as_deref());

        let decision = self.policy.decide(&PolicyInput {
            expert: &self.profile.name,
            text,
            complexity,
            next_tier: target,
            confidence_threshold: self.confidence_threshold,
            escalation_threshold: self.escalation_threshold,
        });

        debug!(
            expert = %self.profile.name,
            policy = %self.policy.kind(),
            confidence = decision.confidence,
            complexity = decision.complexity,
            escalate_to = decision.escalate_to.as_deref().unwrap_or(""),
            reasoning = %decision.reasoning,
            "Expert evaluated request"
        );
        Ok(decision)
    }

    /// Applies the profile to a copy of `request`: the system prompt goes
    /// first, and unset generation limits take the profile's values.
    #[must_use]
    pub fn prepare_request(&self, request: &ModelRequest) -> ModelRequest {
        let mut prepared = request.clone();
        if !self.profile.system_prompt.is_empty() {
            prepared.system.insert(0, SystemBlock::new(self.profile.system_prompt.clone()));
        }
        if prepared.max_tokens.is_none() {
            prepared.max_tokens = self.profile.max_tokens;
        }
        if prepared.temperature.is_none() {
            prepared.temperature = self.profile.temperature;
        }
        prepared
    }

    /// Runs `request` through `service` and records the attempt.
    pub async fn execute(&self, service: &dyn ModelService, request: &ModelRequest) -> ExecutionOutcome {
        let timestamp = Utc::now();
        let start = Instant::now();

        info!(expert = %self.profile.name, model = %self.profile.model, "Expert executing request");

        let prepared = self.prepare_request(request);
        let result = service.complete(&prepared).await;
        let duration = start.elapsed();

        let usage = result.as_ref().map(|r| r.usage).unwrap_or_default();
        let log = PerformanceLog {
            timestamp,
            expert: self.profile.name.clone(),
            model: self.profile.model.clone(),
            task_description: request
                .first_user_text()
                .map(|t| truncate(t, TASK_DESCRIPTION_CHARS)),
            duration,
            tokens_input: usage.input_tokens,
            tokens_output: usage.output_tokens,
            success: result.is_ok(),
            error_message: result.as_ref().err().map(ToString::to_string),
            escalated: false,
            escalated_to: None,
        };

        ExecutionOutcome { log, result }
    }

    /// Log for a failed attempt that never produced a model result.
    #[must_use]
    pub fn failure_log(&self, request: &ModelRequest, started: Instant, error: &str) -> PerformanceLog {
        PerformanceLog {
            timestamp: Utc::now(),
            expert: self.profile.name.clone(),
            model: self.profile.model.clone(),
            task_description: request
                .first_user_text()
                .map(|t| truncate(t, TASK_DESCRIPTION_CHARS)),
            duration: started.elapsed(),
            tokens_input: 0,
            tokens_output: 0,
            success: false,
            error_message: Some(error.to_string()),
            escalated: false,
            escalated_to: None,
        }
    }
}

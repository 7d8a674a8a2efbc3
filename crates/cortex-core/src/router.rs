//! Escalation router.
//!
//! Walks a request up the tier ladder from the entry expert until one expert
//! decides to handle it, executes it there, and records every hop with the
//! performance tracker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cortex_abstraction::{ModelRequest, ModelResponse};
use cortex_models::ModelRouter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CortexConfig;
use crate::cost::CostEstimator;
use crate::error::{CortexError, Result};
use crate::expert::Expert;
use crate::performance::{PerformanceLog, PerformanceTracker, Statistics};
use crate::policy::ExpertDecision;
use crate::registry::ExpertRegistry;

/// The terminal expert for a request, as chosen by an evaluation-only walk.
#[derive(Debug, Clone)]
pub struct ExpertChoice {
    /// Chosen expert.
    pub expert: String,
    /// Its backing model.
    pub model: String,
    /// Its system prompt.
    pub system_prompt: String,
    /// The terminal decision.
    pub decision: ExpertDecision,
    /// Experts visited, entry first.
    pub escalation_path: Vec<String>,
}

impl ExpertChoice {
    /// Whether the request left the entry expert.
    #[must_use]
    pub fn escalated(&self) -> bool {
        self.escalation_path.len() > 1
    }
}

/// A model response plus the route that produced it.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    /// Model response, with `usage.cost_usd` filled when costs are tracked.
    pub response: ModelResponse,
    /// Expert that executed the request; `None` when routing was bypassed.
    pub expert: Option<String>,
    /// Confidence of the terminal decision.
    pub confidence: f64,
    /// Experts visited, entry first.
    pub escalation_path: Vec<String>,
    /// Routing was disabled and the default model answered.
    pub bypassed: bool,
    /// Wall-clock time of the whole request.
    pub duration: Duration,
}

impl RoutedResponse {
    /// Whether the request left the entry expert.
    #[must_use]
    pub fn escalated(&self) -> bool {
        self.escalation_path.len() > 1
    }

    /// Expert the request was last escalated to.
    #[must_use]
    pub fn escalated_to(&self) -> Option<&str> {
        if self.escalated() { self.escalation_path.last().map(String::as_str) } else { None }
    }
}

/// Listing entry for one active expert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpertSummary {
    /// Expert name.
    pub name: String,
    /// Backing model.
    pub model: String,
    /// Tier ordinal.
    pub tier: u32,
}

/// Result of walking the ladder.
struct Walk<'a> {
    expert: &'a Expert,
    decision: ExpertDecision,
    path: Vec<String>,
}

/// Routes requests through the expert hierarchy.
#[derive(Debug)]
pub struct EscalationRouter {
    config: CortexConfig,
    registry: ExpertRegistry,
    models: Arc<ModelRouter>,
    tracker: Arc<PerformanceTracker>,
    costs: CostEstimator,
}

impl EscalationRouter {
    /// Assembles a router from its parts.
    #[must_use]
    pub fn new(
        config: CortexConfig,
        registry: ExpertRegistry,
        models: Arc<ModelRouter>,
        tracker: Arc<PerformanceTracker>,
        costs: CostEstimator,
    ) -> Self {
        info!(
            experts = registry.len(),
            entry = %registry.entry().name(),
            enabled = config.enabled,
            dry_run = config.dry_run,
            "Escalation router ready"
        );
        Self { config, registry, models, tracker, costs }
    }

    /// Builds every component from configuration: model router, registry
    /// from the profiles directory, tracker over the logs directory and the
    /// pricing table.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Configuration` for a bad profile set or pricing
    /// file, and `CortexError::Model` when no API key is available outside a
    /// dry run.
    pub fn from_config(config: CortexConfig) -> Result<Self> {
        let models = Arc::new(ModelRouter::new(config.router_settings())?);
        let registry = ExpertRegistry::load_dir(&config.profiles_dir, &config)?;
        let tracker = Arc::new(PerformanceTracker::new(config.logs_dir.clone()));
        let costs = CostEstimator::from_optional_file(config.pricing_file.as_deref())?;
        Ok(Self::new(config, registry, models, tracker, costs))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CortexConfig {
        &self.config
    }

    /// Loaded experts.
    #[must_use]
    pub fn registry(&self) -> &ExpertRegistry {
        &self.registry
    }

    /// Model router used for execution.
    #[must_use]
    pub fn models(&self) -> &Arc<ModelRouter> {
        &self.models
    }

    /// Performance tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Most experts a single walk may visit.
    fn max_hops(&self) -> usize {
        let len = self.registry.len();
        self.config.max_escalations.map_or(len, |max| len.min(max.saturating_add(1)))
    }

    fn walk(&self, request: &ModelRequest) -> Result<Walk<'_>> {
        let max_hops = self.max_hops();
        let mut expert = self.registry.entry();
        let mut path = vec![expert.name().to_string()];

        loop {
            let decision = expert.evaluate(request)?;
            let Some(target) = decision.escalate_to.clone() else {
                info!(
                    expert = %expert.name(),
                    model = %expert.model(),
                    confidence = decision.confidence,
                    complexity = decision.complexity,
                    hops = path.len(),
                    "Expert handling request"
                );
                return Ok(Walk { expert, decision, path });
            };

            info!(
                from = %expert.name(),
                to = %target,
                confidence = decision.confidence,
                complexity = decision.complexity,
                reasoning = %decision.reasoning,
                "Escalating request"
            );
            self.record(PerformanceLog::escalation(expert.name(), expert.model(), &target));

            let revisited = path.contains(&target);
            path.push(target.clone());
            if revisited || path.len() > max_hops {
                warn!(path = %path.join(" -> "), max_hops, "Escalation loop detected");
                return Err(CortexError::EscalationLoopDetected { path });
            }

            expert = self.registry.get(&target).ok_or(CortexError::ExpertNotFound(target))?;
        }
    }

    /// Decides which expert would handle `request` without executing it.
    /// Each hop is recorded as an escalation. Returns `None` when routing is
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns `ExpertNotFound` for an unregistered escalation target and
    /// `EscalationLoopDetected` when the walk revisits an expert or exceeds
    /// the hop ceiling.
    pub fn choose_expert(&self, request: &ModelRequest) -> Result<Option<ExpertChoice>> {
        if !self.config.enabled {
            debug!("Routing disabled, no expert chosen");
            return Ok(None);
        }
        let walk = self.walk(request)?;
        Ok(Some(ExpertChoice {
            expert: walk.expert.name().to_string(),
            model: walk.expert.model().to_string(),
            system_prompt: walk.expert.profile().system_prompt.clone(),
            decision: walk.decision,
            escalation_path: walk.path,
        }))
    }

    /// Routes and executes `request`.
    ///
    /// # Errors
    ///
    /// See [`EscalationRouter::process_request_with_cancel`].
    pub async fn process_request(&self, request: &ModelRequest) -> Result<RoutedResponse> {
        self.process_request_with_cancel(request, &CancellationToken::new()).await
    }

    /// Routes and executes `request`, abandoning the model call when `cancel`
    /// fires. The abandoned attempt is still logged.
    ///
    /// # Errors
    ///
    /// Returns routing errors from the walk, `Model` when the expert's service
    /// cannot be resolved, `Execution` when the model call fails and
    /// `Cancelled` when `cancel` fires first.
    pub async fn process_request_with_cancel(
        &self,
        request: &ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<RoutedResponse> {
        let started = Instant::now();

        if !self.config.enabled {
            return self.bypass(request, cancel, started).await;
        }

        let walk = self.walk(request)?;

        let expert = walk.expert;
        let service = self.models.service_for(expert.model())?;

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(expert = %expert.name(), "Request cancelled during execution");
                self.record(expert.failure_log(request, started, &CortexError::Cancelled.to_string()));
                self.flush();
                return Err(CortexError::Cancelled);
            }
            outcome = expert.execute(service.as_ref(), request) => outcome,
        };

        self.record(outcome.log);

        let mut response = match outcome.result {
            Ok(response) => response,
            Err(source) => {
                warn!(expert = %expert.name(), error = %source, "Expert execution failed");
                self.flush();
                return Err(CortexError::Execution { expert: expert.name().to_string(), source });
            }
        };

        if self.config.track_costs {
            response.usage.cost_usd = self.execution_cost(expert, &response);
        }

        Ok(RoutedResponse {
            response,
            expert: Some(expert.name().to_string()),
            confidence: walk.decision.confidence,
            escalation_path: walk.path,
            bypassed: false,
            duration: started.elapsed(),
        })
    }

    async fn bypass(
        &self,
        request: &ModelRequest,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<RoutedResponse> {
        let model = &self.config.default_model;
        debug!(model = %model, "Routing disabled, using default model");
        let service = self.models.service_for(model)?;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CortexError::Cancelled),
            result = service.complete(request) => result,
        };
        let response = result.map_err(|source| CortexError::Execution { expert: model.clone(), source })?;

        Ok(RoutedResponse {
            response,
            expert: None,
            confidence: 1.0,
            escalation_path: Vec::new(),
            bypassed: true,
            duration: started.elapsed(),
        })
    }

    fn execution_cost(&self, expert: &Expert, response: &ModelResponse) -> f64 {
        let usage = &response.usage;
        let cost = self.costs.calculate_cost(expert.model(), usage.input_tokens, usage.output_tokens);
        debug!(
            expert = %expert.name(),
            model = %expert.model(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_usd = cost,
            "Execution cost"
        );
        if cost > self.config.cost_alert_threshold {
            warn!(
                expert = %expert.name(),
                cost_usd = cost,
                threshold = self.config.cost_alert_threshold,
                "Request cost exceeded alert threshold"
            );
        }
        cost
    }

    /// Buffers `log`, flushing once the buffer reaches the threshold.
    fn record(&self, log: PerformanceLog) {
        if self.tracker.log(log) >= self.config.flush_threshold {
            self.flush();
        }
    }

    fn flush(&self) {
        if let Err(e) = self.tracker.save() {
            warn!(error = %e, "Failed to flush performance logs");
        }
    }

    /// Active experts in ladder order.
    #[must_use]
    pub fn experts(&self) -> Vec<ExpertSummary> {
        self.registry
            .active()
            .map(|e| ExpertSummary {
                name: e.name().to_string(),
                model: e.model().to_string(),
                tier: e.profile().tier,
            })
            .collect()
    }

    /// Statistics over today's persisted records plus the unflushed buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if today's log file cannot be read.
    pub fn statistics(&self) -> Result<Statistics> {
        let mut logs = self.tracker.load_today()?;
        logs.extend(self.tracker.recent_logs(None));
        Ok(Statistics::compute(&logs))
    }

    /// Flushes buffered logs. Returns how many records were written.
    ///
    /// # Errors
    ///
    /// Returns the persistence error; buffered records are kept.
    pub fn shutdown(&self) -> Result<usize> {
        let written = self.tracker.save()?;
        info!(records = written, "Flushed performance logs");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyKind;
    use crate::registry::ExpertProfile;
    use cortex_models::RouterSettings;
    use tempfile::TempDir;

    fn router_with(profiles: Vec<ExpertProfile>, config: CortexConfig, dir: &TempDir) -> EscalationRouter {
        let registry = ExpertRegistry::from_profiles(profiles, &config).unwrap();
        let models = Arc::new(ModelRouter::new(RouterSettings { dry_run: true, ..RouterSettings::default() }).unwrap());
        let tracker = Arc::new(PerformanceTracker::new(dir.path()));
        EscalationRouter::new(config, registry, models, tracker, CostEstimator::new())
    }

    fn ladder() -> Vec<ExpertProfile> {
        vec![
            ExpertProfile::new("FirstAttendant", "gpt-5-nano", 1),
            ExpertProfile::new("SecondThought", "deepseek-chat", 2),
            ExpertProfile::new("Elite", "claude-sonnet-4-5-20250929", 3),
        ]
    }

    fn complex_text() -> String {
        format!(
            "Design the distributed architecture, optimize the algorithm for performance and \
             scalability, then review security. {}",
            "x".repeat(1100)
        )
    }

    #[test]
    fn test_choose_simple_request_stays_at_entry() {
        let dir = TempDir::new().unwrap();
        let router = router_with(ladder(), CortexConfig::default(), &dir);
        let choice =
            router.choose_expert(&ModelRequest::from_user_text("list files in current directory")).unwrap().unwrap();
        assert_eq!(choice.expert, "FirstAttendant");
        assert!(!choice.escalated());
        assert!((choice.decision.confidence - 0.85).abs() < f64::EPSILON);
        assert_eq!(router.tracker().pending(), 0);
    }

    #[test]
    fn test_choose_complex_request_reaches_top() {
        let dir = TempDir::new().unwrap();
        let router = router_with(ladder(), CortexConfig::default(), &dir);
        let choice = router.choose_expert(&ModelRequest::from_user_text(complex_text())).unwrap().unwrap();
        assert_eq!(choice.expert, "Elite");
        assert_eq!(choice.escalation_path, vec!["FirstAttendant", "SecondThought", "Elite"]);
        assert_eq!(router.registry().get("Elite").unwrap().policy_kind(), PolicyKind::Top);

        let logs = router.tracker().recent_logs(None);
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.escalated && l.success));
        assert_eq!(logs[1].escalated_to.as_deref(), Some("Elite"));
    }

    #[test]
    fn test_choose_empty_text_escalates() {
        let dir = TempDir::new().unwrap();
        let router = router_with(ladder(), CortexConfig::default(), &dir);
        let choice = router.choose_expert(&ModelRequest::from_user_text("")).unwrap().unwrap();
        assert!(choice.escalated());
        assert_eq!(choice.escalation_path[1], "SecondThought");
    }

    #[test]
    fn test_choose_with_routing_disabled() {
        let dir = TempDir::new().unwrap();
        let config = CortexConfig { enabled: false, ..CortexConfig::default() };
        let router = router_with(ladder(), config, &dir);
        assert!(router.choose_expert(&ModelRequest::from_user_text("hi")).unwrap().is_none());
        assert_eq!(router.tracker().pending(), 0);
    }

    #[test]
    fn test_max_escalations_caps_the_walk() {
        let dir = TempDir::new().unwrap();
        let config = CortexConfig { max_escalations: Some(1), ..CortexConfig::default() };
        let router = router_with(ladder(), config, &dir);
        let err = router.choose_expert(&ModelRequest::from_user_text(complex_text())).unwrap_err();
        assert!(matches!(err, CortexError::EscalationLoopDetected { ref path } if path.len() == 3));

        // Hops made before the loop was detected are still recorded.
        assert_eq!(router.tracker().pending(), 2);
    }

    #[tokio::test]
    async fn test_process_records_escalations_and_execution() {
        let dir = TempDir::new().unwrap();
        let router = router_with(ladder(), CortexConfig::default(), &dir);
        let routed = router.process_request(&ModelRequest::from_user_text(complex_text())).await.unwrap();

        assert_eq!(routed.expert.as_deref(), Some("Elite"));
        assert_eq!(routed.escalated_to(), Some("Elite"));
        assert!(routed.response.usage.cost_usd > 0.0);

        let logs = router.tracker().recent_logs(None);
        assert_eq!(logs.len(), 3);
        assert!(logs[0].escalated && logs[1].escalated);
        assert_eq!(logs[0].escalated_to.as_deref(), Some("SecondThought"));
        assert_eq!(logs[2].expert, "Elite");
        assert!(logs[2].success && !logs[2].escalated);
    }

    #[tokio::test]
    async fn test_flush_threshold_persists_buffer() {
        let dir = TempDir::new().unwrap();
        let config = CortexConfig { flush_threshold: 2, ..CortexConfig::default() };
        let router = router_with(ladder(), config, &dir);

        router.process_request(&ModelRequest::from_user_text("hello")).await.unwrap();
        assert_eq!(router.tracker().pending(), 1);
        router.process_request(&ModelRequest::from_user_text("hello again")).await.unwrap();
        assert_eq!(router.tracker().pending(), 0);
        assert_eq!(router.tracker().load_today().unwrap().len(), 2);

        let stats = router.statistics().unwrap();
        assert_eq!(stats.executions, 2);
        assert_eq!(stats.expert_usage.get("FirstAttendant"), Some(&2));
    }

    #[tokio::test]
    async fn test_disabled_routing_uses_default_model() {
        let dir = TempDir::new().unwrap();
        let config = CortexConfig { enabled: false, default_model: "mock-default".to_string(), ..CortexConfig::default() };
        let router = router_with(ladder(), config, &dir);

        let routed = router.process_request(&ModelRequest::from_user_text("hi")).await.unwrap();
        assert!(routed.bypassed);
        assert!(routed.expert.is_none());
        assert_eq!(routed.response.model, "mock-default");
        assert_eq!(router.tracker().pending(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_is_logged() {
        let dir = TempDir::new().unwrap();
        let router = router_with(ladder(), CortexConfig::default(), &dir);
        let token = CancellationToken::new();
        token.cancel();

        let err = router
            .process_request_with_cancel(&ModelRequest::from_user_text("hi"), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::Cancelled));

        let persisted = router.tracker().load_today().unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(!persisted[0].success);
    }

    #[test]
    fn test_experts_listing() {
        let dir = TempDir::new().unwrap();
        let router = router_with(ladder(), CortexConfig::default(), &dir);
        let experts = router.experts();
        assert_eq!(experts.len(), 3);
        assert_eq!(experts[0], ExpertSummary { name: "FirstAttendant".into(), model: "gpt-5-nano".into(), tier: 1 });
    }
}

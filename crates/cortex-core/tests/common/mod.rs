//! Shared test utilities for Cortex Core integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_abstraction::{ModelError, ModelRequest, ModelResponse, ModelService};
use cortex_core::{CortexConfig, EscalationRouter};
use cortex_models::{ServiceBuilder, ServiceConfig};
use tempfile::TempDir;

/// Three-tier ladder backed by mock models.
pub const STANDARD_PROFILES: &[(&str, &str)] = &[
    (
        "first_attendant.yaml",
        "name: FirstAttendant\nmodel: mock-nano\ntier: 1\nsystem_prompt: You answer quick questions.\n",
    ),
    (
        "second_thought.yaml",
        "name: SecondThought\nmodel: mock-deepseek\ntier: 2\nsystem_prompt: You decompose problems.\n",
    ),
    (
        "elite.yaml",
        "name: Elite\nmodel: mock-sonnet\ntier: 3\nsystem_prompt: You solve hard problems.\n",
    ),
];

/// A request that saturates the complexity score.
pub fn complex_request() -> ModelRequest {
    ModelRequest::from_user_text(format!(
        "Design a distributed architecture and optimize the algorithm for performance and \
         scalability, with a security review. {}",
        "detail ".repeat(200)
    ))
}

/// Writes profile files into `dir`.
pub fn write_profiles(dir: &Path, profiles: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    for (file, body) in profiles {
        fs::write(dir.join(file), body).unwrap();
    }
}

/// Dry-run configuration rooted in `root`.
pub fn test_config(root: &Path) -> CortexConfig {
    CortexConfig {
        profiles_dir: root.join("profiles"),
        logs_dir: root.join("logs"),
        dry_run: true,
        ..CortexConfig::default()
    }
}

/// Router over `profiles` with the given configuration tweaks.
pub fn router_with(
    profiles: &[(&str, &str)],
    configure: impl FnOnce(&mut CortexConfig),
) -> (TempDir, Arc<EscalationRouter>) {
    let root = TempDir::new().unwrap();
    let mut config = test_config(root.path());
    configure(&mut config);
    write_profiles(&config.profiles_dir, profiles);
    let router = EscalationRouter::from_config(config).unwrap();
    (root, Arc::new(router))
}

/// Router over the standard ladder in dry-run mode.
pub fn standard_router() -> (TempDir, Arc<EscalationRouter>) {
    router_with(STANDARD_PROFILES, |_| {})
}

/// A model service that always fails with a non-retryable error.
#[derive(Debug)]
pub struct FailingService {
    id: String,
}

#[async_trait]
impl ModelService for FailingService {
    async fn complete(&self, _request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(ModelError::ModelResponseError(format!("{} rejected the request", self.id)))
    }

    fn token_context_window(&self) -> usize {
        1_000
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Builds [`FailingService`] instances.
#[derive(Debug)]
pub struct FailingBuilder;

impl ServiceBuilder for FailingBuilder {
    fn build(&self, config: &ServiceConfig) -> Result<Arc<dyn ModelService>, ModelError> {
        Ok(Arc::new(FailingService { id: config.model_id.clone() }))
    }
}

//! Model router: maps model names to cached [`ModelService`] instances.
//!
//! The router detects a provider from the model name, checks that a
//! credential is configured for it, builds the service through the
//! [`ServiceBuilder`] registered for that provider and wraps it in a
//! [`RetryingService`]. Instances are cached per model name for the lifetime
//! of the router.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use cortex_abstraction::{ModelError, ModelService};
use tracing::{debug, warn};

use crate::MockModel;
use crate::retry::{RetryPolicy, RetryingService};

/// Default Anthropic API endpoint.
pub const DEFAULT_ANTHROPIC_BASE: &str = "https://api.anthropic.com/v1/messages";
/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
/// Default DeepSeek API endpoint.
pub const DEFAULT_DEEPSEEK_BASE: &str = "https://api.deepseek.com/v1";

/// Model provider enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Anthropic Claude models.
    Anthropic,
    /// OpenAI models.
    OpenAI,
    /// DeepSeek models (OpenAI-compatible API).
    DeepSeek,
    /// Deterministic in-process mock.
    Mock,
}

impl Provider {
    /// Returns the canonical lowercase provider name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::DeepSeek => "deepseek",
            Self::Mock => "mock",
        }
    }

    /// Returns the environment variable holding this provider's API key.
    #[must_use]
    pub const fn key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::Mock => "",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            "deepseek" => Ok(Self::DeepSeek),
            "mock" => Ok(Self::Mock),
            _ => Err(ModelError::UnsupportedModelProvider(format!("Unrecognized provider: {s}"))),
        }
    }
}

/// Determines which provider serves `model`.
///
/// Unknown names default to OpenAI with a warning.
#[must_use]
pub fn detect_provider(model: &str) -> Provider {
    let lower = model.to_lowercase();

    if lower.starts_with("mock") {
        return Provider::Mock;
    }
    if ["claude", "opus", "sonnet", "haiku"].iter().any(|k| lower.contains(k)) {
        return Provider::Anthropic;
    }
    if lower.contains("deepseek") {
        return Provider::DeepSeek;
    }
    if ["gpt", "o1", "o3"].iter().any(|k| lower.contains(k)) {
        return Provider::OpenAI;
    }

    warn!(model = %model, "Unknown model type, defaulting to OpenAI");
    Provider::OpenAI
}

/// API keys per provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    /// Anthropic API key.
    pub anthropic: Option<String>,
    /// OpenAI API key.
    pub openai: Option<String>,
    /// DeepSeek API key.
    pub deepseek: Option<String>,
}

impl ProviderKeys {
    /// Returns the non-empty key configured for `provider`.
    #[must_use]
    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::Anthropic => self.anthropic.as_deref(),
            Provider::OpenAI => self.openai.as_deref(),
            Provider::DeepSeek => self.deepseek.as_deref(),
            Provider::Mock => None,
        };
        key.filter(|k| !k.is_empty())
    }

    /// Whether any vendor key is configured.
    #[must_use]
    pub fn any(&self) -> bool {
        [Provider::Anthropic, Provider::OpenAI, Provider::DeepSeek]
            .into_iter()
            .any(|p| self.for_provider(p).is_some())
    }
}

/// Base URLs per provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Anthropic endpoint.
    pub anthropic: String,
    /// OpenAI endpoint.
    pub openai: String,
    /// DeepSeek endpoint.
    pub deepseek: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            anthropic: DEFAULT_ANTHROPIC_BASE.to_string(),
            openai: DEFAULT_OPENAI_BASE.to_string(),
            deepseek: DEFAULT_DEEPSEEK_BASE.to_string(),
        }
    }
}

impl ProviderEndpoints {
    /// Returns the endpoint for `provider`. The mock has none.
    #[must_use]
    pub fn for_provider(&self, provider: Provider) -> &str {
        match provider {
            Provider::Anthropic => &self.anthropic,
            Provider::OpenAI => &self.openai,
            Provider::DeepSeek => &self.deepseek,
            Provider::Mock => "",
        }
    }
}

/// Settings for [`ModelRouter`].
#[derive(Debug, Clone, Default)]
pub struct RouterSettings {
    /// Provider credentials.
    pub keys: ProviderKeys,
    /// Provider endpoints.
    pub endpoints: ProviderEndpoints,
    /// Build mock services for every model instead of vendor clients.
    pub dry_run: bool,
    /// Ask builders to dump request/response traffic.
    pub debug: bool,
    /// Retry policy applied to every built service.
    pub retry: RetryPolicy,
}

/// Everything a [`ServiceBuilder`] needs to construct one service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// The model ID (e.g., "claude-sonnet-4-5-20250929").
    pub model_id: String,
    /// Resolved provider.
    pub provider: Provider,
    /// API key, absent for the mock.
    pub api_key: Option<String>,
    /// Provider endpoint.
    pub base_url: String,
    /// Dump traffic for debugging.
    pub debug: bool,
}

/// Constructs [`ModelService`] instances for one provider.
pub trait ServiceBuilder: Send + Sync {
    /// Builds a service for `config.model_id`.
    ///
    /// # Errors
    /// Returns a `ModelError` if the client cannot be constructed.
    fn build(&self, config: &ServiceConfig) -> Result<Arc<dyn ModelService>, ModelError>;
}

/// Builds [`MockModel`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockServiceBuilder;

impl ServiceBuilder for MockServiceBuilder {
    fn build(&self, config: &ServiceConfig) -> Result<Arc<dyn ModelService>, ModelError> {
        Ok(Arc::new(MockModel::new(config.model_id.clone())))
    }
}

/// Routes model names to cached, retry-wrapped services.
pub struct ModelRouter {
    settings: RouterSettings,
    builders: RwLock<HashMap<Provider, Arc<dyn ServiceBuilder>>>,
    services: RwLock<HashMap<String, Arc<dyn ModelService>>>,
}

impl fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRouter")
            .field("dry_run", &self.settings.dry_run)
            .field("cached", &self.cached_models())
            .finish_non_exhaustive()
    }
}

impl ModelRouter {
    /// Creates a router.
    ///
    /// # Errors
    /// Returns `ModelError::MissingApiKey` when no vendor key is configured
    /// and `dry_run` is off.
    pub fn new(settings: RouterSettings) -> Result<Self, ModelError> {
        if !settings.dry_run && !settings.keys.any() {
            return Err(ModelError::MissingApiKey(
                "no API keys configured: set ANTHROPIC_API_KEY, OPENAI_API_KEY, or DEEPSEEK_API_KEY"
                    .to_string(),
            ));
        }

        let mut builders: HashMap<Provider, Arc<dyn ServiceBuilder>> = HashMap::new();
        builders.insert(Provider::Mock, Arc::new(MockServiceBuilder));

        Ok(Self {
            settings,
            builders: RwLock::new(builders),
            services: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the router settings.
    #[must_use]
    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Plugs in the client builder for `provider`, replacing any previous one.
    pub fn register_builder(&self, provider: Provider, builder: Arc<dyn ServiceBuilder>) {
        debug!(provider = %provider, "Registering model service builder");
        self.builders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider, builder);
    }

    /// Returns the service for `model`, building and caching it on first use.
    ///
    /// # Errors
    /// Returns `ModelError::MissingApiKey` when the provider has no key, or
    /// `ModelError::UnsupportedModelProvider` when no builder is registered.
    pub fn service_for(&self, model: &str) -> Result<Arc<dyn ModelService>, ModelError> {
        if let Some(service) =
            self.services.read().unwrap_or_else(PoisonError::into_inner).get(model)
        {
            return Ok(Arc::clone(service));
        }

        let provider = detect_provider(model);
        let api_key = self.settings.keys.for_provider(provider).map(str::to_string);
        if api_key.is_none() && provider != Provider::Mock && !self.settings.dry_run {
            return Err(ModelError::MissingApiKey(format!(
                "{} not set for model: {model}",
                provider.key_env()
            )));
        }

        let builder: Arc<dyn ServiceBuilder> = if self.settings.dry_run {
            Arc::new(MockServiceBuilder)
        } else {
            self.builders
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&provider)
                .cloned()
                .ok_or_else(|| {
                    ModelError::UnsupportedModelProvider(format!(
                        "no client registered for provider '{provider}' (model: {model})"
                    ))
                })?
        };

        let config = ServiceConfig {
            model_id: model.to_string(),
            provider,
            api_key,
            base_url: self.settings.endpoints.for_provider(provider).to_string(),
            debug: self.settings.debug,
        };

        debug!(
            model_id = %model,
            provider = %provider,
            dry_run = self.settings.dry_run,
            "Creating model service"
        );

        let inner = builder.build(&config)?;
        let service: Arc<dyn ModelService> =
            Arc::new(RetryingService::new(inner, self.settings.retry.clone()));

        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(services.entry(model.to_string()).or_insert(service)))
    }

    /// Model names with a cached service, sorted.
    #[must_use]
    pub fn cached_models(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.services.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_abstraction::ModelRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keys_with_openai() -> ProviderKeys {
        ProviderKeys { openai: Some("sk-test".to_string()), ..ProviderKeys::default() }
    }

    struct CountingBuilder {
        built: AtomicUsize,
    }

    impl ServiceBuilder for CountingBuilder {
        fn build(&self, config: &ServiceConfig) -> Result<Arc<dyn ModelService>, ModelError> {
            self.built.fetch_add(1, Ordering::SeqCst);
            assert_eq!(config.api_key.as_deref(), Some("sk-test"));
            assert_eq!(config.base_url, DEFAULT_OPENAI_BASE);
            Ok(Arc::new(MockModel::new(format!("built-{}", config.model_id))))
        }
    }

    #[test]
    fn test_detect_provider() {
        assert_eq!(detect_provider("claude-sonnet-4-5-20250929"), Provider::Anthropic);
        assert_eq!(detect_provider("OPUS-4"), Provider::Anthropic);
        assert_eq!(detect_provider("haiku-3"), Provider::Anthropic);
        assert_eq!(detect_provider("deepseek-chat"), Provider::DeepSeek);
        assert_eq!(detect_provider("gpt-5-nano"), Provider::OpenAI);
        assert_eq!(detect_provider("o3-mini"), Provider::OpenAI);
        assert_eq!(detect_provider("mock-small"), Provider::Mock);
        assert_eq!(detect_provider("llama-70b"), Provider::OpenAI);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("deepseek".parse::<Provider>().unwrap(), Provider::DeepSeek);
        assert!("gemini".parse::<Provider>().is_err());
    }

    #[test]
    fn test_new_requires_a_key() {
        let err = ModelRouter::new(RouterSettings::default()).unwrap_err();
        assert!(matches!(err, ModelError::MissingApiKey(_)));

        let empty = ProviderKeys { anthropic: Some(String::new()), ..ProviderKeys::default() };
        assert!(ModelRouter::new(RouterSettings { keys: empty, ..RouterSettings::default() })
            .is_err());
    }

    #[test]
    fn test_dry_run_needs_no_keys() {
        let router =
            ModelRouter::new(RouterSettings { dry_run: true, ..RouterSettings::default() })
                .unwrap();
        let service = router.service_for("claude-sonnet-4-5-20250929").unwrap();
        assert_eq!(service.model_id(), "claude-sonnet-4-5-20250929");
    }

    #[test]
    fn test_missing_provider_key() {
        let router = ModelRouter::new(RouterSettings {
            keys: keys_with_openai(),
            ..RouterSettings::default()
        })
        .unwrap();
        let err = router.service_for("claude-sonnet-4-5-20250929").err().unwrap();
        match err {
            ModelError::MissingApiKey(msg) => assert!(msg.contains("ANTHROPIC_API_KEY")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unregistered_provider_is_unsupported() {
        let router = ModelRouter::new(RouterSettings {
            keys: keys_with_openai(),
            ..RouterSettings::default()
        })
        .unwrap();
        let err = router.service_for("gpt-5-nano").err().unwrap();
        assert!(matches!(err, ModelError::UnsupportedModelProvider(_)));
    }

    #[tokio::test]
    async fn test_registered_builder_is_used_and_cached() {
        let router = ModelRouter::new(RouterSettings {
            keys: keys_with_openai(),
            ..RouterSettings::default()
        })
        .unwrap();
        let builder = Arc::new(CountingBuilder { built: AtomicUsize::new(0) });
        router.register_builder(Provider::OpenAI, builder.clone());

        let first = router.service_for("gpt-5-nano").unwrap();
        let second = router.service_for("gpt-5-nano").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.built.load(Ordering::SeqCst), 1);
        assert_eq!(router.cached_models(), vec!["gpt-5-nano".to_string()]);

        let response = first.complete(&ModelRequest::from_user_text("hi")).await.unwrap();
        assert_eq!(response.model, "built-gpt-5-nano");
    }

    #[test]
    fn test_mock_models_skip_key_check() {
        let router = ModelRouter::new(RouterSettings {
            keys: keys_with_openai(),
            ..RouterSettings::default()
        })
        .unwrap();
        assert!(router.service_for("mock-fast").is_ok());
    }
}

//! Cost estimation from token counts.
//!
//! Prices are USD per million tokens. Unknown models are priced at the
//! reference model's rate by [`CostEstimator::calculate_cost`]; callers that
//! need to know about the gap use [`CostEstimator::try_calculate_cost`].

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CortexError, Result};

/// Model every cost is compared against.
pub const REFERENCE_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Price of one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per million input tokens.
    pub input_per_million: f64,
    /// Cost per million output tokens.
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Creates a price entry.
    #[must_use]
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self { input_per_million, output_per_million }
    }

    /// Cost of the given token counts.
    #[must_use]
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// Pricing table in TOML form.
#[derive(Debug, Clone, Deserialize)]
struct PricingFile {
    #[serde(default)]
    reference_model: Option<String>,
    #[serde(default)]
    models: HashMap<String, ModelPricing>,
}

/// Price table plus a reference model.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    pricing: HashMap<String, ModelPricing>,
    reference_model: String,
}

impl Default for CostEstimator {
    fn default() -> Self {
        let pricing = HashMap::from([
            ("gpt-5-nano".to_string(), ModelPricing::new(0.10, 0.30)),
            ("deepseek-chat".to_string(), ModelPricing::new(0.14, 0.28)),
            (REFERENCE_MODEL.to_string(), ModelPricing::new(3.00, 15.00)),
        ]);
        Self { pricing, reference_model: REFERENCE_MODEL.to_string() }
    }
}

impl CostEstimator {
    /// Creates an estimator with the default price table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an estimator from an explicit table.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Configuration` if the reference model is not
    /// priced or a price is negative.
    pub fn with_pricing(
        pricing: HashMap<String, ModelPricing>,
        reference_model: impl Into<String>,
    ) -> Result<Self> {
        let estimator = Self { pricing, reference_model: reference_model.into() };
        estimator.validate()?;
        Ok(estimator)
    }

    /// Loads a TOML table on top of the defaults.
    ///
    /// ```toml
    /// reference_model = "claude-sonnet-4-5-20250929"
    ///
    /// [models."gpt-5-nano"]
    /// input_per_million = 0.10
    /// output_per_million = 0.30
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Configuration` if the file cannot be read,
    /// parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CortexError::Configuration(format!("failed to read pricing file {}: {e}", path.display()))
        })?;
        let file: PricingFile = toml::from_str(&content).map_err(|e| {
            CortexError::Configuration(format!("failed to parse pricing file {}: {e}", path.display()))
        })?;

        let mut estimator = Self::default();
        let added = file.models.len();
        estimator.pricing.extend(file.models);
        if let Some(reference) = file.reference_model {
            estimator.reference_model = reference;
        }
        estimator.validate()?;

        debug!(
            path = %path.display(),
            models = added,
            reference_model = %estimator.reference_model,
            "Loaded pricing table"
        );
        Ok(estimator)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    ///
    /// # Errors
    ///
    /// See [`CostEstimator::load`].
    pub fn from_optional_file(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    fn validate(&self) -> Result<()> {
        if !self.pricing.contains_key(&self.reference_model) {
            return Err(CortexError::Configuration(format!(
                "reference model '{}' has no pricing",
                self.reference_model
            )));
        }
        if let Some((model, _)) = self
            .pricing
            .iter()
            .find(|(_, p)| p.input_per_million < 0.0 || p.output_per_million < 0.0)
        {
            return Err(CortexError::Configuration(format!("negative price for model '{model}'")));
        }
        Ok(())
    }

    /// Reference model name.
    #[must_use]
    pub fn reference_model(&self) -> &str {
        &self.reference_model
    }

    /// Price of `model`, if known.
    #[must_use]
    pub fn pricing(&self, model: &str) -> Option<&ModelPricing> {
        self.pricing.get(model)
    }

    /// Whether `model` has an explicit price.
    #[must_use]
    pub fn is_priced(&self, model: &str) -> bool {
        self.pricing.contains_key(model)
    }

    /// Cost of a call, or `None` for an unpriced model.
    #[must_use]
    pub fn try_calculate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        self.pricing.get(model).map(|p| p.cost(input_tokens, output_tokens))
    }

    /// Cost of a call. Unpriced models use the reference model's rate.
    #[must_use]
    pub fn calculate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        if let Some(cost) = self.try_calculate_cost(model, input_tokens, output_tokens) {
            return cost;
        }
        warn!(
            model = %model,
            reference_model = %self.reference_model,
            "No pricing for model, using reference pricing"
        );
        self.reference_cost(input_tokens, output_tokens)
    }

    /// Cost of the same tokens on the reference model.
    #[must_use]
    pub fn reference_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        self.pricing
            .get(&self.reference_model)
            .map_or(0.0, |p| p.cost(input_tokens, output_tokens))
    }
}

//! Configuration module for Cortex Core.
//!
//! Values come from an optional TOML file named by `CORTEX_CONFIG`, then from
//! `CORTEX_*` environment variables, which take precedence. Loading goes
//! through [`CortexConfig::from_vars`] so tests never touch the process
//! environment.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use cortex_models::{ProviderEndpoints, ProviderKeys, RouterSettings};
use serde::Deserialize;
use tracing::warn;

use crate::error::{CortexError, Result};

/// Prefix of per-expert model override variables.
pub const MODEL_OVERRIDE_PREFIX: &str = "CORTEX_MODEL_";

/// Reference model used when routing is disabled.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8181))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: default_address() }
    }
}

/// Root configuration for Cortex.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    /// Directory holding one YAML document per expert.
    pub profiles_dir: PathBuf,
    /// Directory for daily performance logs.
    pub logs_dir: PathBuf,
    /// When false, requests bypass the experts and go to `default_model`.
    pub enabled: bool,
    /// Expert the escalation walk starts from; lowest tier when unset.
    pub entry_expert: Option<String>,
    /// Confidence threshold for profiles that do not set one.
    pub confidence_threshold: f64,
    /// Escalation threshold for profiles that do not set one.
    pub elite_complexity_threshold: f64,
    /// Maximum escalations per request, on top of the registry bound.
    pub max_escalations: Option<usize>,
    /// Buffered log entries that trigger a flush.
    pub flush_threshold: usize,
    /// Estimate execution cost after each request.
    pub track_costs: bool,
    /// Per-request cost (USD) above which a warning is logged.
    pub cost_alert_threshold: f64,
    /// Verbose logging.
    pub debug: bool,
    /// Serve every model with the mock backend.
    pub dry_run: bool,
    /// Model used when routing is disabled.
    pub default_model: String,
    /// Optional pricing table in TOML form.
    pub pricing_file: Option<PathBuf>,
    /// Per-expert model overrides, keyed by expert name.
    pub models: HashMap<String, String>,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Provider credentials. Environment only.
    #[serde(skip)]
    pub api_keys: ProviderKeys,
    /// Provider endpoints. Environment only.
    #[serde(skip)]
    pub api_endpoints: ProviderEndpoints,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            profiles_dir: PathBuf::from("cortex/profiles"),
            logs_dir: PathBuf::from("cortex/logs"),
            enabled: true,
            entry_expert: None,
            confidence_threshold: 0.5,
            elite_complexity_threshold: 0.85,
            max_escalations: None,
            flush_threshold: 10,
            track_costs: true,
            cost_alert_threshold: 0.50,
            debug: false,
            dry_run: false,
            default_model: DEFAULT_MODEL.to_string(),
            pricing_file: None,
            models: HashMap::new(),
            server: ServerConfig::default(),
            api_keys: ProviderKeys::default(),
            api_endpoints: ProviderEndpoints::default(),
        }
    }
}

/// Normalizes an expert name for override matching: lowercase, without `_`
/// or `-`. `SECOND_THOUGHT` and `SecondThought` both become `secondthought`.
#[must_use]
pub fn normalize_expert_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

impl CortexConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable or a value is out of
    /// range.
    pub fn load() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable or a value is out of
    /// range.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> =
            vars.into_iter().filter(|(_, v)| !v.is_empty()).collect();

        let mut config = match vars.get("CORTEX_CONFIG") {
            Some(path) => Self::from_file(Path::new(path))?,
            None => Self::default(),
        };
        config.apply_vars(&vars);
        config.validate()?;
        Ok(config)
    }

    /// Load defaults from a TOML file. A missing file is an error here since
    /// it was named explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CortexError::Configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            CortexError::Configuration(format!("failed to parse config file {}: {e}", path.display()))
        })
    }

    fn apply_vars(&mut self, vars: &HashMap<String, String>) {
        let get = |key: &str| vars.get(key).map(String::as_str);

        if let Some(v) = get("CORTEX_PROFILES_DIR") {
            self.profiles_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CORTEX_LOGS_DIR") {
            self.logs_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CORTEX_ENTRY_EXPERT") {
            self.entry_expert = Some(v.to_string());
        }
        if let Some(v) = get("CORTEX_DEFAULT_MODEL") {
            self.default_model = v.to_string();
        }
        if let Some(v) = get("CORTEX_PRICING_FILE") {
            self.pricing_file = Some(PathBuf::from(v));
        }

        parse_into(get, "CORTEX_ENABLED", parse_bool, &mut self.enabled);
        parse_into(get, "CORTEX_TRACK_COSTS", parse_bool, &mut self.track_costs);
        parse_into(get, "CORTEX_DEBUG", parse_bool, &mut self.debug);
        parse_into(get, "CORTEX_DRY_RUN", parse_bool, &mut self.dry_run);
        parse_into(get, "CORTEX_CONFIDENCE_THRESHOLD", parse_float, &mut self.confidence_threshold);
        parse_into(
            get,
            "CORTEX_ELITE_COMPLEXITY_THRESHOLD",
            parse_float,
            &mut self.elite_complexity_threshold,
        );
        parse_into(get, "CORTEX_COST_ALERT_THRESHOLD", parse_float, &mut self.cost_alert_threshold);
        parse_into(get, "CORTEX_FLUSH_THRESHOLD", |v| v.parse().ok(), &mut self.flush_threshold);
        parse_into(get, "CORTEX_ADDR", |v| v.parse().ok(), &mut self.server.address);

        if let Some(v) = get("CORTEX_MAX_ESCALATIONS") {
            match v.parse() {
                Ok(n) => self.max_escalations = Some(n),
                Err(_) => warn!(key = "CORTEX_MAX_ESCALATIONS", value = %v, "Ignoring invalid value"),
            }
        }

        for (key, value) in vars {
            if let Some(expert) = key.strip_prefix(MODEL_OVERRIDE_PREFIX) {
                self.models.insert(expert.to_string(), value.clone());
            }
        }

        let key = |name: &str| get(name).map(str::to_string);
        self.api_keys = ProviderKeys {
            anthropic: key("ANTHROPIC_API_KEY"),
            openai: key("OPENAI_API_KEY"),
            deepseek: key("DEEPSEEK_API_KEY"),
        };
        if let Some(v) = get("ANTHROPIC_API_BASE") {
            self.api_endpoints.anthropic = v.to_string();
        }
        if let Some(v) = get("OPENAI_API_BASE") {
            self.api_endpoints.openai = v.to_string();
        }
        if let Some(v) = get("DEEPSEEK_API_BASE") {
            self.api_endpoints.deepseek = v.to_string();
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Configuration` describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("elite_complexity_threshold", self.elite_complexity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CortexError::Configuration(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        if self.cost_alert_threshold < 0.0 {
            return Err(CortexError::Configuration(format!(
                "cost_alert_threshold must be non-negative, got {}",
                self.cost_alert_threshold
            )));
        }
        if self.flush_threshold == 0 {
            return Err(CortexError::Configuration(
                "flush_threshold must be at least 1".to_string(),
            ));
        }
        if self.default_model.trim().is_empty() {
            return Err(CortexError::Configuration("default_model must not be empty".to_string()));
        }
        Ok(())
    }

    /// Model override for `expert`, matched on the normalized name.
    #[must_use]
    pub fn model_override(&self, expert: &str) -> Option<&str> {
        let wanted = normalize_expert_name(expert);
        self.models
            .iter()
            .find(|(name, _)| normalize_expert_name(name) == wanted)
            .map(|(_, model)| model.as_str())
    }

    /// Settings for the model router.
    #[must_use]
    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            keys: self.api_keys.clone(),
            endpoints: self.api_endpoints.clone(),
            dry_run: self.dry_run,
            debug: self.debug,
            ..RouterSettings::default()
        }
    }
}

fn parse_into<'a, T, G, P>(get: G, key: &str, parse: P, target: &mut T)
where
    G: Fn(&str) -> Option<&'a str>,
    P: Fn(&str) -> Option<T>,
{
    if let Some(raw) = get(key) {
        match parse(raw) {
            Some(value) => *target = value,
            None => warn!(key = %key, value = %raw, "Ignoring invalid value, using default"),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" | "yes" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" | "no" => Some(false),
        _ => None,
    }
}

fn parse_float(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = CortexConfig::from_vars(Vec::new()).unwrap();
        assert_eq!(config.profiles_dir, PathBuf::from("cortex/profiles"));
        assert_eq!(config.logs_dir, PathBuf::from("cortex/logs"));
        assert!(config.enabled);
        assert!(config.track_costs);
        assert!(!config.dry_run);
        assert_eq!(config.flush_threshold, 10);
        assert!((config.elite_complexity_threshold - 0.85).abs() < f64::EPSILON);
        assert!((config.cost_alert_threshold - 0.50).abs() < f64::EPSILON);
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.server.address, "127.0.0.1:8181".parse().unwrap());
        assert_eq!(config.max_escalations, None);
    }

    #[test]
    fn test_env_values_override_defaults() {
        let config = CortexConfig::from_vars(vars(&[
            ("CORTEX_ENABLED", "false"),
            ("CORTEX_ELITE_COMPLEXITY_THRESHOLD", "0.7"),
            ("CORTEX_MAX_ESCALATIONS", "1"),
            ("CORTEX_DRY_RUN", "1"),
            ("CORTEX_ADDR", "0.0.0.0:9000"),
            ("ANTHROPIC_API_KEY", "test-anthropic-key"),
            ("OPENAI_API_BASE", "http://localhost:8000/v1"),
        ]))
        .unwrap();

        assert!(!config.enabled);
        assert!((config.elite_complexity_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.max_escalations, Some(1));
        assert!(config.dry_run);
        assert_eq!(config.server.address, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.api_keys.anthropic.as_deref(), Some("test-anthropic-key"));
        assert_eq!(config.api_endpoints.openai, "http://localhost:8000/v1");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = CortexConfig::from_vars(vars(&[
            ("CORTEX_ENABLED", "maybe"),
            ("CORTEX_FLUSH_THRESHOLD", "lots"),
        ]))
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.flush_threshold, 10);
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let err = CortexConfig::from_vars(vars(&[("CORTEX_ELITE_COMPLEXITY_THRESHOLD", "1.5")]))
            .unwrap_err();
        assert!(matches!(err, CortexError::Configuration(_)));
    }

    #[test]
    fn test_model_overrides_match_normalized_names() {
        let config = CortexConfig::from_vars(vars(&[
            ("CORTEX_MODEL_FIRSTATTENDANT", "gpt-4o-mini"),
            ("CORTEX_MODEL_SECOND_THOUGHT", "claude-sonnet-4.5"),
        ]))
        .unwrap();

        assert_eq!(config.model_override("FirstAttendant"), Some("gpt-4o-mini"));
        assert_eq!(config.model_override("SecondThought"), Some("claude-sonnet-4.5"));
        assert_eq!(config.model_override("Elite"), None);
    }

    #[test]
    fn test_normalize_expert_name() {
        assert_eq!(normalize_expert_name("SECOND_THOUGHT"), "secondthought");
        assert_eq!(normalize_expert_name("second-thought"), "secondthought");
        assert_eq!(normalize_expert_name("Elite"), "elite");
    }

    #[test]
    fn test_config_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
logs_dir = "/var/log/cortex"
flush_threshold = 3

[models]
Elite = "claude-opus-4"

[server]
address = "0.0.0.0:8080"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = CortexConfig::from_vars(vars(&[
            ("CORTEX_CONFIG", path.as_str()),
            ("CORTEX_FLUSH_THRESHOLD", "5"),
        ]))
        .unwrap();

        assert_eq!(config.logs_dir, PathBuf::from("/var/log/cortex"));
        assert_eq!(config.flush_threshold, 5);
        assert_eq!(config.model_override("ELITE"), Some("claude-opus-4"));
        assert_eq!(config.server.address, "0.0.0.0:8080".parse().unwrap());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = CortexConfig::from_vars(vars(&[("CORTEX_CONFIG", "/nonexistent/cortex.toml")]))
            .unwrap_err();
        assert!(matches!(err, CortexError::Configuration(_)));
    }

    #[test]
    fn test_router_settings_carry_dry_run() {
        let config = CortexConfig::from_vars(vars(&[("CORTEX_DRY_RUN", "true")])).unwrap();
        let settings = config.router_settings();
        assert!(settings.dry_run);
        assert!(!settings.keys.any());
    }
}

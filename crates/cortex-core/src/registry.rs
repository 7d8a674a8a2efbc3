//! Expert profiles and the registry built from them.
//!
//! Profiles are YAML documents, one per expert, loaded once at startup. The
//! registry orders the active (non-meta) experts into a tier ladder and binds
//! each to a tier policy.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CortexConfig;
use crate::error::{CortexError, Result};
use crate::expert::Expert;
use crate::policy::PolicyKind;

/// Whether an expert takes part in routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertKind {
    /// Routable expert.
    #[default]
    #[serde(alias = "")]
    Regular,
    /// Support expert, never routed to.
    Meta,
}

/// An expert's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertProfile {
    /// Unique expert name.
    pub name: String,
    /// Backing model id.
    pub model: String,
    /// Tier ordinal; lower tiers are tried first.
    #[serde(default)]
    pub tier: u32,
    /// Regular or meta.
    #[serde(default, rename = "type")]
    pub kind: ExpertKind,
    /// Free-form grouping.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    /// Confidence below which the expert escalates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    /// Complexity at or above which the expert escalates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elite_complexity_threshold: Option<f64>,
    /// Explicit escalation target, instead of the next tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
    /// Explicit policy, instead of one derived from the ladder position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyKind>,
    /// What the expert is good at.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// What the expert is bad at.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weaknesses: Vec<String>,
    /// Prepended to every request the expert executes.
    #[serde(default)]
    pub system_prompt: String,
    /// Default output limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Default sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ExpertProfile {
    /// A minimal regular profile.
    #[must_use]
    pub fn new(name: impl Into<String>, model: impl Into<String>, tier: u32) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            tier,
            kind: ExpertKind::Regular,
            category: String::new(),
            confidence_threshold: None,
            elite_complexity_threshold: None,
            escalate_to: None,
            policy: None,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            system_prompt: String::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    /// Parses one YAML profile.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Configuration` if the file cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CortexError::Configuration(format!("failed to read profile {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            CortexError::Configuration(format!("failed to parse profile {}: {e}", path.display()))
        })
    }

    /// Whether the expert takes part in routing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.kind == ExpertKind::Regular
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CortexError::Configuration("profile with empty name".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(CortexError::Configuration(format!(
                "profile '{}' has an empty model",
                self.name
            )));
        }
        if self.escalate_to.as_deref() == Some(self.name.as_str()) {
            return Err(CortexError::Configuration(format!(
                "profile '{}' escalates to itself",
                self.name
            )));
        }
        for (field, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("elite_complexity_threshold", self.elite_complexity_threshold),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(CortexError::Configuration(format!(
                        "profile '{}': {field} must be between 0.0 and 1.0, got {v}",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Loaded experts, ordered into a tier ladder.
#[derive(Debug)]
pub struct ExpertRegistry {
    experts: HashMap<String, Expert>,
    ladder: Vec<String>,
    meta: Vec<ExpertProfile>,
    entry: String,
}

impl ExpertRegistry {
    /// Loads every `*.yaml`/`*.yml` file directly under `dir`.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Configuration` if the directory is missing, a
    /// profile is malformed, or the profile set is invalid.
    pub fn load_dir(dir: &Path, config: &CortexConfig) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| {
            CortexError::Configuration(format!(
                "failed to read profiles directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        let profiles = paths.iter().map(|p| ExpertProfile::load(p)).collect::<Result<Vec<_>>>()?;
        info!(dir = %dir.display(), profiles = profiles.len(), "Loaded expert profiles");
        Self::from_profiles(profiles, config)
    }

    /// Builds a registry from in-memory profiles, applying the configured
    /// model overrides and threshold defaults.
    ///
    /// # Errors
    ///
    /// Returns `CortexError::Configuration` on an empty set, duplicate or
    /// empty names, self-escalation, or an unknown entry expert.
    pub fn from_profiles(profiles: Vec<ExpertProfile>, config: &CortexConfig) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut active = Vec::new();
        let mut meta = Vec::new();

        for mut profile in profiles {
            profile.validate()?;
            if !seen.insert(profile.name.clone()) {
                return Err(CortexError::Configuration(format!(
                    "duplicate expert profile '{}'",
                    profile.name
                )));
            }
            if let Some(model) = config.model_override(&profile.name) {
                info!(expert = %profile.name, from = %profile.model, to = %model, "Applying model override");
                profile.model = model.to_string();
            }
            if profile.is_active() {
                active.push(profile);
            } else {
                meta.push(profile);
            }
        }

        if active.is_empty() {
            return Err(CortexError::Configuration("no active expert profiles".to_string()));
        }

        active.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| a.name.cmp(&b.name)));
        let ladder: Vec<String> = active.iter().map(|p| p.name.clone()).collect();
        let tiers: Vec<u32> = active.iter().map(|p| p.tier).collect();

        let mut experts = HashMap::with_capacity(active.len());
        let ladder_len = active.len();
        for (index, profile) in active.into_iter().enumerate() {
            let next_tier = (index + 1..ladder_len)
                .find(|&i| tiers[i] > profile.tier)
                .map(|i| ladder[i].clone());
            let policy =
                profile.policy.unwrap_or_else(|| PolicyKind::for_position(index, ladder_len));

            debug!(
                expert = %profile.name,
                model = %profile.model,
                tier = profile.tier,
                policy = %policy,
                next_tier = next_tier.as_deref().unwrap_or(""),
                "Registered expert"
            );

            let name = profile.name.clone();
            let expert = Expert::new(
                profile,
                policy,
                next_tier,
                config.confidence_threshold,
                config.elite_complexity_threshold,
            );
            experts.insert(name, expert);
        }

        let entry = match &config.entry_expert {
            Some(name) if experts.contains_key(name) => name.clone(),
            Some(name) => {
                return Err(CortexError::Configuration(format!(
                    "entry expert '{name}' is not an active expert"
                )));
            }
            None => ladder[0].clone(),
        };

        Ok(Self { experts, ladder, meta, entry })
    }

    /// Active expert by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Expert> {
        self.experts.get(name)
    }

    /// Active experts in ladder order.
    pub fn active(&self) -> impl Iterator<Item = &Expert> {
        self.ladder.iter().filter_map(|name| self.experts.get(name))
    }

    /// Where the escalation walk starts.
    #[must_use]
    pub fn entry(&self) -> &Expert {
        &self.experts[&self.entry]
    }

    /// The next tier above `name`, if any.
    #[must_use]
    pub fn next_above(&self, name: &str) -> Option<&Expert> {
        self.get(name)?.next_tier().and_then(|next| self.get(next))
    }

    /// Meta profiles, loaded but never routed to.
    #[must_use]
    pub fn meta_profiles(&self) -> &[ExpertProfile] {
        &self.meta
    }

    /// Number of active experts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ladder.len()
    }

    /// Always false for a constructed registry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ladder.is_empty()
    }
}

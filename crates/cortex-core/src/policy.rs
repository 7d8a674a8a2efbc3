//! Tier policies.
//!
//! A policy turns the facts about one request (its text, complexity score and
//! the expert's position in the ladder) into an [`ExpertDecision`]. Policies
//! are selected per expert by configuration, never by expert name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::complexity::truncate;
use crate::error::CortexError;

/// Maximum characters of source text carried in an escalation summary.
pub const CONTEXT_SUMMARY_CHARS: usize = 100;

/// Which policy an expert runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Lowest tier: confidence bands over the complexity score.
    Entry,
    /// Middle tiers: escalate above the complexity threshold.
    Mid,
    /// Highest tier: always handles.
    Top,
}

impl PolicyKind {
    /// Returns the policy implementation for this kind.
    #[must_use]
    pub fn policy(self) -> Box<dyn TierPolicy> {
        match self {
            Self::Entry => Box::new(EntryPolicy),
            Self::Mid => Box::new(MidPolicy),
            Self::Top => Box::new(TopPolicy),
        }
    }

    /// Derives the policy from a ladder position.
    #[must_use]
    pub const fn for_position(index: usize, ladder_len: usize) -> Self {
        if index + 1 >= ladder_len {
            Self::Top
        } else if index == 0 {
            Self::Entry
        } else {
            Self::Mid
        }
    }

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Mid => "mid",
            Self::Top => "top",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "entry" => Ok(Self::Entry),
            "mid" => Ok(Self::Mid),
            "top" => Ok(Self::Top),
            _ => Err(CortexError::Configuration(format!("Unknown tier policy: {s}"))),
        }
    }
}

/// An expert's decision on how to handle a request.
///
/// `escalate_to` being `None` means the expert must execute the request;
/// `Some` means it must not execute and the request moves to the named expert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertDecision {
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Complexity score in [0, 1].
    pub complexity: f64,
    /// Expert to hand the request to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
    /// Human-readable justification.
    pub reasoning: String,
    /// How the expert intends to work ("solve", "decomposition").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approach: Option<String>,
    /// Summary passed along on escalation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,
}

impl ExpertDecision {
    /// A terminal decision.
    #[must_use]
    pub fn handle(confidence: f64, complexity: f64, reasoning: impl Into<String>, approach: &str) -> Self {
        Self {
            confidence,
            complexity,
            escalate_to: None,
            reasoning: reasoning.into(),
            approach: Some(approach.to_string()),
            context_summary: None,
        }
    }

    /// An escalating decision.
    #[must_use]
    pub fn escalate(
        confidence: f64,
        complexity: f64,
        target: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            confidence,
            complexity,
            escalate_to: Some(target.into()),
            reasoning: reasoning.into(),
            approach: None,
            context_summary: None,
        }
    }

    /// Whether the deciding expert must execute the request.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.escalate_to.is_none()
    }
}

/// What a policy sees about a request and the deciding expert.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    /// Deciding expert's name.
    pub expert: &'a str,
    /// First user text block, if any.
    pub text: Option<&'a str>,
    /// Complexity of `text` (0.0 without text).
    pub complexity: f64,
    /// Next tier up the ladder, if any.
    pub next_tier: Option<&'a str>,
    /// Confidence below which the expert escalates.
    pub confidence_threshold: f64,
    /// Complexity at or above which the expert escalates.
    pub escalation_threshold: f64,
}

/// Decides whether an expert handles a request or escalates it.
pub trait TierPolicy: Send + Sync + fmt::Debug {
    /// Which policy this is.
    fn kind(&self) -> PolicyKind;

    /// Produces a decision. Must be deterministic.
    fn decide(&self, input: &PolicyInput<'_>) -> ExpertDecision;
}

/// Entry-tier policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryPolicy;

impl TierPolicy for EntryPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Entry
    }

    fn decide(&self, input: &PolicyInput<'_>) -> ExpertDecision {
        if input.text.is_none() {
            let reasoning = "No clear user content to evaluate";
            return match input.next_tier {
                Some(next) => ExpertDecision::escalate(0.3, 0.0, next, reasoning),
                None => ExpertDecision::handle(0.3, 0.0, reasoning, "solve"),
            };
        }

        let score = input.complexity;
        let (confidence, reasoning) = if score < 0.3 {
            (0.85, format!("Simple task matching {} strengths", input.expert))
        } else if score < 0.6 {
            (0.65, "Medium complexity task, within capabilities".to_string())
        } else {
            (0.45, format!("Task complexity exceeds {} threshold", input.expert))
        };

        match input.next_tier {
            Some(next) if confidence < input.confidence_threshold => {
                ExpertDecision::escalate(confidence, score, next, reasoning)
            }
            _ => ExpertDecision::handle(confidence, score, reasoning, "solve"),
        }
    }
}

/// Mid-tier policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidPolicy;

impl TierPolicy for MidPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Mid
    }

    fn decide(&self, input: &PolicyInput<'_>) -> ExpertDecision {
        let score = input.complexity;
        let confidence = (1.0 - score).clamp(0.0, 1.0);

        match input.next_tier {
            Some(next) if score >= input.escalation_threshold => {
                let mut decision = ExpertDecision::escalate(
                    confidence,
                    score,
                    next,
                    "Task requires higher-tier expertise",
                );
                decision.context_summary = Some(format!(
                    "Complex task: {}",
                    truncate(input.text.unwrap_or_default(), CONTEXT_SUMMARY_CHARS)
                ));
                decision
            }
            _ => ExpertDecision::handle(
                confidence,
                score,
                format!("Task within {} capabilities", input.expert),
                "decomposition",
            ),
        }
    }
}

/// Top-tier policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopPolicy;

impl TierPolicy for TopPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Top
    }

    fn decide(&self, input: &PolicyInput<'_>) -> ExpertDecision {
        ExpertDecision::handle(
            1.0,
            1.0,
            format!("{} handles all escalated tasks", input.expert),
            "solve",
        )
    }
}

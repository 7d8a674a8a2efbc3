//! Cortex Core - expert escalation and routing engine.
//!
//! This crate decides which expert in a tiered hierarchy answers a request,
//! executes it against that expert's model, and records performance and cost
//! outcomes:
//! - Expert profiles and the tier ladder
//! - Tier policies and complexity estimation
//! - The escalation router
//! - Performance logs, cost estimation and monitoring reports
//! - Configuration, error handling and the HTTP surface
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cortex_core::{CortexConfig, EscalationRouter, server};
//!
//! #[tokio::main]
//! async fn main() -> cortex_core::Result<()> {
//!     let config = CortexConfig::load()?;
//!     let addr = config.server.address;
//!     let router = Arc::new(EscalationRouter::from_config(config)?);
//!     server::run(router, addr, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod complexity;
pub mod config;
pub mod cost;
pub mod error;
pub mod expert;
pub mod performance;
pub mod policy;
pub mod registry;
pub mod report;
pub mod router;
pub mod server;

pub use complexity::{ComplexityEstimator, ComplexityScore};
pub use config::{CortexConfig, ServerConfig};
pub use cost::{CostEstimator, ModelPricing, REFERENCE_MODEL};
pub use error::{CortexError, Result};
pub use expert::{ExecutionOutcome, Expert};
pub use performance::{PerformanceLog, PerformanceTracker, Statistics};
pub use policy::{EntryPolicy, ExpertDecision, MidPolicy, PolicyInput, PolicyKind, TierPolicy, TopPolicy};
pub use registry::{ExpertKind, ExpertProfile, ExpertRegistry};
pub use report::{MonitoringReport, generate_report};
pub use router::{EscalationRouter, ExpertChoice, ExpertSummary, RoutedResponse};

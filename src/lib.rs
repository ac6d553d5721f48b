//! MarketMap Core - Rule-driven market data normalization
//!
//! This crate turns heterogeneous provider payloads (REST snapshots and
//! stream ticks from several brokers) into canonical records. The
//! implementation prioritizes:
//!
//! 1. **Correctness** - Statistics never drift, writes never leave stale cache
//! 2. **Logging** - Every decision point logged with request context
//! 3. **Bounded work** - Concurrency and queueing limits under load
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `analysis` - Schema inference and mapping suggestions from samples
//! - `validation` - Rule-type capability checks and fallback resolution
//! - `registry` - Mapping rule lifecycle and best-match selection
//! - `extraction` - Path parsing and field mapping
//! - `limiter` - Bounded task admission with timeouts
//! - `pipeline` - End-to-end transformation of single requests and batches
//! - `config` - Environment-driven engine configuration
//! - `logging` - Structured logging with request context
//!
//! With the `python` feature the pure components are exposed through PyO3.

pub mod analysis;
pub mod config;
pub mod cycle;
pub mod error;
pub mod extraction;
pub mod limiter;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod validation;

#[cfg(feature = "python")]
mod python;

pub use analysis::{analyze, suggest_mappings, DataSourceAnalysis, ExtractedField, FieldType};
pub use config::EngineConfig;
pub use error::{Error, ErrorCategory, Result};
pub use extraction::{apply_mappings, TransformationResult};
pub use limiter::{LimiterConfig, ScheduleOutcome, TaskLimiter};
pub use pipeline::{BatchItemOutcome, BatchResult, MarketDataPipeline, TransformOutcome, TransformRequest};
pub use registry::{
    ApiType, CreateRuleSpec, FieldMapping, MappingRule, MappingRuleRegistry, MappingRuleResponse,
    RuleCache, RuleStore,
};
pub use validation::{CapabilityTable, CapabilityValidator, TypeValidationResult, ValidationOptions};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the process-wide logger.
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call repeatedly; only
/// the first call installs a logger.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Build a pipeline from `config` over the given collaborators.
pub fn build_pipeline(
    config: &EngineConfig,
    store: std::sync::Arc<dyn RuleStore>,
    cache: std::sync::Arc<dyn RuleCache>,
) -> Result<MarketDataPipeline> {
    let table = config.load_capabilities()?;
    let validator = CapabilityValidator::new(table);
    let registry = MappingRuleRegistry::new(store, cache, config.registry.clone());
    Ok(MarketDataPipeline::new(
        std::sync::Arc::new(validator),
        std::sync::Arc::new(registry),
        TaskLimiter::new(config.limiter.clone()),
    ))
}

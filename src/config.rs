//! Engine configuration.
//!
//! Defaults suit a single process; every knob can be overridden through
//! `MARKETMAP_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::limiter::LimiterConfig;
use crate::registry::RegistryConfig;
use crate::validation::capability::CapabilityTable;

pub const ENV_MAX_PENDING: &str = "MARKETMAP_MAX_PENDING";
pub const ENV_TASK_TIMEOUT_MS: &str = "MARKETMAP_TASK_TIMEOUT_MS";
pub const ENV_MAX_QUEUE_SIZE: &str = "MARKETMAP_MAX_QUEUE_SIZE";
pub const ENV_WARMUP_LIMIT: &str = "MARKETMAP_WARMUP_LIMIT";
pub const ENV_CAPABILITIES_PATH: &str = "MARKETMAP_CAPABILITIES_PATH";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub limiter: LimiterConfig,
    pub registry: RegistryConfig,
    /// Capability table JSON. The built-in table is used when unset.
    pub capabilities_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep their
    /// defaults; set but unparseable ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_MAX_PENDING)? {
            config.limiter.max_pending = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, ENV_TASK_TIMEOUT_MS)? {
            config.limiter.task_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_MAX_QUEUE_SIZE)? {
            config.limiter.max_queue_size = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_WARMUP_LIMIT)? {
            config.registry.warmup_limit = v;
        }
        config.capabilities_path = lookup(ENV_CAPABILITIES_PATH)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        log::info!(
            "ENGINE_CONFIG max_pending={} task_timeout_ms={} max_queue_size={} warmup_limit={} capabilities={:?}",
            config.limiter.max_pending,
            config.limiter.task_timeout.as_millis(),
            config.limiter.max_queue_size,
            config.registry.warmup_limit,
            config.capabilities_path
        );
        Ok(config)
    }

    /// The configured capability table, or the built-in one.
    pub fn load_capabilities(&self) -> Result<Arc<CapabilityTable>> {
        match &self.capabilities_path {
            Some(path) => CapabilityTable::load_from_path(path)
                .map(Arc::new)
                .map_err(|e| Error::Config(format!("{:#}", e))),
            None => Ok(Arc::new(CapabilityTable::builtin())),
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?}: {}", name, raw, e))),
    }
}

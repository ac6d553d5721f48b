//! Rule-type capability validation.
//!
//! Decides whether a rule-list type may be used, substitutes fallback types
//! when allowed, and attaches risk/performance advisories.
//!
//! Check order for one type: enabled, then strict-mode support level, then
//! target endpoint. The first failing check either falls back (re-running
//! every check on the fallback type) or fails; later checks are not
//! evaluated for that type.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cycle::{walk_chain, CycleGuard, WalkViolation};
use crate::error::{Error, Result};
use crate::validation::capability::{
    CapabilityTable, RiskLevel, SupportLevel, TypeCapabilityConfig,
};

/// Average response time above which a performance warning is attached.
pub const SLOW_RESPONSE_THRESHOLD_MS: f64 = 1000.0;
/// Cache hit rate below which a cache-efficiency warning is attached.
pub const LOW_CACHE_HIT_RATE: f64 = 0.5;
/// Maximum number of fallback hops from the requested type.
pub const MAX_FALLBACK_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    pub allow_fallback: bool,
    pub strict_mode: bool,
    pub target_endpoint: Option<String>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            allow_fallback: true,
            strict_mode: false,
            target_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeValidationResult {
    pub is_valid: bool,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub is_fallback: bool,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TypeValidationResult {
    fn valid(rule_type: &str) -> Self {
        Self {
            is_valid: true,
            rule_type: rule_type.to_string(),
            is_fallback: false,
            warnings: Vec::new(),
            suggestions: Vec::new(),
            error: None,
        }
    }

    fn invalid(rule_type: &str, error: &Error) -> Self {
        Self {
            is_valid: false,
            rule_type: rule_type.to_string(),
            is_fallback: false,
            warnings: Vec::new(),
            suggestions: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeHealthReport {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub status: HealthStatus,
    pub enabled: bool,
    pub support_level: SupportLevel,
    pub risk_level: RiskLevel,
    pub issues: Vec<String>,
    /// The type itself followed by each fallback hop.
    pub fallback_chain: Vec<String>,
}

/// Constraints a fallback candidate must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackContext {
    pub target_endpoint: Option<String>,
    pub require_production: bool,
    pub max_risk: Option<RiskLevel>,
}

#[derive(Debug, Clone)]
pub struct CapabilityValidator {
    table: Arc<CapabilityTable>,
}

impl CapabilityValidator {
    pub fn new(table: Arc<CapabilityTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    pub fn validate(&self, rule_type: &str, options: &ValidationOptions) -> Result<TypeValidationResult> {
        let mut guard = CycleGuard::new(MAX_FALLBACK_DEPTH + 1);
        let result = self.validate_step(rule_type, options, &mut guard)?;
        log::debug!(
            "TYPE_VALIDATED requested={} resolved={} fallback={} warnings={}",
            rule_type,
            result.rule_type,
            result.is_fallback,
            result.warnings.len()
        );
        Ok(result)
    }

    /// Validate each type independently, preserving order. Per-type failures
    /// become invalid results carrying the error message.
    pub fn validate_many<S: AsRef<str>>(
        &self,
        rule_types: &[S],
        options: &ValidationOptions,
    ) -> Result<Vec<TypeValidationResult>> {
        if rule_types.is_empty() {
            return Err(Error::EmptyInput("no rule types to validate".into()));
        }
        Ok(rule_types
            .iter()
            .map(|t| {
                let t = t.as_ref();
                self.validate(t, options)
                    .unwrap_or_else(|e| TypeValidationResult::invalid(t, &e))
            })
            .collect())
    }

    pub fn health_check(&self, rule_type: &str) -> Result<TypeHealthReport> {
        let config = self.lookup(rule_type)?;
        let mut issues = Vec::new();

        if !config.enabled {
            issues.push(format!("Type '{}' is disabled", rule_type));
        }
        if config.support_level != SupportLevel::Production {
            issues.push(format!(
                "Type '{}' support level is {:?}",
                rule_type, config.support_level
            ));
        }
        if config.risk_level != RiskLevel::Low {
            issues.push(format!("Type '{}' risk level is {:?}", rule_type, config.risk_level));
        }
        issues.extend(performance_warnings(rule_type, config));

        let fallback_chain = match self.fallback_chain(rule_type) {
            Ok(chain) => chain,
            Err(e) => {
                issues.push(e.to_string());
                vec![rule_type.to_string()]
            }
        };
        if let Some(missing) = config
            .fallback_type
            .as_ref()
            .filter(|f| !self.table.contains(f))
        {
            issues.push(format!("Fallback type '{}' is not configured", missing));
        }

        let status = if !config.enabled {
            HealthStatus::Unavailable
        } else if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        Ok(TypeHealthReport {
            rule_type: rule_type.to_string(),
            status,
            enabled: config.enabled,
            support_level: config.support_level,
            risk_level: config.risk_level,
            issues,
            fallback_chain,
        })
    }

    /// First type along the fallback chain of `rule_type` (excluding itself)
    /// that is enabled and satisfies `context`.
    pub fn optimal_fallback(
        &self,
        rule_type: &str,
        context: Option<&FallbackContext>,
    ) -> Result<Option<String>> {
        let chain = self.fallback_chain(rule_type)?;
        let default_context = FallbackContext::default();
        let context = context.unwrap_or(&default_context);

        Ok(chain.into_iter().skip(1).find(|candidate| {
            self.table.get(candidate).map_or(false, |config| {
                config.enabled
                    && (!context.require_production
                        || config.support_level == SupportLevel::Production)
                    && context
                        .target_endpoint
                        .as_ref()
                        .map_or(true, |e| config.supports_endpoint(e))
                    && context.max_risk.map_or(true, |max| config.risk_level <= max)
            })
        }))
    }

    /// `rule_type` followed by each configured fallback hop. Stops at a
    /// fallback name missing from the table.
    pub fn fallback_chain(&self, rule_type: &str) -> Result<Vec<String>> {
        self.lookup(rule_type)?;
        walk_chain(rule_type.to_string(), MAX_FALLBACK_DEPTH + 1, |current| {
            self.table
                .get(current)
                .and_then(|c| c.fallback_type.clone())
                .filter(|f| self.table.contains(f))
        })
        .map_err(|v| fallback_violation(rule_type, v))
    }

    fn lookup(&self, rule_type: &str) -> Result<&TypeCapabilityConfig> {
        if rule_type.trim().is_empty() {
            return Err(Error::UnsupportedType(rule_type.to_string()));
        }
        self.table
            .get(rule_type)
            .ok_or_else(|| Error::UnsupportedType(rule_type.to_string()))
    }

    fn validate_step(
        &self,
        rule_type: &str,
        options: &ValidationOptions,
        guard: &mut CycleGuard<String>,
    ) -> Result<TypeValidationResult> {
        let config = self.lookup(rule_type)?;
        guard
            .enter(rule_type.to_string())
            .map_err(|v| fallback_violation(guard_origin(guard, rule_type), v))?;

        if !config.enabled {
            let reason = format!("Type '{}' is disabled", rule_type);
            return self.fall_back(rule_type, config, options, guard, reason);
        }

        if options.strict_mode && config.support_level != SupportLevel::Production {
            let reason = format!(
                "Strict mode requires PRODUCTION support but type '{}' is {:?}",
                rule_type, config.support_level
            );
            return self.fall_back(rule_type, config, options, guard, reason);
        }

        if let Some(endpoint) = &options.target_endpoint {
            if !config.supports_endpoint(endpoint) {
                let reason = format!(
                    "Type '{}' does not support endpoint '{}'",
                    rule_type, endpoint
                );
                return self.fall_back(rule_type, config, options, guard, reason);
            }
        }

        let mut result = TypeValidationResult::valid(rule_type);
        add_advisories(rule_type, config, &mut result);
        Ok(result)
    }

    fn fall_back(
        &self,
        rule_type: &str,
        config: &TypeCapabilityConfig,
        options: &ValidationOptions,
        guard: &mut CycleGuard<String>,
        reason: String,
    ) -> Result<TypeValidationResult> {
        match (&config.fallback_type, options.allow_fallback) {
            (Some(fallback), true) => {
                log::info!(
                    "TYPE_FALLBACK from={} to={} reason={:?}",
                    rule_type,
                    fallback,
                    reason
                );
                let mut result = self.validate_step(fallback, options, guard)?;
                result.is_fallback = true;
                result
                    .warnings
                    .insert(0, format!("{}, falling back to '{}'", reason, fallback));
                Ok(result)
            }
            (Some(_), false) => Err(Error::DisabledType {
                rule_type: rule_type.to_string(),
                reason: format!("{} and fallback is not allowed", reason),
            }),
            (None, _) => Err(Error::DisabledType {
                rule_type: rule_type.to_string(),
                reason: format!("{} and no fallback type is configured", reason),
            }),
        }
    }
}

fn guard_origin<'a>(guard: &'a CycleGuard<String>, fallback: &'a str) -> &'a str {
    guard.path().first().map(String::as_str).unwrap_or(fallback)
}

fn fallback_violation(origin: &str, violation: WalkViolation<String>) -> Error {
    match violation {
        WalkViolation::Revisited(chain) => Error::CircularFallback { chain },
        WalkViolation::TooDeep(_) => Error::DisabledType {
            rule_type: origin.to_string(),
            reason: format!("fallback chain exceeds {} hops", MAX_FALLBACK_DEPTH),
        },
    }
}

fn add_advisories(rule_type: &str, config: &TypeCapabilityConfig, result: &mut TypeValidationResult) {
    if matches!(config.risk_level, RiskLevel::High | RiskLevel::Medium) {
        result.warnings.push(format!(
            "Type '{}' has {:?} risk level",
            rule_type, config.risk_level
        ));
        result.suggestions.push(match &config.fallback_type {
            Some(fallback) => format!(
                "Consider fallback type '{}' for production traffic",
                fallback
            ),
            None => format!("Monitor '{}' closely; no fallback type is configured", rule_type),
        });
    }
    result.warnings.extend(performance_warnings(rule_type, config));
}

fn performance_warnings(rule_type: &str, config: &TypeCapabilityConfig) -> Vec<String> {
    let profile = &config.performance_profile;
    let mut warnings = Vec::new();
    if profile.avg_response_time > SLOW_RESPONSE_THRESHOLD_MS {
        warnings.push(format!(
            "Type '{}' averages {}ms response time (threshold {}ms)",
            rule_type, profile.avg_response_time, SLOW_RESPONSE_THRESHOLD_MS
        ));
    }
    if profile.cache_hit_rate < LOW_CACHE_HIT_RATE {
        warnings.push(format!(
            "Type '{}' cache hit rate {:.0}% is below {:.0}%",
            rule_type,
            profile.cache_hit_rate * 100.0,
            LOW_CACHE_HIT_RATE * 100.0
        ));
    }
    warnings
}

//! Capability configuration for rule-list types.
//!
//! Read-only table keyed by rule-type name, loaded once and injected into
//! the validator.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportLevel {
    Production,
    Experimental,
    Deprecated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceProfile {
    /// Milliseconds.
    pub avg_response_time: f64,
    /// Fraction in [0, 1].
    pub cache_hit_rate: f64,
    pub memory_usage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCapabilityConfig {
    pub enabled: bool,
    pub support_level: SupportLevel,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub fallback_type: Option<String>,
    pub performance_profile: PerformanceProfile,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl TypeCapabilityConfig {
    pub fn supports_endpoint(&self, endpoint: &str) -> bool {
        self.endpoints.iter().any(|e| e == endpoint)
    }
}

/// Immutable map from rule-type name to its capability configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityTable {
    types: HashMap<String, TypeCapabilityConfig>,
}

impl CapabilityTable {
    pub fn new(types: HashMap<String, TypeCapabilityConfig>) -> Self {
        Self { types }
    }

    pub fn get(&self, rule_type: &str) -> Option<&TypeCapabilityConfig> {
        self.types.get(rule_type)
    }

    pub fn contains(&self, rule_type: &str) -> bool {
        self.types.contains_key(rule_type)
    }

    /// Sorted type names.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Load a table from a JSON file.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading capability table {}", path.display()))?;
        let table = Self::from_json_str(&raw)
            .with_context(|| format!("parsing capability table {}", path.display()))?;
        log::info!(
            "CAPABILITY_TABLE_LOADED path={} types={:?}",
            path.display(),
            table.type_names()
        );
        Ok(table)
    }

    /// Table shipped with the crate for the canonical rule-list types.
    pub fn builtin() -> Self {
        let entry = |enabled: bool,
                     support_level: SupportLevel,
                     risk_level: RiskLevel,
                     fallback: Option<&str>,
                     avg_ms: f64,
                     hit_rate: f64,
                     memory: &str,
                     endpoints: &[&str]| TypeCapabilityConfig {
            enabled,
            support_level,
            risk_level,
            fallback_type: fallback.map(str::to_string),
            performance_profile: PerformanceProfile {
                avg_response_time: avg_ms,
                cache_hit_rate: hit_rate,
                memory_usage: memory.to_string(),
            },
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
        };

        let types = HashMap::from([
            (
                "quote_fields".to_string(),
                entry(
                    true,
                    SupportLevel::Production,
                    RiskLevel::Low,
                    None,
                    120.0,
                    0.92,
                    "low",
                    &["get-stock-quote", "stream-stock-quote"],
                ),
            ),
            (
                "basic_info_fields".to_string(),
                entry(
                    true,
                    SupportLevel::Production,
                    RiskLevel::Low,
                    Some("quote_fields"),
                    250.0,
                    0.85,
                    "low",
                    &["get-stock-basic-info"],
                ),
            ),
            (
                "index_fields".to_string(),
                entry(
                    true,
                    SupportLevel::Experimental,
                    RiskLevel::Medium,
                    Some("quote_fields"),
                    400.0,
                    0.75,
                    "medium",
                    &["get-index-quote"],
                ),
            ),
            (
                "stream_quote_fields".to_string(),
                entry(
                    true,
                    SupportLevel::Experimental,
                    RiskLevel::High,
                    Some("quote_fields"),
                    60.0,
                    0.40,
                    "high",
                    &["stream-stock-quote"],
                ),
            ),
            (
                "historical_fields".to_string(),
                entry(
                    false,
                    SupportLevel::Deprecated,
                    RiskLevel::Medium,
                    Some("quote_fields"),
                    1800.0,
                    0.30,
                    "high",
                    &["get-stock-history"],
                ),
            ),
        ]);
        Self { types }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_fallbacks_resolve() {
        let table = CapabilityTable::builtin();
        for name in table.type_names() {
            if let Some(fallback) = &table.get(&name).unwrap().fallback_type {
                assert!(table.contains(fallback), "{} falls back to unknown {}", name, fallback);
            }
        }
    }

    #[test]
    fn test_parse_json_table() {
        let table = CapabilityTable::from_json_str(
            r#"{
                "quote_fields": {
                    "enabled": true,
                    "supportLevel": "PRODUCTION",
                    "riskLevel": "LOW",
                    "performanceProfile": {
                        "avgResponseTime": 100,
                        "cacheHitRate": 0.9,
                        "memoryUsage": "low"
                    },
                    "endpoints": ["get-stock-quote"]
                }
            }"#,
        )
        .unwrap();
        let quote = table.get("quote_fields").unwrap();
        assert_eq!(quote.support_level, SupportLevel::Production);
        assert!(quote.fallback_type.is_none());
        assert!(quote.supports_endpoint("get-stock-quote"));
        assert!(!quote.supports_endpoint("get-index-quote"));
    }

    #[test]
    fn test_load_from_path() {
        let json = serde_json::to_string(&CapabilityTable::builtin()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = CapabilityTable::load_from_path(file.path()).unwrap();
        assert_eq!(loaded, CapabilityTable::builtin());
    }

    #[test]
    fn test_load_from_path_reports_context() {
        let err = CapabilityTable::load_from_path(Path::new("/nonexistent/caps.json")).unwrap_err();
        assert!(err.to_string().contains("reading capability table"));
    }
}

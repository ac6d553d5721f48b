//! Mapping rule documents.
//!
//! A rule maps fields of one provider payload shape (provider + API type)
//! onto one canonical rule-list type.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::extraction::json_path::FieldPath;

/// How the provider delivers the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    Rest,
    Stream,
}

impl ApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::Rest => "rest",
            ApiType::Stream => "stream",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rest" => Ok(ApiType::Rest),
            "stream" => Ok(ApiType::Stream),
            other => Err(Error::InvalidRule(format!("unknown api type '{}'", other))),
        }
    }
}

/// The (provider, apiType, ruleListType) triple a rule is selected by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleKey {
    pub provider: String,
    pub api_type: ApiType,
    pub rule_list_type: String,
}

impl RuleKey {
    pub fn new(provider: &str, api_type: ApiType, rule_list_type: &str) -> Self {
        Self {
            provider: provider.to_string(),
            api_type,
            rule_list_type: rule_list_type.to_string(),
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.provider, self.api_type, self.rule_list_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub source_field_path: String,
    pub target_field: String,
}

impl FieldMapping {
    pub fn new(source_field_path: &str, target_field: &str) -> Self {
        Self {
            source_field_path: source_field_path.to_string(),
            target_field: target_field.to_string(),
        }
    }
}

/// SHA-256 over the ordered mapping list, hex encoded.
pub fn mappings_fingerprint(mappings: &[FieldMapping]) -> String {
    let mut hasher = Sha256::new();
    for mapping in mappings {
        hasher.update(mapping.source_field_path.as_bytes());
        hasher.update([0x1f]);
        hasher.update(mapping.target_field.as_bytes());
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

/// A persisted mapping rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub api_type: ApiType,
    pub rule_list_type: String,
    pub field_mappings: Vec<FieldMapping>,
    pub enabled: bool,
    pub is_active: bool,
    pub is_default: bool,
    pub version: u32,
    pub overall_confidence: f64,
    pub usage_count: u64,
    pub successful_transformations: u64,
    pub failed_transformations: u64,
    pub success_rate: f64,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MappingRule {
    pub fn key(&self) -> RuleKey {
        RuleKey::new(&self.provider, self.api_type, &self.rule_list_type)
    }

    /// Whether best-match selection may return this rule.
    pub fn is_selectable(&self) -> bool {
        self.enabled && self.is_active
    }

    /// Fold one transformation outcome into the usage statistics.
    pub fn record_transformation(&mut self, success: bool) {
        self.usage_count += 1;
        if success {
            self.successful_transformations += 1;
        } else {
            self.failed_transformations += 1;
        }
        self.success_rate = self.successful_transformations as f64 / self.usage_count as f64;
    }
}

/// Input for creating a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleSpec {
    pub name: String,
    pub provider: String,
    pub api_type: ApiType,
    pub rule_list_type: String,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub overall_confidence: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl CreateRuleSpec {
    pub fn new(name: &str, provider: &str, api_type: ApiType, rule_list_type: &str) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            api_type,
            rule_list_type: rule_list_type.to_string(),
            field_mappings: Vec::new(),
            enabled: true,
            is_default: false,
            overall_confidence: None,
        }
    }

    pub fn with_mappings(mut self, mappings: Vec<FieldMapping>) -> Self {
        self.field_mappings = mappings;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.overall_confidence = Some(confidence);
        self
    }

    /// Build the initial rule document (version 1, zeroed statistics).
    pub fn into_rule(self, now: DateTime<Utc>) -> Result<MappingRule> {
        let rule = MappingRule {
            id: Uuid::new_v4().to_string(),
            fingerprint: mappings_fingerprint(&self.field_mappings),
            name: self.name,
            provider: self.provider,
            api_type: self.api_type,
            rule_list_type: self.rule_list_type,
            field_mappings: self.field_mappings,
            enabled: self.enabled,
            is_active: true,
            is_default: self.is_default,
            version: 1,
            overall_confidence: self.overall_confidence.unwrap_or(0.0),
            usage_count: 0,
            successful_transformations: 0,
            failed_transformations: 0,
            success_rate: 0.0,
            created_at: now,
            updated_at: now,
        };
        validate_rule(&rule)?;
        Ok(rule)
    }
}

/// Partial update of a rule. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePatch {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub api_type: Option<ApiType>,
    pub rule_list_type: Option<String>,
    pub field_mappings: Option<Vec<FieldMapping>>,
    pub enabled: Option<bool>,
    pub is_default: Option<bool>,
    pub overall_confidence: Option<f64>,
}

impl RulePatch {
    /// Apply onto `rule`, bumping the version when the mapping list changes.
    pub fn apply_to(&self, rule: &mut MappingRule, now: DateTime<Utc>) -> Result<()> {
        if let Some(name) = &self.name {
            rule.name = name.clone();
        }
        if let Some(provider) = &self.provider {
            rule.provider = provider.clone();
        }
        if let Some(api_type) = self.api_type {
            rule.api_type = api_type;
        }
        if let Some(rule_list_type) = &self.rule_list_type {
            rule.rule_list_type = rule_list_type.clone();
        }
        if let Some(mappings) = &self.field_mappings {
            let fingerprint = mappings_fingerprint(mappings);
            if fingerprint != rule.fingerprint {
                rule.field_mappings = mappings.clone();
                rule.fingerprint = fingerprint;
                rule.version += 1;
            }
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(is_default) = self.is_default {
            rule.is_default = is_default;
        }
        if let Some(confidence) = self.overall_confidence {
            rule.overall_confidence = confidence;
        }
        rule.updated_at = now;
        validate_rule(rule)
    }
}

/// A candidate mapping proposed for an analyzed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSuggestion {
    pub source_field_path: String,
    pub target_field: String,
    pub confidence: f64,
}

/// Reject documents that could never be applied.
pub fn validate_rule(rule: &MappingRule) -> Result<()> {
    if rule.name.trim().is_empty() {
        return Err(Error::InvalidRule("name must not be empty".into()));
    }
    if rule.provider.trim().is_empty() {
        return Err(Error::InvalidRule("provider must not be empty".into()));
    }
    if rule.rule_list_type.trim().is_empty() {
        return Err(Error::InvalidRule("ruleListType must not be empty".into()));
    }
    if !(0.0..=1.0).contains(&rule.overall_confidence) {
        return Err(Error::InvalidRule(format!(
            "overallConfidence {} outside [0, 1]",
            rule.overall_confidence
        )));
    }
    for mapping in &rule.field_mappings {
        FieldPath::parse(&mapping.source_field_path)?;
        if mapping.target_field.trim().is_empty() {
            return Err(Error::InvalidRule(format!(
                "mapping from '{}' has an empty targetField",
                mapping.source_field_path
            )));
        }
    }
    Ok(())
}

/// Serializable projection handed to outside callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRuleResponse {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub api_type: ApiType,
    pub rule_list_type: String,
    pub field_mappings: Vec<FieldMapping>,
    pub enabled: bool,
    pub is_active: bool,
    pub is_default: bool,
    pub version: u32,
    pub overall_confidence: f64,
    pub usage_count: u64,
    pub success_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&MappingRule> for MappingRuleResponse {
    fn from(rule: &MappingRule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            provider: rule.provider.clone(),
            api_type: rule.api_type,
            rule_list_type: rule.rule_list_type.clone(),
            field_mappings: rule.field_mappings.clone(),
            enabled: rule.enabled,
            is_active: rule.is_active,
            is_default: rule.is_default,
            version: rule.version,
            overall_confidence: rule.overall_confidence,
            usage_count: rule.usage_count,
            success_rate: rule.success_rate,
            created_at: rule.created_at,
            updated_at: rule.updated_at,
        }
    }
}

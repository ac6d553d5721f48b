//! Cache and persistence contracts consumed by the registry.
//!
//! The registry never assumes a storage or cache technology; it talks to
//! these traits only.

use async_trait::async_trait;

use crate::error::Result;
use crate::registry::rule::{ApiType, MappingRule, RuleKey};

/// Equality filter over rule documents. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleFilter {
    pub provider: Option<String>,
    pub api_type: Option<ApiType>,
    pub rule_list_type: Option<String>,
    pub enabled: Option<bool>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

impl RuleFilter {
    /// Selectable rules for one triple.
    pub fn selectable(key: &RuleKey) -> Self {
        Self {
            provider: Some(key.provider.clone()),
            api_type: Some(key.api_type),
            rule_list_type: Some(key.rule_list_type.clone()),
            enabled: Some(true),
            is_active: Some(true),
            is_default: None,
        }
    }

    pub fn active() -> Self {
        Self {
            is_active: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, rule: &MappingRule) -> bool {
        self.provider.as_ref().map_or(true, |p| *p == rule.provider)
            && self.api_type.map_or(true, |t| t == rule.api_type)
            && self
                .rule_list_type
                .as_ref()
                .map_or(true, |t| *t == rule.rule_list_type)
            && self.enabled.map_or(true, |e| e == rule.enabled)
            && self.is_active.map_or(true, |a| a == rule.is_active)
            && self.is_default.map_or(true, |d| d == rule.is_default)
    }
}

/// Result ordering for [`RuleStore::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSort {
    /// Explicit default first, then highest confidence, then most recently
    /// updated.
    BestMatch,
    /// Most recently updated first.
    RecentlyUpdated,
}

impl RuleSort {
    pub fn compare(&self, a: &MappingRule, b: &MappingRule) -> std::cmp::Ordering {
        match self {
            RuleSort::BestMatch => b
                .is_default
                .cmp(&a.is_default)
                .then_with(|| b.overall_confidence.total_cmp(&a.overall_confidence))
                .then_with(|| b.updated_at.cmp(&a.updated_at)),
            RuleSort::RecentlyUpdated => b.updated_at.cmp(&a.updated_at),
        }
    }
}

/// Durable storage of rule documents.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<MappingRule>>;

    async fn find(
        &self,
        filter: &RuleFilter,
        sort: RuleSort,
        limit: Option<usize>,
    ) -> Result<Vec<MappingRule>>;

    async fn count(&self, filter: &RuleFilter) -> Result<usize>;

    async fn create(&self, rule: &MappingRule) -> Result<()>;

    /// Replace the stored document with the same id. Returns `false` when no
    /// such document exists.
    async fn update(&self, rule: &MappingRule) -> Result<bool>;

    /// Fold one transformation outcome into the stored usage statistics in a
    /// single write. Returns the updated document, or `None` when absent.
    async fn record_transformation(&self, id: &str, success: bool) -> Result<Option<MappingRule>>;

    /// Returns `false` when no such document exists.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Clear `is_default` on every rule of `key` except `keep_id`. Returns the
    /// number of documents changed.
    async fn clear_defaults(&self, key: &RuleKey, keep_id: Option<&str>) -> Result<usize>;
}

/// Lookup acceleration in front of a [`RuleStore`]. No TTL policy is
/// assumed.
#[async_trait]
pub trait RuleCache: Send + Sync {
    async fn get_rule_by_id(&self, id: &str) -> Result<Option<MappingRule>>;

    async fn cache_rule_by_id(&self, rule: &MappingRule) -> Result<()>;

    async fn get_best_matching_rule(&self, key: &RuleKey) -> Result<Option<MappingRule>>;

    async fn cache_best_matching_rule(&self, key: &RuleKey, rule: &MappingRule) -> Result<()>;

    /// Drop the by-id entry and, when `key` is given, the best-match entry
    /// for that triple.
    async fn invalidate_rule_cache(&self, id: &str, key: Option<&RuleKey>) -> Result<()>;

    async fn warmup_cache(&self, rules: &[MappingRule]) -> Result<()>;
}

//! Mapping rule registry.
//!
//! Owns rule documents and best-match selection on top of a [`RuleStore`]
//! and a [`RuleCache`]. Writes go persistence first, then cache
//! invalidation, then cache repopulation. Cache fills after a read miss are
//! detached so read latency never includes a cache write.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::extraction::transform::{apply_mappings, TransformationResult};
use crate::logging::structured::LogContext;
use crate::registry::rule::{
    ApiType, CreateRuleSpec, FieldMapping, FieldSuggestion, MappingRule, RuleKey, RulePatch,
};
use crate::registry::store::{RuleCache, RuleFilter, RuleSort, RuleStore};
use crate::{log_debug, log_error, log_info, log_warn};

/// Default bound on the number of rules loaded by [`MappingRuleRegistry::warmup_cache`].
pub const DEFAULT_WARMUP_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub warmup_limit: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            warmup_limit: DEFAULT_WARMUP_LIMIT,
        }
    }
}

pub struct MappingRuleRegistry {
    store: Arc<dyn RuleStore>,
    cache: Arc<dyn RuleCache>,
    config: RegistryConfig,
}

impl MappingRuleRegistry {
    pub fn new(store: Arc<dyn RuleStore>, cache: Arc<dyn RuleCache>, config: RegistryConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Persist a new rule.
    ///
    /// When the rule is the default for its triple, the previous default is
    /// cleared once the new document is stored. The two writes are not
    /// atomic across a distributed store: concurrent writers may briefly
    /// observe two defaults.
    pub async fn create(&self, spec: CreateRuleSpec) -> Result<MappingRule> {
        let rule = spec.into_rule(Utc::now())?;
        let ctx = LogContext::generate("create")
            .with_provider(&rule.provider)
            .with_rule_type(&rule.rule_list_type);

        self.store.create(&rule).await?;
        log_info!(
            ctx,
            "RULE_CREATED",
            id = rule.id,
            name = rule.name,
            mappings = rule.field_mappings.len(),
            default = rule.is_default
        );

        if rule.is_default {
            self.clear_defaults(&rule.key(), Some(&rule.id), &ctx).await?;
        }
        // Any selectable newcomer may outrank the cached best match.
        if rule.is_selectable() {
            self.invalidate(&rule, None, &ctx).await;
        }
        self.populate(&rule, &ctx).await;
        Ok(rule)
    }

    /// Build field mappings from the selected suggestions, then create.
    pub async fn create_from_suggestions(
        &self,
        mut spec: CreateRuleSpec,
        suggestions: &[FieldSuggestion],
        selected: &[usize],
    ) -> Result<MappingRule> {
        if selected.is_empty() {
            return Err(Error::EmptyInput("no suggestions selected".into()));
        }

        let mut picked = Vec::with_capacity(selected.len());
        for &index in selected {
            let suggestion = suggestions.get(index).ok_or_else(|| {
                Error::InvalidRule(format!(
                    "suggestion index {} out of range (have {})",
                    index,
                    suggestions.len()
                ))
            })?;
            picked.push(suggestion);
        }

        spec.field_mappings = picked
            .iter()
            .map(|s| FieldMapping::new(&s.source_field_path, &s.target_field))
            .collect();
        if spec.overall_confidence.is_none() {
            let mean = picked.iter().map(|s| s.confidence).sum::<f64>() / picked.len() as f64;
            spec.overall_confidence = Some(mean.clamp(0.0, 1.0));
        }

        self.create(spec).await
    }

    /// Cache-first lookup by id.
    pub async fn find_by_id(&self, id: &str) -> Result<MappingRule> {
        let ctx = LogContext::generate("get");
        match self.cache.get_rule_by_id(id).await {
            Ok(Some(rule)) => {
                log_debug!(ctx, "RULE_CACHE_HIT", id = id);
                return Ok(rule);
            }
            Ok(None) => log_debug!(ctx, "RULE_CACHE_MISS", id = id),
            Err(e) => log_warn!(ctx, "RULE_CACHE_READ_FAILED", id = id, error = e.to_string()),
        }

        let rule = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let cache = Arc::clone(&self.cache);
        let filled = rule.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.cache_rule_by_id(&filled).await {
                log_warn!(ctx, "RULE_CACHE_FILL_FAILED", id = filled.id, error = e.to_string());
            }
        });

        Ok(rule)
    }

    /// Best selectable rule for a triple, or `None` when nothing matches.
    pub async fn find_best_matching(
        &self,
        provider: &str,
        api_type: ApiType,
        rule_list_type: &str,
    ) -> Result<Option<MappingRule>> {
        let key = RuleKey::new(provider, api_type, rule_list_type);
        let ctx = LogContext::generate("match")
            .with_provider(provider)
            .with_rule_type(rule_list_type);

        match self.cache.get_best_matching_rule(&key).await {
            Ok(Some(rule)) => {
                log_debug!(ctx, "BEST_MATCH_CACHE_HIT", id = rule.id);
                return Ok(Some(rule));
            }
            Ok(None) => log_debug!(ctx, "BEST_MATCH_CACHE_MISS"),
            Err(e) => log_warn!(ctx, "BEST_MATCH_CACHE_READ_FAILED", error = e.to_string()),
        }

        let found = self
            .store
            .find(&RuleFilter::selectable(&key), RuleSort::BestMatch, Some(1))
            .await?
            .into_iter()
            .next();

        match &found {
            Some(rule) => {
                log_info!(
                    ctx,
                    "BEST_MATCH_RESOLVED",
                    id = rule.id,
                    confidence = rule.overall_confidence,
                    default = rule.is_default
                );
                let cache = Arc::clone(&self.cache);
                let filled = rule.clone();
                tokio::spawn(async move {
                    if let Err(e) = cache.cache_best_matching_rule(&key, &filled).await {
                        log_warn!(ctx, "BEST_MATCH_CACHE_FILL_FAILED", error = e.to_string());
                    }
                });
            }
            None => log_info!(ctx, "BEST_MATCH_NONE"),
        }

        Ok(found)
    }

    pub async fn update(&self, id: &str, patch: RulePatch) -> Result<MappingRule> {
        let before = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut rule = before.clone();
        patch.apply_to(&mut rule, Utc::now())?;
        let ctx = LogContext::generate("update")
            .with_provider(&rule.provider)
            .with_rule_type(&rule.rule_list_type);

        if !self.store.update(&rule).await? {
            return Err(Error::NotFound(id.to_string()));
        }
        log_info!(
            ctx,
            "RULE_UPDATED",
            id = rule.id,
            version = rule.version,
            default = rule.is_default
        );

        if rule.is_default && rule.is_active {
            self.clear_defaults(&rule.key(), Some(&rule.id), &ctx).await?;
        }

        self.invalidate(&before, Some(&rule), &ctx).await;
        self.populate(&rule, &ctx).await;
        Ok(rule)
    }

    /// Soft-retire or reactivate a rule.
    pub async fn toggle_status(&self, id: &str, is_active: bool) -> Result<MappingRule> {
        let before = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut rule = before.clone();
        rule.is_active = is_active;
        rule.updated_at = Utc::now();
        let ctx = LogContext::generate("toggle")
            .with_provider(&rule.provider)
            .with_rule_type(&rule.rule_list_type);

        if !self.store.update(&rule).await? {
            return Err(Error::NotFound(id.to_string()));
        }
        log_info!(ctx, "RULE_STATUS_CHANGED", id = rule.id, active = is_active);

        if rule.is_default && is_active {
            self.clear_defaults(&rule.key(), Some(&rule.id), &ctx).await?;
        }

        self.invalidate(&before, Some(&rule), &ctx).await;
        self.populate(&rule, &ctx).await;
        Ok(rule)
    }

    /// Hard-delete a rule. Deleting the default leaves the triple without
    /// one; no other rule is promoted.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let rule = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let ctx = LogContext::generate("delete")
            .with_provider(&rule.provider)
            .with_rule_type(&rule.rule_list_type);

        if !self.store.delete(id).await? {
            return Err(Error::NotFound(id.to_string()));
        }
        log_info!(ctx, "RULE_DELETED", id = id, was_default = rule.is_default);

        self.invalidate(&rule, None, &ctx).await;
        Ok(())
    }

    /// Most recently updated rules matching `filter`.
    pub async fn list(&self, filter: &RuleFilter, limit: Option<usize>) -> Result<Vec<MappingRule>> {
        self.store.find(filter, RuleSort::RecentlyUpdated, limit).await
    }

    pub async fn count(&self, filter: &RuleFilter) -> Result<usize> {
        self.store.count(filter).await
    }

    /// Load active rules into the cache. Failures are logged, never
    /// returned; returns the number of rules warmed.
    pub async fn warmup_cache(&self) -> usize {
        let ctx = LogContext::generate("warmup");
        let rules = match self
            .store
            .find(
                &RuleFilter::active(),
                RuleSort::RecentlyUpdated,
                Some(self.config.warmup_limit),
            )
            .await
        {
            Ok(rules) => rules,
            Err(e) => {
                log_error!(ctx, "CACHE_WARMUP_LOAD_FAILED", error = e.to_string());
                return 0;
            }
        };

        match self.cache.warmup_cache(&rules).await {
            Ok(()) => {
                log_info!(ctx, "CACHE_WARMUP_COMPLETE", rules = rules.len());
                rules.len()
            }
            Err(e) => {
                log_error!(
                    ctx,
                    "CACHE_WARMUP_FAILED",
                    rules = rules.len(),
                    error = e.to_string()
                );
                0
            }
        }
    }

    /// Apply `rule` to `raw_data` and fold the outcome into the rule's usage
    /// statistics. A statistics write failure is logged and does not affect
    /// the returned result.
    pub async fn apply_rule(
        &self,
        rule: &MappingRule,
        raw_data: &Value,
        include_debug_info: bool,
    ) -> TransformationResult {
        let ctx = LogContext::generate("apply")
            .with_provider(&rule.provider)
            .with_rule_type(&rule.rule_list_type);
        let result = apply_mappings(&rule.field_mappings, raw_data, include_debug_info);

        log_debug!(
            ctx,
            "RULE_APPLIED",
            id = rule.id,
            success = result.success,
            mapped = result.mapping_stats.successful_mappings,
            total = result.mapping_stats.total_mappings
        );

        if let Err(e) = self.record_usage(&rule.id, result.success, &ctx).await {
            log_warn!(ctx, "RULE_STATS_UPDATE_FAILED", id = rule.id, error = e.to_string());
        }
        result
    }

    async fn record_usage(&self, id: &str, success: bool, ctx: &LogContext) -> Result<()> {
        let current = self
            .store
            .record_transformation(id, success)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if let Err(e) = self.cache.cache_rule_by_id(&current).await {
            log_warn!(ctx, "RULE_CACHE_FILL_FAILED", id = id, error = e.to_string());
        }
        Ok(())
    }

    /// Clear the default flag on every other rule of `key`, then drop their
    /// by-id cache entries.
    async fn clear_defaults(&self, key: &RuleKey, keep_id: Option<&str>, ctx: &LogContext) -> Result<()> {
        let filter = RuleFilter {
            provider: Some(key.provider.clone()),
            api_type: Some(key.api_type),
            rule_list_type: Some(key.rule_list_type.clone()),
            is_default: Some(true),
            ..RuleFilter::default()
        };
        let previous = self.store.find(&filter, RuleSort::RecentlyUpdated, None).await?;
        let cleared = self.store.clear_defaults(key, keep_id).await?;
        if cleared == 0 {
            return Ok(());
        }
        log_info!(ctx, "DEFAULT_CLEARED", count = cleared);

        for old in previous.iter().filter(|r| Some(r.id.as_str()) != keep_id) {
            if let Err(e) = self.cache.invalidate_rule_cache(&old.id, Some(key)).await {
                log_warn!(ctx, "RULE_CACHE_INVALIDATE_FAILED", id = old.id, error = e.to_string());
            }
        }
        Ok(())
    }

    /// Drop the by-id entry and the best-match entry of every triple the
    /// rule occupied before or after the write.
    async fn invalidate(&self, before: &MappingRule, after: Option<&MappingRule>, ctx: &LogContext) {
        let old_key = before.key();
        if let Err(e) = self.cache.invalidate_rule_cache(&before.id, Some(&old_key)).await {
            log_warn!(ctx, "RULE_CACHE_INVALIDATE_FAILED", id = before.id, error = e.to_string());
        }
        if let Some(after) = after {
            let new_key = after.key();
            if new_key != old_key {
                if let Err(e) = self.cache.invalidate_rule_cache(&after.id, Some(&new_key)).await {
                    log_warn!(
                        ctx,
                        "RULE_CACHE_INVALIDATE_FAILED",
                        id = after.id,
                        error = e.to_string()
                    );
                }
            }
        }
    }

    /// Repopulate the by-id entry and, for a selectable default, the
    /// best-match entry.
    async fn populate(&self, rule: &MappingRule, ctx: &LogContext) {
        if let Err(e) = self.cache.cache_rule_by_id(rule).await {
            log_warn!(ctx, "RULE_CACHE_FILL_FAILED", id = rule.id, error = e.to_string());
        }
        if rule.is_default && rule.is_selectable() {
            if let Err(e) = self.cache.cache_best_matching_rule(&rule.key(), rule).await {
                log_warn!(ctx, "BEST_MATCH_CACHE_FILL_FAILED", id = rule.id, error = e.to_string());
            }
        }
    }
}

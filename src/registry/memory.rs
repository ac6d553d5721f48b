//! In-memory cache and store.
//!
//! Process-local collaborators for single-node deployments and tests. Both
//! keep their maps behind `parking_lot` locks that are never held across an
//! `.await`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::registry::rule::{MappingRule, RuleKey};
use crate::registry::store::{RuleCache, RuleFilter, RuleSort, RuleStore};

#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<String, MappingRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<MappingRule>> {
        Ok(self.rules.read().get(id).cloned())
    }

    async fn find(
        &self,
        filter: &RuleFilter,
        sort: RuleSort,
        limit: Option<usize>,
    ) -> Result<Vec<MappingRule>> {
        let mut found: Vec<MappingRule> = self
            .rules
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| sort.compare(a, b));
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn count(&self, filter: &RuleFilter) -> Result<usize> {
        Ok(self.rules.read().values().filter(|r| filter.matches(r)).count())
    }

    async fn create(&self, rule: &MappingRule) -> Result<()> {
        let mut rules = self.rules.write();
        if rules.contains_key(&rule.id) {
            return Err(Error::Persistence(format!("duplicate rule id {}", rule.id)));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn update(&self, rule: &MappingRule) -> Result<bool> {
        let mut rules = self.rules.write();
        match rules.get_mut(&rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_transformation(&self, id: &str, success: bool) -> Result<Option<MappingRule>> {
        Ok(self.rules.write().get_mut(id).map(|rule| {
            rule.record_transformation(success);
            rule.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.rules.write().remove(id).is_some())
    }

    async fn clear_defaults(&self, key: &RuleKey, keep_id: Option<&str>) -> Result<usize> {
        let mut cleared = 0;
        for rule in self.rules.write().values_mut() {
            if rule.is_default && rule.key() == *key && Some(rule.id.as_str()) != keep_id {
                rule.is_default = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRuleCache {
    by_id: RwLock<HashMap<String, MappingRule>>,
    best_match: RwLock<HashMap<RuleKey, MappingRule>>,
}

impl InMemoryRuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// (by-id entries, best-match entries)
    pub fn entry_counts(&self) -> (usize, usize) {
        (self.by_id.read().len(), self.best_match.read().len())
    }

    pub fn clear(&self) {
        self.by_id.write().clear();
        self.best_match.write().clear();
    }
}

#[async_trait]
impl RuleCache for InMemoryRuleCache {
    async fn get_rule_by_id(&self, id: &str) -> Result<Option<MappingRule>> {
        Ok(self.by_id.read().get(id).cloned())
    }

    async fn cache_rule_by_id(&self, rule: &MappingRule) -> Result<()> {
        self.by_id.write().insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn get_best_matching_rule(&self, key: &RuleKey) -> Result<Option<MappingRule>> {
        Ok(self.best_match.read().get(key).cloned())
    }

    async fn cache_best_matching_rule(&self, key: &RuleKey, rule: &MappingRule) -> Result<()> {
        self.best_match.write().insert(key.clone(), rule.clone());
        Ok(())
    }

    async fn invalidate_rule_cache(&self, id: &str, key: Option<&RuleKey>) -> Result<()> {
        self.by_id.write().remove(id);
        if let Some(key) = key {
            self.best_match.write().remove(key);
        }
        Ok(())
    }

    async fn warmup_cache(&self, rules: &[MappingRule]) -> Result<()> {
        let mut best: HashMap<RuleKey, &MappingRule> = HashMap::new();
        for rule in rules.iter().filter(|r| r.is_selectable()) {
            best.entry(rule.key())
                .and_modify(|current| {
                    if RuleSort::BestMatch.compare(rule, *current).is_lt() {
                        *current = rule;
                    }
                })
                .or_insert(rule);
        }

        {
            let mut by_id = self.by_id.write();
            for rule in rules {
                by_id.insert(rule.id.clone(), rule.clone());
            }
        }
        let mut best_match = self.best_match.write();
        for (key, rule) in best {
            best_match.insert(key, rule.clone());
        }
        Ok(())
    }
}

//! Bounded graph walk with a cycle guard.
//!
//! Shared by the fallback-chain resolution (keyed by rule-type name) and the
//! schema analyzer's descent into sample payloads (keyed by node identity).

use std::collections::HashSet;
use std::hash::Hash;

/// Why a step of the walk was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkViolation<K> {
    /// The key was already on the current walk. Carries the path including
    /// the repeated key.
    Revisited(Vec<K>),
    /// The walk would exceed its depth bound.
    TooDeep(Vec<K>),
}

/// Tracks the keys visited along one walk and refuses revisits or runaway
/// depth.
#[derive(Debug, Clone)]
pub struct CycleGuard<K> {
    visited: HashSet<K>,
    path: Vec<K>,
    max_depth: usize,
}

impl<K: Eq + Hash + Clone> CycleGuard<K> {
    pub fn new(max_depth: usize) -> Self {
        Self {
            visited: HashSet::new(),
            path: Vec::new(),
            max_depth,
        }
    }

    /// Push `key` onto the walk.
    pub fn enter(&mut self, key: K) -> Result<(), WalkViolation<K>> {
        if self.visited.contains(&key) {
            let mut chain = self.path.clone();
            chain.push(key);
            return Err(WalkViolation::Revisited(chain));
        }
        if self.path.len() >= self.max_depth {
            let mut chain = self.path.clone();
            chain.push(key);
            return Err(WalkViolation::TooDeep(chain));
        }
        self.visited.insert(key.clone());
        self.path.push(key);
        Ok(())
    }

    /// Pop the most recent key, allowing it to be entered again by a sibling
    /// branch.
    pub fn leave(&mut self) {
        if let Some(key) = self.path.pop() {
            self.visited.remove(&key);
        }
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn path(&self) -> &[K] {
        &self.path
    }
}

/// Follow `next` from `start` until it yields `None`, collecting every key.
///
/// Used for linear chains such as fallback types, where each node has at
/// most one successor.
pub fn walk_chain<K, F>(start: K, max_depth: usize, mut next: F) -> Result<Vec<K>, WalkViolation<K>>
where
    K: Eq + Hash + Clone,
    F: FnMut(&K) -> Option<K>,
{
    let mut guard = CycleGuard::new(max_depth);
    let mut current = start;
    loop {
        guard.enter(current.clone())?;
        match next(&current) {
            Some(successor) => current = successor,
            None => return Ok(guard.path().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_guard_detects_revisit() {
        let mut guard = CycleGuard::new(10);
        guard.enter("a").unwrap();
        guard.enter("b").unwrap();
        assert_eq!(
            guard.enter("a"),
            Err(WalkViolation::Revisited(vec!["a", "b", "a"]))
        );
    }

    #[test]
    fn test_guard_allows_sibling_reentry() {
        let mut guard = CycleGuard::new(10);
        guard.enter("root").unwrap();
        guard.enter("child").unwrap();
        guard.leave();
        assert!(guard.enter("child").is_ok());
        assert_eq!(guard.depth(), 2);
    }

    #[test]
    fn test_guard_depth_bound() {
        let mut guard = CycleGuard::new(2);
        guard.enter(1).unwrap();
        guard.enter(2).unwrap();
        assert_eq!(guard.enter(3), Err(WalkViolation::TooDeep(vec![1, 2, 3])));
    }

    #[test]
    fn test_walk_chain() {
        let links: HashMap<&str, &str> = HashMap::from([("a", "b"), ("b", "c")]);
        let chain = walk_chain("a", 5, |k| links.get(k).copied()).unwrap();
        assert_eq!(chain, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_walk_chain_cycle() {
        let links: HashMap<&str, &str> = HashMap::from([("a", "b"), ("b", "a")]);
        let err = walk_chain("a", 5, |k| links.get(k).copied()).unwrap_err();
        assert_eq!(err, WalkViolation::Revisited(vec!["a", "b", "a"]));
    }
}

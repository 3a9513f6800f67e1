//! Source-to-target identifier maps shared across concurrent tasks.
//!
//! Every map is guarded by its own lock, and no lock is held across an
//! await point: callers copy values out before continuing.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use crate::hierarchy::SuiteKey;
use crate::types::{SourceId, TargetId};

/// A lock-guarded map from a source key to a target value.
#[derive(Debug)]
pub struct IdMap<V, K = SourceId> {
    inner: RwLock<HashMap<K, V>>,
}

impl<V, K> Default for IdMap<V, K> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone, K: Eq + Hash> IdMap<V, K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Value for `key`, inserting `make()` first when it is absent. The
    /// lookup and the insert happen under one write lock.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_insert_with(make)
            .clone()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identifier maps belonging to one target project.
#[derive(Debug, Default)]
pub struct ProjectIdMaps {
    /// Source section or synthetic suite to target suite id.
    pub suites: IdMap<TargetId, SuiteKey>,
    pub milestones: IdMap<TargetId>,
    pub configurations: IdMap<TargetId>,
    /// Source shared step id to target shared step hash.
    pub shared_steps: IdMap<String>,
}

/// Per-project maps, created on first use for a project code.
#[derive(Debug, Default)]
pub struct ProjectMapRegistry {
    projects: RwLock<HashMap<String, Arc<ProjectIdMaps>>>,
}

impl ProjectMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps for `code`, created empty if this is the first lookup.
    pub fn for_project(&self, code: &str) -> Arc<ProjectIdMaps> {
        if let Some(maps) = self
            .projects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(code)
        {
            return Arc::clone(maps);
        }

        let mut projects = self.projects.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(projects.entry(code.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let map: IdMap<TargetId> = IdMap::new();
        assert!(map.is_empty());
        map.insert(10, 100);
        map.insert(11, 110);
        assert_eq!(map.get(&10), Some(100));
        assert_eq!(map.get(&12), None);
        assert!(map.contains(&11));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn get_or_insert_keeps_the_first_value() {
        let map: IdMap<TargetId> = IdMap::new();
        assert_eq!(map.get_or_insert_with(1, || 10), 10);
        assert_eq!(map.get_or_insert_with(1, || 20), 10);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn string_keyed_map() {
        let map: IdMap<String, String> = IdMap::new();
        map.insert("abc".into(), "hash".into());
        assert_eq!(map.get(&"abc".to_string()).as_deref(), Some("hash"));
    }

    #[test]
    fn synthetic_suites_do_not_collide_with_sections() {
        let maps = ProjectIdMaps::default();
        maps.suites.insert(SuiteKey::SuiteRoot(0), 1);
        maps.suites.insert(SuiteKey::Section(0), 2);
        maps.suites.insert(SuiteKey::Section(1_000_000), 3);
        assert_eq!(maps.suites.get(&SuiteKey::SuiteRoot(0)), Some(1));
        assert_eq!(maps.suites.len(), 3);
    }

    #[test]
    fn project_maps_are_shared_per_code() {
        let registry = ProjectMapRegistry::new();
        registry.for_project("AT").suites.insert(SuiteKey::Section(1), 7);
        assert_eq!(registry.for_project("AT").suites.get(&SuiteKey::Section(1)), Some(7));
        assert!(registry.for_project("BT").suites.is_empty());
    }
}

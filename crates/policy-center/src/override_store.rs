use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::model::RuntimeOverrideSpec;

/// Active runtime overrides keyed by policy path.
#[derive(Clone, Debug, Default)]
pub struct RuntimeOverrideStore {
    entries: BTreeMap<String, RuntimeOverrideEntry>,
    next_generation: u64,
}

#[derive(Clone, Debug)]
pub struct RuntimeOverrideEntry {
    pub value: Value,
    pub owner: String,
    pub reason: String,
    pub expires_at: Option<Instant>,
    /// Bumped on every insert so a stale expiry cannot remove a newer entry.
    pub generation: u64,
}

impl RuntimeOverrideStore {
    /// Stores `spec`, replacing any entry at the same path, and returns its generation.
    pub fn insert(&mut self, spec: &RuntimeOverrideSpec, ttl: Option<Duration>) -> u64 {
        self.next_generation += 1;
        let entry = RuntimeOverrideEntry {
            value: spec.value.clone(),
            owner: spec.owner.clone(),
            reason: spec.reason.clone(),
            expires_at: ttl.map(|dur| Instant::now() + dur),
            generation: self.next_generation,
        };
        self.entries.insert(spec.path.clone(), entry);
        self.next_generation
    }

    /// Removes the entry at `path` only while it is still `generation`.
    pub fn expire(&mut self, path: &str, generation: u64) -> bool {
        match self.entries.get(path) {
            Some(entry) if entry.generation == generation => {
                self.entries.remove(path);
                true
            }
            _ => false,
        }
    }

    /// Drops expired entries and returns the remaining `(path, value)` pairs in path order.
    pub fn active_entries(&mut self) -> Vec<(String, Value)> {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| entry.expires_at.map(|at| at > now).unwrap_or(true));
        self.entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.value.clone()))
            .collect()
    }

    pub fn owner_of(&self, path: &str) -> Option<(&str, &str)> {
        self.entries
            .get(path)
            .map(|entry| (entry.owner.as_str(), entry.reason.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(path: &str) -> RuntimeOverrideSpec {
        RuntimeOverrideSpec {
            path: path.into(),
            value: serde_json::json!(1),
            owner: "ops".into(),
            reason: "incident".into(),
            ttl_seconds: 0,
        }
    }

    #[test]
    fn expired_entries_are_dropped() {
        let mut store = RuntimeOverrideStore::default();
        store.insert(&spec("sla.high_ms"), Some(Duration::from_millis(1)));
        store.insert(&spec("sla.medium_ms"), None);
        std::thread::sleep(Duration::from_millis(5));
        let active = store.active_entries();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "sla.medium_ms");
        assert_eq!(store.owner_of("sla.medium_ms"), Some(("ops", "incident")));
    }

    #[test]
    fn stale_generation_does_not_expire_replacement() {
        let mut store = RuntimeOverrideStore::default();
        let first = store.insert(&spec("fetch.timeout_ms"), None);
        let second = store.insert(&spec("fetch.timeout_ms"), None);
        assert_ne!(first, second);

        assert!(!store.expire("fetch.timeout_ms", first));
        assert_eq!(store.active_entries().len(), 1);
        assert!(store.expire("fetch.timeout_ms", second));
        assert!(store.active_entries().is_empty());
    }
}

//! Run exclusion for orchestrated operations.
//!
//! One run may be in flight per key (typically the active project id).
//! Acquiring a held key is rejected, not queued; the caller surfaces the
//! rejection to the operator. The guard releases on drop, so the running
//! state clears on every exit path, including failures.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use crate::error::{FlowError, Result};

#[derive(Clone)]
pub struct RunRegistry {
    active: Arc<DashMap<String, ()>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            active: Arc::new(DashMap::new()),
        }
    }

    /// Claim `key` for a run, failing with [`FlowError::RunInProgress`]
    /// when it is already held.
    pub fn acquire(&self, key: &str) -> Result<RunGuard> {
        match self.active.entry(key.to_string()) {
            Entry::Occupied(_) => Err(FlowError::RunInProgress(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(RunGuard {
                    key: key.to_string(),
                    active: Arc::clone(&self.active),
                })
            }
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.active.contains_key(key)
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RunGuard {
    key: String,
    active: Arc<DashMap<String, ()>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected() {
        let registry = RunRegistry::new();
        let guard = registry.acquire("project:p1").unwrap();
        assert!(registry.is_running("project:p1"));

        let rejected = registry.acquire("project:p1");
        assert!(matches!(rejected, Err(FlowError::RunInProgress(_))));

        // independent keys are unaffected
        let other = registry.acquire("project:p2").unwrap();
        drop(other);
        drop(guard);
    }

    #[test]
    fn guard_drop_releases_even_midway() {
        let registry = RunRegistry::new();
        {
            let _guard = registry.acquire("create-project").unwrap();
            assert!(registry.is_running("create-project"));
        }
        assert!(!registry.is_running("create-project"));
        assert!(registry.acquire("create-project").is_ok());
    }
}

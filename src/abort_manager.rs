use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::utils::log_warn;

/// Shared "keep generating" flag for one group.
///
/// The running round reads it at every cancellation point; `pause` clears it.
#[derive(Debug, Default)]
pub struct GenerationFlag {
    generating: AtomicBool,
}

impl GenerationFlag {
    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    fn set(&self, value: bool) {
        self.generating.store(value, Ordering::SeqCst);
    }
}

/// Owns the generation slot of a group for the duration of a round.
///
/// Dropping the guard clears the flag and frees the slot, so an early return or a
/// panic in the round cannot leave the group stuck in the generating state.
#[derive(Debug)]
pub struct GenerationGuard {
    group_id: String,
    flag: Arc<GenerationFlag>,
    registry: GenerationRegistry,
}

impl GenerationGuard {
    pub fn flag(&self) -> Arc<GenerationFlag> {
        Arc::clone(&self.flag)
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.flag.set(false);
        self.registry.release(&self.group_id, &self.flag);
    }
}

/// Per-group single-writer registry for observer rounds.
#[derive(Clone, Debug, Default)]
pub struct GenerationRegistry {
    inner: Arc<Mutex<HashMap<String, Arc<GenerationFlag>>>>,
}

impl GenerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the group for a new round. Returns `None` while another round owns it.
    pub fn try_begin(&self, group_id: &str) -> Option<GenerationGuard> {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.contains_key(group_id) {
            return None;
        }
        let flag = Arc::new(GenerationFlag::default());
        flag.set(true);
        map.insert(group_id.to_string(), Arc::clone(&flag));
        Some(GenerationGuard {
            group_id: group_id.to_string(),
            flag,
            registry: self.clone(),
        })
    }

    /// Ask the running round to stop before its next action.
    /// Returns false when no round is running for the group.
    pub fn pause(&self, group_id: &str) -> bool {
        let map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        match map.get(group_id) {
            Some(flag) => {
                flag.set(false);
                true
            }
            None => false,
        }
    }

    pub fn is_generating(&self, group_id: &str) -> bool {
        self.inner
            .lock()
            .map(|map| map.get(group_id).map(|f| f.is_generating()).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn is_registered(&self, group_id: &str) -> bool {
        self.inner
            .lock()
            .map(|map| map.contains_key(group_id))
            .unwrap_or(false)
    }

    fn release(&self, group_id: &str, flag: &Arc<GenerationFlag>) {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        match map.get(group_id) {
            Some(current) if Arc::ptr_eq(current, flag) => {
                map.remove(group_id);
            }
            _ => log_warn(
                "generation_registry",
                format!("release for {} did not match the registered round", group_id),
            ),
        }
    }
}

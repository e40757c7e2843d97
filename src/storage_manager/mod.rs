use std::collections::HashMap;
use std::sync::Mutex;

use crate::chat_manager::types::ObserverGroup;

pub mod db;
pub mod observer_groups;
pub mod settings;
pub mod world_books;

pub use observer_groups::SqliteGroupStore;
pub use world_books::{SqliteWorldBookSource, StaticWorldBookSource, WorldBookSource};

/// Key-value persistence for whole group records.
///
/// The dispatcher calls `put` after every appended message, so a crash mid-round
/// never loses a message that was already rendered.
pub trait GroupStore: Send + Sync {
    fn put(&self, group: &ObserverGroup) -> Result<(), String>;
    fn get(&self, id: &str) -> Result<Option<ObserverGroup>, String>;
}

/// Process-local store, mostly for tests and embedding.
#[derive(Default)]
pub struct MemoryGroupStore {
    groups: Mutex<HashMap<String, ObserverGroup>>,
    puts: Mutex<usize>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.lock().map(|n| *n).unwrap_or(0)
    }
}

impl GroupStore for MemoryGroupStore {
    fn put(&self, group: &ObserverGroup) -> Result<(), String> {
        let mut groups = self
            .groups
            .lock()
            .map_err(|_| "group store lock poisoned".to_string())?;
        groups.insert(group.id.clone(), group.clone());
        if let Ok(mut n) = self.puts.lock() {
            *n += 1;
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ObserverGroup>, String> {
        let groups = self
            .groups
            .lock()
            .map_err(|_| "group store lock poisoned".to_string())?;
        Ok(groups.get(id).cloned())
    }
}

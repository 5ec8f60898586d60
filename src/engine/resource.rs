//! Named shared resources.
//!
//! A resource is a named, non-entity-keyed datum shared across systems:
//! configuration blocks, spatial indices, input queues. The container maps
//! string names to opaque `Arc` values under a reader/writer lock.
//!
//! The container itself does not enforce the scheduler's read/write
//! declarations; the scheduler rejects conflicting declarations at work-group
//! registration time, which makes runtime enforcement here redundant.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Opaque, shareable resource value.
pub type ResourceValue = Arc<dyn Any + Send + Sync>;

/// Thread-safe map of named resources.
///
/// Concurrent readers are allowed; writers take the lock exclusively. The
/// set/delete lifecycle is independent of the tick.
#[derive(Default)]
pub struct ResourceContainer {
    values: RwLock<HashMap<String, ResourceValue>>,
}

impl ResourceContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resource stored under `name`.
    pub fn get(&self, name: &str) -> Option<ResourceValue> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(name).cloned()
    }

    /// Returns the resource under `name` downcast to `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).and_then(|value| value.downcast::<T>().ok())
    }

    /// Stores `value` under `name`, replacing any previous resource.
    pub fn set(&self, name: impl Into<String>, value: ResourceValue) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(name.into(), value);
    }

    /// Wraps `value` in an `Arc` and stores it under `name`.
    pub fn insert<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.set(name, Arc::new(value));
    }

    /// Removes the resource under `name`.
    pub fn delete(&self, name: &str) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(name);
    }

    /// Visits every resource; the visitor returns `false` to stop early.
    pub fn range(&self, mut visit: impl FnMut(&str, &ResourceValue) -> bool) {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in values.iter() {
            if !visit(name, value) {
                return;
            }
        }
    }
}

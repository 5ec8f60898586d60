//! Component storage layer.
//!
//! ## Purpose
//! A world owns one typed store per registered component type. Stores are
//! created by pluggable [`StorageStrategy`] implementations and accessed
//! through the uniform [`ComponentStore`] contract: generation-safe reads,
//! writes, and iteration over erased values.
//!
//! ## Strategies
//! Two strategies ship with the engine:
//!
//! - [`DenseStrategy`] — slot-indexed by entity index. O(1) access, memory
//!   proportional to the highest entity index ever bound. The default for
//!   per-entity state that most entities carry.
//! - [`SharedStrategy`] — interns structurally equal values behind reference
//!   counts so thousands of entities can share one allocation. Suited to
//!   archetype-like data (base stats, species templates) where few distinct
//!   values cover many entities.
//!
//! ## Generation Safety
//! Every lookup is gated on generation equality: a destroyed id never
//! reaches a live binding, and the mismatch is also the point where a store
//! may release the stored value.
//!
//! ## Concurrency
//! Stores carry their own reader/writer lock so multiple async work groups
//! can iterate the same component concurrently. The iteration callback runs
//! under the store's read lock; mutating the same store from inside the
//! callback deadlocks.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::engine::component::ComponentValue;
use crate::engine::entity::EntityId;
use crate::engine::error::{CommandError, RegistrationError, ZeroEntityError};
use crate::engine::types::ComponentType;

/// Factory and layout choice behind a component type.
pub trait StorageStrategy: Send + Sync {
    /// Short strategy name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Produces a fresh store bound to `component`.
    fn new_store(&self, component: ComponentType) -> Arc<dyn ComponentStore>;
}

/// Uniform read/write contract over a typed component collection.
///
/// Values returned by [`ComponentStore::get`] are copies: callers mutating a
/// returned value must `set` it back to persist the change.
pub trait ComponentStore: Send + Sync {
    /// The component type this store is bound to.
    fn component_type(&self) -> &ComponentType;

    /// Number of live bindings.
    fn len(&self) -> usize;

    /// Returns `true` when the store holds no bindings.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reports whether `id` has a live binding.
    fn has(&self, id: EntityId) -> bool;

    /// Returns a copy of the value bound to `id`, or `None` when absent or
    /// stale.
    fn get(&self, id: EntityId) -> Option<Box<dyn ComponentValue>>;

    /// Visits every live binding exactly once; the visitor returns `false`
    /// to stop early. The visitor must not mutate this store.
    fn iterate(&self, visit: &mut dyn FnMut(EntityId, &dyn ComponentValue) -> bool);

    /// Binds `value` to `id`, replacing any previous binding.
    fn set(&self, id: EntityId, value: Box<dyn ComponentValue>) -> Result<(), ZeroEntityError>;

    /// Removes the binding for `id`, returning `true` when one was present.
    fn remove(&self, id: EntityId) -> bool;

    /// Drops every binding.
    fn clear(&self);

    /// The store as [`Any`], for downcasting to a concrete store type (e.g.
    /// to reach [`SharedStore::stats`]).
    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("component_type", self.component_type())
            .field("len", &self.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dense strategy
// ─────────────────────────────────────────────────────────────────────────────

/// Slot-per-entity-index storage strategy.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseStrategy;

impl DenseStrategy {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl StorageStrategy for DenseStrategy {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn new_store(&self, component: ComponentType) -> Arc<dyn ComponentStore> {
        Arc::new(DenseStore {
            component,
            inner: RwLock::new(DenseInner::default()),
        })
    }
}

struct DenseSlot {
    generation: u32,
    value: Option<Box<dyn ComponentValue>>,
}

impl DenseSlot {
    const VACANT: DenseSlot = DenseSlot { generation: 0, value: None };

    fn matches(&self, id: EntityId) -> bool {
        self.value.is_some() && self.generation == id.generation()
    }
}

#[derive(Default)]
struct DenseInner {
    slots: Vec<DenseSlot>,
    count: usize,
}

impl DenseInner {
    fn slot(&self, id: EntityId) -> Option<&DenseSlot> {
        self.slots.get(id.index() as usize).filter(|slot| slot.matches(id))
    }
}

/// Store produced by [`DenseStrategy`].
///
/// Each slot records the generation it was written under; lookups succeed
/// only when the slot is occupied and the generations match.
pub struct DenseStore {
    component: ComponentType,
    inner: RwLock<DenseInner>,
}

impl DenseStore {
    fn read(&self) -> RwLockReadGuard<'_, DenseInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DenseInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ComponentStore for DenseStore {
    fn component_type(&self) -> &ComponentType {
        &self.component
    }

    fn len(&self) -> usize {
        self.read().count
    }

    fn has(&self, id: EntityId) -> bool {
        self.read().slot(id).is_some()
    }

    fn get(&self, id: EntityId) -> Option<Box<dyn ComponentValue>> {
        self.read()
            .slot(id)
            .and_then(|slot| slot.value.as_ref())
            .map(|value| value.clone_value())
    }

    fn iterate(&self, visit: &mut dyn FnMut(EntityId, &dyn ComponentValue) -> bool) {
        let inner = self.read();
        for (index, slot) in inner.slots.iter().enumerate() {
            let Some(value) = slot.value.as_ref() else {
                continue;
            };
            let id = EntityId::from_parts(index as u32, slot.generation);
            if !visit(id, value.as_ref()) {
                return;
            }
        }
    }

    fn set(&self, id: EntityId, value: Box<dyn ComponentValue>) -> Result<(), ZeroEntityError> {
        if id.is_zero() {
            return Err(ZeroEntityError::new("set"));
        }
        let mut inner = self.write();
        let index = id.index() as usize;
        if index >= inner.slots.len() {
            inner.slots.resize_with(index + 1, || DenseSlot::VACANT);
        }
        if inner.slots[index].value.is_none() {
            inner.count += 1;
        }
        inner.slots[index] = DenseSlot { generation: id.generation(), value: Some(value) };
        Ok(())
    }

    fn remove(&self, id: EntityId) -> bool {
        let mut inner = self.write();
        let index = id.index() as usize;
        let removed = match inner.slots.get_mut(index) {
            Some(slot) if slot.matches(id) => {
                slot.value = None;
                true
            }
            _ => false,
        };
        if removed {
            inner.count -= 1;
        }
        removed
    }

    fn clear(&self) {
        let mut inner = self.write();
        for slot in &mut inner.slots {
            slot.value = None;
            slot.generation = 0;
        }
        inner.count = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared (interned) strategy
// ─────────────────────────────────────────────────────────────────────────────

/// Interned storage strategy: entities with structurally equal values share
/// one reference-counted cell.
///
/// Shared values are immutable from the perspective of individual entities;
/// to "modify" a shared component, `set` a new value — the entity is rebound
/// to a different cell and the old cell is reclaimed when its last reference
/// drops.
#[derive(Clone, Copy, Debug, Default)]
pub struct SharedStrategy;

impl SharedStrategy {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl StorageStrategy for SharedStrategy {
    fn name(&self) -> &'static str {
        "shared"
    }

    fn new_store(&self, component: ComponentType) -> Arc<dyn ComponentStore> {
        Arc::new(SharedStore {
            component,
            inner: RwLock::new(SharedInner {
                entity_to_value: HashMap::new(),
                cells: HashMap::new(),
                next_value_id: 1,
            }),
        })
    }
}

struct SharedCell {
    value: Box<dyn ComponentValue>,
    refcount: usize,
}

struct SharedInner {
    entity_to_value: HashMap<EntityId, u32>,
    cells: HashMap<u32, SharedCell>,
    next_value_id: u32,
}

impl SharedInner {
    /// Finds a cell structurally equal to `value`, or interns a fresh one.
    fn find_or_intern(&mut self, value: Box<dyn ComponentValue>) -> u32 {
        for (&value_id, cell) in &mut self.cells {
            if cell.value.value_eq(value.as_ref()) {
                cell.refcount += 1;
                return value_id;
            }
        }
        let value_id = self.next_value_id;
        self.next_value_id += 1;
        self.cells.insert(value_id, SharedCell { value, refcount: 1 });
        value_id
    }

    /// Drops one reference to `value_id`, reclaiming the cell at zero.
    fn release(&mut self, value_id: u32) {
        if let Some(cell) = self.cells.get_mut(&value_id) {
            cell.refcount -= 1;
            if cell.refcount == 0 {
                self.cells.remove(&value_id);
            }
        }
    }
}

/// Store produced by [`SharedStrategy`].
pub struct SharedStore {
    component: ComponentType,
    inner: RwLock<SharedInner>,
}

impl SharedStore {
    fn read(&self) -> RwLockReadGuard<'_, SharedInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SharedInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sharing statistics for diagnostics.
    pub fn stats(&self) -> SharedStoreStats {
        let inner = self.read();
        let entity_count = inner.entity_to_value.len();
        let unique_value_count = inner.cells.len();
        SharedStoreStats {
            entity_count,
            unique_value_count,
            sharing_ratio: entity_count as f64 / unique_value_count.max(1) as f64,
        }
    }
}

impl ComponentStore for SharedStore {
    fn component_type(&self) -> &ComponentType {
        &self.component
    }

    fn len(&self) -> usize {
        self.read().entity_to_value.len()
    }

    fn has(&self, id: EntityId) -> bool {
        self.read().entity_to_value.contains_key(&id)
    }

    fn get(&self, id: EntityId) -> Option<Box<dyn ComponentValue>> {
        let inner = self.read();
        let value_id = inner.entity_to_value.get(&id)?;
        inner.cells.get(value_id).map(|cell| cell.value.clone_value())
    }

    fn iterate(&self, visit: &mut dyn FnMut(EntityId, &dyn ComponentValue) -> bool) {
        let inner = self.read();
        for (&id, value_id) in &inner.entity_to_value {
            let Some(cell) = inner.cells.get(value_id) else {
                continue;
            };
            if !visit(id, cell.value.as_ref()) {
                return;
            }
        }
    }

    fn set(&self, id: EntityId, value: Box<dyn ComponentValue>) -> Result<(), ZeroEntityError> {
        if id.is_zero() {
            return Err(ZeroEntityError::new("set"));
        }
        let mut inner = self.write();
        if let Some(old) = inner.entity_to_value.remove(&id) {
            inner.release(old);
        }
        let value_id = inner.find_or_intern(value);
        inner.entity_to_value.insert(id, value_id);
        Ok(())
    }

    fn remove(&self, id: EntityId) -> bool {
        let mut inner = self.write();
        match inner.entity_to_value.remove(&id) {
            Some(value_id) => {
                inner.release(value_id);
                true
            }
            None => false,
        }
    }

    fn clear(&self) {
        let mut inner = self.write();
        inner.entity_to_value.clear();
        inner.cells.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sharing metrics exposed by [`SharedStore::stats`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SharedStoreStats {
    /// Number of entities bound to a value.
    pub entity_count: usize,
    /// Number of distinct interned values.
    pub unique_value_count: usize,
    /// `entity_count / max(unique_value_count, 1)`; higher means more
    /// sharing.
    pub sharing_ratio: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of component stores, one per registered component type.
#[derive(Default)]
pub struct StorageProvider {
    stores: RwLock<HashMap<ComponentType, Arc<dyn ComponentStore>>>,
}

impl StorageProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `component` with a store produced by `strategy`.
    pub fn register(
        &self,
        component: ComponentType,
        strategy: &dyn StorageStrategy,
    ) -> Result<(), RegistrationError> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if stores.contains_key(&component) {
            return Err(RegistrationError::ComponentAlreadyRegistered(component));
        }
        let store = strategy.new_store(component.clone());
        stores.insert(component, store);
        Ok(())
    }

    /// Returns the store registered under `component`.
    pub fn view(&self, component: &ComponentType) -> Result<Arc<dyn ComponentStore>, CommandError> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores
            .get(component)
            .cloned()
            .ok_or_else(|| CommandError::ComponentNotRegistered(component.clone()))
    }
}

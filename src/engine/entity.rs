//! Entity identity and lifecycle.
//!
//! ## Purpose
//! Entities are lightweight, opaque identifiers. This module is responsible
//! for:
//!
//! - Issuing stable entity identifiers
//! - Tracking entity liveness via generation counters
//! - Recycling destroyed indices through a free list
//!
//! ## Entity Model
//! An [`EntityId`] is a compact, generational handle composed of:
//!
//! - An **index**, identifying the slot in the registry
//! - A **generation**, incremented on every create *and* destroy of the slot,
//!   so stale handles are detectable after recycling
//!
//! `(0, 0)` is the zero sentinel and is never alive.
//!
//! ## Invariants
//! - An entity is alive if and only if the registry's stored generation for
//!   its index equals the handle's generation.
//! - Every live id carries a generation of at least `1`.
//! - Destroying an entity invalidates all previously issued handles for it;
//!   recycling the index issues a strictly greater generation.
//!
//! ## Concurrency
//! All registry operations are linearizable under a single internal lock.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Opaque entity handle carrying a generation for stale-reference detection.
///
/// Two ids with the same index but different generations are distinct
/// entities; at most one of them can be alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    /// The zero sentinel `(0, 0)`; never alive and rejected by every
    /// mutating operation.
    pub const ZERO: EntityId = EntityId { index: 0, generation: 0 };

    /// Reconstructs an identifier from raw parts.
    ///
    /// Stores use this to rebuild ids during iteration; hosts normally only
    /// see ids issued by [`EntityRegistry::create`].
    #[inline]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the backing index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation counter.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Reports whether this is the zero sentinel.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.index == 0 && self.generation == 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}:{})", self.index, self.generation)
    }
}

#[derive(Default)]
struct RegistryInner {
    generations: Vec<u32>,
    free: Vec<u32>,
    alive: u32,
}

impl RegistryInner {
    fn is_alive(&self, id: EntityId) -> bool {
        let index = id.index as usize;
        index < self.generations.len() && self.generations[index] == id.generation
    }
}

/// Allocator for entity identifiers.
///
/// ## Behavior
/// - `create` recycles the most recently freed index when the free list is
///   non-empty, otherwise appends a fresh index; either way the slot's
///   generation is incremented so the issued id is unique for all time.
/// - `destroy` succeeds only when the handle's generation matches the stored
///   generation; success bumps the generation again, so the handle becomes
///   stale immediately.
///
/// ## Concurrency
/// Thread-safe; every operation takes the internal lock.
#[derive(Default)]
pub struct EntityRegistry {
    inner: Mutex<RegistryInner>,
}

impl EntityRegistry {
    /// Constructs an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // The data behind the lock is valid after any panic that poisoned it;
    // every mutation leaves the vectors internally consistent.
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a new entity identifier, recycling freed indices when possible.
    pub fn create(&self) -> EntityId {
        let mut inner = self.lock();
        let index = match inner.free.pop() {
            Some(index) => index,
            None => {
                let index = inner.generations.len() as u32;
                inner.generations.push(0);
                index
            }
        };
        inner.generations[index as usize] += 1;
        let generation = inner.generations[index as usize];
        inner.alive += 1;
        EntityId { index, generation }
    }

    /// Releases the entity, returning `true` when the handle was live.
    ///
    /// Destroying the zero sentinel or a stale handle is a no-op that
    /// returns `false`.
    pub fn destroy(&self, id: EntityId) -> bool {
        if id.is_zero() {
            return false;
        }
        let mut inner = self.lock();
        if !inner.is_alive(id) {
            return false;
        }
        inner.alive -= 1;
        inner.generations[id.index as usize] += 1;
        inner.free.push(id.index);
        true
    }

    /// Reports whether the handle refers to a currently allocated entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_zero() {
            return false;
        }
        self.lock().is_alive(id)
    }

    /// Returns the number of live entities.
    pub fn count(&self) -> usize {
        self.lock().alive as usize
    }
}

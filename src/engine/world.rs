//! The world: entities, component stores, and resources.
//!
//! A [`World`] is the container a scheduler advances: an entity registry, a
//! set of typed component stores behind pluggable strategies, and a named
//! resource container. Hosts register components and apply command batches;
//! systems reach the same state read-only through their execution context.

use std::sync::Arc;

use crate::engine::commands::Command;
use crate::engine::entity::EntityRegistry;
use crate::engine::error::EngineResult;
use crate::engine::resource::ResourceContainer;
use crate::engine::storage::{ComponentStore, StorageProvider, StorageStrategy};
use crate::engine::types::ComponentType;

/// Container of entities, component stores, and resources.
#[derive(Default)]
pub struct World {
    registry: EntityRegistry,
    storage: StorageProvider,
    resources: ResourceContainer,
}

impl World {
    /// Constructs an empty world.
    pub fn new() -> Self {
        Self {
            registry: EntityRegistry::new(),
            storage: StorageProvider::new(),
            resources: ResourceContainer::new(),
        }
    }

    /// The entity registry backing this world.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// The storage provider backing this world.
    pub fn storage(&self) -> &StorageProvider {
        &self.storage
    }

    /// The resource container backing this world.
    pub fn resources(&self) -> &ResourceContainer {
        &self.resources
    }

    /// Registers `component` with a store produced by `strategy`.
    ///
    /// Each component type can be registered at most once per world.
    pub fn register_component(
        &self,
        component: impl Into<ComponentType>,
        strategy: &dyn StorageStrategy,
    ) -> EngineResult<()> {
        self.storage.register(component.into(), strategy)?;
        Ok(())
    }

    /// Returns the store registered under `component`.
    pub fn view_component(
        &self,
        component: &ComponentType,
    ) -> EngineResult<Arc<dyn ComponentStore>> {
        Ok(self.storage.view(component)?)
    }

    /// Applies deferred commands in order, stopping at the first failure.
    ///
    /// Commands already applied before the failure stay applied; the failing
    /// command and everything after it leave the world untouched.
    pub fn apply_commands(&self, commands: impl IntoIterator<Item = Command>) -> EngineResult<()> {
        for command in commands {
            command.apply(self)?;
        }
        Ok(())
    }
}

//! Deferred world mutations.
//!
//! Systems never mutate the world directly; they push [`Command`] values
//! into the tick's command buffer and the scheduler applies them outside
//! system execution windows. Create-entity commands can carry an
//! [`EntityIdSlot`] so the host observes the allocated id after the tick.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::engine::component::ComponentValue;
use crate::engine::entity::EntityId;
use crate::engine::error::{CommandError, StaleEntityError, ZeroEntityError};
use crate::engine::types::ComponentType;
use crate::engine::world::World;

/// Write-once cell receiving the id of a deferred entity creation.
///
/// Clones share the cell; the first apply fills it.
#[derive(Clone, Debug, Default)]
pub struct EntityIdSlot {
    cell: Arc<OnceLock<EntityId>>,
}

impl EntityIdSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the allocated id once the command has been applied.
    pub fn get(&self) -> Option<EntityId> {
        self.cell.get().copied()
    }

    fn fill(&self, id: EntityId) {
        let _ = self.cell.set(id);
    }
}

/// A deferred mutation applied to the world after system execution.
pub enum Command {
    /// Allocate a fresh entity; optionally report the id through a slot.
    CreateEntity {
        /// Receives the allocated id, when present.
        target: Option<EntityIdSlot>,
    },
    /// Destroy a live entity.
    DestroyEntity {
        /// The entity to destroy.
        entity: EntityId,
    },
    /// Bind a component value to an entity.
    AddComponent {
        /// The entity to bind to.
        entity: EntityId,
        /// The component type to bind under.
        component: ComponentType,
        /// The value to bind.
        value: Box<dyn ComponentValue>,
    },
    /// Remove a component binding from an entity.
    RemoveComponent {
        /// The entity to unbind.
        entity: EntityId,
        /// The component type to unbind.
        component: ComponentType,
    },
}

impl Command {
    /// Enqueues an entity creation.
    pub fn create_entity() -> Self {
        Command::CreateEntity { target: None }
    }

    /// Enqueues an entity creation that reports its id through `slot`.
    pub fn create_entity_into(slot: EntityIdSlot) -> Self {
        Command::CreateEntity { target: Some(slot) }
    }

    /// Enqueues an entity destruction.
    pub fn destroy_entity(entity: EntityId) -> Self {
        Command::DestroyEntity { entity }
    }

    /// Enqueues a component addition.
    pub fn add_component(
        entity: EntityId,
        component: impl Into<ComponentType>,
        value: impl ComponentValue,
    ) -> Self {
        Command::AddComponent { entity, component: component.into(), value: Box::new(value) }
    }

    /// Enqueues a component removal.
    pub fn remove_component(entity: EntityId, component: impl Into<ComponentType>) -> Self {
        Command::RemoveComponent { entity, component: component.into() }
    }

    /// Applies the mutation to `world`.
    ///
    /// Create never fails. Destroy fails on the zero id or a stale handle.
    /// Add and Remove fail on the zero id or an unregistered component;
    /// removing an absent binding silently succeeds.
    pub(crate) fn apply(self, world: &World) -> Result<(), CommandError> {
        match self {
            Command::CreateEntity { target } => {
                let id = world.registry().create();
                if let Some(slot) = target {
                    slot.fill(id);
                }
                Ok(())
            }
            Command::DestroyEntity { entity } => {
                if entity.is_zero() {
                    return Err(ZeroEntityError::new("destroy").into());
                }
                if !world.registry().destroy(entity) {
                    return Err(StaleEntityError { entity }.into());
                }
                Ok(())
            }
            Command::AddComponent { entity, component, value } => {
                if entity.is_zero() {
                    return Err(ZeroEntityError::new("add component to").into());
                }
                let store = world.storage().view(&component)?;
                store.set(entity, value)?;
                Ok(())
            }
            Command::RemoveComponent { entity, component } => {
                if entity.is_zero() {
                    return Err(ZeroEntityError::new("remove component from").into());
                }
                let store = world.storage().view(&component)?;
                store.remove(entity);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::CreateEntity { target } => f
                .debug_struct("CreateEntity")
                .field("has_target", &target.is_some())
                .finish(),
            Command::DestroyEntity { entity } => {
                f.debug_struct("DestroyEntity").field("entity", entity).finish()
            }
            Command::AddComponent { entity, component, value } => f
                .debug_struct("AddComponent")
                .field("entity", entity)
                .field("component", component)
                .field("value", value)
                .finish(),
            Command::RemoveComponent { entity, component } => f
                .debug_struct("RemoveComponent")
                .field("entity", entity)
                .field("component", component)
                .finish(),
        }
    }
}

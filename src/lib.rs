//! # simtick
//!
//! Deterministic Entity-Component-System execution engine for interactive
//! server workloads: game simulations, real-time arenas, large agent-based
//! sims.
//!
//! The engine advances a *world* — entities, typed component stores, and
//! named resources — by driving a deterministic *tick*: registered work
//! groups of systems execute in configured order, their mutation intents
//! are collected as deferred commands, and the commands are applied
//! atomically at well-defined points.
//!
//! ## Design Goals
//! - Deterministic, configuration-driven ordering
//! - Static access validation instead of per-access locking
//! - Cooperative async dispatch with strict join ordering
//! - Pluggable component storage (dense and shared/interned strategies)
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use simtick::prelude::*;
//!
//! let world = Arc::new(World::new());
//! world.register_component("pos", &DenseStrategy::new()).unwrap();
//!
//! let scheduler = Scheduler::new(world);
//! let slot = EntityIdSlot::new();
//! let spawn_slot = slot.clone();
//! scheduler
//!     .register_work_group(WorkGroupConfig::new("spawn").system(FnSystem::new(
//!         SystemDescriptor::new("spawner").writes(["pos"]),
//!         move |_deadline, ctx| {
//!             ctx.defer(Command::create_entity_into(spawn_slot.clone()));
//!             Ok(SystemStatus::Executed)
//!         },
//!     )))
//!     .unwrap();
//!
//! scheduler
//!     .tick(&DeadlineToken::new(), Duration::from_millis(16))
//!     .unwrap();
//! assert!(slot.get().is_some());
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::buffer::{CommandBuffer, CommandBufferPool};
pub use engine::commands::{Command, EntityIdSlot};
pub use engine::component::ComponentValue;
pub use engine::entity::{EntityId, EntityRegistry};
pub use engine::error::{
    AccessConflict, CommandError, EngineError, EngineResult, RegistrationError, StaleEntityError,
    SystemError, WorkerPoolError, ZeroEntityError,
};
pub use engine::observe::{
    shared_writer, CounterOptions, InstrumentationConfig, ObservationSettings, ScopedLogger,
    SchedulerObserver, SharedWriter, SummaryLogFormat, TraceExportOptions, TraceExporter,
    WorkGroupCounters,
};
pub use engine::resource::{ResourceContainer, ResourceValue};
pub use engine::scheduler::{
    Scheduler, SchedulerBuilder, WorkGroupConfig, WorkGroupHandle, WorkGroupSummary,
};
pub use engine::storage::{
    ComponentStore, DenseStore, DenseStrategy, SharedStore, SharedStoreStats, SharedStrategy,
    StorageProvider, StorageStrategy,
};
pub use engine::systems::{ExecutionContext, FnSystem, System, SystemDescriptor, SystemStatus};
pub use engine::types::{
    AccessMode, ComponentType, DeadlineToken, ErrorPolicy, ResourceAccess, Tick, TickInterval,
    WorkGroupId, WorkGroupMode,
};
pub use engine::world::World;

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used engine types.
///
/// Import with:
/// ```rust
/// use simtick::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Command, ComponentType, DeadlineToken, DenseStrategy, EntityId, EntityIdSlot, ErrorPolicy,
        FnSystem, ResourceAccess, Scheduler, SharedStrategy, System, SystemDescriptor,
        SystemStatus, TickInterval, WorkGroupConfig, WorkGroupId, WorkGroupMode, World,
    };
}

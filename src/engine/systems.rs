//! System abstractions and the execution context.
//!
//! A **system** is a unit of behavior scheduled inside a work group.
//! Systems:
//! - declare the components and resources they touch through a
//!   [`SystemDescriptor`],
//! - are gated per tick by their own `run_every` interval,
//! - operate through a read-only [`ExecutionContext`] and defer every world
//!   mutation as a command.
//!
//! ## Design Goals
//!
//! - **Safe concurrency by declaration** — the scheduler validates declared
//!   access once at registration; systems never take storage write locks
//!   across work groups.
//! - **Lightweight definitions** — [`FnSystem`] wraps a closure with a
//!   descriptor, so most simulation logic needs no dedicated type.
//! - **Statelessness from the scheduler's view** — a system is invoked once
//!   per admitted tick and owns no scheduler state.
//!
//! ## Thread Safety
//!
//! Systems must be `Send + Sync`: async work groups run them on worker
//! threads while the driver owns the tick.

use std::time::Duration;

use crate::engine::buffer::CommandBuffer;
use crate::engine::commands::Command;
use crate::engine::error::SystemError;
use crate::engine::observe::ScopedLogger;
use crate::engine::types::{ComponentType, DeadlineToken, ResourceAccess, Tick, TickInterval};
use crate::engine::world::World;

/// Declared metadata and access set of a system.
#[derive(Clone, Debug, Default)]
pub struct SystemDescriptor {
    /// Human-readable name, used in logs, summaries, and wrapped errors.
    pub name: String,
    /// Component types the system reads.
    pub reads: Vec<ComponentType>,
    /// Component types the system writes (via deferred commands).
    pub writes: Vec<ComponentType>,
    /// Named resources the system touches.
    pub resources: Vec<ResourceAccess>,
    /// Free-form labels for host tooling.
    pub tags: Vec<String>,
    /// Per-system tick gate, applied on top of the group interval.
    pub run_every: TickInterval,
    /// Whether the system may run on a worker thread in an async group.
    pub async_allowed: bool,
}

impl SystemDescriptor {
    /// Creates a descriptor with the given name and empty access sets.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Declares component reads.
    pub fn reads(mut self, components: impl IntoIterator<Item = impl Into<ComponentType>>) -> Self {
        self.reads.extend(components.into_iter().map(Into::into));
        self
    }

    /// Declares component writes.
    pub fn writes(
        mut self,
        components: impl IntoIterator<Item = impl Into<ComponentType>>,
    ) -> Self {
        self.writes.extend(components.into_iter().map(Into::into));
        self
    }

    /// Declares access to a named resource.
    pub fn resource(mut self, access: ResourceAccess) -> Self {
        self.resources.push(access);
        self
    }

    /// Attaches a free-form tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the per-system tick gate.
    pub fn run_every(mut self, interval: TickInterval) -> Self {
        self.run_every = interval;
        self
    }

    /// Opts the system into async execution.
    pub fn async_allowed(mut self, allowed: bool) -> Self {
        self.async_allowed = allowed;
        self
    }
}

/// How a system invocation concluded when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemStatus {
    /// The system did its work this tick.
    Executed,
    /// The system decided it had nothing to do.
    Skipped,
}

/// A unit of executable logic scheduled within a work group.
pub trait System: Send + Sync {
    /// Returns the system's declared metadata and access set.
    fn descriptor(&self) -> SystemDescriptor;

    /// Executes the system against the world.
    ///
    /// Systems honoring cancellation should check `deadline` at convenient
    /// points and return early; the scheduler otherwise waits for the call
    /// to return.
    fn run(
        &self,
        deadline: &DeadlineToken,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<SystemStatus, SystemError>;
}

/// A [`System`] backed by a function or closure.
///
/// This is the preferred way to define simulation logic: it keeps the
/// descriptor next to the behavior without a dedicated type per system.
pub struct FnSystem<F> {
    descriptor: SystemDescriptor,
    run: F,
}

impl<F> FnSystem<F>
where
    F: Fn(&DeadlineToken, &mut ExecutionContext<'_>) -> Result<SystemStatus, SystemError>
        + Send
        + Sync,
{
    /// Wraps `run` with its descriptor.
    pub fn new(descriptor: SystemDescriptor, run: F) -> Self {
        Self { descriptor, run }
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(&DeadlineToken, &mut ExecutionContext<'_>) -> Result<SystemStatus, SystemError>
        + Send
        + Sync,
{
    fn descriptor(&self) -> SystemDescriptor {
        self.descriptor.clone()
    }

    fn run(
        &self,
        deadline: &DeadlineToken,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<SystemStatus, SystemError> {
        (self.run)(deadline, ctx)
    }
}

/// Scoped handle passed to each system invocation.
///
/// Exposes read-only world access, tick timing, a logger tagged with the
/// enclosing work group and system, and the `defer` capability for world
/// mutation.
pub struct ExecutionContext<'a> {
    world: &'a World,
    dt: Duration,
    tick: Tick,
    logger: ScopedLogger,
    commands: &'a mut CommandBuffer,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        world: &'a World,
        dt: Duration,
        tick: Tick,
        logger: ScopedLogger,
        commands: &'a mut CommandBuffer,
    ) -> Self {
        Self { world, dt, tick, logger, commands }
    }

    /// The world, read-only.
    pub fn world(&self) -> &World {
        self.world
    }

    /// Time advanced by this tick.
    pub fn time_delta(&self) -> Duration {
        self.dt
    }

    /// Index of the current tick; monotonically increasing.
    pub fn tick_index(&self) -> Tick {
        self.tick
    }

    /// Structured logger scoped with `work_group` and `system` fields.
    pub fn logger(&self) -> &ScopedLogger {
        &self.logger
    }

    /// Buffers a deferred mutation for application after the group.
    pub fn defer(&mut self, command: Command) {
        self.commands.push(command);
    }
}

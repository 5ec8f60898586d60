//! Work-group scheduling and the tick pipeline.
//!
//! The scheduler owns the registered work groups, the tick counter, the
//! worker pool for async groups, the cross-group conflict tables, and the
//! observer chain. One call to [`Scheduler::tick`] advances the world by a
//! single deterministic step.
//!
//! ## Scheduling model
//!
//! A tick is driven by one *driver task* (the caller of `tick`):
//!
//! 1. The group order is snapshotted; groups gated out by their interval are
//!    skipped.
//! 2. Synchronous groups run inline, in configured order, against the
//!    tick-local command buffer.
//! 3. Asynchronous groups are dispatched to the worker pool with their own
//!    buffers; the driver records a handle per dispatch.
//! 4. The driver joins async handles in dispatch order, publishing their
//!    summaries and applying each group's commands only on success.
//! 5. The tick-local sync buffer is applied after every async buffer.
//! 6. Executed groups record `last_run`; the tick counter advances.
//!
//! ## Access safety
//!
//! Registration-time validation guarantees that within a tick each component
//! has at most one writing group and each resource has either one writer and
//! no other readers, or any number of readers and no writer. This is the
//! sufficient condition for data-race freedom between work groups, so no
//! locks are taken between groups at runtime.
//!
//! ## Group lifecycle within a tick
//!
//! Each group moves through `idle → pending → running → drained | failed`:
//! the interval gate admits it (`pending`), its systems execute (`running`),
//! and it ends the tick either with its commands applied (`drained`) or with
//! an unrecovered error (`failed`). Groups return to `idle` for their next
//! interval window; a `failed` group records no `last_run`.
//!
//! ## Error policy
//!
//! Per group: `abort` ends the tick at the first unrecovered error (after
//! joining already-dispatched async work), `continue` logs and moves on, and
//! `retry` re-runs the failing system once against a rewound buffer. A
//! failed group never contributes commands, whatever the policy.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::engine::buffer::{CommandBuffer, CommandBufferPool};
use crate::engine::error::{
    AccessConflict, EngineError, EngineResult, RegistrationError,
};
use crate::engine::observe::{
    build_observer_chain, InstrumentationConfig, ScopedLogger, SchedulerObserver, SharedWriter,
    TraceExportOptions, TraceExporter,
};
use crate::engine::systems::{ExecutionContext, System, SystemStatus};
use crate::engine::types::{
    AccessMode, ComponentType, DeadlineToken, ErrorPolicy, Tick, TickInterval, WorkGroupId,
    WorkGroupMode,
};
use crate::engine::worker::{JobHandle, JobOutcome, WorkerPool};
use crate::engine::world::World;

/// Sentinel for a group that has not executed yet.
const NEVER_RUN: u64 = u64::MAX;

/// Declares a set of systems and their execution preferences.
pub struct WorkGroupConfig {
    /// Unique, non-empty group id.
    pub id: WorkGroupId,
    /// Synchronous or asynchronous execution.
    pub mode: WorkGroupMode,
    /// Systems, invoked in declaration order.
    pub systems: Vec<Arc<dyn System>>,
    /// Tick gate for the whole group.
    pub interval: TickInterval,
    /// Error policy override; unset falls back to the builder's policy map,
    /// then to [`ErrorPolicy::Abort`].
    pub error_policy: Option<ErrorPolicy>,
    /// Recorded for host-side bookkeeping; ordering is governed solely by
    /// the sync order and registration order.
    pub priority: i32,
}

impl WorkGroupConfig {
    /// Starts a synchronous group configuration.
    pub fn new(id: impl Into<WorkGroupId>) -> Self {
        Self {
            id: id.into(),
            mode: WorkGroupMode::Sync,
            systems: Vec::new(),
            interval: TickInterval::EVERY_TICK,
            error_policy: None,
            priority: 0,
        }
    }

    /// Sets the execution mode.
    pub fn mode(mut self, mode: WorkGroupMode) -> Self {
        self.mode = mode;
        self
    }

    /// Appends a system.
    pub fn system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Arc::new(system));
        self
    }

    /// Appends an already-shared system.
    pub fn shared_system(mut self, system: Arc<dyn System>) -> Self {
        self.systems.push(system);
        self
    }

    /// Sets the group interval gate.
    pub fn interval(mut self, interval: TickInterval) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the error policy.
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }

    /// Sets the bookkeeping priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Reference to a registered work group.
#[derive(Clone, Debug)]
pub struct WorkGroupHandle {
    id: WorkGroupId,
}

impl WorkGroupHandle {
    /// The registered group's id.
    pub fn id(&self) -> &WorkGroupId {
        &self.id
    }
}

/// Execution metadata published to observers after a work group completes.
#[derive(Clone, Debug)]
pub struct WorkGroupSummary {
    /// The group that ran.
    pub work_group_id: WorkGroupId,
    /// The group's configured mode.
    pub mode: WorkGroupMode,
    /// Whether this run was dispatched asynchronously.
    pub async_run: bool,
    /// The tick the group ran on.
    pub tick: Tick,
    /// Wall-clock duration from the first system's start.
    pub duration: Duration,
    /// Systems considered.
    pub systems_total: usize,
    /// Systems that executed.
    pub systems_executed: usize,
    /// Systems gated out or self-skipped.
    pub systems_skipped: usize,
    /// Sorted declared component reads.
    pub component_reads: Vec<ComponentType>,
    /// Sorted declared component writes.
    pub component_writes: Vec<ComponentType>,
    /// Sorted declared resource reads.
    pub resource_reads: Vec<String>,
    /// Sorted declared resource writes.
    pub resource_writes: Vec<String>,
    /// Rendered terminal error, if the group failed.
    pub error: Option<String>,
}

pub(crate) struct WorkGroupState {
    id: WorkGroupId,
    mode: WorkGroupMode,
    systems: Vec<Arc<dyn System>>,
    interval: TickInterval,
    policy: AtomicU8,
    read_set: BTreeSet<ComponentType>,
    write_set: BTreeSet<ComponentType>,
    resource_reads: BTreeSet<String>,
    resource_writes: BTreeSet<String>,
    last_run: AtomicU64,
}

impl WorkGroupState {
    fn policy(&self) -> ErrorPolicy {
        ErrorPolicy::from_u8(self.policy.load(Ordering::Acquire))
    }

    fn set_policy(&self, policy: ErrorPolicy) {
        self.policy.store(policy as u8, Ordering::Release);
    }
}

/// Union of the access declared by a group's systems.
struct AccessUnion {
    reads: BTreeSet<ComponentType>,
    writes: BTreeSet<ComponentType>,
    resource_reads: BTreeSet<String>,
    resource_writes: BTreeSet<String>,
}

struct SchedulerInner {
    groups: HashMap<WorkGroupId, Arc<WorkGroupState>>,
    registration_order: Vec<WorkGroupId>,
    sync_order: Vec<WorkGroupId>,
    ordered: Vec<Arc<WorkGroupState>>,
    error_policies: HashMap<WorkGroupId, ErrorPolicy>,
    async_workers: Option<usize>,
    pool: Option<Arc<WorkerPool>>,
    component_owners: HashMap<ComponentType, WorkGroupId>,
    resource_owners: HashMap<String, WorkGroupId>,
    resource_readers: HashMap<String, BTreeSet<WorkGroupId>>,
    instrumentation: InstrumentationConfig,
    observer: Arc<dyn SchedulerObserver>,
    trace_session: Option<Arc<TraceExporter>>,
}

/// Drives deterministic ticks over a world's registered work groups.
pub struct Scheduler {
    world: Arc<World>,
    logger: ScopedLogger,
    buffers: Arc<CommandBufferPool>,
    tick_index: AtomicU64,
    inner: RwLock<SchedulerInner>,
}

impl Scheduler {
    /// Constructs a scheduler bound to `world`.
    pub fn new(world: Arc<World>) -> Self {
        let logger = ScopedLogger::new();
        let instrumentation = InstrumentationConfig::default();
        let observer = build_observer_chain(&logger, &instrumentation);
        Self {
            world,
            logger,
            buffers: Arc::new(CommandBufferPool::new()),
            tick_index: AtomicU64::new(0),
            inner: RwLock::new(SchedulerInner {
                groups: HashMap::new(),
                registration_order: Vec::new(),
                sync_order: Vec::new(),
                ordered: Vec::new(),
                error_policies: HashMap::new(),
                async_workers: None,
                pool: None,
                component_owners: HashMap::new(),
                resource_owners: HashMap::new(),
                resource_readers: HashMap::new(),
                instrumentation,
                observer,
                trace_session: None,
            }),
        }
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, SchedulerInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, SchedulerInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The world this scheduler advances.
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Index the next tick will run under.
    pub fn tick_index(&self) -> Tick {
        self.tick_index.load(Ordering::Acquire)
    }

    /// The tick a group last executed on, if it has executed.
    pub fn last_run(&self, id: &WorkGroupId) -> Option<Tick> {
        let inner = self.read_inner();
        let state = inner.groups.get(id)?;
        let last = state.last_run.load(Ordering::Acquire);
        (last != NEVER_RUN).then_some(last)
    }

    /// Number of threads in the async worker pool; `0` when async groups
    /// run inline.
    pub fn async_worker_count(&self) -> usize {
        self.read_inner().pool.as_ref().map_or(0, |pool| pool.size())
    }

    /// Returns a live configuration interface over this scheduler; setters
    /// mutate in place.
    pub fn builder(&self) -> SchedulerBuilder<'_> {
        SchedulerBuilder { scheduler: self }
    }

    /// Validates and installs a work group.
    ///
    /// ## Errors
    /// Rejects empty or duplicate ids, invalid async declarations, and any
    /// access conflict within the group or against registered groups. On
    /// error the scheduler state is unchanged.
    pub fn register_work_group(&self, cfg: WorkGroupConfig) -> EngineResult<WorkGroupHandle> {
        if cfg.id.is_empty() {
            return Err(RegistrationError::EmptyWorkGroupId.into());
        }

        let mut inner = self.write_inner();
        if inner.groups.contains_key(&cfg.id) {
            return Err(RegistrationError::DuplicateWorkGroup(cfg.id).into());
        }

        if cfg.mode == WorkGroupMode::Async && inner.pool.is_none() {
            let workers = match inner.async_workers {
                Some(count) => count,
                None => {
                    // First async registration with no configured count:
                    // default to host parallelism.
                    let count = default_parallelism();
                    inner.async_workers = Some(count);
                    count
                }
            };
            if workers > 0 {
                inner.pool = Some(Arc::new(WorkerPool::new(workers)?));
            }
        }

        let access = validate_systems_access(cfg.mode, &cfg.systems)?;
        check_cross_group_conflicts(&inner, &cfg.id, &access)?;

        let policy = cfg
            .error_policy
            .or_else(|| inner.error_policies.get(&cfg.id).copied())
            .unwrap_or_default();

        let state = Arc::new(WorkGroupState {
            id: cfg.id.clone(),
            mode: cfg.mode,
            systems: cfg.systems,
            interval: cfg.interval,
            policy: AtomicU8::new(policy as u8),
            read_set: access.reads,
            write_set: access.writes,
            resource_reads: access.resource_reads,
            resource_writes: access.resource_writes,
            last_run: AtomicU64::new(NEVER_RUN),
        });

        for component in &state.write_set {
            inner.component_owners.insert(component.clone(), state.id.clone());
        }
        for resource in &state.resource_writes {
            inner.resource_owners.insert(resource.clone(), state.id.clone());
        }
        for resource in &state.resource_reads {
            inner
                .resource_readers
                .entry(resource.clone())
                .or_default()
                .insert(state.id.clone());
        }

        inner.registration_order.push(cfg.id.clone());
        inner.groups.insert(cfg.id.clone(), state);
        rebuild_order(&mut inner);

        Ok(WorkGroupHandle { id: cfg.id })
    }

    /// Runs one tick.
    ///
    /// ## Errors
    /// Returns the first unrecovered error: a wrapped system failure, a
    /// command validation failure, pool infrastructure failure, or
    /// cancellation. Already-dispatched async groups are always joined
    /// before the error propagates; their commands are discarded.
    pub fn tick(&self, deadline: &DeadlineToken, dt: Duration) -> EngineResult<()> {
        let mut buffer = self.buffers.acquire();

        let (groups, observer, trace, pool) = {
            let inner = self.read_inner();
            (
                inner.ordered.clone(),
                inner.observer.clone(),
                inner.trace_session.clone(),
                inner.pool.clone(),
            )
        };
        let tick = self.tick_index.load(Ordering::Acquire);
        let world = Arc::clone(&self.world);

        let mut executed: Vec<Arc<WorkGroupState>> = Vec::new();
        let mut dispatched: Vec<(Arc<WorkGroupState>, JobHandle)> = Vec::new();
        let mut outcome: EngineResult<()> = Ok(());

        for group in &groups {
            if let Err(err) = deadline.check() {
                outcome = Err(err);
                break;
            }
            if !group.interval.should_run(tick) {
                continue;
            }
            match group.mode {
                WorkGroupMode::Async => {
                    let handle = dispatch_async(
                        Arc::clone(group),
                        Arc::clone(&world),
                        dt,
                        tick,
                        self.logger.clone(),
                        deadline,
                        pool.as_ref(),
                        Arc::clone(&self.buffers),
                    );
                    dispatched.push((Arc::clone(group), handle));
                }
                WorkGroupMode::Sync => {
                    let (summary, result) = run_work_group(
                        group,
                        &world,
                        dt,
                        tick,
                        &mut buffer,
                        &self.logger,
                        deadline,
                        false,
                    );
                    match result {
                        Ok(()) => {
                            publish_summary(&observer, &trace, &summary);
                            executed.push(Arc::clone(group));
                        }
                        Err(err) if group.policy() == ErrorPolicy::Continue => {
                            self.logger
                                .with("work_group", &group.id)
                                .with("err", &err)
                                .error("work group error");
                            publish_summary(&observer, &trace, &summary);
                        }
                        Err(err) => {
                            publish_summary(&observer, &trace, &summary);
                            outcome = Err(err);
                            break;
                        }
                    }
                }
            }
        }

        // Join every dispatched async group in dispatch order even when the
        // sync phase failed: summaries still publish, commands apply only
        // while the tick is still healthy.
        for (group, handle) in dispatched {
            let job = handle.wait();
            if let Some(summary) = &job.summary {
                publish_summary(&observer, &trace, summary);
            }
            if outcome.is_err() {
                continue;
            }
            match job.error {
                Some(err) => {
                    if group.policy() == ErrorPolicy::Continue {
                        self.logger
                            .with("work_group", &group.id)
                            .with("err", &err)
                            .error("async work group error");
                    } else {
                        outcome = Err(err);
                    }
                }
                None => {
                    if !job.commands.is_empty() {
                        if let Err(err) = world.apply_commands(job.commands) {
                            outcome = Err(err);
                            continue;
                        }
                    }
                    executed.push(group);
                }
            }
        }

        if outcome.is_ok() {
            let drained = buffer.drain();
            if !drained.is_empty() {
                outcome = world.apply_commands(drained);
            }
        }

        self.buffers.release(buffer);

        if outcome.is_ok() {
            for group in &executed {
                group.last_run.store(tick, Ordering::Release);
            }
            self.tick_index.fetch_add(1, Ordering::AcqRel);
        }
        outcome
    }

    /// Calls [`Scheduler::tick`] `steps` times, stopping at the first error.
    pub fn run(&self, deadline: &DeadlineToken, steps: usize, dt: Duration) -> EngineResult<()> {
        for _ in 0..steps {
            self.tick(deadline, dt)?;
        }
        Ok(())
    }

    /// Runs `body` under a scoped trace session when tracing is enabled.
    ///
    /// Every summary published while `body` runs is exported as a JSON span
    /// to `writer`. The session stops on all exit paths of `body`,
    /// including panics.
    pub fn run_with_trace<F>(
        &self,
        deadline: &DeadlineToken,
        writer: SharedWriter,
        body: F,
    ) -> EngineResult<()>
    where
        F: FnOnce() -> EngineResult<()>,
    {
        deadline.check()?;
        let enabled = self.read_inner().instrumentation.enable_trace;
        if !enabled {
            return body();
        }
        let exporter = Arc::new(TraceExporter::new(TraceExportOptions {
            writer: Some(writer),
            service_name: String::new(),
        }));
        self.write_inner().trace_session = Some(exporter);
        let _guard = TraceSessionGuard { scheduler: self };
        body()
    }
}

struct TraceSessionGuard<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for TraceSessionGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.write_inner().trace_session = None;
    }
}

/// Live configuration interface over a scheduler; setters mutate in place.
pub struct SchedulerBuilder<'a> {
    scheduler: &'a Scheduler,
}

impl SchedulerBuilder<'_> {
    /// Front-loads the sync execution order; registered groups not named
    /// here follow in registration order.
    pub fn with_sync_order(
        self,
        order: impl IntoIterator<Item = impl Into<WorkGroupId>>,
    ) -> Self {
        let mut inner = self.scheduler.write_inner();
        inner.sync_order = order.into_iter().map(Into::into).collect();
        rebuild_order(&mut inner);
        drop(inner);
        self
    }

    /// Sets the async worker count. `0` disables the pool; async groups
    /// then run inline on the driver.
    ///
    /// A pool that cannot be rebuilt is logged and left disabled rather
    /// than failing the builder chain.
    pub fn with_async_workers(self, count: usize) -> Self {
        let mut inner = self.scheduler.write_inner();
        inner.async_workers = Some(count);
        if let Some(pool) = inner.pool.take() {
            pool.close();
        }
        let has_async = inner
            .groups
            .values()
            .any(|group| group.mode == WorkGroupMode::Async);
        if count > 0 && has_async {
            match WorkerPool::new(count) {
                Ok(pool) => inner.pool = Some(Arc::new(pool)),
                Err(err) => {
                    self.scheduler
                        .logger
                        .with("err", &err)
                        .error("worker pool rebuild failed; async groups run inline");
                }
            }
        }
        drop(inner);
        self
    }

    /// Sets the error policy for `id`, applying to the group immediately if
    /// registered and to a future registration otherwise.
    pub fn with_error_policy(self, id: impl Into<WorkGroupId>, policy: ErrorPolicy) -> Self {
        let id = id.into();
        let mut inner = self.scheduler.write_inner();
        inner.error_policies.insert(id.clone(), policy);
        if let Some(state) = inner.groups.get(&id) {
            state.set_policy(policy);
        }
        drop(inner);
        self
    }

    /// Replaces the instrumentation configuration and rebuilds the observer
    /// chain.
    pub fn with_instrumentation(self, cfg: InstrumentationConfig) -> Self {
        let mut inner = self.scheduler.write_inner();
        inner.observer = build_observer_chain(&self.scheduler.logger, &cfg);
        inner.instrumentation = cfg;
        drop(inner);
        self
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |count| count.get())
}

/// Validates a group's systems per the mode rules and collects the union of
/// their declared access.
fn validate_systems_access(
    mode: WorkGroupMode,
    systems: &[Arc<dyn System>],
) -> Result<AccessUnion, RegistrationError> {
    let mut access = AccessUnion {
        reads: BTreeSet::new(),
        writes: BTreeSet::new(),
        resource_reads: BTreeSet::new(),
        resource_writes: BTreeSet::new(),
    };
    let mut component_write_owners: HashMap<ComponentType, String> = HashMap::new();
    let mut resource_write_owners: HashMap<String, String> = HashMap::new();

    for system in systems {
        let descriptor = system.descriptor();
        let name = if descriptor.name.is_empty() {
            "<unnamed>".to_string()
        } else {
            descriptor.name.clone()
        };

        if mode == WorkGroupMode::Async {
            if !descriptor.async_allowed {
                return Err(RegistrationError::AsyncSystemNotAllowed { system: name });
            }
            if !descriptor.writes.is_empty() {
                return Err(RegistrationError::AsyncWritesNotSupported {
                    system: name,
                    components: descriptor.writes.clone(),
                });
            }
            if let Some(write) = descriptor
                .resources
                .iter()
                .find(|access| access.mode == AccessMode::Write)
            {
                return Err(RegistrationError::AsyncResourceWritesNotSupported {
                    system: name,
                    resource: write.name.clone(),
                });
            }
        }

        for component in &descriptor.reads {
            access.reads.insert(component.clone());
        }

        let mut seen_writes: HashSet<&ComponentType> = HashSet::new();
        for component in &descriptor.writes {
            if !seen_writes.insert(component) {
                return Err(AccessConflict::ComponentWriteRepeated {
                    system: name,
                    component: component.clone(),
                }
                .into());
            }
            if let Some(owner) = component_write_owners.get(component) {
                return Err(AccessConflict::ComponentWriteShared {
                    first: owner.clone(),
                    second: name,
                    component: component.clone(),
                }
                .into());
            }
            component_write_owners.insert(component.clone(), name.clone());
            access.writes.insert(component.clone());
        }

        let mut seen_resource_writes: HashSet<&str> = HashSet::new();
        for resource in &descriptor.resources {
            if resource.name.is_empty() {
                continue;
            }
            match resource.mode {
                AccessMode::Write => {
                    if !seen_resource_writes.insert(&resource.name) {
                        return Err(AccessConflict::ResourceWriteRepeated {
                            system: name,
                            resource: resource.name.clone(),
                        }
                        .into());
                    }
                    if let Some(owner) = resource_write_owners.get(&resource.name) {
                        return Err(AccessConflict::ResourceWriteShared {
                            first: owner.clone(),
                            second: name,
                            resource: resource.name.clone(),
                        }
                        .into());
                    }
                    resource_write_owners.insert(resource.name.clone(), name.clone());
                    access.resource_writes.insert(resource.name.clone());
                }
                AccessMode::Read => {
                    access.resource_reads.insert(resource.name.clone());
                }
            }
        }
    }

    Ok(access)
}

/// Rejects the group when its declared access collides with an already
/// registered group. Readers may overlap freely; everything else is
/// exclusive.
fn check_cross_group_conflicts(
    inner: &SchedulerInner,
    id: &WorkGroupId,
    access: &AccessUnion,
) -> Result<(), RegistrationError> {
    for component in &access.writes {
        if let Some(owner) = inner.component_owners.get(component) {
            if owner != id {
                return Err(AccessConflict::ComponentWriteOwned {
                    owner: owner.clone(),
                    component: component.clone(),
                }
                .into());
            }
        }
    }
    for resource in &access.resource_writes {
        if let Some(owner) = inner.resource_owners.get(resource) {
            if owner != id {
                return Err(AccessConflict::ResourceWriteOwned {
                    owner: owner.clone(),
                    resource: resource.clone(),
                }
                .into());
            }
        }
        if let Some(readers) = inner.resource_readers.get(resource) {
            if let Some(reader) = readers.iter().find(|reader| *reader != id) {
                return Err(AccessConflict::ResourceWriteReadElsewhere {
                    reader: reader.clone(),
                    resource: resource.clone(),
                }
                .into());
            }
        }
    }
    for resource in &access.resource_reads {
        if let Some(owner) = inner.resource_owners.get(resource) {
            if owner != id {
                return Err(AccessConflict::ResourceReadWrittenElsewhere {
                    owner: owner.clone(),
                    resource: resource.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Rebuilds the executable group order: sync-order entries first, then the
/// remaining groups in registration order.
fn rebuild_order(inner: &mut SchedulerInner) {
    let mut ordered = Vec::with_capacity(inner.groups.len());
    let mut seen: HashSet<WorkGroupId> = HashSet::new();

    for id in &inner.sync_order {
        if let Some(state) = inner.groups.get(id) {
            if seen.insert(id.clone()) {
                ordered.push(Arc::clone(state));
            }
        }
    }
    for id in &inner.registration_order {
        if seen.contains(id) {
            continue;
        }
        if let Some(state) = inner.groups.get(id) {
            seen.insert(id.clone());
            ordered.push(Arc::clone(state));
        }
    }

    inner.ordered = ordered;
}

fn publish_summary(
    observer: &Arc<dyn SchedulerObserver>,
    trace: &Option<Arc<TraceExporter>>,
    summary: &WorkGroupSummary,
) {
    observer.work_group_completed(summary);
    if let Some(session) = trace {
        session.export(summary);
    }
}

/// Runs one work group against `buffer`.
///
/// Returns the summary to publish and the group's terminal result. A failed
/// group leaves `buffer` exactly as it found it.
#[allow(clippy::too_many_arguments)]
fn run_work_group(
    group: &WorkGroupState,
    world: &World,
    dt: Duration,
    tick: Tick,
    buffer: &mut CommandBuffer,
    logger: &ScopedLogger,
    deadline: &DeadlineToken,
    async_run: bool,
) -> (WorkGroupSummary, EngineResult<()>) {
    let group_logger = logger.with("work_group", &group.id);
    let mut summary = WorkGroupSummary {
        work_group_id: group.id.clone(),
        mode: group.mode,
        async_run,
        tick,
        duration: Duration::ZERO,
        systems_total: 0,
        systems_executed: 0,
        systems_skipped: 0,
        component_reads: group.read_set.iter().cloned().collect(),
        component_writes: group.write_set.iter().cloned().collect(),
        resource_reads: group.resource_reads.iter().cloned().collect(),
        resource_writes: group.resource_writes.iter().cloned().collect(),
        error: None,
    };

    let group_mark = buffer.snapshot();
    let start = Instant::now();

    for system in &group.systems {
        if deadline.is_cancelled() {
            buffer.restore(group_mark);
            summary.duration = start.elapsed();
            summary.error = Some(EngineError::Cancelled.to_string());
            return (summary, Err(EngineError::Cancelled));
        }

        let descriptor = system.descriptor();
        summary.systems_total += 1;
        if !descriptor.run_every.should_run(tick) {
            summary.systems_skipped += 1;
            continue;
        }

        let system_logger = group_logger.with("system", &descriptor.name);
        let mark = buffer.snapshot();
        let mut result = {
            let mut ctx = ExecutionContext::new(world, dt, tick, system_logger.clone(), buffer);
            system.run(deadline, &mut ctx)
        };

        if result.is_err() && group.policy() == ErrorPolicy::Retry {
            if let Err(err) = &result {
                system_logger.with("err", err).error("system failed, retrying");
            }
            buffer.restore(mark);
            result = {
                let mut ctx = ExecutionContext::new(world, dt, tick, system_logger.clone(), buffer);
                system.run(deadline, &mut ctx)
            };
            if result.is_ok() {
                system_logger.info("system retry succeeded");
            }
        }

        match result {
            Ok(SystemStatus::Skipped) => summary.systems_skipped += 1,
            Ok(SystemStatus::Executed) => {
                summary.systems_executed += 1;
                system_logger.info("system executed");
            }
            Err(err) => {
                buffer.restore(group_mark);
                let err = EngineError::system(&descriptor.name, err);
                summary.error = Some(err.to_string());
                summary.duration = start.elapsed();
                return (summary, Err(err));
            }
        }
    }

    summary.duration = start.elapsed();
    (summary, Ok(()))
}

/// Dispatches an async group: to the worker pool when one is configured,
/// inline on the driver otherwise.
#[allow(clippy::too_many_arguments)]
fn dispatch_async(
    group: Arc<WorkGroupState>,
    world: Arc<World>,
    dt: Duration,
    tick: Tick,
    logger: ScopedLogger,
    deadline: &DeadlineToken,
    pool: Option<&Arc<WorkerPool>>,
    buffers: Arc<CommandBufferPool>,
) -> JobHandle {
    let Some(pool) = pool else {
        let mut job_buffer = buffers.acquire();
        let (summary, result) =
            run_work_group(&group, &world, dt, tick, &mut job_buffer, &logger, deadline, true);
        let commands = if result.is_ok() { job_buffer.drain() } else { Vec::new() };
        buffers.release(job_buffer);
        return JobHandle::ready(JobOutcome {
            summary: Some(summary),
            commands,
            error: result.err(),
        });
    };

    let job_deadline = deadline.clone();
    pool.submit(deadline, move || {
        let mut job_buffer = buffers.acquire();
        let (summary, result) = run_work_group(
            &group,
            &world,
            dt,
            tick,
            &mut job_buffer,
            &logger,
            &job_deadline,
            true,
        );
        let commands = if result.is_ok() { job_buffer.drain() } else { Vec::new() };
        buffers.release(job_buffer);
        JobOutcome { summary: Some(summary), commands, error: result.err() }
    })
}

// Tick pipeline behavior: ordering, deferred commands, interval gating,
// error policies, async dispatch, and cancellation.
//
// Run with:
//   cargo test --test tick_pipeline -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use simtick::prelude::*;
use simtick::{
    CommandError, EngineError, SchedulerObserver, SystemError, WorkGroupSummary,
};

const DT: Duration = Duration::from_millis(16);

/// One-time structured-logging setup so engine events are visible under
/// `--nocapture`.
static INIT: Once = Once::new();

fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive("simtick=info".parse().expect("valid directive")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn new_scheduler() -> Scheduler {
    init_logging();
    Scheduler::new(Arc::new(World::new()))
}

/// System that appends its name to a shared list when it runs.
fn recorder(name: &str, log: Arc<Mutex<Vec<String>>>) -> impl System {
    let tag = name.to_string();
    FnSystem::new(SystemDescriptor::new(name), move |_deadline, _ctx| {
        log.lock().unwrap().push(tag.clone());
        Ok(SystemStatus::Executed)
    })
}

#[test]
fn sync_groups_run_in_registration_order() {
    let scheduler = new_scheduler();
    let log = Arc::new(Mutex::new(Vec::new()));

    scheduler
        .register_work_group(WorkGroupConfig::new("A").system(recorder("a", log.clone())))
        .unwrap();
    scheduler
        .register_work_group(WorkGroupConfig::new("B").system(recorder("b", log.clone())))
        .unwrap();

    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn sync_order_front_loads_execution() {
    let scheduler = new_scheduler();
    let log = Arc::new(Mutex::new(Vec::new()));

    scheduler
        .register_work_group(WorkGroupConfig::new("late").system(recorder("late", log.clone())))
        .unwrap();
    scheduler
        .register_work_group(WorkGroupConfig::new("early").system(recorder("early", log.clone())))
        .unwrap();

    scheduler.builder().with_sync_order(["early"]);
    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["early".to_string(), "late".to_string()]
    );
}

#[test]
fn deferred_create_is_visible_after_tick() {
    let scheduler = new_scheduler();
    let slot = EntityIdSlot::new();
    let spawn_slot = slot.clone();

    scheduler
        .register_work_group(WorkGroupConfig::new("spawn").system(FnSystem::new(
            SystemDescriptor::new("spawner"),
            move |_deadline, ctx| {
                ctx.defer(Command::create_entity_into(spawn_slot.clone()));
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();

    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    let id = slot.get().expect("slot should hold the allocated id");
    assert!(scheduler.world().registry().is_alive(id));
    assert_eq!(scheduler.world().registry().count(), 1);
}

#[test]
fn run_every_gates_systems() {
    let scheduler = new_scheduler();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    scheduler
        .register_work_group(WorkGroupConfig::new("gated").system(FnSystem::new(
            SystemDescriptor::new("even-ticks").run_every(TickInterval::new(2, 0)),
            move |_deadline, _ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();

    scheduler.run(&DeadlineToken::new(), 4, DT).unwrap();

    // Admitted on ticks 0 and 2.
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn interval_offset_is_normalized() {
    let scheduler = new_scheduler();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    // offset 3 with every 2 normalizes to offset 1: ticks 1 and 3.
    scheduler
        .register_work_group(
            WorkGroupConfig::new("odd")
                .interval(TickInterval::new(2, 3))
                .system(FnSystem::new(
                    SystemDescriptor::new("odd-ticks"),
                    move |_deadline, _ctx| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(SystemStatus::Executed)
                    },
                )),
        )
        .unwrap();

    scheduler.run(&DeadlineToken::new(), 4, DT).unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn retry_rewinds_the_buffer_and_reruns_once() {
    let scheduler = new_scheduler();
    let attempts = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let attempt_counter = attempts.clone();
    scheduler
        .register_work_group(
            WorkGroupConfig::new("flaky")
                .error_policy(ErrorPolicy::Retry)
                .system(FnSystem::new(
                    SystemDescriptor::new("fails-once"),
                    move |_deadline, ctx| {
                        ctx.defer(Command::create_entity());
                        if attempt_counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            return Err("transient failure".into());
                        }
                        Ok(SystemStatus::Executed)
                    },
                )),
        )
        .unwrap();

    let summaries = observed.clone();
    scheduler.builder().with_instrumentation(simtick::InstrumentationConfig {
        observer: Some(Arc::new(RecordingObserver { summaries })),
        ..Default::default()
    });

    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    // Only the successful attempt's command survived the rewind.
    assert_eq!(scheduler.world().registry().count(), 1);

    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 1);
    let summary = &observed[0];
    assert_eq!(summary.systems_total, 1);
    assert_eq!(summary.systems_executed, 1);
    assert_eq!(summary.systems_skipped, 0);
    assert!(summary.error.is_none());
}

#[test]
fn retry_falls_back_to_abort_on_second_failure() {
    let scheduler = new_scheduler();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempt_counter = attempts.clone();

    scheduler
        .register_work_group(
            WorkGroupConfig::new("doomed")
                .error_policy(ErrorPolicy::Retry)
                .system(FnSystem::new(
                    SystemDescriptor::new("always-fails"),
                    move |_deadline, ctx| {
                        ctx.defer(Command::create_entity());
                        attempt_counter.fetch_add(1, Ordering::SeqCst);
                        Err::<SystemStatus, SystemError>("persistent failure".into())
                    },
                )),
        )
        .unwrap();

    let err = scheduler.tick(&DeadlineToken::new(), DT).unwrap_err();
    assert!(matches!(err, EngineError::System { .. }));
    assert!(err.to_string().contains("always-fails"));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.world().registry().count(), 0);
}

#[test]
fn abort_discards_the_tick_buffer() {
    let scheduler = new_scheduler();

    scheduler
        .register_work_group(WorkGroupConfig::new("producer").system(FnSystem::new(
            SystemDescriptor::new("producer"),
            move |_deadline, ctx| {
                ctx.defer(Command::create_entity());
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();
    scheduler
        .register_work_group(WorkGroupConfig::new("breaker").system(FnSystem::new(
            SystemDescriptor::new("breaker"),
            move |_deadline, _ctx| Err::<SystemStatus, SystemError>("boom".into()),
        )))
        .unwrap();

    let err = scheduler.tick(&DeadlineToken::new(), DT).unwrap_err();
    assert!(matches!(err, EngineError::System { .. }));

    // Nothing applied, nothing marked executed, tick not advanced.
    assert_eq!(scheduler.world().registry().count(), 0);
    assert_eq!(scheduler.last_run(&WorkGroupId::new("producer")), None);
    assert_eq!(scheduler.tick_index(), 0);
}

#[test]
fn continue_policy_drops_the_failed_groups_commands() {
    let scheduler = new_scheduler();

    scheduler
        .register_work_group(
            WorkGroupConfig::new("lossy")
                .error_policy(ErrorPolicy::Continue)
                .system(FnSystem::new(
                    SystemDescriptor::new("pushes-then-fails"),
                    move |_deadline, ctx| {
                        ctx.defer(Command::create_entity());
                        Err::<SystemStatus, SystemError>("late failure".into())
                    },
                )),
        )
        .unwrap();
    scheduler
        .register_work_group(WorkGroupConfig::new("healthy").system(FnSystem::new(
            SystemDescriptor::new("creates"),
            move |_deadline, ctx| {
                ctx.defer(Command::create_entity());
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();

    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    // Only the healthy group's entity exists.
    assert_eq!(scheduler.world().registry().count(), 1);
    assert_eq!(scheduler.last_run(&WorkGroupId::new("healthy")), Some(0));
    assert_eq!(scheduler.last_run(&WorkGroupId::new("lossy")), None);
    assert_eq!(scheduler.tick_index(), 1);
}

#[test]
fn executed_groups_record_last_run() {
    let scheduler = new_scheduler();
    let log = Arc::new(Mutex::new(Vec::new()));

    scheduler
        .register_work_group(WorkGroupConfig::new("steady").system(recorder("s", log)))
        .unwrap();

    scheduler.run(&DeadlineToken::new(), 3, DT).unwrap();

    assert_eq!(scheduler.last_run(&WorkGroupId::new("steady")), Some(2));
    assert_eq!(scheduler.tick_index(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Async groups
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn async_group_commands_apply_after_join() {
    let scheduler = new_scheduler();

    scheduler
        .register_work_group(
            WorkGroupConfig::new("bg")
                .mode(WorkGroupMode::Async)
                .system(FnSystem::new(
                    SystemDescriptor::new("bg-spawn").async_allowed(true),
                    move |_deadline, ctx| {
                        ctx.defer(Command::create_entity());
                        Ok(SystemStatus::Executed)
                    },
                )),
        )
        .unwrap();

    assert!(scheduler.async_worker_count() > 0);
    scheduler.tick(&DeadlineToken::new(), DT).unwrap();
    assert_eq!(scheduler.world().registry().count(), 1);
    assert_eq!(scheduler.last_run(&WorkGroupId::new("bg")), Some(0));
}

#[test]
fn async_buffers_apply_before_the_sync_buffer() {
    init_logging();
    let world = Arc::new(World::new());
    world.register_component("flag", &DenseStrategy::new()).unwrap();
    let target = world.registry().create();

    let scheduler = Scheduler::new(world);
    let async_target = target;
    let sync_target = target;

    scheduler
        .register_work_group(WorkGroupConfig::new("sync").system(FnSystem::new(
            SystemDescriptor::new("sync-writer"),
            move |_deadline, ctx| {
                ctx.defer(Command::add_component(sync_target, "flag", "sync".to_string()));
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();
    scheduler
        .register_work_group(
            WorkGroupConfig::new("bg")
                .mode(WorkGroupMode::Async)
                .system(FnSystem::new(
                    SystemDescriptor::new("bg-writer").async_allowed(true),
                    move |_deadline, ctx| {
                        ctx.defer(Command::add_component(async_target, "flag", "async".to_string()));
                        Ok(SystemStatus::Executed)
                    },
                )),
        )
        .unwrap();

    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    let store = scheduler
        .world()
        .view_component(&ComponentType::new("flag"))
        .unwrap();
    let value = store.get(target).unwrap();
    // The sync buffer applies strictly after all async buffers.
    assert_eq!(value.downcast_ref::<String>().unwrap(), "sync");
}

#[test]
fn async_groups_run_inline_without_workers() {
    let scheduler = new_scheduler();
    scheduler.builder().with_async_workers(0);

    scheduler
        .register_work_group(
            WorkGroupConfig::new("inline")
                .mode(WorkGroupMode::Async)
                .system(FnSystem::new(
                    SystemDescriptor::new("inline-spawn").async_allowed(true),
                    move |_deadline, ctx| {
                        ctx.defer(Command::create_entity());
                        Ok(SystemStatus::Executed)
                    },
                )),
        )
        .unwrap();

    assert_eq!(scheduler.async_worker_count(), 0);
    scheduler.tick(&DeadlineToken::new(), DT).unwrap();
    assert_eq!(scheduler.world().registry().count(), 1);
}

#[test]
fn failed_async_group_contributes_no_commands() {
    let scheduler = new_scheduler();

    scheduler
        .register_work_group(
            WorkGroupConfig::new("bad-bg")
                .mode(WorkGroupMode::Async)
                .error_policy(ErrorPolicy::Continue)
                .system(FnSystem::new(
                    SystemDescriptor::new("bg-fails").async_allowed(true),
                    move |_deadline, ctx| {
                        ctx.defer(Command::create_entity());
                        Err::<SystemStatus, SystemError>("async failure".into())
                    },
                )),
        )
        .unwrap();
    scheduler
        .register_work_group(WorkGroupConfig::new("good").system(FnSystem::new(
            SystemDescriptor::new("creates"),
            move |_deadline, ctx| {
                ctx.defer(Command::create_entity());
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();

    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    assert_eq!(scheduler.world().registry().count(), 1);
    assert_eq!(scheduler.last_run(&WorkGroupId::new("bad-bg")), None);
}

#[test]
fn commands_apply_in_system_run_order() {
    init_logging();
    let world = Arc::new(World::new());
    world.register_component("marker", &DenseStrategy::new()).unwrap();
    let target = world.registry().create();

    let scheduler = Scheduler::new(world);
    scheduler
        .register_work_group(
            WorkGroupConfig::new("pipeline")
                .system(FnSystem::new(
                    SystemDescriptor::new("first"),
                    move |_deadline, ctx| {
                        ctx.defer(Command::add_component(target, "marker", 1_i64));
                        Ok(SystemStatus::Executed)
                    },
                ))
                .system(FnSystem::new(
                    SystemDescriptor::new("second"),
                    move |_deadline, ctx| {
                        ctx.defer(Command::add_component(target, "marker", 2_i64));
                        Ok(SystemStatus::Executed)
                    },
                )),
        )
        .unwrap();

    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    let store = scheduler
        .world()
        .view_component(&ComponentType::new("marker"))
        .unwrap();
    // FIFO application: the later system's write lands last.
    assert_eq!(*store.get(target).unwrap().downcast_ref::<i64>().unwrap(), 2);
}

struct RecordingObserver {
    summaries: Arc<Mutex<Vec<WorkGroupSummary>>>,
}

impl SchedulerObserver for RecordingObserver {
    fn work_group_completed(&self, summary: &WorkGroupSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}

#[test]
fn summaries_publish_sync_first_then_async_in_dispatch_order() {
    let scheduler = new_scheduler();
    let observed = Arc::new(Mutex::new(Vec::new()));

    scheduler.builder().with_instrumentation(simtick::InstrumentationConfig {
        observer: Some(Arc::new(RecordingObserver { summaries: observed.clone() })),
        ..Default::default()
    });

    fn noop(
        _deadline: &DeadlineToken,
        _ctx: &mut simtick::ExecutionContext<'_>,
    ) -> Result<SystemStatus, SystemError> {
        Ok(SystemStatus::Executed)
    }
    scheduler
        .register_work_group(
            WorkGroupConfig::new("bg-1")
                .mode(WorkGroupMode::Async)
                .system(FnSystem::new(
                    SystemDescriptor::new("one").async_allowed(true),
                    noop,
                )),
        )
        .unwrap();
    scheduler
        .register_work_group(WorkGroupConfig::new("fg").system(FnSystem::new(
            SystemDescriptor::new("fg"),
            noop,
        )))
        .unwrap();
    scheduler
        .register_work_group(
            WorkGroupConfig::new("bg-2")
                .mode(WorkGroupMode::Async)
                .system(FnSystem::new(
                    SystemDescriptor::new("two").async_allowed(true),
                    noop,
                )),
        )
        .unwrap();

    scheduler.tick(&DeadlineToken::new(), DT).unwrap();

    let order: Vec<(String, bool)> = observed
        .lock()
        .unwrap()
        .iter()
        .map(|summary| (summary.work_group_id.as_str().to_string(), summary.async_run))
        .collect();
    assert_eq!(
        order,
        vec![
            ("fg".to_string(), false),
            ("bg-1".to_string(), true),
            ("bg-2".to_string(), true),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn cancelled_deadline_rejects_the_tick() {
    let scheduler = new_scheduler();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    scheduler
        .register_work_group(WorkGroupConfig::new("work").system(FnSystem::new(
            SystemDescriptor::new("work"),
            move |_deadline, _ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();

    let deadline = DeadlineToken::new();
    deadline.cancel();

    let err = scheduler.tick(&deadline, DT).unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.tick_index(), 0);
}

#[test]
fn mid_tick_cancellation_stops_at_the_next_boundary() {
    let scheduler = new_scheduler();
    let later_runs = Arc::new(AtomicUsize::new(0));

    scheduler
        .register_work_group(
            WorkGroupConfig::new("canceller").system(FnSystem::new(
                SystemDescriptor::new("cancels"),
                move |deadline, _ctx| {
                    deadline.cancel();
                    Ok(SystemStatus::Executed)
                },
            )),
        )
        .unwrap();
    let counter = later_runs.clone();
    scheduler
        .register_work_group(WorkGroupConfig::new("after").system(FnSystem::new(
            SystemDescriptor::new("never-runs"),
            move |_deadline, _ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();

    let err = scheduler.tick(&DeadlineToken::new(), DT).unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(later_runs.load(Ordering::SeqCst), 0);
}

#[test]
fn command_failure_during_drain_fails_the_tick() {
    let scheduler = new_scheduler();

    scheduler
        .register_work_group(WorkGroupConfig::new("bad-cmd").system(FnSystem::new(
            SystemDescriptor::new("unregistered-write"),
            move |_deadline, ctx| {
                let slot = EntityIdSlot::new();
                ctx.defer(Command::create_entity_into(slot.clone()));
                ctx.defer(Command::add_component(
                    EntityId::from_parts(7, 1),
                    "nope",
                    1_u32,
                ));
                Ok(SystemStatus::Executed)
            },
        )))
        .unwrap();

    let err = scheduler.tick(&DeadlineToken::new(), DT).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Command(CommandError::ComponentNotRegistered(_))
    ));
    // The create ahead of the failing command still applied.
    assert_eq!(scheduler.world().registry().count(), 1);
}

//! Observation surface: summary observers, counters, and trace export.
//!
//! After every work group completes (sync groups immediately, async groups
//! at join), the scheduler publishes a
//! [`WorkGroupSummary`](crate::engine::scheduler::WorkGroupSummary) through a
//! chain of observers. The chain is assembled from
//! [`InstrumentationConfig`] in a fixed order:
//!
//! 1. the host-supplied observer,
//! 2. the structured-log observer,
//! 3. the counter collector,
//! 4. the trace exporter.
//!
//! Counters follow the Prometheus text exposition format; trace export
//! writes one JSON span object per summary, newline-delimited, suitable for
//! ingestion by span-based tracing backends.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::engine::scheduler::WorkGroupSummary;

/// Byte sink shared between the engine and the host.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Wraps a writer for use as a counter or trace sink.
pub fn shared_writer(writer: impl Write + Send + 'static) -> SharedWriter {
    Arc::new(Mutex::new(writer))
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoped logging
// ─────────────────────────────────────────────────────────────────────────────

/// Structured logger carrying a chain of `key=value` scope fields.
///
/// The scheduler scopes it with `work_group` and `system` before handing it
/// to a system run; events are emitted through `tracing` under the
/// `simtick` target.
#[derive(Clone, Debug, Default)]
pub struct ScopedLogger {
    fields: Vec<(String, String)>,
}

impl ScopedLogger {
    /// Creates a logger with no scope fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a logger extended with one more scope field.
    pub fn with(&self, key: impl Into<String>, value: impl fmt::Display) -> ScopedLogger {
        let mut fields = self.fields.clone();
        fields.push((key.into(), value.to_string()));
        ScopedLogger { fields }
    }

    fn scope(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    /// Emits an info-level event.
    pub fn info(&self, message: &str) {
        tracing::info!(target: "simtick", scope = %self.scope(), "{message}");
    }

    /// Emits an error-level event.
    pub fn error(&self, message: &str) {
        tracing::error!(target: "simtick", scope = %self.scope(), "{message}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observer chain
// ─────────────────────────────────────────────────────────────────────────────

/// Receives work-group summaries as the scheduler publishes them.
pub trait SchedulerObserver: Send + Sync {
    /// Called once per completed work group per tick.
    fn work_group_completed(&self, summary: &WorkGroupSummary);
}

pub(crate) struct NoopObserver;

impl SchedulerObserver for NoopObserver {
    fn work_group_completed(&self, _summary: &WorkGroupSummary) {}
}

struct CompositeObserver {
    observers: Vec<Arc<dyn SchedulerObserver>>,
}

impl SchedulerObserver for CompositeObserver {
    fn work_group_completed(&self, summary: &WorkGroupSummary) {
        for observer in &self.observers {
            observer.work_group_completed(summary);
        }
    }
}

/// Encoding used by the structured-log observer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SummaryLogFormat {
    /// One JSON object per summary.
    #[default]
    Json,
    /// `key=value` scope fields with a fixed message.
    KeyValue,
}

struct LogObserver {
    logger: ScopedLogger,
    format: SummaryLogFormat,
}

impl LogObserver {
    fn log_json(&self, summary: &WorkGroupSummary) {
        let mut payload = serde_json::json!({
            "work_group_id": summary.work_group_id.as_str(),
            "mode": summary.mode.label(),
            "async": summary.async_run,
            "tick": summary.tick,
            "duration_ms": summary.duration.as_secs_f64() * 1_000.0,
            "systems_total": summary.systems_total,
            "systems_executed": summary.systems_executed,
            "systems_skipped": summary.systems_skipped,
            "component_reads": component_names(&summary.component_reads),
            "component_writes": component_names(&summary.component_writes),
            "resource_reads": summary.resource_reads,
            "resource_writes": summary.resource_writes,
        });
        if let Some(error) = &summary.error {
            payload["error"] = serde_json::Value::String(error.clone());
        }
        self.logger.info(&payload.to_string());
    }

    fn log_key_value(&self, summary: &WorkGroupSummary) {
        let mut logger = self
            .logger
            .with("work_group", &summary.work_group_id)
            .with("mode", summary.mode.label())
            .with("async", summary.async_run)
            .with("tick", summary.tick)
            .with("duration_ms", summary.duration.as_secs_f64() * 1_000.0)
            .with("systems_total", summary.systems_total)
            .with("systems_executed", summary.systems_executed)
            .with("systems_skipped", summary.systems_skipped)
            .with("component_reads", component_names(&summary.component_reads).join(","))
            .with("component_writes", component_names(&summary.component_writes).join(","))
            .with("resource_reads", summary.resource_reads.join(","))
            .with("resource_writes", summary.resource_writes.join(","));
        if let Some(error) = &summary.error {
            logger = logger.with("error", error);
        }
        logger.info("work group summary");
    }
}

impl SchedulerObserver for LogObserver {
    fn work_group_completed(&self, summary: &WorkGroupSummary) {
        match self.format {
            SummaryLogFormat::Json => self.log_json(summary),
            SummaryLogFormat::KeyValue => self.log_key_value(summary),
        }
    }
}

fn component_names(components: &[crate::engine::types::ComponentType]) -> Vec<String> {
    components.iter().map(|c| c.as_str().to_string()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Counters
// ─────────────────────────────────────────────────────────────────────────────

/// Options for [`WorkGroupCounters`].
#[derive(Clone, Default)]
pub struct CounterOptions {
    /// When set, the full exposition is written after every observation.
    pub writer: Option<SharedWriter>,
    /// Upper bounds for the duration histogram buckets; empty disables
    /// bucket lines.
    pub duration_buckets: Vec<Duration>,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CounterKey {
    work_group_id: String,
    mode: &'static str,
    async_run: bool,
}

#[derive(Default)]
struct CounterSample {
    duration_sum: f64,
    duration_count: u64,
    buckets: Vec<u64>,
    executed: u64,
    skipped: u64,
    errors: u64,
}

/// Prometheus-style counter collector keyed by work group, mode, and async
/// flag.
pub struct WorkGroupCounters {
    options: CounterOptions,
    samples: Mutex<BTreeMap<CounterKey, CounterSample>>,
}

impl WorkGroupCounters {
    /// Creates a collector.
    pub fn new(options: CounterOptions) -> Self {
        Self { options, samples: Mutex::new(BTreeMap::new()) }
    }

    /// Writes the full text exposition to `writer`.
    pub fn write_metrics(&self, writer: &mut dyn Write) -> io::Result<()> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_metrics_locked(&samples, writer)
    }

    fn write_metrics_locked(
        &self,
        samples: &BTreeMap<CounterKey, CounterSample>,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let mut out = String::new();
        out.push_str(
            "# HELP simtick_work_group_duration_seconds Work group execution duration.\n",
        );
        out.push_str("# TYPE simtick_work_group_duration_seconds summary\n");
        for (key, sample) in samples {
            let labels = Self::labels(key);
            out.push_str(&format!(
                "simtick_work_group_duration_seconds_sum{{{labels}}} {}\n",
                sample.duration_sum
            ));
            out.push_str(&format!(
                "simtick_work_group_duration_seconds_count{{{labels}}} {}\n",
                sample.duration_count
            ));
            for (index, count) in sample.buckets.iter().enumerate() {
                let le = self.options.duration_buckets[index].as_secs_f64();
                out.push_str(&format!(
                    "simtick_work_group_duration_seconds_bucket{{{labels},le=\"{le:.6}\"}} {count}\n"
                ));
            }
        }

        Self::write_counter(
            &mut out,
            samples,
            "simtick_work_group_systems_executed_total",
            "Systems executed per work group.",
            |sample| sample.executed,
        );
        Self::write_counter(
            &mut out,
            samples,
            "simtick_work_group_systems_skipped_total",
            "Systems skipped per work group.",
            |sample| sample.skipped,
        );
        Self::write_counter(
            &mut out,
            samples,
            "simtick_work_group_errors_total",
            "Work group error count.",
            |sample| sample.errors,
        );

        writer.write_all(out.as_bytes())
    }

    fn write_counter(
        out: &mut String,
        samples: &BTreeMap<CounterKey, CounterSample>,
        metric: &str,
        help: &str,
        pick: impl Fn(&CounterSample) -> u64,
    ) {
        out.push_str(&format!("# HELP {metric} {help}\n"));
        out.push_str(&format!("# TYPE {metric} counter\n"));
        for (key, sample) in samples {
            let labels = Self::labels(key);
            out.push_str(&format!("{metric}{{{labels}}} {}\n", pick(sample)));
        }
    }

    fn labels(key: &CounterKey) -> String {
        format!(
            "work_group_id=\"{}\",mode=\"{}\",async=\"{}\"",
            key.work_group_id, key.mode, key.async_run
        )
    }
}

impl SchedulerObserver for WorkGroupCounters {
    fn work_group_completed(&self, summary: &WorkGroupSummary) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let key = CounterKey {
            work_group_id: summary.work_group_id.as_str().to_string(),
            mode: summary.mode.label(),
            async_run: summary.async_run,
        };
        let bucket_count = self.options.duration_buckets.len();
        let sample = samples
            .entry(key)
            .or_insert_with(|| CounterSample { buckets: vec![0; bucket_count], ..Default::default() });

        let seconds = summary.duration.as_secs_f64();
        sample.duration_sum += seconds;
        sample.duration_count += 1;
        for (index, bound) in self.options.duration_buckets.iter().enumerate() {
            if seconds <= bound.as_secs_f64() {
                sample.buckets[index] += 1;
            }
        }
        sample.executed += summary.systems_executed as u64;
        sample.skipped += summary.systems_skipped as u64;
        if summary.error.is_some() {
            sample.errors += 1;
        }

        if let Some(writer) = &self.options.writer {
            let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = self.write_metrics_locked(&samples, &mut *writer);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trace export
// ─────────────────────────────────────────────────────────────────────────────

/// Options for [`TraceExporter`].
#[derive(Clone, Default)]
pub struct TraceExportOptions {
    /// Sink for newline-delimited span JSON; export is a no-op without one.
    pub writer: Option<SharedWriter>,
    /// Service name stamped on every span; defaults to `simtick-scheduler`.
    pub service_name: String,
}

#[derive(Serialize)]
struct SpanRecord<'a> {
    service_name: &'a str,
    name: String,
    timestamp_us: u128,
    duration_ms: f64,
    attributes: SpanAttributes<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct SpanAttributes<'a> {
    work_group_id: &'a str,
    mode: &'static str,
    #[serde(rename = "async")]
    async_run: bool,
    tick: u64,
    systems_total: usize,
    systems_executed: usize,
    systems_skipped: usize,
    component_reads: Vec<&'a str>,
    component_writes: Vec<&'a str>,
    resource_reads: &'a [String],
    resource_writes: &'a [String],
}

/// Exports one JSON span per work-group summary.
pub struct TraceExporter {
    options: TraceExportOptions,
}

impl TraceExporter {
    /// Creates an exporter; an empty service name falls back to
    /// `simtick-scheduler`.
    pub fn new(mut options: TraceExportOptions) -> Self {
        if options.service_name.is_empty() {
            options.service_name = "simtick-scheduler".to_string();
        }
        Self { options }
    }

    pub(crate) fn export(&self, summary: &WorkGroupSummary) {
        let Some(writer) = &self.options.writer else {
            return;
        };
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_micros();
        let span = SpanRecord {
            service_name: &self.options.service_name,
            name: format!("workgroup:{}", summary.work_group_id),
            timestamp_us,
            duration_ms: summary.duration.as_secs_f64() * 1_000.0,
            attributes: SpanAttributes {
                work_group_id: summary.work_group_id.as_str(),
                mode: summary.mode.label(),
                async_run: summary.async_run,
                tick: summary.tick,
                systems_total: summary.systems_total,
                systems_executed: summary.systems_executed,
                systems_skipped: summary.systems_skipped,
                component_reads: summary.component_reads.iter().map(|c| c.as_str()).collect(),
                component_writes: summary.component_writes.iter().map(|c| c.as_str()).collect(),
                resource_reads: &summary.resource_reads,
                resource_writes: &summary.resource_writes,
            },
            error: summary.error.as_deref(),
        };
        let Ok(mut payload) = serde_json::to_vec(&span) else {
            return;
        };
        payload.push(b'\n');
        let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writer.write_all(&payload);
    }
}

impl SchedulerObserver for TraceExporter {
    fn work_group_completed(&self, summary: &WorkGroupSummary) {
        self.export(summary);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instrumentation configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Built-in observer toggles.
#[derive(Clone, Default)]
pub struct ObservationSettings {
    /// Emit a structured log line per summary.
    pub structured_logging: bool,
    /// Encoding for the structured-log observer.
    pub logging_format: SummaryLogFormat,
    /// Collect Prometheus-style counters.
    pub counters: bool,
    /// Collector to use; one is built from `counter_options` when absent.
    pub counter_collector: Option<Arc<WorkGroupCounters>>,
    /// Options for the default-built collector.
    pub counter_options: CounterOptions,
    /// Export a JSON span per summary.
    pub trace_export: bool,
    /// Exporter to use; one is built from `trace_options` when absent.
    pub trace_exporter: Option<Arc<TraceExporter>>,
    /// Options for the default-built exporter.
    pub trace_options: TraceExportOptions,
}

/// Scheduler instrumentation: observers plus the scoped-trace toggle.
#[derive(Clone, Default)]
pub struct InstrumentationConfig {
    /// Allow [`run_with_trace`](crate::engine::scheduler::Scheduler::run_with_trace)
    /// to open trace sessions.
    pub enable_trace: bool,
    /// Host-supplied observer, invoked before the built-in chain.
    pub observer: Option<Arc<dyn SchedulerObserver>>,
    /// Built-in observer settings.
    pub observation: ObservationSettings,
}

pub(crate) fn build_observer_chain(
    logger: &ScopedLogger,
    cfg: &InstrumentationConfig,
) -> Arc<dyn SchedulerObserver> {
    let mut observers: Vec<Arc<dyn SchedulerObserver>> = Vec::new();

    if let Some(observer) = &cfg.observer {
        observers.push(observer.clone());
    }

    let settings = &cfg.observation;
    if settings.structured_logging {
        observers.push(Arc::new(LogObserver {
            logger: logger.clone(),
            format: settings.logging_format,
        }));
    }
    if settings.counters {
        let collector = settings
            .counter_collector
            .clone()
            .unwrap_or_else(|| Arc::new(WorkGroupCounters::new(settings.counter_options.clone())));
        observers.push(collector);
    }
    if settings.trace_export {
        let exporter = settings
            .trace_exporter
            .clone()
            .unwrap_or_else(|| Arc::new(TraceExporter::new(settings.trace_options.clone())));
        observers.push(exporter);
    }

    match observers.len() {
        0 => Arc::new(NoopObserver),
        1 => observers.remove(0),
        _ => Arc::new(CompositeObserver { observers }),
    }
}

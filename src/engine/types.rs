//! Core identifiers, scheduling primitives, and access declarations.
//!
//! This module defines the **fundamental types** shared across the engine:
//! component and work-group keys, the tick counter, interval gating, access
//! modes, error policies, and the cooperative deadline token.
//!
//! ## Design Philosophy
//!
//! The engine is organized around:
//!
//! - **String-keyed component namespaces** — stores are registered under
//!   opaque string keys rather than Rust types, so hosts can register
//!   component spaces at runtime (scripted worlds, data-driven sims).
//! - **Declared access** — systems and work groups declare component and
//!   resource access up front; the scheduler validates the declarations once
//!   at registration instead of locking per access.
//! - **Cooperative cancellation** — a tick is interrupted only at group and
//!   system boundaries, signalled through [`DeadlineToken`].
//!
//! ## Interval Gating
//!
//! A [`TickInterval`] of `every = E, offset = O` admits tick `T` when
//! `(T + O) % E == 0`, with `O` normalized to `O % E` whenever `E > 0`.
//! `E = 0` admits every tick. The first admitted tick is therefore
//! `(E - O % E) % E`. This formula is part of the public contract and is
//! relied on by both work-group intervals and per-system `run_every` gates.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::error::{EngineError, EngineResult};

/// Simulation tick counter.
pub type Tick = u64;

/// Namespaced key under which a single component store is registered.
///
/// Keys are opaque to the engine; two keys name the same component type
/// exactly when the strings are equal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ComponentType(String);

impl ComponentType {
    /// Creates a component key from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ComponentType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Unique identifier of a work group within a scheduler.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WorkGroupId(String);

impl WorkGroupId {
    /// Creates a work-group id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty id, which is never a valid registration.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WorkGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkGroupId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkGroupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Selects synchronous or asynchronous execution for a work group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkGroupMode {
    /// Runs inline on the driver task, in configured order.
    #[default]
    Sync,
    /// Dispatched to the worker pool; joined at the end of the tick.
    Async,
}

impl WorkGroupMode {
    /// Stable label used by observers and metric exporters.
    pub fn label(self) -> &'static str {
        match self {
            WorkGroupMode::Sync => "sync",
            WorkGroupMode::Async => "async",
        }
    }
}

impl fmt::Display for WorkGroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the scheduler responds to a system failure within a work group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorPolicy {
    /// First unrecovered error aborts the tick.
    #[default]
    Abort = 0,
    /// Errors are logged; the failed group contributes nothing and the tick
    /// proceeds.
    Continue = 1,
    /// The failing system is re-run once against a rewound buffer; a second
    /// failure falls back to [`ErrorPolicy::Abort`] semantics.
    Retry = 2,
}

impl ErrorPolicy {
    pub(crate) fn from_u8(raw: u8) -> ErrorPolicy {
        match raw {
            1 => ErrorPolicy::Continue,
            2 => ErrorPolicy::Retry,
            _ => ErrorPolicy::Abort,
        }
    }
}

/// Controls how frequently a work group or system runs.
///
/// `every = 0` runs on every tick. Otherwise the gate admits tick `T` when
/// `(T + offset % every) % every == 0`; the first admitted tick is
/// `(every - offset % every) % every`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickInterval {
    /// Run once per `every` ticks; `0` means every tick.
    pub every: u32,
    /// Phase offset, normalized modulo `every` when `every > 0`.
    pub offset: u32,
}

impl TickInterval {
    /// An interval that admits every tick.
    pub const EVERY_TICK: TickInterval = TickInterval { every: 0, offset: 0 };

    /// Creates an interval gate.
    pub fn new(every: u32, offset: u32) -> Self {
        Self { every, offset }
    }

    /// Returns `true` when the gate admits `tick`.
    #[inline]
    pub fn should_run(self, tick: Tick) -> bool {
        if self.every == 0 {
            return true;
        }
        let every = u64::from(self.every);
        let offset = u64::from(self.offset % self.every);
        (tick + offset) % every == 0
    }
}

/// Read or write intent toward a named resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// Shared, read-only access.
    #[default]
    Read,
    /// Exclusive, mutable access.
    Write,
}

/// A system's declared access to one named resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceAccess {
    /// Resource name within the world's resource container.
    pub name: String,
    /// Declared intent.
    pub mode: AccessMode,
}

impl ResourceAccess {
    /// Declares read access to `name`.
    pub fn read(name: impl Into<String>) -> Self {
        Self { name: name.into(), mode: AccessMode::Read }
    }

    /// Declares write access to `name`.
    pub fn write(name: impl Into<String>) -> Self {
        Self { name: name.into(), mode: AccessMode::Write }
    }
}

/// Cooperative cancellation signal for tick execution.
///
/// ## Purpose
/// The driver checks the token before each work group and at every system
/// boundary inside a group; worker threads check it before starting a job.
/// A cancelled token short-circuits the current tick with
/// [`EngineError::Cancelled`].
///
/// ## Behavior
/// Cancellation is cooperative: a system that ignores the token runs to
/// completion and the tick fails afterwards. Cloning the token shares the
/// underlying flag.
#[derive(Clone, Debug, Default)]
pub struct DeadlineToken {
    cancelled: Arc<AtomicBool>,
}

impl DeadlineToken {
    /// Creates a token in the non-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`DeadlineToken::cancel`] has been called.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Converts the cancelled state into an error for `?` propagation.
    #[inline]
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

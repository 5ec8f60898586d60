//! Error types for world mutation, storage, and scheduling.
//!
//! This module declares focused, composable error types used across the
//! storage layer, the command pipeline, and the scheduler. Each error carries
//! enough context to make failures actionable while remaining small and cheap
//! to pass around or convert into the aggregate [`EngineError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure layer
//!   (registration-time configuration, per-command validation, in-tick
//!   execution, pool infrastructure).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`EngineError`]
//!   so call sites can use `?` throughout.
//! * **Actionability:** Structured fields (offending component, conflicting
//!   owners, failed system name) make logs useful without reproducing the
//!   issue.
//!
//! ## Typical flow
//! Low-level operations return small, dedicated error types (e.g.
//! [`ZeroEntityError`] from a store write). Higher-level orchestration code
//! uses `?` to bubble failures into [`EngineError`], which callers can match
//! on for control flow or log with user-readable messages.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is optimized for operator logs (short, single-line
//!   phrasing).
//! * [`fmt::Debug`] (derived) retains full structure for diagnostics.

use std::error::Error;
use std::fmt;

use crate::engine::entity::EntityId;
use crate::engine::types::{ComponentType, WorkGroupId};

/// Boxed error produced by a system's `run` implementation.
pub type SystemError = Box<dyn Error + Send + Sync + 'static>;

/// Convenient alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

/// Returned when an operation names the zero entity id `(0, 0)`.
///
/// The zero id is a sentinel that is never alive; stores and commands reject
/// it before touching any state.
///
/// ### Fields
/// * `operation` — Short verb phrase naming the rejected operation
///   (e.g. `"set"`, `"destroy"`, `"add component to"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroEntityError {
    /// The operation that named the zero id.
    pub operation: &'static str,
}

impl ZeroEntityError {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

impl fmt::Display for ZeroEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot {} the zero entity", self.operation)
    }
}

impl Error for ZeroEntityError {}

/// Returned when an entity handle is no longer valid — typically because the
/// entity was destroyed and the stored generation no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError {
    /// The stale handle that was presented.
    pub entity: EntityId,
}

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stale or dead entity reference {}", self.entity)
    }
}

impl Error for StaleEntityError {}

/// Access conflicts detected while validating a work group's declared
/// component and resource access, both inside one group and across groups.
///
/// All component variants render with the stable `duplicate write access to
/// component` prefix; resource variants with `duplicate write access to
/// resource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessConflict {
    /// One system descriptor declares the same component write twice.
    ComponentWriteRepeated {
        /// Offending system.
        system: String,
        /// Component declared more than once.
        component: ComponentType,
    },
    /// Two systems in the same group declare overlapping component writes.
    ComponentWriteShared {
        /// System that declared the write first.
        first: String,
        /// System that declared the conflicting write.
        second: String,
        /// Contested component.
        component: ComponentType,
    },
    /// Another work group already owns the component write.
    ComponentWriteOwned {
        /// Registered owner of the write.
        owner: WorkGroupId,
        /// Contested component.
        component: ComponentType,
    },
    /// One system descriptor declares the same resource write twice.
    ResourceWriteRepeated {
        /// Offending system.
        system: String,
        /// Resource declared more than once.
        resource: String,
    },
    /// Two systems in the same group declare writes to the same resource.
    ResourceWriteShared {
        /// System that declared the write first.
        first: String,
        /// System that declared the conflicting write.
        second: String,
        /// Contested resource.
        resource: String,
    },
    /// Another work group already owns the resource write.
    ResourceWriteOwned {
        /// Registered owner of the write.
        owner: WorkGroupId,
        /// Contested resource.
        resource: String,
    },
    /// A resource write is rejected because another group reads the resource.
    ResourceWriteReadElsewhere {
        /// A registered reader of the resource.
        reader: WorkGroupId,
        /// Contested resource.
        resource: String,
    },
    /// A resource read is rejected because another group writes the resource.
    ResourceReadWrittenElsewhere {
        /// Registered writer of the resource.
        owner: WorkGroupId,
        /// Contested resource.
        resource: String,
    },
}

impl fmt::Display for AccessConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessConflict::ComponentWriteRepeated { system, component } => write!(
                f,
                "duplicate write access to component {component}: {system} declares it multiple times"
            ),
            AccessConflict::ComponentWriteShared { first, second, component } => write!(
                f,
                "duplicate write access to component {component}: {first} and {second} both write it"
            ),
            AccessConflict::ComponentWriteOwned { owner, component } => write!(
                f,
                "duplicate write access to component {component}: work group {owner} already owns it"
            ),
            AccessConflict::ResourceWriteRepeated { system, resource } => write!(
                f,
                "duplicate write access to resource {resource}: {system} declares it multiple times"
            ),
            AccessConflict::ResourceWriteShared { first, second, resource } => write!(
                f,
                "duplicate write access to resource {resource}: {first} and {second} both write it"
            ),
            AccessConflict::ResourceWriteOwned { owner, resource } => write!(
                f,
                "duplicate write access to resource {resource}: work group {owner} already owns it"
            ),
            AccessConflict::ResourceWriteReadElsewhere { reader, resource } => write!(
                f,
                "duplicate write access to resource {resource}: work group {reader} already reads it"
            ),
            AccessConflict::ResourceReadWrittenElsewhere { owner, resource } => write!(
                f,
                "duplicate write access to resource {resource}: work group {owner} already writes it"
            ),
        }
    }
}

impl Error for AccessConflict {}

/// Configuration-time errors: the offending component or work group is not
/// installed and the scheduler state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A component type was registered twice in the same world.
    ComponentAlreadyRegistered(ComponentType),
    /// A work group was registered with an empty id.
    EmptyWorkGroupId,
    /// A work group id was registered twice in the same scheduler.
    DuplicateWorkGroup(WorkGroupId),
    /// A system in an async group did not opt into async execution.
    AsyncSystemNotAllowed {
        /// Offending system.
        system: String,
    },
    /// A system in an async group declares component writes.
    AsyncWritesNotSupported {
        /// Offending system.
        system: String,
        /// The declared writes.
        components: Vec<ComponentType>,
    },
    /// A system in an async group declares a resource write.
    AsyncResourceWritesNotSupported {
        /// Offending system.
        system: String,
        /// The declared resource write.
        resource: String,
    },
    /// Declared access conflicts within the group or against registered
    /// groups.
    Conflict(AccessConflict),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::ComponentAlreadyRegistered(component) => {
                write!(f, "component already registered: {component}")
            }
            RegistrationError::EmptyWorkGroupId => {
                f.write_str("work group requires a non-empty id")
            }
            RegistrationError::DuplicateWorkGroup(id) => {
                write!(f, "work group {id} already registered")
            }
            RegistrationError::AsyncSystemNotAllowed { system } => {
                write!(f, "system does not allow async execution: {system}")
            }
            RegistrationError::AsyncWritesNotSupported { system, components } => {
                write!(
                    f,
                    "async work group cannot perform component writes: {system} writes"
                )?;
                for component in components {
                    write!(f, " {component}")?;
                }
                Ok(())
            }
            RegistrationError::AsyncResourceWritesNotSupported { system, resource } => write!(
                f,
                "async work group cannot perform resource writes: {system} writes {resource}"
            ),
            RegistrationError::Conflict(conflict) => write!(f, "{conflict}"),
        }
    }
}

impl Error for RegistrationError {}

impl From<AccessConflict> for RegistrationError {
    fn from(conflict: AccessConflict) -> Self {
        RegistrationError::Conflict(conflict)
    }
}

/// Per-command validation errors raised while applying deferred commands.
///
/// The failing command leaves the world untouched; subsequent commands in the
/// same batch are not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command named the zero entity id.
    ZeroEntity(ZeroEntityError),
    /// Destroy was applied to an id that is not currently alive.
    StaleEntity(StaleEntityError),
    /// The command named a component type with no registered store.
    ComponentNotRegistered(ComponentType),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::ZeroEntity(e) => write!(f, "{e}"),
            CommandError::StaleEntity(e) => write!(f, "{e}"),
            CommandError::ComponentNotRegistered(component) => {
                write!(f, "component not registered: {component}")
            }
        }
    }
}

impl Error for CommandError {}

impl From<ZeroEntityError> for CommandError {
    fn from(e: ZeroEntityError) -> Self {
        CommandError::ZeroEntity(e)
    }
}

impl From<StaleEntityError> for CommandError {
    fn from(e: StaleEntityError) -> Self {
        CommandError::StaleEntity(e)
    }
}

/// Infrastructure failures of the async worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerPoolError {
    /// A job was submitted after the pool closed, or the pool terminated
    /// before reporting the job's outcome.
    Closed,
    /// The pool's threads could not be spawned.
    Spawn(String),
}

impl fmt::Display for WorkerPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerPoolError::Closed => f.write_str("worker pool closed"),
            WorkerPoolError::Spawn(reason) => write!(f, "worker pool spawn failed: {reason}"),
        }
    }
}

impl Error for WorkerPoolError {}

/// Aggregate error for every fallible engine operation.
///
/// `From` conversions are implemented for the focused error types so callers
/// can write `?` and still return a single, expressive type.
#[derive(Debug)]
pub enum EngineError {
    /// Configuration rejected at registration time.
    Registration(RegistrationError),
    /// A deferred command failed validation during apply.
    Command(CommandError),
    /// A system returned an error that the group's policy did not absorb.
    System {
        /// Name of the failed system.
        system: String,
        /// The error the system returned.
        source: SystemError,
    },
    /// The async worker pool failed.
    WorkerPool(WorkerPoolError),
    /// The deadline token was cancelled.
    Cancelled,
}

impl EngineError {
    /// Wraps a system failure with the system's name.
    pub fn system(system: impl Into<String>, source: SystemError) -> Self {
        EngineError::System { system: system.into(), source }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Registration(e) => write!(f, "{e}"),
            EngineError::Command(e) => write!(f, "{e}"),
            EngineError::System { system, source } => {
                write!(f, "system {system} failed: {source}")
            }
            EngineError::WorkerPool(e) => write!(f, "{e}"),
            EngineError::Cancelled => f.write_str("tick cancelled by deadline"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::System { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<RegistrationError> for EngineError {
    fn from(e: RegistrationError) -> Self {
        EngineError::Registration(e)
    }
}

impl From<CommandError> for EngineError {
    fn from(e: CommandError) -> Self {
        EngineError::Command(e)
    }
}

impl From<WorkerPoolError> for EngineError {
    fn from(e: WorkerPoolError) -> Self {
        EngineError::WorkerPool(e)
    }
}

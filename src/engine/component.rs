//! Type-erased component values.
//!
//! ## Purpose
//! Component stores hold values of host-defined types behind a uniform
//! read/write contract. [`ComponentValue`] is the erasure seam: any
//! `Clone + PartialEq` value can be stored, and systems downcast back to the
//! concrete type at the boundary.
//!
//! ## Design
//! - `clone_value` gives stores value-copy semantics: a `get` returns a
//!   clone, so mutating the returned value is never observable in the store
//!   without a subsequent `set`.
//! - `value_eq` is structural equality through `PartialEq`, used by the
//!   shared storage strategy to intern identical values.
//! - `as_any` exposes the concrete type for downcasting.
//!
//! The blanket implementation covers every `T: Any + Send + Sync + Clone +
//! PartialEq`, so component types need no manual trait plumbing.

use std::any::Any;
use std::fmt;

/// A storable, comparable, clonable component value.
pub trait ComponentValue: Any + Send + Sync {
    /// Returns an owned copy of the value.
    fn clone_value(&self) -> Box<dyn ComponentValue>;

    /// Structural equality against another erased value.
    ///
    /// Values of different concrete types are never equal.
    fn value_eq(&self, other: &dyn ComponentValue) -> bool;

    /// The value as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete type, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<T> ComponentValue for T
where
    T: Any + Send + Sync + Clone + PartialEq,
{
    fn clone_value(&self) -> Box<dyn ComponentValue> {
        Box::new(self.clone())
    }

    fn value_eq(&self, other: &dyn ComponentValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl dyn ComponentValue {
    /// Returns `true` if the erased value is a `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrows the value as a `T`, if it is one.
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl Clone for Box<dyn ComponentValue> {
    fn clone(&self) -> Self {
        self.clone_value()
    }
}

impl fmt::Debug for dyn ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentValue<{}>", self.type_name())
    }
}

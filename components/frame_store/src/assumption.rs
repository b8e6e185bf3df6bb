//! Optimistic assumptions and stable values.
//!
//! An assumption is a named validity flag: reading it is O(1), invalidating
//! it is a single store. A stable value pairs a binding's value with the
//! assumption that it has not changed; readers that find the assumption
//! invalid fall back to a slow-path re-read.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use core_types::InvalidAssumption;

struct AssumptionInner {
    name: Box<str>,
    valid: Cell<bool>,
}

/// A named, invalidatable validity flag. Cloning shares the flag.
#[derive(Clone)]
pub struct Assumption {
    inner: Rc<AssumptionInner>,
}

impl Assumption {
    /// Create a valid assumption. The name is kept for diagnostics only.
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Self {
            inner: Rc::new(AssumptionInner {
                name: name.into(),
                valid: Cell::new(true),
            }),
        }
    }

    /// Whether the assumption still holds.
    pub fn is_valid(&self) -> bool {
        self.inner.valid.get()
    }

    /// Succeeds while the assumption holds; signals otherwise.
    pub fn check(&self) -> Result<(), InvalidAssumption> {
        if self.inner.valid.get() {
            Ok(())
        } else {
            Err(InvalidAssumption)
        }
    }

    /// Permanently invalidate the assumption.
    pub fn invalidate(&self) {
        self.inner.valid.set(false);
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl fmt::Debug for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assumption")
            .field("name", &self.inner.name)
            .field("valid", &self.inner.valid.get())
            .finish()
    }
}

/// A value paired with the assumption that it is still current.
///
/// Stable values are immutable; a binding change replaces the whole pair
/// after invalidating the old assumption.
#[derive(Debug)]
pub struct StableValue<T> {
    value: T,
    assumption: Assumption,
}

impl<T> StableValue<T> {
    /// Create a stable value named after the binding it guards.
    pub fn new(value: T, name: &str) -> Self {
        Self {
            value,
            assumption: Assumption::new(format!("stable value \"{}\"", name)),
        }
    }

    /// The guarded value. Callers must check the assumption.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The guarding assumption.
    pub fn assumption(&self) -> &Assumption {
        &self.assumption
    }
}

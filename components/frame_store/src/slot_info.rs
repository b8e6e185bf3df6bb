//! Per-slot metadata: assumptions and the stable-value protocol.
//!
//! Each slot carries an assumption that it has never been modified
//! non-locally, an assumption that it has never been promoted to
//! multi-context storage, and (for singleton-frame slots) an optional
//! stable value. A stable value survives a bounded number of rebinds;
//! once the invalidation budget is spent the slot never records a stable
//! value again.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use core_types::Value;

use crate::assumption::{Assumption, StableValue};

/// Rebinds a local-frame slot may survive before stable values stop.
pub const MAX_INVALIDATION_COUNT: u32 = 2;
/// Rebinds a global-environment slot may survive before stable values stop.
pub const MAX_GLOBAL_ENV_INVALIDATION_COUNT: u32 = 1;

/// Metadata attached to one slot of a frame descriptor.
#[derive(Debug)]
pub struct FrameSlotInfo {
    /// Valid until some non-local writer sets this slot. Local reads are
    /// cheap; the costly check happens only on the non-local write paths.
    non_local_modified: Assumption,
    /// Valid until the slot is first promoted to multi-context storage.
    no_multi_slot: Assumption,
    stable_value: RefCell<Option<Rc<StableValue<Value>>>>,
    invalidation_count: Cell<u32>,
    possible_multi_slot: bool,
}

impl FrameSlotInfo {
    /// Create slot metadata.
    ///
    /// Only singleton-frame slots track a stable value; global-environment
    /// slots get the smaller invalidation budget, and slots of manually
    /// created environments are never multi-slot candidates.
    pub fn new(is_singleton_frame: bool, is_global_env: bool, identifier: &str, is_new_env: bool) -> Self {
        let stable_value = if is_singleton_frame {
            Some(Rc::new(StableValue::new(Value::Unbound, identifier)))
        } else {
            None
        };
        let invalidation_count = if is_global_env {
            MAX_GLOBAL_ENV_INVALIDATION_COUNT
        } else {
            MAX_INVALIDATION_COUNT
        };
        Self {
            non_local_modified: Assumption::new(format!("{}:NonLocalModified", identifier)),
            no_multi_slot: Assumption::new(format!("{}:NoMultiSlot", identifier)),
            stable_value: RefCell::new(stable_value),
            invalidation_count: Cell::new(invalidation_count),
            possible_multi_slot: is_singleton_frame && !is_new_env,
        }
    }

    /// The not-changed-non-locally assumption.
    pub fn non_local_modified(&self) -> &Assumption {
        &self.non_local_modified
    }

    /// The never-promoted assumption.
    pub fn no_multi_slot(&self) -> &Assumption {
        &self.no_multi_slot
    }

    /// Whether the slot may ever be promoted to multi-context storage.
    pub fn possible_multi_slot(&self) -> bool {
        self.possible_multi_slot
    }

    /// Whether writes must run the stable-value comparison.
    pub fn needs_invalidation(&self) -> bool {
        self.stable_value.borrow().is_some()
    }

    /// The current stable value, if the slot still records one.
    pub fn stable_value(&self) -> Option<Rc<StableValue<Value>>> {
        self.stable_value.borrow().clone()
    }

    /// Record a boolean write.
    pub fn set_boolean(&self, value: bool, identifier: &str) {
        self.set_value(Value::logical(value), identifier);
    }

    /// Record a byte write.
    pub fn set_byte(&self, value: u8, identifier: &str) {
        self.set_value(Value::Logical(value), identifier);
    }

    /// Record an integer write.
    pub fn set_int(&self, value: i32, identifier: &str) {
        self.set_value(Value::Int(value), identifier);
    }

    /// Record a double write. Comparison against the stable value is
    /// bitwise: rebinding the same NaN payload keeps the stable value,
    /// `+0.0` and `-0.0` are distinct.
    pub fn set_double(&self, value: f64, identifier: &str) {
        self.set_value(Value::Double(value), identifier);
    }

    /// Record an object write. Objects compare by identity, primitives by
    /// value.
    pub fn set_value(&self, value: Value, identifier: &str) {
        let current = self.stable_value.borrow().clone();
        if let Some(sv) = current {
            if !sv.value().same_object(&value) {
                self.invalidate_stable_value(&sv, value, identifier);
            }
        }
    }

    /// Drop the stable value without recording a replacement (active
    /// bindings and multi-slot promotion).
    pub fn clear_stable_value(&self) {
        if let Some(sv) = self.stable_value.borrow_mut().take() {
            sv.assumption().invalidate();
        }
        self.invalidation_count.set(0);
    }

    fn invalidate_stable_value(&self, old: &Rc<StableValue<Value>>, value: Value, identifier: &str) {
        old.assumption().invalidate();
        let count = self.invalidation_count.get();
        if count > 0 {
            self.invalidation_count.set(count - 1);
            *self.stable_value.borrow_mut() = Some(Rc::new(StableValue::new(value, identifier)));
        } else {
            *self.stable_value.borrow_mut() = None;
        }
    }
}

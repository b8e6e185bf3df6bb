//! Active bindings: slots whose value is computed by a function.

use core_types::Value;

/// Tagged wrapper for a binding backed by a getter function.
///
/// Stored directly in a slot cell; readers must invoke the function instead
/// of returning the wrapper. Writing one into a frame invalidates the
/// descriptor-level "contains no active binding" assumption.
#[derive(Debug, Clone)]
pub struct ActiveBinding {
    function: Value,
}

impl ActiveBinding {
    /// Wrap a getter function (a closure or builtin value).
    pub fn new(function: Value) -> Self {
        Self { function }
    }

    /// The getter function.
    pub fn function(&self) -> &Value {
        &self.function
    }
}

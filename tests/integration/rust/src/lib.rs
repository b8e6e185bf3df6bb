//! Integration test suite for the Strata runtime environment core.
//!
//! This crate provides integration tests that verify the components work
//! together correctly across component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use builtins;
    pub use core_types;
    pub use frame_store;
    pub use interpreter;
    pub use profiler;
}

use std::rc::Rc;

use core_types::{Node, Signature, Value};
use interpreter::{Context, Interpreter, RuntimeOptions};

/// A context with all builtins installed and an interpreter on it.
pub fn fresh_interpreter() -> (Rc<Context>, Interpreter) {
    let ctx = Context::new(RuntimeOptions::new());
    builtins::install_builtins(&ctx);
    let interp = Interpreter::new(ctx.clone());
    (ctx, interp)
}

/// `name <- function(formals) body`
pub fn define_function(name: &str, formals: &[&str], body: Rc<Node>) -> Rc<Node> {
    Node::assign(
        name,
        Node::function_def(Some(name), Signature::of(formals), body),
        false,
    )
}

/// Extract the integer from a scalar result.
pub fn as_int(value: &Value) -> i32 {
    match value {
        Value::Int(i) => *i,
        other => panic!("expected integer, got {:?}", other),
    }
}

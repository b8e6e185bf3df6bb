//! AST evaluator, promise machinery and execution context for the Strata
//! runtime.
//!
//! The interpreter is single-threaded and cooperative: one thread walks
//! syntax nodes, promise forcing is the only suspension point, and user
//! interrupts are observed at statement boundaries. All state hangs off an
//! explicit [`Context`] handle.
//!
//! # Examples
//!
//! ```
//! use core_types::{Node, Value};
//! use interpreter::{Context, Interpreter, RuntimeOptions};
//!
//! let ctx = Context::new(RuntimeOptions::new());
//! let mut interp = Interpreter::new(ctx);
//! let program = vec![
//!     Node::assign("x", Node::constant(Value::Int(1)), false),
//!     Node::lookup("x"),
//! ];
//! assert_eq!(interp.eval_program(&program).unwrap(), Value::Int(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod arguments;
mod context;
mod eval;
mod options;
mod promise;
mod stack;

pub use arguments::{match_arguments, MatchedArg, SuppliedArg, SuppliedPayload};
pub use context::{Builtin, Context, StatementListener, StatementListenerId};
pub use eval::Interpreter;
pub use options::RuntimeOptions;
pub use promise::{deoptimize_frame, force_promise, force_value};
pub use stack::{FrameStack, StackEntry};

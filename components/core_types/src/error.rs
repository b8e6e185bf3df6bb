//! Runtime error types and the assumption-invalidation signal.
//!
//! User errors carry the best-available call node so messages can point at
//! the source position of the lexically-enclosing activation. Assumption
//! invalidations are not errors: they are a control-flow signal caught at
//! read sites, never surfaced to user code.

use std::fmt;
use std::rc::Rc;

use crate::node::Node;

/// The kind of a runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A frame number outside the current stack was requested.
    NotThatManyFrames,
    /// An argument had an unusable value.
    InvalidArgument,
    /// An argument had an unusable mode (type).
    InvalidMode,
    /// An argument had to be an environment.
    MustBeEnviron,
    /// A promise was forced from within its own evaluation.
    RecursivePromise,
    /// A malformed call reached the runtime.
    InvalidCall,
    /// The running statement observed a user interrupt.
    Interrupted,
    /// An I/O operation of a user-initiated call failed.
    Io,
    /// An internal invariant was violated; unwinds to the top level.
    Internal,
}

/// A runtime error with message and originating call.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// The call the error is reported at, when one is known.
    pub call: Option<Rc<Node>>,
}

impl RuntimeError {
    /// Create an error with no associated call.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            call: None,
        }
    }

    /// Attach the call the error should be reported at.
    pub fn with_call(mut self, call: Rc<Node>) -> Self {
        self.call = Some(call);
        self
    }

    /// "not that many frames on the stack"
    pub fn not_that_many_frames() -> Self {
        Self::new(ErrorKind::NotThatManyFrames, "not that many frames on the stack")
    }

    /// invalid argument error for the named argument
    pub fn invalid_argument(name: &str) -> Self {
        Self::new(ErrorKind::InvalidArgument, format!("invalid '{}' argument", name))
    }

    /// Whether unwinding this error may be recovered at the forcing caller
    /// (only user interrupts are).
    pub fn is_recoverable_at_caller(&self) -> bool {
        self.kind == ErrorKind::Interrupted
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.call {
            Some(call) => write!(f, "Error in {}: {}", call, self.message),
            None => write!(f, "Error: {}", self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::new(ErrorKind::Io, err.to_string())
    }
}

/// Result type for runtime operations.
pub type RResult<T> = Result<T, RuntimeError>;

/// Signal that an optimistic assumption no longer holds.
///
/// Caught locally at the read site, which falls back to a full slow-path
/// re-read; re-raised to callers only in deoptimization paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidAssumption;

impl fmt::Display for InvalidAssumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "assumption invalidated")
    }
}

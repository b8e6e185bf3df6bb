//! Core value, syntax and call-stack types for the Strata runtime.
//!
//! This crate provides the foundational types shared by every other
//! component:
//!
//! - [`Value`] - NA-aware tagged representation of runtime values
//! - [`Node`] - syntax tree nodes with tag-dispatched introspection
//! - [`Caller`] - immutable call activation records and their unwrap rules
//! - [`RuntimeError`] / [`InvalidAssumption`] - the error taxonomy
//! - [`DataFactory`] - value allocation with listener instrumentation
//!
//! # Examples
//!
//! ```
//! use core_types::{Caller, Node, Value};
//!
//! let global = Caller::global();
//! let call = Node::call_named("f", vec![]);
//! let activation = Caller::function(global.clone(), global, call);
//! assert_eq!(activation.depth(), 1);
//! assert!(activation.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod alloc;
mod caller;
mod error;
mod node;
mod source;
mod value;

pub use alloc::{object_size, AllocationListener, DataFactory, ListenerId, LARGE_VECTOR_THRESHOLD};
pub use caller::{Caller, CallerPayload};
pub use error::{ErrorKind, InvalidAssumption, RResult, RuntimeError};
pub use node::{Argument, Node, NodeKind};
pub use source::SourceSection;
pub use value::{
    is_na_real, na_real, ArgsAndNames, EnvId, FrameDescriptorId, PairListCell, PromiseData,
    PromiseState, RFunction, RVector, ShareState, Signature, Value, VectorData, LOGICAL_FALSE,
    LOGICAL_NA, LOGICAL_TRUE, NA_INT, NA_REAL_BITS, VARARG_NAME,
};

//! Sampling profiler for the Strata runtime.
//!
//! A background timer thread raises a tick flag at fixed wall-clock
//! intervals; the statement listener drains the flag at statement entries,
//! snapshots the caller chain and (optionally) the allocation deltas since
//! the previous sample, and the collected samples are written as a text
//! profile when the session stops.
//!
//! The timer thread shares nothing with the interpreter but two atomic
//! flags (`tick` and `running`); all capture state lives on the
//! interpreter thread.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod rprof;

pub use rprof::{MemoryQuad, ProfParams, Profiler};

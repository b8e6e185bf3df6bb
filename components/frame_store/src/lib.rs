//! Frame, slot and environment-hierarchy store for the Strata runtime.
//!
//! This crate implements the execution-time variable store:
//!
//! - [`Frame`] - typed slot cells plus the activation header
//! - [`FrameSlotInfo`] - per-slot assumptions and the stable-value protocol
//! - [`SlotChangeMonitor`] - descriptor metadata, enclosing-chain
//!   assumptions and the cross-frame lookup cache with invalidation
//! - [`MultiSlotData`] - per-context storage for shared-context hosts
//! - [`LookupSiteCache`] - per-read-site polymorphic caching
//!
//! The monitor's knowledge is expressed as [`Assumption`]s; invalidating
//! one makes every reader fall back to a slow-path re-read, which keeps
//! unsynchronized hot-path reads sound.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod active_binding;
mod assumption;
mod environment;
mod frame;
mod monitor;
mod multi_slot;
mod site_cache;
mod slot_info;

pub use active_binding::ActiveBinding;
pub use assumption::{Assumption, StableValue};
pub use environment::EnvironmentRegistry;
pub use frame::{Frame, FrameCell, FrameSlotTypeError, SlotIndex, SlotKind, WeakFrame};
pub use monitor::{LookupResult, SlotChangeMonitor, SlotValue};
pub use multi_slot::MultiSlotData;
pub use site_cache::{LookupSiteCache, SiteEntry};
pub use slot_info::{FrameSlotInfo, MAX_GLOBAL_ENV_INVALIDATION_COUNT, MAX_INVALIDATION_COUNT};

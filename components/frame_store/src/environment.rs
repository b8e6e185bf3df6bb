//! Environment registry: stable integer handles for frames.
//!
//! Every frame that becomes visible as an environment gets an `EnvId`;
//! values refer to environments only through these handles. The registry
//! also tracks the global environment and creates manually constructed
//! environments with their own singleton descriptors.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use core_types::{Caller, EnvId};

use crate::frame::Frame;
use crate::monitor::SlotChangeMonitor;

/// Maps environment handles to frames.
pub struct EnvironmentRegistry {
    frames: RefCell<Vec<Frame>>,
    global: Cell<Option<EnvId>>,
    new_env_counter: Cell<usize>,
}

impl EnvironmentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
            global: Cell::new(None),
            new_env_counter: Cell::new(0),
        }
    }

    /// Register a frame, assigning it an environment handle. Idempotent.
    pub fn register(&self, frame: &Frame) -> EnvId {
        if let Some(id) = frame.env() {
            return id;
        }
        let mut frames = self.frames.borrow_mut();
        let id = EnvId(frames.len());
        frames.push(frame.clone());
        frame.set_env(id);
        id
    }

    /// The frame behind an environment handle.
    pub fn frame(&self, id: EnvId) -> Option<Frame> {
        self.frames.borrow().get(id.0).cloned()
    }

    /// Mark an environment as the global one.
    pub fn set_global(&self, id: EnvId) {
        self.global.set(Some(id));
    }

    /// The global environment handle.
    pub fn global(&self) -> Option<EnvId> {
        self.global.get()
    }

    /// The global environment's frame.
    pub fn global_frame(&self) -> Option<Frame> {
        self.global.get().and_then(|id| self.frame(id))
    }

    /// Expose a frame as a user-held environment: register it and flag it
    /// irregular, since writes may now come from outside the regular
    /// stack discipline.
    pub fn materialize(&self, frame: &Frame) -> EnvId {
        frame.set_irregular();
        self.register(frame)
    }

    /// Create a manually constructed environment with its own singleton
    /// descriptor, enclosed by `enclosing`.
    pub fn create_environment(
        &self,
        monitor: &SlotChangeMonitor,
        call: Rc<Caller>,
        enclosing: Option<&Frame>,
    ) -> Frame {
        let n = self.new_env_counter.get();
        self.new_env_counter.set(n + 1);
        let name = format!("<new-env-{}>", n);
        let descriptor = monitor.initialize_non_function_descriptor(&name);
        let frame = Frame::new(descriptor, call);
        monitor.set_singleton_frame(descriptor, &frame);
        frame.set_enclosing_frame(enclosing.cloned());
        monitor.initialize_enclosing_frame(&frame, enclosing);
        self.register(&frame);
        frame
    }
}

impl Default for EnvironmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

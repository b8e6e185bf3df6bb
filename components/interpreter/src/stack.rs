//! The dynamic frame stack.
//!
//! Each entry pairs a frame with the activation record it currently runs
//! under. For ordinary calls the record is the frame's own; promise
//! evaluation re-enters the captured frame under a promise-evaluation
//! record, so the pairing lives here rather than in the frame.

use std::rc::Rc;

use core_types::Caller;
use frame_store::Frame;

/// One entry on the dynamic stack.
#[derive(Debug, Clone)]
pub struct StackEntry {
    /// The frame executing.
    pub frame: Frame,
    /// The activation record it executes under.
    pub call: Rc<Caller>,
}

/// The dynamic stack, oldest entry first.
#[derive(Debug)]
pub struct FrameStack {
    entries: Vec<StackEntry>,
}

impl FrameStack {
    /// Create a stack with the global frame as its base entry.
    pub fn new(global_frame: Frame) -> Self {
        let call = global_frame.call();
        Self {
            entries: vec![StackEntry {
                frame: global_frame,
                call,
            }],
        }
    }

    /// Push an activation.
    pub fn push(&mut self, frame: Frame, call: Rc<Caller>) {
        self.entries.push(StackEntry { frame, call });
    }

    /// Pop the youngest activation.
    pub fn pop(&mut self) -> Option<StackEntry> {
        if self.entries.len() > 1 {
            self.entries.pop()
        } else {
            None
        }
    }

    /// The youngest entry.
    pub fn current(&self) -> &StackEntry {
        self.entries.last().expect("stack never empty")
    }

    /// The activation record of the youngest entry.
    pub fn current_call(&self) -> Rc<Caller> {
        self.current().call.clone()
    }

    /// The frame of the youngest entry.
    pub fn current_frame(&self) -> Frame {
        self.current().frame.clone()
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    /// Visit entries youngest to oldest, read-only.
    pub fn iterate_frames(&self, mut visit: impl FnMut(&StackEntry)) {
        for entry in self.entries.iter().rev() {
            visit(entry);
        }
    }

    /// Find the frame with the given absolute depth. Depth 0 is the global
    /// frame. Promise-evaluation entries share a function frame's depth
    /// and are skipped. Entries passed over are asked to keep their caller
    /// frame so later walks get cheaper.
    pub fn get_numbered_frame(&self, depth: u32, global_frame: &Frame) -> Option<Frame> {
        if depth == 0 {
            return Some(global_frame.clone());
        }
        for entry in self.entries.iter().rev() {
            if entry.call.depth() == depth && !entry.call.is_promise() {
                return Some(entry.frame.clone());
            }
            entry.frame.set_needs_caller_frame();
        }
        None
    }
}

//! Materialized frames: typed slot cells plus the activation header.
//!
//! A frame stores one activation's variable bindings, keyed by its
//! descriptor's slot order, and a header carrying the activation record,
//! the function, the dynamic caller frame and the promise arguments. The
//! lexical enclosing frame hangs off the header as well; identifier
//! resolution walks it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use core_types::{Caller, EnvId, FrameDescriptorId, RFunction, Value};

use crate::active_binding::ActiveBinding;
use crate::multi_slot::MultiSlotData;

/// Index of a slot within a frame descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotIndex(pub usize);

/// Declared kind of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Plain boolean.
    Boolean,
    /// NA-aware logical byte.
    Byte,
    /// Integer with NA sentinel.
    Int,
    /// Double with NA bit pattern.
    Double,
    /// Any value.
    Object,
}

/// A typed slot cell.
#[derive(Debug, Clone)]
pub enum FrameCell {
    /// Plain boolean storage.
    Boolean(bool),
    /// NA-aware logical byte storage.
    Byte(u8),
    /// Integer storage.
    Int(i32),
    /// Double storage.
    Double(f64),
    /// Generic value storage.
    Object(Value),
    /// An active (function-backed) binding.
    Active(ActiveBinding),
    /// Per-context storage for a promoted slot.
    Multi(Rc<MultiSlotData>),
}

impl FrameCell {
    fn unset() -> FrameCell {
        FrameCell::Object(Value::Unbound)
    }
}

/// A typed read found a cell of a different kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlotTypeError;

impl fmt::Display for FrameSlotTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame slot holds a different type")
    }
}

impl std::error::Error for FrameSlotTypeError {}

struct FrameInner {
    descriptor: FrameDescriptorId,
    env: Cell<Option<EnvId>>,
    cells: RefCell<Vec<FrameCell>>,
    call: RefCell<Rc<Caller>>,
    function: RefCell<Option<Rc<RFunction>>>,
    caller_frame: RefCell<Option<Frame>>,
    enclosing: RefCell<Option<Frame>>,
    arguments: RefCell<Vec<Value>>,
    irregular: Cell<bool>,
    needs_caller_frame: Cell<bool>,
}

/// A materialized frame. Cloning shares the frame.
#[derive(Clone)]
pub struct Frame {
    inner: Rc<FrameInner>,
}

impl Frame {
    /// Create an empty frame for `descriptor` anchored by `call`.
    pub fn new(descriptor: FrameDescriptorId, call: Rc<Caller>) -> Frame {
        Frame {
            inner: Rc::new(FrameInner {
                descriptor,
                env: Cell::new(None),
                cells: RefCell::new(Vec::new()),
                call: RefCell::new(call),
                function: RefCell::new(None),
                caller_frame: RefCell::new(None),
                enclosing: RefCell::new(None),
                arguments: RefCell::new(Vec::new()),
                irregular: Cell::new(false),
                needs_caller_frame: Cell::new(false),
            }),
        }
    }

    /// The frame's descriptor.
    pub fn descriptor(&self) -> FrameDescriptorId {
        self.inner.descriptor
    }

    /// The environment handle, once registered.
    pub fn env(&self) -> Option<EnvId> {
        self.inner.env.get()
    }

    /// Record the environment handle. Set once by the registry.
    pub fn set_env(&self, env: EnvId) {
        self.inner.env.set(Some(env));
    }

    /// The activation record anchoring this frame.
    pub fn call(&self) -> Rc<Caller> {
        self.inner.call.borrow().clone()
    }

    /// Replace the activation record (used when a frame is re-entered
    /// through `eval`-like paths).
    pub fn set_call(&self, call: Rc<Caller>) {
        *self.inner.call.borrow_mut() = call;
    }

    /// The function executing in this frame, absent for environments.
    pub fn function(&self) -> Option<Rc<RFunction>> {
        self.inner.function.borrow().clone()
    }

    /// Record the executing function.
    pub fn set_function(&self, function: Rc<RFunction>) {
        *self.inner.function.borrow_mut() = Some(function);
    }

    /// The dynamic caller's frame, when it was captured.
    pub fn caller_frame(&self) -> Option<Frame> {
        self.inner.caller_frame.borrow().clone()
    }

    /// Capture the dynamic caller's frame.
    pub fn set_caller_frame(&self, frame: Frame) {
        *self.inner.caller_frame.borrow_mut() = Some(frame);
    }

    /// The lexical enclosing frame.
    pub fn enclosing_frame(&self) -> Option<Frame> {
        self.inner.enclosing.borrow().clone()
    }

    /// Set the lexical enclosing frame.
    pub fn set_enclosing_frame(&self, frame: Option<Frame>) {
        *self.inner.enclosing.borrow_mut() = frame;
    }

    /// The activation's argument values (promises until forced).
    pub fn arguments(&self) -> Vec<Value> {
        self.inner.arguments.borrow().clone()
    }

    /// Record the activation's argument values.
    pub fn set_arguments(&self, arguments: Vec<Value>) {
        *self.inner.arguments.borrow_mut() = arguments;
    }

    /// Whether the frame escaped the regular stack discipline.
    pub fn is_irregular(&self) -> bool {
        self.inner.irregular.get()
    }

    /// Flag the frame as used outside the regular stack.
    pub fn set_irregular(&self) {
        self.inner.irregular.set(true);
    }

    /// Whether a numbered-frame walk asked this frame to keep its caller.
    pub fn needs_caller_frame(&self) -> bool {
        self.inner.needs_caller_frame.get()
    }

    /// Ask this frame to keep its caller frame for later walks.
    pub fn set_needs_caller_frame(&self) {
        self.inner.needs_caller_frame.set(true);
    }

    /// Read a cell. Out-of-range slots read as unbound.
    pub fn get_cell(&self, slot: SlotIndex) -> FrameCell {
        self.inner
            .cells
            .borrow()
            .get(slot.0)
            .cloned()
            .unwrap_or_else(FrameCell::unset)
    }

    /// Write a cell, extending storage as slots are added.
    pub fn set_cell(&self, slot: SlotIndex, cell: FrameCell) {
        let mut cells = self.inner.cells.borrow_mut();
        if slot.0 >= cells.len() {
            cells.resize_with(slot.0 + 1, FrameCell::unset);
        }
        cells[slot.0] = cell;
    }

    /// Typed boolean read.
    pub fn get_boolean(&self, slot: SlotIndex) -> Result<bool, FrameSlotTypeError> {
        match self.get_cell(slot) {
            FrameCell::Boolean(b) => Ok(b),
            _ => Err(FrameSlotTypeError),
        }
    }

    /// Typed byte read.
    pub fn get_byte(&self, slot: SlotIndex) -> Result<u8, FrameSlotTypeError> {
        match self.get_cell(slot) {
            FrameCell::Byte(b) => Ok(b),
            _ => Err(FrameSlotTypeError),
        }
    }

    /// Typed integer read.
    pub fn get_int(&self, slot: SlotIndex) -> Result<i32, FrameSlotTypeError> {
        match self.get_cell(slot) {
            FrameCell::Int(i) => Ok(i),
            _ => Err(FrameSlotTypeError),
        }
    }

    /// Typed double read.
    pub fn get_double(&self, slot: SlotIndex) -> Result<f64, FrameSlotTypeError> {
        match self.get_cell(slot) {
            FrameCell::Double(d) => Ok(d),
            _ => Err(FrameSlotTypeError),
        }
    }

    /// Typed object read.
    pub fn get_object(&self, slot: SlotIndex) -> Result<Value, FrameSlotTypeError> {
        match self.get_cell(slot) {
            FrameCell::Object(v) => Ok(v),
            _ => Err(FrameSlotTypeError),
        }
    }

    /// Whether two handles refer to the same frame.
    pub fn same_frame(&self, other: &Frame) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Downgrade to a weak handle.
    pub fn downgrade(&self) -> WeakFrame {
        WeakFrame {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.same_frame(other)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("descriptor", &self.inner.descriptor)
            .field("env", &self.inner.env.get())
            .field("depth", &self.inner.call.borrow().depth())
            .field("cells", &self.inner.cells.borrow().len())
            .field("irregular", &self.inner.irregular.get())
            .finish()
    }
}

/// Weak handle to a frame (used for singleton-frame references).
#[derive(Debug, Clone)]
pub struct WeakFrame {
    inner: Weak<FrameInner>,
}

impl WeakFrame {
    /// Upgrade to a strong handle if the frame is still alive.
    pub fn upgrade(&self) -> Option<Frame> {
        self.inner.upgrade().map(|inner| Frame { inner })
    }
}

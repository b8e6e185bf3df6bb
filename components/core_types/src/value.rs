//! Strata value representation.
//!
//! This module provides the core `Value` enum that represents all runtime
//! values of the language. Scalars are stored inline with their NA encodings;
//! aggregates are reference counted and carry a share state that decides
//! whether destructive reuse is permitted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::caller::Caller;
use crate::node::Node;

/// NA sentinel for integer values.
pub const NA_INT: i32 = i32::MIN;

/// Bit pattern of the NA double (a quiet NaN with a reserved payload).
pub const NA_REAL_BITS: u64 = 0x7FF0_0000_0000_07A2;

/// Logical `false` as stored in a logical byte.
pub const LOGICAL_FALSE: u8 = 0;
/// Logical `true` as stored in a logical byte.
pub const LOGICAL_TRUE: u8 = 1;
/// Logical NA as stored in a logical byte.
pub const LOGICAL_NA: u8 = 0xFF;

/// Name under which a variadic argument pack is bound in a frame.
pub const VARARG_NAME: &str = "...";

/// The NA double value.
pub fn na_real() -> f64 {
    f64::from_bits(NA_REAL_BITS)
}

/// Whether a double is the NA double (checked bitwise, so ordinary NaNs
/// are not NA).
pub fn is_na_real(x: f64) -> bool {
    x.to_bits() == NA_REAL_BITS
}

/// Handle to a registered environment (index into the environment registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(pub usize);

/// Handle to a registered frame descriptor (index into the descriptor arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameDescriptorId(pub usize);

/// Share state of an aggregate value.
///
/// `Temporary` values may be reused destructively, `Shared` values force
/// copy-on-write. The state only ever moves towards `Shared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareState {
    /// Freshly allocated, not yet visible to user code.
    Temporary,
    /// Bound exactly once.
    NonShared,
    /// Visible through more than one binding; copy before mutating.
    Shared,
}

/// Element storage of a vector.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    /// NA-aware logical bytes.
    Logical(Vec<u8>),
    /// Integers with the NA sentinel.
    Int(Vec<i32>),
    /// Doubles with the NA bit pattern.
    Double(Vec<f64>),
    /// Complex pairs (re, im).
    Complex(Vec<(f64, f64)>),
    /// Possibly-NA strings.
    Str(Vec<Option<Rc<str>>>),
    /// Raw bytes.
    Raw(Vec<u8>),
    /// Generic list elements.
    List(Vec<Value>),
}

impl VectorData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            VectorData::Logical(v) => v.len(),
            VectorData::Int(v) => v.len(),
            VectorData::Double(v) => v.len(),
            VectorData::Complex(v) => v.len(),
            VectorData::Str(v) => v.len(),
            VectorData::Raw(v) => v.len(),
            VectorData::List(v) => v.len(),
        }
    }

    /// Whether the vector has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A vector with attributes and a share state.
#[derive(Debug)]
pub struct RVector {
    /// Element storage.
    pub data: VectorData,
    /// Attribute name → value pairs.
    pub attributes: RefCell<Vec<(Rc<str>, Value)>>,
    share_state: Cell<ShareState>,
}

impl RVector {
    /// Create a fresh, temporary vector with no attributes.
    pub fn new(data: VectorData) -> Self {
        Self {
            data,
            attributes: RefCell::new(Vec::new()),
            share_state: Cell::new(ShareState::Temporary),
        }
    }

    /// Current share state.
    pub fn share_state(&self) -> ShareState {
        self.share_state.get()
    }

    /// Advance the share state one step towards `Shared`.
    pub fn mark_bound(&self) {
        let next = match self.share_state.get() {
            ShareState::Temporary => ShareState::NonShared,
            _ => ShareState::Shared,
        };
        self.share_state.set(next);
    }

    /// Whether destructive reuse is still permitted.
    pub fn is_temporary(&self) -> bool {
        self.share_state.get() == ShareState::Temporary
    }
}

impl PartialEq for RVector {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && *self.attributes.borrow() == *other.attributes.borrow()
    }
}

/// A pairlist cell. `cdr` is `Value::Null` at the end of the list.
#[derive(Debug)]
pub struct PairListCell {
    /// The element.
    pub car: RefCell<Value>,
    /// Optional tag (name) of the element.
    pub tag: RefCell<Option<Rc<str>>>,
    /// Rest of the list.
    pub cdr: RefCell<Value>,
}

impl PairListCell {
    /// Create a cell with no tag and a `Null` tail.
    pub fn new(car: Value) -> Rc<Self> {
        Rc::new(Self {
            car: RefCell::new(car),
            tag: RefCell::new(None),
            cdr: RefCell::new(Value::Null),
        })
    }

    /// Build a pairlist from tagged elements; returns `Value::Null` when
    /// `items` is empty.
    pub fn from_items(items: Vec<(Option<Rc<str>>, Value)>) -> Value {
        let mut result = Value::Null;
        for (tag, car) in items.into_iter().rev() {
            let cell = PairListCell::new(car);
            *cell.tag.borrow_mut() = tag;
            *cell.cdr.borrow_mut() = result;
            result = Value::PairList(cell);
        }
        result
    }

    /// Deep-copy this list (cells are fresh, elements are cloned).
    pub fn deep_copy(self: &Rc<Self>) -> Rc<Self> {
        let cdr = match &*self.cdr.borrow() {
            Value::PairList(next) => Value::PairList(next.deep_copy()),
            other => other.clone(),
        };
        Rc::new(Self {
            car: RefCell::new(self.car.borrow().clone()),
            tag: RefCell::new(self.tag.borrow().clone()),
            cdr: RefCell::new(cdr),
        })
    }
}

/// Formal argument signature of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    names: Vec<Rc<str>>,
}

impl Signature {
    /// Create a signature from formal names, in declaration order.
    pub fn new(names: Vec<Rc<str>>) -> Self {
        Self { names }
    }

    /// Convenience constructor from string slices.
    pub fn of(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| Rc::from(*n)).collect(),
        }
    }

    /// Number of formals, including a variadic marker.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether there are no formals.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Formal name at `index`.
    pub fn name(&self, index: usize) -> &Rc<str> {
        &self.names[index]
    }

    /// All formal names.
    pub fn names(&self) -> &[Rc<str>] {
        &self.names
    }

    /// Position of the variadic marker, if the signature has one.
    pub fn vararg_index(&self) -> Option<usize> {
        self.names.iter().position(|n| &**n == VARARG_NAME)
    }
}

/// A user-defined function: formals, body and the defining environment.
#[derive(Debug)]
pub struct RFunction {
    /// Function name for diagnostics and profiling, if known.
    pub name: Option<Rc<str>>,
    /// Formal argument signature.
    pub signature: Signature,
    /// Body expression.
    pub body: Rc<Node>,
    /// Environment the function was defined in.
    pub env: EnvId,
    /// Frame descriptor shared by all activations, created on first call.
    pub descriptor: Cell<Option<FrameDescriptorId>>,
}

impl RFunction {
    /// Create a function value.
    pub fn new(name: Option<Rc<str>>, signature: Signature, body: Rc<Node>, env: EnvId) -> Rc<Self> {
        Rc::new(Self {
            name,
            signature,
            body,
            env,
            descriptor: Cell::new(None),
        })
    }
}

/// Evaluated variadic arguments with their names (the value bound to `...`).
#[derive(Debug, Clone, PartialEq)]
pub struct ArgsAndNames {
    /// Argument values (possibly promises).
    pub values: Vec<Value>,
    /// Supplied names, index-aligned with `values`.
    pub names: Vec<Option<Rc<str>>>,
}

impl ArgsAndNames {
    /// An empty pack.
    pub fn empty() -> Rc<Self> {
        Rc::new(Self {
            values: Vec::new(),
            names: Vec::new(),
        })
    }

    /// Number of packed arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the pack is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Lifecycle state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// Not yet evaluated.
    Unforced,
    /// Evaluation in progress; re-entry is a fatal recursive evaluation.
    Forcing,
    /// Evaluated; the result is cached.
    Forced,
}

/// A lazily evaluated argument.
///
/// The thunk runs exactly once, in the captured environment. The logical
/// caller is recorded when forcing starts and is used to make promise
/// evaluation frames transparent to stack introspection.
#[derive(Debug)]
pub struct PromiseData {
    state: Cell<PromiseState>,
    /// The unevaluated expression.
    pub expr: Rc<Node>,
    /// Environment the expression is evaluated in.
    pub env: EnvId,
    value: RefCell<Option<Value>>,
    eager: Cell<bool>,
    logical_caller: RefCell<Option<Rc<Caller>>>,
}

impl PromiseData {
    /// Create an unforced promise.
    pub fn new(expr: Rc<Node>, env: EnvId, eager: bool) -> Rc<Self> {
        Rc::new(Self {
            state: Cell::new(PromiseState::Unforced),
            expr,
            env,
            value: RefCell::new(None),
            eager: Cell::new(eager),
            logical_caller: RefCell::new(None),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PromiseState {
        self.state.get()
    }

    /// Transition the lifecycle state.
    pub fn set_state(&self, state: PromiseState) {
        self.state.set(state);
    }

    /// Whether the promise has been evaluated.
    pub fn is_forced(&self) -> bool {
        self.state.get() == PromiseState::Forced
    }

    /// The cached result, if forced.
    pub fn forced_value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    /// Store the result of forcing.
    pub fn set_forced_value(&self, value: Value) {
        *self.value.borrow_mut() = Some(value);
        self.state.set(PromiseState::Forced);
    }

    /// Whether the optimizer may elide this promise's slot.
    pub fn is_eager(&self) -> bool {
        self.eager.get()
    }

    /// Mark the promise non-eager so its slot is kept materialized.
    pub fn deoptimize(&self) {
        self.eager.set(false);
    }

    /// The activation the promise logically evaluates in, once forcing has
    /// started.
    pub fn logical_caller(&self) -> Option<Rc<Caller>> {
        self.logical_caller.borrow().clone()
    }

    /// Record the activation the promise logically evaluates in.
    pub fn set_logical_caller(&self, caller: Rc<Caller>) {
        *self.logical_caller.borrow_mut() = Some(caller);
    }
}

/// Represents any Strata runtime value.
///
/// Scalars are stored inline with their NA encodings; aggregates are
/// reference counted. `Language` wraps a syntax tree as a first-class value
/// (the result of `sys.call` and `match.call`).
#[derive(Debug, Clone)]
pub enum Value {
    /// The null value.
    Null,
    /// The missing-argument marker.
    Missing,
    /// The unbound-variable marker.
    Unbound,
    /// NA-aware logical byte.
    Logical(u8),
    /// Integer with the NA sentinel.
    Int(i32),
    /// Double with the NA bit pattern.
    Double(f64),
    /// Complex pair (re, im).
    Complex(f64, f64),
    /// Possibly-NA string.
    Str(Option<Rc<str>>),
    /// Raw byte.
    Raw(u8),
    /// Vector or list with attributes and a share state.
    Vector(Rc<RVector>),
    /// Pairlist node.
    PairList(Rc<PairListCell>),
    /// Symbol (interned name).
    Symbol(Rc<str>),
    /// Environment handle.
    Environment(EnvId),
    /// User-defined function.
    Function(Rc<RFunction>),
    /// Native builtin, dispatched by name.
    NativeFunction(Rc<str>),
    /// Lazily evaluated argument.
    Promise(Rc<PromiseData>),
    /// Evaluated variadic arguments with their names.
    Args(Rc<ArgsAndNames>),
    /// A syntax tree as a value.
    Language(Rc<Node>),
}

impl Value {
    /// Logical value from a bool.
    pub fn logical(b: bool) -> Value {
        Value::Logical(if b { LOGICAL_TRUE } else { LOGICAL_FALSE })
    }

    /// String value from a str.
    pub fn string(s: &str) -> Value {
        Value::Str(Some(Rc::from(s)))
    }

    /// Whether two values are the same object (identity for aggregates,
    /// bitwise equality for inline scalars).
    ///
    /// This is the comparison used by the stable-value protocol for
    /// non-primitive values; doubles compare bitwise so NaN payloads and
    /// signed zeroes are distinct keys.
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Missing, Value::Missing) => true,
            (Value::Unbound, Value::Unbound) => true,
            (Value::Logical(a), Value::Logical(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Complex(ar, ai), Value::Complex(br, bi)) => {
                ar.to_bits() == br.to_bits() && ai.to_bits() == bi.to_bits()
            }
            (Value::Str(a), Value::Str(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b) || a == b,
                _ => false,
            },
            (Value::Raw(a), Value::Raw(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b),
            (Value::PairList(a), Value::PairList(b)) => Rc::ptr_eq(a, b),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Environment(a), Value::Environment(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::NativeFunction(a), Value::NativeFunction(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::Args(a), Value::Args(b)) => Rc::ptr_eq(a, b),
            (Value::Language(a), Value::Language(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether this is a vector value (relevant for allocation accounting).
    pub fn is_vector(&self) -> bool {
        matches!(self, Value::Vector(_))
    }

    /// The type name, as reported to user code.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Missing => "missing",
            Value::Unbound => "unbound",
            Value::Logical(_) => "logical",
            Value::Int(_) => "integer",
            Value::Double(_) => "double",
            Value::Complex(..) => "complex",
            Value::Str(_) => "character",
            Value::Raw(_) => "raw",
            Value::Vector(v) => match v.data {
                VectorData::Logical(_) => "logical",
                VectorData::Int(_) => "integer",
                VectorData::Double(_) => "double",
                VectorData::Complex(_) => "complex",
                VectorData::Str(_) => "character",
                VectorData::Raw(_) => "raw",
                VectorData::List(_) => "list",
            },
            Value::PairList(_) => "pairlist",
            Value::Symbol(_) => "symbol",
            Value::Environment(_) => "environment",
            Value::Function(_) => "closure",
            Value::NativeFunction(_) => "builtin",
            Value::Promise(_) => "promise",
            Value::Args(_) => "...",
            Value::Language(_) => "language",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => self.same_object(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Missing => write!(f, "<missing>"),
            Value::Unbound => write!(f, "<unbound>"),
            Value::Logical(b) => match *b {
                LOGICAL_NA => write!(f, "NA"),
                LOGICAL_FALSE => write!(f, "FALSE"),
                _ => write!(f, "TRUE"),
            },
            Value::Int(i) => {
                if *i == NA_INT {
                    write!(f, "NA")
                } else {
                    write!(f, "{}", i)
                }
            }
            Value::Double(d) => {
                if is_na_real(*d) {
                    write!(f, "NA")
                } else {
                    write!(f, "{}", d)
                }
            }
            Value::Complex(re, im) => write!(f, "{}+{}i", re, im),
            Value::Str(s) => match s {
                None => write!(f, "NA"),
                Some(s) => write!(f, "\"{}\"", s),
            },
            Value::Raw(b) => write!(f, "{:02x}", b),
            Value::Vector(v) => write!(f, "<{} vector[{}]>", self.type_name(), v.data.len()),
            Value::PairList(_) => write!(f, "<pairlist>"),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Environment(id) => write!(f, "<environment {}>", id.0),
            Value::Function(func) => match &func.name {
                Some(name) => write!(f, "function {}", name),
                None => write!(f, "<function>"),
            },
            Value::NativeFunction(name) => write!(f, "<builtin {}>", name),
            Value::Promise(_) => write!(f, "<promise>"),
            Value::Args(args) => write!(f, "<... [{}]>", args.len()),
            Value::Language(_) => write!(f, "<language>"),
        }
    }
}

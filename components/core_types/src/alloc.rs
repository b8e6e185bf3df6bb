//! Value allocation, size accounting and allocation/copy listeners.
//!
//! The data factory is the single place new aggregate values come from, so
//! instrumentation (the memory profiler) can observe every allocation by
//! registering a listener. Copy events are reported by whoever performs a
//! copy-on-write duplication.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{RVector, Value, VectorData};

/// Vectors at or above this size (in bytes) are accounted in the
/// large-vector bucket.
pub const LARGE_VECTOR_THRESHOLD: u64 = 128;

/// Fixed per-value header cost used by the size accounting.
const HEADER_SIZE: u64 = 40;

/// Observer of allocation and copy events.
pub trait AllocationListener {
    /// A new value has been allocated.
    fn report_allocation(&self, value: &Value);
    /// `source` has been copied (copy-on-write or explicit duplication).
    fn report_copying(&self, source: &Value);
}

/// Handle for deregistering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(usize);

/// Creates aggregate values and reports them to registered listeners.
pub struct DataFactory {
    listeners: RefCell<Vec<(ListenerId, Rc<dyn AllocationListener>)>>,
    next_id: RefCell<usize>,
}

impl DataFactory {
    /// Create a factory with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: RefCell::new(0),
        }
    }

    /// Register a listener; returns a handle for removal.
    pub fn add_listener(&self, listener: Rc<dyn AllocationListener>) -> ListenerId {
        let mut next = self.next_id.borrow_mut();
        let id = ListenerId(*next);
        *next += 1;
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Deregister a previously added listener.
    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    /// Report an externally allocated value to all listeners.
    pub fn report_allocation(&self, value: &Value) {
        for (_, listener) in self.listeners.borrow().iter() {
            listener.report_allocation(value);
        }
    }

    /// Report a copy of `source` to all listeners.
    pub fn report_copying(&self, source: &Value) {
        for (_, listener) in self.listeners.borrow().iter() {
            listener.report_copying(source);
        }
    }

    /// Allocate a vector value and report it.
    pub fn new_vector(&self, data: VectorData) -> Value {
        let value = Value::Vector(Rc::new(RVector::new(data)));
        self.report_allocation(&value);
        value
    }

    /// Allocate a double vector of `length` zeros and report it.
    pub fn new_double_vector(&self, length: usize) -> Value {
        self.new_vector(VectorData::Double(vec![0.0; length]))
    }

    /// Duplicate a vector value, reporting the copy.
    pub fn duplicate(&self, source: &Value) -> Value {
        match source {
            Value::Vector(v) => {
                self.report_copying(source);
                let copy = Value::Vector(Rc::new(RVector::new(v.data.clone())));
                self.report_allocation(&copy);
                copy
            }
            other => other.clone(),
        }
    }
}

impl Default for DataFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Approximate heap size of a value in bytes.
///
/// Scalars count as one header; vectors add their element storage. The
/// numbers only need to be stable, not exact: the profiler reports deltas
/// of this measure.
pub fn object_size(value: &Value) -> u64 {
    match value {
        Value::Vector(v) => {
            let payload = match &v.data {
                VectorData::Logical(d) => d.len() as u64,
                VectorData::Int(d) => d.len() as u64 * 4,
                VectorData::Double(d) => d.len() as u64 * 8,
                VectorData::Complex(d) => d.len() as u64 * 16,
                VectorData::Str(d) => d
                    .iter()
                    .map(|s| s.as_ref().map_or(0, |s| s.len() as u64) + 16)
                    .sum(),
                VectorData::Raw(d) => d.len() as u64,
                VectorData::List(d) => d.iter().map(object_size).sum(),
            };
            HEADER_SIZE + payload
        }
        Value::PairList(cell) => {
            let mut size = HEADER_SIZE + object_size(&cell.car.borrow());
            if let Value::PairList(_) = &*cell.cdr.borrow() {
                size += object_size(&cell.cdr.borrow());
            }
            size
        }
        Value::Str(s) => HEADER_SIZE + s.as_ref().map_or(0, |s| s.len() as u64),
        _ => HEADER_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingListener {
        allocations: Cell<u64>,
        copies: Cell<u64>,
    }

    impl AllocationListener for CountingListener {
        fn report_allocation(&self, _value: &Value) {
            self.allocations.set(self.allocations.get() + 1);
        }

        fn report_copying(&self, _source: &Value) {
            self.copies.set(self.copies.get() + 1);
        }
    }

    #[test]
    fn test_listener_receives_allocations() {
        let factory = DataFactory::new();
        let listener = Rc::new(CountingListener {
            allocations: Cell::new(0),
            copies: Cell::new(0),
        });
        let id = factory.add_listener(listener.clone());
        factory.new_double_vector(4);
        assert_eq!(listener.allocations.get(), 1);

        factory.remove_listener(id);
        factory.new_double_vector(4);
        assert_eq!(listener.allocations.get(), 1);
    }

    #[test]
    fn test_duplicate_reports_copy_then_allocation() {
        let factory = DataFactory::new();
        let listener = Rc::new(CountingListener {
            allocations: Cell::new(0),
            copies: Cell::new(0),
        });
        factory.add_listener(listener.clone());
        let source = factory.new_double_vector(2);
        let copy = factory.duplicate(&source);
        assert_eq!(listener.copies.get(), 1);
        assert_eq!(listener.allocations.get(), 2);
        assert!(!source.same_object(&copy));
    }

    #[test]
    fn test_object_size_scales_with_length() {
        let factory = DataFactory::new();
        let small = factory.new_double_vector(2);
        let large = factory.new_double_vector(100);
        assert!(object_size(&small) < LARGE_VECTOR_THRESHOLD);
        assert!(object_size(&large) >= LARGE_VECTOR_THRESHOLD);
        assert_eq!(object_size(&large), HEADER_SIZE + 800);
    }

    #[test]
    fn test_scalar_size_is_header_only() {
        assert_eq!(object_size(&Value::Int(1)), HEADER_SIZE);
        assert_eq!(object_size(&Value::Null), HEADER_SIZE);
    }
}

//! A handful of base-library builtins used by workloads and tests.

use core_types::{ErrorKind, RResult, RuntimeError, Value};
use frame_store::Frame;
use interpreter::{Builtin, Interpreter};

use crate::args::{named_or_pos, BuiltinArgs};

/// `numeric(length)`: a double vector of zeros.
pub struct Numeric;

impl Builtin for Numeric {
    fn call(&self, interp: &mut Interpreter, _frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let length = match named_or_pos(args, "length", 0) {
            None => 0,
            Some(Value::Int(i)) if *i >= 0 => *i as usize,
            Some(Value::Double(d)) if *d >= 0.0 => *d as usize,
            Some(_) => return Err(RuntimeError::invalid_argument("length")),
        };
        Ok(interp.ctx().data_factory().new_double_vector(length))
    }
}

/// `duplicate(x)`: an explicit copy, reported to the copy tracer.
pub struct Duplicate;

impl Builtin for Duplicate {
    fn call(&self, interp: &mut Interpreter, _frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let value = named_or_pos(args, "x", 0)
            .ok_or_else(|| RuntimeError::invalid_argument("x"))?;
        Ok(interp.ctx().data_factory().duplicate(value))
    }
}

/// Scalar numeric addition.
pub struct Add;

impl Builtin for Add {
    fn call(&self, _interp: &mut Interpreter, _frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let lhs = named_or_pos(args, "e1", 0).ok_or_else(|| RuntimeError::invalid_argument("e1"))?;
        let rhs = named_or_pos(args, "e2", 1).ok_or_else(|| RuntimeError::invalid_argument("e2"))?;
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::Int(a), Value::Double(b)) => Ok(Value::Double(*a as f64 + b)),
            (Value::Double(a), Value::Int(b)) => Ok(Value::Double(a + *b as f64)),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
            _ => Err(RuntimeError::new(
                ErrorKind::InvalidMode,
                "non-numeric argument to binary operator",
            )),
        }
    }
}

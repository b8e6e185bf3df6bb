//! Builtin argument extraction helpers.

use std::rc::Rc;

use core_types::{RResult, RuntimeError, Value, LOGICAL_NA};

/// Evaluated builtin arguments with their supplied names.
pub type BuiltinArgs = [(Option<Rc<str>>, Value)];

/// Fetch an argument by supplied name, falling back to its position.
pub fn named_or_pos<'a>(args: &'a BuiltinArgs, name: &str, pos: usize) -> Option<&'a Value> {
    for (supplied, value) in args {
        if supplied.as_deref() == Some(name) {
            return Some(value);
        }
    }
    let mut index = 0;
    for (supplied, value) in args {
        if supplied.is_none() {
            if index == pos {
                return Some(value);
            }
            index += 1;
        }
    }
    None
}

/// Extract an integer argument, defaulting when absent.
pub fn int_arg_or(args: &BuiltinArgs, name: &str, pos: usize, default: i32) -> RResult<i32> {
    match named_or_pos(args, name, pos) {
        None => Ok(default),
        Some(Value::Int(i)) => Ok(*i),
        Some(Value::Double(d)) => Ok(*d as i32),
        Some(_) => Err(RuntimeError::invalid_argument(name)),
    }
}

/// Extract a logical argument, defaulting when absent. NA is an error.
pub fn logical_arg_or(args: &BuiltinArgs, name: &str, pos: usize, default: bool) -> RResult<bool> {
    match named_or_pos(args, name, pos) {
        None => Ok(default),
        Some(Value::Logical(b)) if *b != LOGICAL_NA => Ok(*b != 0),
        Some(_) => Err(RuntimeError::invalid_argument(name)),
    }
}

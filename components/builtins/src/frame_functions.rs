//! Stack introspection builtins.
//!
//! The frame for the sys functions themselves is not counted: frames are
//! numbered 0, 1, .. starting from the global environment, non-negative
//! arguments are frame numbers, negative arguments are relative to the
//! current frame.
//!
//! The main distinction is between `sys.parent` and `sys.frame`:
//! `sys.parent` follows the *logical* parent relation of the activation
//! records, which is not necessarily the frame preceding the current frame
//! on the call stack, while `sys.frame(n)` selects by absolute frame
//! number and ignores the parent relation entirely.

use std::rc::Rc;

use core_types::{Caller, ErrorKind, PairListCell, RResult, RuntimeError, Value, VectorData};
use frame_store::Frame;
use interpreter::{deoptimize_frame, Builtin, Interpreter};

use crate::args::{int_arg_or, BuiltinArgs};

/// Shared frame-number decoding and numbered-frame access.
pub struct FrameHelper;

impl FrameHelper {
    /// Handle `n > 0` and `n <= 0` and errors relating to stack depth.
    /// `current` is the introspection builtin's own activation; its frame
    /// is not counted.
    pub fn decode_frame_number(current: &Rc<Caller>, n: i32) -> RResult<u32> {
        let call = current
            .previous()
            .ok_or_else(RuntimeError::not_that_many_frames)?;
        let call = Caller::unwrap_promise_caller(&call);
        let depth = call.depth() as i32;
        if n > 0 {
            if n > depth {
                return Err(RuntimeError::not_that_many_frames());
            }
            Ok(n as u32)
        } else {
            if -n > depth {
                return Err(RuntimeError::not_that_many_frames());
            }
            Ok((depth + n) as u32)
        }
    }

    /// The frame selected by `which`, counted as `decode_frame_number`.
    pub fn get_numbered_frame(interp: &Interpreter, frame: &Frame, which: i32) -> RResult<Frame> {
        let depth = Self::decode_frame_number(&frame.call(), which)?;
        interp
            .get_numbered_frame(depth)
            .ok_or_else(RuntimeError::not_that_many_frames)
    }

    /// The environment view of a frame, marking it user-held.
    pub fn frame_to_environment(interp: &Interpreter, frame: &Frame) -> Value {
        Value::Environment(interp.ctx().environments().materialize(frame))
    }
}

/// `sys.call(which)`: the call of the selected activation.
///
/// Preserves provided argument names but does not create them, unlike
/// `match.call`.
pub struct SysCall;

impl Builtin for SysCall {
    fn call(&self, interp: &mut Interpreter, frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let which = int_arg_or(args, "which", 0, 0)?;
        let target = FrameHelper::get_numbered_frame(interp, frame, which)?;
        let call = target.call();
        debug_assert!(!call.is_promise());
        match call.syntax() {
            Some(node) if call.is_valid() => Ok(Value::Language(node)),
            _ => Ok(Value::Null),
        }
    }
}

/// `sys.frame(which)`: the environment of the numbered frame.
pub struct SysFrame;

impl Builtin for SysFrame {
    fn call(&self, interp: &mut Interpreter, frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let which = int_arg_or(args, "which", 0, 0)?;
        let result = if which == 0 {
            let global = interp.ctx().global_frame();
            FrameHelper::frame_to_environment(interp, &global)
        } else {
            let target = FrameHelper::get_numbered_frame(interp, frame, which)?;
            // Deoptimize every promise now in this frame, as it might
            // leave its stack.
            deoptimize_frame(&target.arguments());
            FrameHelper::frame_to_environment(interp, &target)
        };
        Ok(result)
    }
}

/// `sys.frames()`: the list of all frame environments, outermost first.
pub struct SysFrames;

impl Builtin for SysFrames {
    fn call(&self, interp: &mut Interpreter, frame: &Frame, _args: &BuiltinArgs) -> RResult<Value> {
        let depth = frame.call().depth();
        if depth <= 1 {
            return Ok(Value::Null);
        }
        let mut items = Vec::new();
        for i in 1..depth {
            let target = interp
                .get_numbered_frame(i)
                .ok_or_else(RuntimeError::not_that_many_frames)?;
            deoptimize_frame(&target.arguments());
            items.push((None, FrameHelper::frame_to_environment(interp, &target)));
        }
        Ok(PairListCell::from_items(items))
    }
}

/// `sys.nframe()`: the number of the current frame.
pub struct SysNFrame;

impl Builtin for SysNFrame {
    fn call(&self, _interp: &mut Interpreter, frame: &Frame, _args: &BuiltinArgs) -> RResult<Value> {
        let current = Caller::unwrap_promise_caller(&frame.call());
        let call = current
            .previous()
            .map(|p| Caller::unwrap_promise_caller(&p));
        Ok(Value::Int(call.map_or(0, |c| c.depth() as i32)))
    }
}

/// `sys.parent(n)`: the number of the n-th logical parent frame.
pub struct SysParent;

impl Builtin for SysParent {
    fn call(&self, _interp: &mut Interpreter, frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let n = int_arg_or(args, "n", 0, 1)?;
        let original = frame.call();
        let unwrapped = Caller::unwrap_promise_caller(&original);
        let Some(previous) = unwrapped.previous() else {
            return Ok(Value::Int(0));
        };
        let call = Caller::unwrap_promise_caller(&previous);
        if n <= 0 {
            // Undocumented but relied upon: n <= 0 answers the current
            // frame number.
            return Ok(Value::Int(call.depth() as i32));
        }

        let mut prev_call = call.clone();
        let mut current = Some(call);
        let mut i = 0;
        while i < n {
            let Some(c) = current else {
                return Ok(Value::Int(0));
            };
            if !c.is_valid() && !c.is_non_function_parent() {
                return Ok(Value::Int(0));
            }
            if c.is_non_function_parent() {
                // For environments that are not function frames, the depth
                // of the last function frame encountered is used.
                return Ok(Value::Int(prev_call.depth() as i32));
            }
            // An artificial promise-evaluation record stands for the frame
            // the promise logically evaluates in; follow its payload to
            // the real activation before taking the parent.
            let c = Caller::unwrap_promise_caller(&c);
            prev_call = c.clone();
            current = c.parent();
            i += 1;
        }
        let Some(c) = current else {
            return Ok(Value::Int(0));
        };
        if !c.is_valid() && !c.is_non_function_parent() {
            return Ok(Value::Int(0));
        }
        if c.is_non_function_parent() {
            return Ok(Value::Int(prev_call.depth() as i32));
        }
        let c = Caller::unwrap_promise_caller(&c);
        Ok(Value::Int(c.depth() as i32))
    }
}

/// `sys.parents()`: the vector of parent frame numbers for all frames.
pub struct SysParents;

impl Builtin for SysParents {
    fn call(&self, interp: &mut Interpreter, frame: &Frame, _args: &BuiltinArgs) -> RResult<Value> {
        let unwrapped = Caller::unwrap_promise_caller(&frame.call());
        let Some(previous) = unwrapped.previous() else {
            return Ok(int_vector(interp, Vec::new()));
        };
        let call = Caller::unwrap_promise_caller(&previous);
        if !call.is_valid() {
            // Called at the top level.
            return Ok(int_vector(interp, Vec::new()));
        }

        let mut depths = Vec::new();
        let mut current = Some(call);
        while let Some(c) = current {
            if !c.is_valid() {
                break;
            }
            match c.parent() {
                Some(parent) if parent.is_non_function_parent() => {
                    depths.push(c.depth() as i32);
                }
                Some(parent) => {
                    let parent = Caller::unwrap_promise_caller(&parent);
                    depths.push(parent.depth() as i32);
                }
                None => break,
            }
            // Jump to the next real frame on the evaluation stack, not to
            // the logical parent.
            current = c.previous().map(|p| Caller::unwrap_previous(&p));
        }
        depths.reverse();
        Ok(int_vector(interp, depths))
    }
}

/// `sys.calls()`: the calls of all valid activations, outermost first.
pub struct SysCalls;

impl Builtin for SysCalls {
    fn call(&self, _interp: &mut Interpreter, frame: &Frame, _args: &BuiltinArgs) -> RResult<Value> {
        let unwrapped = Caller::unwrap_promise_caller(&frame.call());
        let Some(previous) = unwrapped.previous() else {
            return Ok(Value::Null);
        };
        let call = Caller::unwrap_promise_caller(&previous);
        if call.depth() == 0 {
            return Ok(Value::Null);
        }
        let mut result = Value::Null;
        Caller::iterate_callers(&call, |c| {
            if c.is_valid() {
                if let Some(syntax) = c.syntax() {
                    let cell = PairListCell::new(Value::Language(syntax));
                    *cell.cdr.borrow_mut() = result.clone();
                    result = Value::PairList(cell);
                }
            }
        });
        Ok(result)
    }
}

/// `sys.function(which)`: the function of the numbered frame.
///
/// `which == 0` selects the current function.
pub struct SysFunction;

impl Builtin for SysFunction {
    fn call(&self, interp: &mut Interpreter, frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let which = int_arg_or(args, "which", 0, 0)?;
        let target = FrameHelper::get_numbered_frame(interp, frame, which)?;
        match target.function() {
            Some(func) => Ok(Value::Function(func)),
            None => Ok(Value::Null),
        }
    }
}

/// `parent.frame(n)`: the environment of the caller of the function that
/// called `parent.frame`.
pub struct ParentFrame;

impl Builtin for ParentFrame {
    fn call(&self, interp: &mut Interpreter, frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let n = int_arg_or(args, "n", 0, 1)?;
        if n <= 0 {
            return Err(RuntimeError::new(
                ErrorKind::InvalidArgument,
                "invalid value for 'n'",
            ));
        }
        // Substitute semantics: operate as if evaluated in the caller's
        // frame, without counting this builtin's own activation.
        let caller_frame = frame
            .caller_frame()
            .ok_or_else(|| RuntimeError::new(ErrorKind::Internal, "missing caller frame"))?;
        let original = caller_frame.call();

        let mut current = Some(Caller::unwrap_promise_caller(&original));
        let mut i = 0;
        while i < n {
            let Some(c) = current else {
                return Ok(global_environment(interp));
            };
            if !c.is_valid() && !c.is_non_function_parent() {
                return Ok(global_environment(interp));
            }
            // Promise-evaluation records are transparent: follow the
            // payload to the activation the promise logically runs in.
            let c = Caller::unwrap_promise_caller(&c);
            current = c.parent();
            i += 1;
        }
        let Some(c) = current else {
            return Ok(global_environment(interp));
        };
        if !c.is_valid() && !c.is_non_function_parent() {
            return Ok(global_environment(interp));
        }
        if let Some(env) = Caller::unwrap_sys_parent(&c) {
            return Ok(Value::Environment(env));
        }
        let c = Caller::unwrap_promise_caller(&c);
        // If the parent frame is the caller frame, the cached caller-frame
        // pointer avoids the numbered walk.
        if original.depth() == c.depth() + 1 {
            if let Some(cf) = caller_frame.caller_frame() {
                return Ok(FrameHelper::frame_to_environment(interp, &cf));
            }
        }
        let target = interp
            .get_numbered_frame(c.depth())
            .ok_or_else(RuntimeError::not_that_many_frames)?;
        Ok(FrameHelper::frame_to_environment(interp, &target))
    }
}

fn int_vector(interp: &Interpreter, data: Vec<i32>) -> Value {
    interp.ctx().data_factory().new_vector(VectorData::Int(data))
}

fn global_environment(interp: &Interpreter) -> Value {
    let global = interp.ctx().global_frame();
    Value::Environment(interp.ctx().environments().materialize(&global))
}

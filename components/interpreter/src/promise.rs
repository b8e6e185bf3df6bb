//! Promise forcing and frame deoptimization.
//!
//! A promise's thunk runs exactly once, in the captured environment, under
//! an artificial promise-evaluation activation whose payload is the
//! activation the promise logically evaluates in. Stack introspection
//! unwraps through that record, so `sys.parent` and friends see the
//! logical caller rather than the forcing site.

use std::rc::Rc;

use core_types::{
    Caller, ErrorKind, PromiseData, PromiseState, RResult, RuntimeError, Value,
};

use crate::eval::Interpreter;

/// Force a promise, returning its value.
///
/// Re-entry while the promise is already forcing is a fatal recursive
/// evaluation. On any evaluation failure the promise is reset to unforced
/// before the error propagates, so no promise is ever left in the forcing
/// state.
pub fn force_promise(interp: &mut Interpreter, promise: &Rc<PromiseData>) -> RResult<Value> {
    match promise.state() {
        PromiseState::Forced => Ok(promise.forced_value().unwrap_or(Value::Null)),
        PromiseState::Forcing => Err(RuntimeError::new(
            ErrorKind::RecursivePromise,
            "promise already under evaluation: recursive default argument reference or earlier problems?",
        )),
        PromiseState::Unforced => {
            let env_frame = interp
                .ctx()
                .environments()
                .frame(promise.env)
                .ok_or_else(|| {
                    RuntimeError::new(ErrorKind::Internal, "promise environment no longer exists")
                })?;
            promise.set_state(PromiseState::Forcing);
            let logical_caller = env_frame.call();
            promise.set_logical_caller(logical_caller.clone());

            let record = Caller::promise_evaluation(interp.current_call(), logical_caller);
            interp.push_activation(env_frame.clone(), record);
            let result = interp.eval(&promise.expr.clone(), &env_frame);
            interp.pop_activation();

            match result {
                Ok(value) => {
                    promise.set_forced_value(value.clone());
                    Ok(value)
                }
                Err(err) => {
                    promise.set_state(PromiseState::Unforced);
                    Err(err)
                }
            }
        }
    }
}

/// Force a value if it is a promise; other values pass through.
pub fn force_value(interp: &mut Interpreter, value: Value) -> RResult<Value> {
    match value {
        Value::Promise(promise) => force_promise(interp, &promise),
        other => Ok(other),
    }
}

/// Mark every still-unforced eager promise among `arguments` as non-eager,
/// so the optimizer will not elide its slot once the frame is exposed to
/// user code.
pub fn deoptimize_frame(arguments: &[Value]) {
    for value in arguments {
        if let Value::Promise(promise) = value {
            if !promise.is_forced() && promise.is_eager() {
                promise.deoptimize();
            }
        }
    }
}

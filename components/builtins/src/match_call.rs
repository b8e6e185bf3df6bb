//! `match.call`: rebuild a call with fully qualified arguments.
//!
//! Unlike `sys.call`, named arguments are re-ordered to match the formal
//! signature and names are created for positionally matched arguments.
//! `...` complicates this twice over: with `expand.dots = FALSE` the
//! variadic arguments are wrapped in a pairlist, and an argument that is
//! itself `...` has its values retrieved from the environment of the
//! caller of the function containing the `match.call`.

use std::rc::Rc;

use core_types::{
    Argument, ErrorKind, Node, NodeKind, PairListCell, RResult, RuntimeError, Value, VARARG_NAME,
};
use frame_store::{Frame, SlotValue};
use interpreter::{match_arguments, Builtin, Interpreter, MatchedArg, SuppliedArg, SuppliedPayload};

use crate::args::{logical_arg_or, named_or_pos, BuiltinArgs};

/// The `match.call(definition, call, expand.dots, envir)` builtin.
pub struct MatchCall;

impl Builtin for MatchCall {
    fn call(&self, interp: &mut Interpreter, frame: &Frame, args: &BuiltinArgs) -> RResult<Value> {
        let caller_frame = frame
            .caller_frame()
            .ok_or_else(|| RuntimeError::new(ErrorKind::Internal, "missing caller frame"))?;

        let definition = match named_or_pos(args, "definition", 0) {
            Some(Value::Function(func)) => func.clone(),
            Some(Value::Null) | None => caller_frame.function().ok_or_else(|| {
                RuntimeError::new(ErrorKind::InvalidArgument, "match.call called from outside a function")
            })?,
            Some(_) => return Err(RuntimeError::invalid_argument("definition")),
        };

        let call_node = match named_or_pos(args, "call", 1) {
            Some(Value::Language(node)) => node.clone(),
            Some(Value::Null) | None => caller_frame.call().syntax().ok_or_else(|| {
                RuntimeError::new(ErrorKind::InvalidArgument, "match.call called from outside a function")
            })?,
            Some(_) => return Err(RuntimeError::invalid_argument("call")),
        };

        let expand_dots = logical_arg_or(args, "expand.dots", 2, true)?;

        let env_frame = match named_or_pos(args, "envir", 3) {
            Some(Value::Environment(env)) => interp
                .ctx()
                .environments()
                .frame(*env)
                .ok_or_else(|| RuntimeError::new(ErrorKind::MustBeEnviron, "'envir' must be an environment"))?,
            None => caller_frame.clone(),
            Some(_) => {
                return Err(RuntimeError::new(
                    ErrorKind::MustBeEnviron,
                    "'envir' must be an environment",
                ))
            }
        };

        let NodeKind::Call {
            function,
            args: call_args,
        } = &call_node.kind
        else {
            return Err(RuntimeError::invalid_argument("call"));
        };

        // Expand any `...` among the supplied arguments against the
        // variadic binding of the matching environment; promises expand to
        // their expressions.
        let mut supplied = Vec::with_capacity(call_args.len());
        for arg in call_args {
            if matches!(arg.value.kind, NodeKind::Varargs) {
                for (name, node) in variadic_expressions(interp, &env_frame)? {
                    supplied.push(SuppliedArg {
                        name,
                        payload: SuppliedPayload::Expr(node),
                    });
                }
            } else if matches!(arg.value.kind, NodeKind::MissingArg) {
                // Nothing to do for empty positions.
            } else {
                supplied.push(SuppliedArg {
                    name: arg.name.clone(),
                    payload: SuppliedPayload::Expr(arg.value.clone()),
                });
            }
        }

        let matched = match_arguments(&definition.signature, &supplied)?;

        let mut new_args: Vec<Argument> = Vec::new();
        for (i, matched_arg) in matched.into_iter().enumerate() {
            let formal = definition.signature.name(i).clone();
            match matched_arg {
                MatchedArg::Missing => {}
                MatchedArg::Supplied(arg) => {
                    // A user-supplied spelling that collides with the
                    // positional match is kept as written.
                    let name = arg.name.clone().unwrap_or(formal);
                    new_args.push(Argument {
                        name: Some(name),
                        value: argument_expression(&arg),
                    });
                }
                MatchedArg::Varargs(items) if expand_dots => {
                    for item in items {
                        new_args.push(Argument {
                            name: item.name.clone(),
                            value: argument_expression(&item),
                        });
                    }
                }
                MatchedArg::Varargs(items) => {
                    if items.is_empty() {
                        continue;
                    }
                    // The unexpanded arguments are wrapped as a pairlist,
                    // not a list.
                    let cells = items
                        .iter()
                        .map(|item| {
                            (
                                item.name.clone(),
                                Value::Language(argument_expression(item)),
                            )
                        })
                        .collect::<Vec<_>>();
                    new_args.push(Argument {
                        name: Some(Rc::from(VARARG_NAME)),
                        value: Node::constant(PairListCell::from_items(cells)),
                    });
                }
            }
        }

        Ok(Value::Language(Node::call(function.clone(), new_args)))
    }
}

/// The expressions behind the variadic binding of `frame`, in pack order.
fn variadic_expressions(
    interp: &Interpreter,
    frame: &Frame,
) -> RResult<Vec<(Option<Rc<str>>, Rc<Node>)>> {
    let Some(slot) = interp
        .ctx()
        .monitor()
        .find_slot(frame.descriptor(), VARARG_NAME)
    else {
        return Ok(Vec::new());
    };
    let SlotValue::Plain(Value::Args(pack)) = interp.ctx().monitor().get_value(frame, slot) else {
        return Ok(Vec::new());
    };
    let mut result = Vec::with_capacity(pack.len());
    for (name, value) in pack.names.iter().zip(pack.values.iter()) {
        let node = match value {
            Value::Promise(promise) => promise.expr.clone(),
            other => Node::constant(other.clone()),
        };
        result.push((name.clone(), node));
    }
    Ok(result)
}

fn argument_expression(arg: &SuppliedArg) -> Rc<Node> {
    match &arg.payload {
        SuppliedPayload::Expr(node) => node.clone(),
        SuppliedPayload::Value(Value::Promise(promise)) => promise.expr.clone(),
        SuppliedPayload::Value(other) => Node::constant(other.clone()),
    }
}

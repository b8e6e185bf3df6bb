//! Promise lifecycle across the caller chain.
//!
//! Tests cover:
//! - force-once semantics with observable side effects
//! - recursive promise evaluation failing and resetting state
//! - depth bookkeeping across promise evaluation frames

use std::rc::Rc;

use core_types::{Caller, ErrorKind, Node, PromiseData, PromiseState, RResult, Value};
use frame_store::Frame;
use integration_tests::{as_int, define_function, fresh_interpreter};
use interpreter::{Builtin, Interpreter};

#[test]
fn test_promise_thunk_runs_exactly_once() {
    // count <- 0; f <- function(a) { a; a; a }; f({count <<- count + 1; 42})
    let (_ctx, mut interp) = fresh_interpreter();
    let side_effect = Node::block(vec![
        Node::assign(
            "count",
            Node::call_named(
                "+",
                vec![
                    Node::arg(Node::lookup("count")),
                    Node::arg(Node::constant(Value::Int(1))),
                ],
            ),
            true,
        ),
        Node::constant(Value::Int(42)),
    ]);
    let body = Node::block(vec![
        Node::lookup("a"),
        Node::lookup("a"),
        Node::lookup("a"),
    ]);
    let program = vec![
        Node::assign("count", Node::constant(Value::Int(0)), false),
        define_function("f", &["a"], body),
        Node::call_named("f", vec![Node::arg(side_effect)]),
        Node::lookup("count"),
    ];
    assert_eq!(as_int(&interp.eval_program(&program).unwrap()), 1);
}

#[test]
fn test_recursive_promise_fails_and_resets() {
    // A binding holding a promise whose expression reads the binding
    // itself: forcing must fail and leave the promise unforced.
    let (ctx, mut interp) = fresh_interpreter();
    let global = ctx.global_frame();
    let promise = PromiseData::new(Node::lookup("x"), ctx.global_env(), false);
    let slot = ctx
        .monitor()
        .find_or_add_slot(global.descriptor(), "x", frame_store::SlotKind::Object);
    ctx.monitor().set_object_and_invalidate(
        &global,
        slot,
        Value::Promise(promise.clone()),
        false,
    );

    let err = interp.eval_program(&[Node::lookup("x")]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RecursivePromise);
    assert_eq!(promise.state(), PromiseState::Unforced);
}

#[test]
fn test_unforced_argument_promise_stays_unforced() {
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function("f", &["a"], Node::constant(Value::Int(1))),
        Node::call_named("f", vec![Node::arg(Node::lookup("never.bound"))]),
    ];
    assert_eq!(as_int(&interp.eval_program(&program).unwrap()), 1);
}

#[test]
fn test_depth_invariants_across_promise_frames() {
    // Check depth monotonicity of the whole dynamic stack from inside a
    // function reached through a promise evaluation.
    struct CheckDepths;
    impl Builtin for CheckDepths {
        fn call(
            &self,
            interp: &mut Interpreter,
            _frame: &Frame,
            _args: &[(Option<Rc<str>>, Value)],
        ) -> RResult<Value> {
            let entries = interp.stack().entries();
            for pair in entries.windows(2) {
                let previous = pair[0].call.depth();
                let current = pair[1].call.depth();
                assert!(previous <= current && current <= previous + 1);
                if pair[1].call.is_promise() {
                    assert_eq!(current, previous);
                }
            }
            for entry in entries {
                let unwrapped = Caller::unwrap_promise_caller(&entry.call);
                let twice = Caller::unwrap_promise_caller(&unwrapped);
                assert!(Rc::ptr_eq(&unwrapped, &twice));
            }
            Ok(Value::Null)
        }
    }

    let (ctx, mut interp) = fresh_interpreter();
    ctx.register_builtin("check.depths", Rc::new(CheckDepths));
    let slot = ctx.monitor().find_or_add_slot(
        ctx.global_frame().descriptor(),
        "check.depths",
        frame_store::SlotKind::Object,
    );
    ctx.monitor().set_object_and_invalidate(
        &ctx.global_frame(),
        slot,
        Value::NativeFunction(Rc::from("check.depths")),
        false,
    );

    // f(g()) forces the promise inside f; g runs under a promise frame.
    let program = vec![
        define_function("g", &[], Node::call_named("check.depths", vec![])),
        define_function("f", &["a"], Node::lookup("a")),
        Node::call_named("f", vec![Node::arg(Node::call_named("g", vec![]))]),
    ];
    interp.eval_program(&program).unwrap();
}

#[test]
fn test_forced_promise_value_becomes_visible_to_stable_lookup() {
    // A promise bound on the search path is returned by lookups; once
    // forced, the cached stable value unwraps to the result.
    let (ctx, mut interp) = fresh_interpreter();
    let global = ctx.global_frame();
    let promise = PromiseData::new(Node::constant(Value::Int(31)), ctx.global_env(), false);
    let slot = ctx
        .monitor()
        .find_or_add_slot(global.descriptor(), "lazy", frame_store::SlotKind::Object);
    ctx.monitor().set_object_and_invalidate(
        &global,
        slot,
        Value::Promise(promise.clone()),
        false,
    );

    assert_eq!(as_int(&interp.eval_program(&[Node::lookup("lazy")]).unwrap()), 31);
    assert!(promise.is_forced());

    // The stable value still holds the promise; readers unwrap it.
    let result = ctx.monitor().lookup(&global, "lazy").expect("cacheable");
    assert_eq!(result.stable_value().unwrap(), Some(Value::Int(31)));

    assert_eq!(as_int(&interp.eval_program(&[Node::lookup("lazy")]).unwrap()), 31);
}

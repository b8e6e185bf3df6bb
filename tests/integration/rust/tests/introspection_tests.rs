//! Stack introspection builtins across real call stacks.
//!
//! Tests cover:
//! - sys.parent through promise evaluation frames
//! - sys.nframe / sys.frame round trips
//! - parent.frame agreement with sys.frame(sys.parent(1))
//! - sys.function, sys.calls and sys.parents
//! - promise deoptimization when frames are exposed

use std::cell::RefCell;
use std::rc::Rc;

use core_types::{ErrorKind, Node, NodeKind, RResult, Value};
use frame_store::Frame;
use integration_tests::{as_int, define_function, fresh_interpreter};
use interpreter::{Builtin, Interpreter};

#[test]
fn test_sys_parent_through_promise() {
    // f <- function(a) a; g <- function() sys.parent(1); f(g())
    // The promise for `a` evaluates logically in f's caller, so sys.parent
    // from g sees the global activation, not f and not a promise frame.
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function("f", &["a"], Node::lookup("a")),
        define_function(
            "g",
            &[],
            Node::call_named("sys.parent", vec![Node::arg(Node::constant(Value::Int(1)))]),
        ),
        Node::call_named("f", vec![Node::arg(Node::call_named("g", vec![]))]),
    ];
    assert_eq!(as_int(&interp.eval_program(&program).unwrap()), 0);
}

#[test]
fn test_sys_parent_of_directly_nested_call() {
    // g called by f: sys.parent(1) in g is f's frame number.
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function(
            "g",
            &[],
            Node::call_named("sys.parent", vec![Node::arg(Node::constant(Value::Int(1)))]),
        ),
        define_function("f", &[], Node::call_named("g", vec![])),
        Node::call_named("f", vec![]),
    ];
    assert_eq!(as_int(&interp.eval_program(&program).unwrap()), 1);
}

#[test]
fn test_sys_nframe_counts_user_frames() {
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function("g", &[], Node::call_named("sys.nframe", vec![])),
        define_function("f", &[], Node::call_named("g", vec![])),
        Node::call_named("f", vec![]),
    ];
    assert_eq!(as_int(&interp.eval_program(&program).unwrap()), 2);
}

#[test]
fn test_sys_frame_of_sys_nframe_is_current_environment() {
    // h <- function() { loc <- 7; sys.frame(sys.nframe()) }
    let (ctx, mut interp) = fresh_interpreter();
    let body = Node::block(vec![
        Node::assign("loc", Node::constant(Value::Int(7)), false),
        Node::call_named(
            "sys.frame",
            vec![Node::arg(Node::call_named("sys.nframe", vec![]))],
        ),
    ]);
    let program = vec![
        define_function("h", &[], body),
        Node::call_named("h", vec![]),
    ];
    let result = interp.eval_program(&program).unwrap();
    let Value::Environment(env) = result else {
        panic!("expected environment, got {:?}", result);
    };
    let frame = ctx.environments().frame(env).unwrap();
    let slot = ctx.monitor().find_slot(frame.descriptor(), "loc").unwrap();
    let frame_store::SlotValue::Plain(value) = ctx.monitor().get_value(&frame, slot) else {
        panic!("unexpected active binding");
    };
    assert_eq!(value, Value::Int(7));
}

#[test]
fn test_parent_frame_matches_sys_frame_of_sys_parent() {
    // In g (called by f): parent.frame(1) and sys.frame(sys.parent(1))
    // resolve to the same environment.
    let (_ctx, mut interp) = fresh_interpreter();
    let g_body = Node::block(vec![
        Node::assign(
            "e1",
            Node::call_named("parent.frame", vec![Node::arg(Node::constant(Value::Int(1)))]),
            false,
        ),
        Node::assign(
            "e2",
            Node::call_named(
                "sys.frame",
                vec![Node::arg(Node::call_named(
                    "sys.parent",
                    vec![Node::arg(Node::constant(Value::Int(1)))],
                ))],
            ),
            false,
        ),
        Node::call_named(
            "envs.equal",
            vec![Node::arg(Node::lookup("e1")), Node::arg(Node::lookup("e2"))],
        ),
    ]);
    let program = vec![
        define_function("g", &[], g_body),
        define_function("f", &[], Node::call_named("g", vec![])),
        Node::call_named("f", vec![]),
    ];

    struct EnvsEqual;
    impl Builtin for EnvsEqual {
        fn call(
            &self,
            _interp: &mut Interpreter,
            _frame: &Frame,
            args: &[(Option<Rc<str>>, Value)],
        ) -> RResult<Value> {
            let (Value::Environment(a), Value::Environment(b)) = (&args[0].1, &args[1].1) else {
                panic!("expected environments");
            };
            Ok(Value::logical(a == b))
        }
    }
    interp.ctx().register_builtin("envs.equal", Rc::new(EnvsEqual));
    interp
        .ctx()
        .monitor()
        .set_object_and_invalidate(
            &interp.ctx().global_frame(),
            interp.ctx().monitor().find_or_add_slot(
                interp.ctx().global_frame().descriptor(),
                "envs.equal",
                frame_store::SlotKind::Object,
            ),
            Value::NativeFunction(Rc::from("envs.equal")),
            false,
        );

    let result = interp.eval_program(&program).unwrap();
    assert_eq!(result, Value::logical(true));
}

#[test]
fn test_parent_frame_at_top_level_function_is_global() {
    let (ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function(
            "f",
            &[],
            Node::call_named("parent.frame", vec![Node::arg(Node::constant(Value::Int(1)))]),
        ),
        Node::call_named("f", vec![]),
    ];
    let result = interp.eval_program(&program).unwrap();
    let Value::Environment(env) = result else {
        panic!("expected environment");
    };
    assert_eq!(env, ctx.global_env());
}

#[test]
fn test_sys_function_returns_running_function() {
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function(
            "f",
            &[],
            Node::call_named("sys.function", vec![Node::arg(Node::constant(Value::Int(1)))]),
        ),
        Node::call_named("f", vec![]),
    ];
    let result = interp.eval_program(&program).unwrap();
    let Value::Function(func) = result else {
        panic!("expected function, got {:?}", result);
    };
    assert_eq!(func.name.as_deref(), Some("f"));
}

#[test]
fn test_sys_call_returns_call_syntax() {
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function(
            "f",
            &["a"],
            Node::call_named("sys.call", vec![Node::arg(Node::constant(Value::Int(0)))]),
        ),
        Node::call_named("f", vec![Node::named_arg("a", Node::constant(Value::Int(1)))]),
    ];
    let result = interp.eval_program(&program).unwrap();
    let Value::Language(node) = result else {
        panic!("expected language, got {:?}", result);
    };
    let NodeKind::Call { args, .. } = &node.kind else {
        panic!("expected call node");
    };
    // sys.call preserves provided names but does not create them.
    assert_eq!(args.len(), 1);
    assert_eq!(args[0].name.as_deref(), Some("a"));
}

#[test]
fn test_sys_calls_lists_stack_outermost_first() {
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function("g", &[], Node::call_named("sys.calls", vec![])),
        define_function("f", &[], Node::call_named("g", vec![])),
        Node::call_named("f", vec![]),
    ];
    let result = interp.eval_program(&program).unwrap();
    let Value::PairList(head) = result else {
        panic!("expected pairlist");
    };
    let Value::Language(outer) = head.car.borrow().clone() else {
        panic!("expected language element");
    };
    assert!(outer.to_string().starts_with("f("));
    let tail = head.cdr.borrow().clone();
    let Value::PairList(second) = tail else {
        panic!("expected second cell");
    };
    let Value::Language(inner) = second.car.borrow().clone() else {
        panic!("expected language element");
    };
    assert!(inner.to_string().starts_with("g("));
}

#[test]
fn test_sys_parents_vector() {
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function("g", &[], Node::call_named("sys.parents", vec![])),
        define_function("f", &[], Node::call_named("g", vec![])),
        Node::call_named("f", vec![]),
    ];
    let result = interp.eval_program(&program).unwrap();
    let Value::Vector(v) = result else {
        panic!("expected vector");
    };
    let core_types::VectorData::Int(depths) = &v.data else {
        panic!("expected int vector");
    };
    assert_eq!(depths, &vec![0, 1]);
}

#[test]
fn test_sys_frame_out_of_range_errors() {
    let (_ctx, mut interp) = fresh_interpreter();
    let program = vec![
        define_function(
            "f",
            &[],
            Node::call_named("sys.frame", vec![Node::arg(Node::constant(Value::Int(5)))]),
        ),
        Node::call_named("f", vec![]),
    ];
    let err = interp.eval_program(&program).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotThatManyFrames);
}

#[test]
fn test_sys_frame_deoptimizes_unforced_eager_promises() {
    // Capture the promise for `a` while still unforced, expose the frame
    // through sys.frame, and observe the eager flag being cleared.
    let captured: Rc<RefCell<Option<Rc<core_types::PromiseData>>>> = Rc::new(RefCell::new(None));

    struct CaptureArg(Rc<RefCell<Option<Rc<core_types::PromiseData>>>>);
    impl Builtin for CaptureArg {
        fn call(
            &self,
            _interp: &mut Interpreter,
            frame: &Frame,
            _args: &[(Option<Rc<str>>, Value)],
        ) -> RResult<Value> {
            let caller = frame.caller_frame().unwrap();
            for value in caller.arguments() {
                if let Value::Promise(p) = value {
                    *self.0.borrow_mut() = Some(p);
                }
            }
            Ok(Value::Null)
        }
    }

    let (ctx, mut interp) = fresh_interpreter();
    ctx.register_builtin("capture.arg", Rc::new(CaptureArg(captured.clone())));
    let slot = ctx.monitor().find_or_add_slot(
        ctx.global_frame().descriptor(),
        "capture.arg",
        frame_store::SlotKind::Object,
    );
    ctx.monitor().set_object_and_invalidate(
        &ctx.global_frame(),
        slot,
        Value::NativeFunction(Rc::from("capture.arg")),
        false,
    );

    let body = Node::block(vec![
        Node::call_named("capture.arg", vec![]),
        Node::call_named(
            "sys.frame",
            vec![Node::arg(Node::call_named("sys.nframe", vec![]))],
        ),
        Node::constant(Value::Int(0)),
    ]);
    let program = vec![
        define_function("f", &["a"], body),
        Node::call_named("f", vec![Node::arg(Node::constant(Value::Int(1)))]),
    ];
    interp.eval_program(&program).unwrap();

    let promise = captured.borrow().clone().expect("captured promise");
    assert!(!promise.is_forced());
    assert!(!promise.is_eager());
}

//! Lookup caching and invalidation across frames and environments.
//!
//! Tests cover:
//! - Stable-value caching of cross-frame lookups
//! - Invalidation by redefinition of the binding
//! - Subtree invalidation when an environment attaches into the chain
//! - Lookup soundness against a fresh walk

use core_types::{Caller, Node, Value};
use frame_store::LookupResult;
use integration_tests::{as_int, define_function, fresh_interpreter};

/// x <- 1; g <- function() x; f <- function() g()
fn define_f_and_g() -> Vec<std::rc::Rc<Node>> {
    vec![
        Node::assign("x", Node::constant(Value::Int(1)), false),
        define_function("g", &[], Node::lookup("x")),
        define_function("f", &[], Node::call_named("g", vec![])),
    ]
}

fn g_descriptor(ctx: &interpreter::Context) -> core_types::FrameDescriptorId {
    let global = ctx.global_frame();
    let slot = ctx.monitor().find_slot(global.descriptor(), "g").unwrap();
    let frame_store::SlotValue::Plain(Value::Function(g)) = ctx.monitor().get_value(&global, slot)
    else {
        panic!("g is not a function");
    };
    g.descriptor.get().expect("g has been called")
}

#[test]
fn test_repeated_calls_hit_stable_value() {
    let (ctx, mut interp) = fresh_interpreter();
    interp.eval_program(&define_f_and_g()).unwrap();

    let call_f = Node::call_named("f", vec![]);
    assert_eq!(as_int(&interp.eval_program(&[call_f.clone()]).unwrap()), 1);

    // After the first call, the lookup of x in g's descriptor is answered
    // by a cached stable value.
    let g_fd = g_descriptor(&ctx);
    let cached = ctx.monitor().cached_lookup(g_fd, "x").expect("cached");
    assert!(cached.is_valid());
    let LookupResult::Stable { .. } = &cached else {
        panic!("expected stable-value result");
    };
    assert_eq!(cached.stable_value().unwrap(), Some(Value::Int(1)));

    for _ in 0..1000 {
        assert_eq!(as_int(&interp.eval_program(&[call_f.clone()]).unwrap()), 1);
    }
    assert!(cached.is_valid());

    // Redefining x invalidates the cached result; the next call sees 2.
    interp
        .eval_program(&[Node::assign("x", Node::constant(Value::Int(2)), false)])
        .unwrap();
    assert!(!cached.is_valid());
    assert_eq!(as_int(&interp.eval_program(&[call_f]).unwrap()), 2);
}

#[test]
fn test_attach_invalidates_cached_lookup_subtree() {
    let (ctx, mut interp) = fresh_interpreter();
    interp.eval_program(&define_f_and_g()).unwrap();

    let call_f = Node::call_named("f", vec![]);
    assert_eq!(as_int(&interp.eval_program(&[call_f.clone()]).unwrap()), 1);
    let g_fd = g_descriptor(&ctx);
    let cached = ctx.monitor().cached_lookup(g_fd, "x").expect("cached");
    assert!(cached.is_valid());

    // x <- x + 1 inside a fresh child environment of global.
    let env = ctx.environments().create_environment(
        ctx.monitor(),
        Caller::global(),
        Some(&ctx.global_frame()),
    );
    let bump = Node::assign(
        "x",
        Node::call_named(
            "+",
            vec![
                Node::arg(Node::lookup("x")),
                Node::arg(Node::constant(Value::Int(1))),
            ],
        ),
        false,
    );
    interp.eval_in_env(&bump, &env).unwrap();

    // Attaching the environment into the enclosing chain must invalidate
    // every cached lookup that could now resolve differently.
    ctx.monitor().attach(&ctx.global_frame(), &env);
    assert!(!cached.is_valid());

    // g still resolves x soundly after the rewiring.
    assert_eq!(as_int(&interp.eval_program(&[call_f]).unwrap()), 1);
}

#[test]
fn test_lookup_soundness_matches_fresh_walk() {
    let (ctx, mut interp) = fresh_interpreter();
    interp.eval_program(&define_f_and_g()).unwrap();
    interp
        .eval_program(&[Node::call_named("f", vec![])])
        .unwrap();

    // A cached result and a fresh walk from the global frame agree.
    let global = ctx.global_frame();
    let fresh = ctx.monitor().lookup(&global, "x").expect("cacheable");
    match fresh.stable_value().unwrap() {
        Some(value) => assert_eq!(value, Value::Int(1)),
        None => {
            let LookupResult::FrameAndSlot { frame, slot, .. } = &fresh else {
                panic!("expected frame-and-slot");
            };
            let frame_store::SlotValue::Plain(value) = ctx.monitor().get_value(frame, *slot) else {
                panic!("unexpected active binding");
            };
            assert_eq!(value, Value::Int(1));
        }
    }
}

#[test]
fn test_super_assign_from_function_invalidates_cache() {
    let (ctx, mut interp) = fresh_interpreter();
    let mut program = define_f_and_g();
    // h <- function() x <<- 5
    program.push(define_function(
        "h",
        &[],
        Node::assign("x", Node::constant(Value::Int(5)), true),
    ));
    interp.eval_program(&program).unwrap();

    interp
        .eval_program(&[Node::call_named("f", vec![])])
        .unwrap();
    let g_fd = g_descriptor(&ctx);
    let cached = ctx.monitor().cached_lookup(g_fd, "x").expect("cached");
    assert!(cached.is_valid());

    interp
        .eval_program(&[Node::call_named("h", vec![])])
        .unwrap();
    assert!(!cached.is_valid());
    assert_eq!(
        as_int(&interp.eval_program(&[Node::call_named("f", vec![])]).unwrap()),
        5
    );
}

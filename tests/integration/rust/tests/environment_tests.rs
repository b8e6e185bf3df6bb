//! Environment-level behavior: active bindings and multi-context slots.

use std::rc::Rc;

use core_types::{Node, PromiseData, Value};
use frame_store::{ActiveBinding, SlotKind, SlotValue};
use integration_tests::{as_int, fresh_interpreter};
use interpreter::{Context, Interpreter, RuntimeOptions};

#[test]
fn test_active_binding_read_calls_getter() {
    let (ctx, mut interp) = fresh_interpreter();

    struct Getter;
    impl interpreter::Builtin for Getter {
        fn call(
            &self,
            _interp: &mut Interpreter,
            _frame: &frame_store::Frame,
            _args: &[(Option<Rc<str>>, Value)],
        ) -> core_types::RResult<Value> {
            Ok(Value::Int(99))
        }
    }
    ctx.register_builtin("the.getter", Rc::new(Getter));

    let global = ctx.global_frame();
    let slot = ctx
        .monitor()
        .find_or_add_slot(global.descriptor(), "computed", SlotKind::Object);
    let assumption = ctx.monitor().no_active_binding_assumption(global.descriptor());
    assert!(assumption.is_valid());
    ctx.monitor().set_active_binding(
        &global,
        slot,
        ActiveBinding::new(Value::NativeFunction(Rc::from("the.getter"))),
        false,
    );
    assert!(!assumption.is_valid());

    assert_eq!(as_int(&interp.eval_program(&[Node::lookup("computed")]).unwrap()), 99);
}

#[test]
fn test_search_path_promotion_forces_promise_bindings() {
    let mut options = RuntimeOptions::new();
    options.shared_contexts = true;
    options.search_path_force_promises = true;
    let ctx = Context::new(options);
    builtins::install_builtins(&ctx);
    let mut interp = Interpreter::new(ctx.clone());

    let global = ctx.global_frame();
    let promise = PromiseData::new(Node::constant(Value::Int(5)), ctx.global_env(), false);
    let slot = ctx
        .monitor()
        .find_or_add_slot(global.descriptor(), "lazy", SlotKind::Object);
    ctx.monitor()
        .set_object_and_invalidate(&global, slot, Value::Promise(promise.clone()), false);

    // A second logical context comes up; the global frame's slots are
    // promoted without replication, forcing promise bindings first.
    ctx.monitor().set_context_count(2);
    let force_promises = ctx.options().search_path_force_promises;
    let mut forcer = |value: &Value| interp.force_value(value.clone());
    ctx.monitor()
        .handle_all_multi_slots(&global, &[1], false, force_promises, &mut forcer)
        .unwrap();

    assert!(promise.is_forced());
    let info = ctx.monitor().slot_info(global.descriptor(), slot);
    assert!(!info.no_multi_slot().is_valid());
    match ctx.monitor().get_value(&global, slot) {
        SlotValue::Plain(value) => assert_eq!(value, Value::Int(5)),
        other => panic!("unexpected read {:?}", other),
    }

    // The initial context still evaluates through the promoted slots.
    assert_eq!(as_int(&interp.eval_program(&[Node::lookup("lazy")]).unwrap()), 5);
}

#[test]
fn test_child_context_writes_stay_isolated() {
    let mut options = RuntimeOptions::new();
    options.shared_contexts = true;
    let ctx = Context::new(options);
    builtins::install_builtins(&ctx);
    let mut interp = Interpreter::new(ctx.clone());

    interp
        .eval_program(&[Node::assign("x", Node::constant(Value::Int(1)), false)])
        .unwrap();
    ctx.monitor().set_context_count(2);

    // Context 1 rebinding x must not disturb context 0.
    ctx.monitor().set_current_context(1);
    interp
        .eval_program(&[Node::assign("x", Node::constant(Value::Int(2)), false)])
        .unwrap();
    assert_eq!(as_int(&interp.eval_program(&[Node::lookup("x")]).unwrap()), 2);

    ctx.monitor().set_current_context(0);
    assert_eq!(as_int(&interp.eval_program(&[Node::lookup("x")]).unwrap()), 1);

    // Context 1 exits; its entries are cleaned, context 0 is preserved.
    ctx.monitor().clean_multi_slots(&ctx.global_frame(), Some(&[1]));
    assert_eq!(as_int(&interp.eval_program(&[Node::lookup("x")]).unwrap()), 1);
}

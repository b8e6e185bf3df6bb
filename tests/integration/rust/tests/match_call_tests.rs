//! match.call: argument reordering, name creation and variadic handling.

use core_types::{Node, NodeKind, Value};
use integration_tests::{define_function, fresh_interpreter};

/// f <- function(a, ...) match.call(definition, call, expand.dots)
fn define_f(expand_dots: bool) -> Vec<std::rc::Rc<Node>> {
    vec![define_function(
        "f",
        &["a", "..."],
        Node::call_named(
            "match.call",
            vec![
                Node::named_arg("expand.dots", Node::constant(Value::logical(expand_dots))),
            ],
        ),
    )]
}

fn call_f() -> std::rc::Rc<Node> {
    Node::call_named(
        "f",
        vec![
            Node::named_arg("b", Node::constant(Value::Int(2))),
            Node::arg(Node::constant(Value::Int(1))),
            Node::named_arg("c", Node::constant(Value::Int(3))),
        ],
    )
}

fn call_args(result: &Value) -> Vec<(Option<String>, std::rc::Rc<Node>)> {
    let Value::Language(node) = result else {
        panic!("expected language, got {:?}", result);
    };
    let NodeKind::Call { args, .. } = &node.kind else {
        panic!("expected call node");
    };
    args.iter()
        .map(|a| (a.name.as_deref().map(str::to_string), a.value.clone()))
        .collect()
}

fn constant_int(node: &Node) -> i32 {
    match &node.kind {
        NodeKind::Constant(Value::Int(i)) => *i,
        other => panic!("expected integer constant, got {:?}", other),
    }
}

#[test]
fn test_match_call_expands_dots() {
    let (_ctx, mut interp) = fresh_interpreter();
    let mut program = define_f(true);
    program.push(call_f());
    let result = interp.eval_program(&program).unwrap();

    let args = call_args(&result);
    assert_eq!(args.len(), 3);
    assert_eq!(args[0].0.as_deref(), Some("a"));
    assert_eq!(constant_int(&args[0].1), 1);
    assert_eq!(args[1].0.as_deref(), Some("b"));
    assert_eq!(constant_int(&args[1].1), 2);
    assert_eq!(args[2].0.as_deref(), Some("c"));
    assert_eq!(constant_int(&args[2].1), 3);
}

#[test]
fn test_match_call_wraps_dots_in_pairlist() {
    let (_ctx, mut interp) = fresh_interpreter();
    let mut program = define_f(false);
    program.push(call_f());
    let result = interp.eval_program(&program).unwrap();

    let args = call_args(&result);
    assert_eq!(args.len(), 2);
    assert_eq!(args[0].0.as_deref(), Some("a"));
    assert_eq!(constant_int(&args[0].1), 1);
    assert_eq!(args[1].0.as_deref(), Some("..."));

    let NodeKind::Constant(Value::PairList(head)) = &args[1].1.kind else {
        panic!("expected pairlist constant");
    };
    assert_eq!(head.tag.borrow().as_deref(), Some("b"));
    let Value::Language(b_expr) = head.car.borrow().clone() else {
        panic!("expected language element");
    };
    assert_eq!(constant_int(&b_expr), 2);
    let tail = head.cdr.borrow().clone();
    let Value::PairList(second) = tail else {
        panic!("expected second cell");
    };
    assert_eq!(second.tag.borrow().as_deref(), Some("c"));
}

#[test]
fn test_match_call_is_idempotent_on_canonical_calls() {
    // Matching an already-canonical call reproduces it.
    let (_ctx, mut interp) = fresh_interpreter();
    let mut program = define_f(true);
    program.push(Node::call_named(
        "f",
        vec![
            Node::named_arg("a", Node::constant(Value::Int(1))),
            Node::named_arg("b", Node::constant(Value::Int(2))),
        ],
    ));
    let result = interp.eval_program(&program).unwrap();
    let args = call_args(&result);
    assert_eq!(args.len(), 2);
    assert_eq!(args[0].0.as_deref(), Some("a"));
    assert_eq!(constant_int(&args[0].1), 1);
    assert_eq!(args[1].0.as_deref(), Some("b"));
    assert_eq!(constant_int(&args[1].1), 2);
}

#[test]
fn test_match_call_with_explicit_arguments() {
    // match.call(definition, call) on a quoted call, outside the function.
    let (_ctx, mut interp) = fresh_interpreter();
    let quoted = Node::call_named(
        "g",
        vec![
            Node::arg(Node::constant(Value::Int(10))),
            Node::named_arg("y", Node::constant(Value::Int(20))),
        ],
    );
    let program = vec![
        define_function("g", &["x", "y"], Node::lookup("x")),
        define_function(
            "h",
            &[],
            Node::call_named(
                "match.call",
                vec![
                    Node::arg(Node::lookup("g")),
                    Node::arg(Node::constant(Value::Language(quoted))),
                ],
            ),
        ),
        Node::call_named("h", vec![]),
    ];
    let result = interp.eval_program(&program).unwrap();
    let args = call_args(&result);
    assert_eq!(args.len(), 2);
    assert_eq!(args[0].0.as_deref(), Some("x"));
    assert_eq!(constant_int(&args[0].1), 10);
    assert_eq!(args[1].0.as_deref(), Some("y"));
    assert_eq!(constant_int(&args[1].1), 20);
}

//! Call activation records.
//!
//! Every activation on the dynamic stack is anchored by an immutable
//! `Caller` record. This module lives in core_types to avoid cyclic
//! dependencies between the frame store and the interpreter.
//!
//! The record distinguishes the *lexical-logical* parent (what
//! `sys.parent` and `parent.frame` follow) from the *dynamic* previous
//! activation (the frame physically preceding this one on the stack).
//! Promise-evaluation records sit on the dynamic chain but are transparent
//! to most introspection: unwrapping follows their payload to the
//! activation the promise logically evaluates in.

use std::rc::Rc;

use crate::node::Node;
use crate::value::EnvId;

/// Payload of an activation record, selected by the activation's kind.
#[derive(Debug, Clone)]
pub enum CallerPayload {
    /// An ordinary function (or builtin) activation.
    Regular,
    /// An artificial frame evaluating a promise; the payload is the
    /// activation the promise logically evaluates in.
    PromiseEvaluation(Rc<Caller>),
    /// An activation whose `sys.parent` is a plain environment rather than
    /// a function frame.
    NonFunctionParent(EnvId),
    /// A frame used outside the regular stack discipline (e.g. `eval` into
    /// a user-held environment).
    Irregular,
}

/// Immutable record of a single call activation.
#[derive(Debug)]
pub struct Caller {
    depth: u32,
    parent: Option<Rc<Caller>>,
    previous: Option<Rc<Caller>>,
    syntax: Option<Rc<Node>>,
    payload: CallerPayload,
}

impl Caller {
    /// The record of the global activation (depth 0, no previous).
    pub fn global() -> Rc<Caller> {
        Rc::new(Caller {
            depth: 0,
            parent: None,
            previous: None,
            syntax: None,
            payload: CallerPayload::Regular,
        })
    }

    /// A function activation: one deeper than `previous`, with the logical
    /// parent and the call-site syntax node.
    pub fn function(
        parent: Rc<Caller>,
        previous: Rc<Caller>,
        syntax: Rc<Node>,
    ) -> Rc<Caller> {
        Rc::new(Caller {
            depth: previous.depth + 1,
            parent: Some(parent),
            previous: Some(previous),
            syntax: Some(syntax),
            payload: CallerPayload::Regular,
        })
    }

    /// An artificial activation for evaluating a promise. Shares the depth
    /// of the activation it interrupts; `logical_caller` is the activation
    /// the promise logically evaluates in.
    pub fn promise_evaluation(current: Rc<Caller>, logical_caller: Rc<Caller>) -> Rc<Caller> {
        Rc::new(Caller {
            depth: current.depth,
            parent: current.parent.clone(),
            previous: Some(current),
            syntax: None,
            payload: CallerPayload::PromiseEvaluation(logical_caller),
        })
    }

    /// An activation for a frame whose logical parent is a plain
    /// environment. Shares the depth of the nearest enclosing function
    /// activation.
    pub fn non_function(previous: Rc<Caller>, parent_env: EnvId, syntax: Option<Rc<Node>>) -> Rc<Caller> {
        Rc::new(Caller {
            depth: previous.depth,
            parent: Some(previous.clone()),
            previous: Some(previous),
            syntax,
            payload: CallerPayload::NonFunctionParent(parent_env),
        })
    }

    /// An activation for an irregular frame (e.g. `eval` into a user-held
    /// environment). Shares the depth of the activation it extends.
    pub fn irregular(previous: Rc<Caller>, syntax: Option<Rc<Node>>) -> Rc<Caller> {
        Rc::new(Caller {
            depth: previous.depth,
            parent: Some(previous.clone()),
            previous: Some(previous),
            syntax,
            payload: CallerPayload::Irregular,
        })
    }

    /// Count of function frames between this activation and the global one.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Lexical-logical parent, followed by `sys.parent`/`parent.frame`.
    pub fn parent(&self) -> Option<Rc<Caller>> {
        self.parent.clone()
    }

    /// The preceding activation on the dynamic stack. `None` only for the
    /// global activation.
    pub fn previous(&self) -> Option<Rc<Caller>> {
        self.previous.clone()
    }

    /// Call-site syntax node, absent for non-function frames.
    pub fn syntax(&self) -> Option<Rc<Node>> {
        self.syntax.clone()
    }

    /// Whether this is an artificial promise-evaluation record.
    pub fn is_promise(&self) -> bool {
        matches!(self.payload, CallerPayload::PromiseEvaluation(_))
    }

    /// Whether this activation's logical parent is a plain environment.
    pub fn is_non_function_parent(&self) -> bool {
        matches!(self.payload, CallerPayload::NonFunctionParent(_))
    }

    /// Whether this activation is usable for introspection: promise
    /// records are never valid in their own right, everything else is
    /// valid when it has a syntax node.
    pub fn is_valid(&self) -> bool {
        !self.is_promise() && self.syntax.is_some()
    }

    /// Follow promise-evaluation payloads until a real activation is
    /// reached. A no-op for regular records; idempotent.
    pub fn unwrap_promise_caller(caller: &Rc<Caller>) -> Rc<Caller> {
        let mut current = caller.clone();
        loop {
            let next = match &current.payload {
                CallerPayload::PromiseEvaluation(logical) => logical.clone(),
                _ => return current,
            };
            current = next;
        }
    }

    /// The captured environment of a non-function-parent activation, if
    /// this is one.
    pub fn unwrap_sys_parent(caller: &Rc<Caller>) -> Option<EnvId> {
        match &caller.payload {
            CallerPayload::NonFunctionParent(env) => Some(*env),
            _ => None,
        }
    }

    /// Skip promise-evaluation records along the dynamic `previous` chain,
    /// yielding the next real activation on the stack.
    pub fn unwrap_previous(caller: &Rc<Caller>) -> Rc<Caller> {
        let mut current = caller.clone();
        while current.is_promise() {
            match current.previous() {
                Some(previous) => current = previous,
                None => return current,
            }
        }
        current
    }

    /// Visit this activation and every `previous` activation down to the
    /// global one.
    pub fn iterate_callers(caller: &Rc<Caller>, mut visit: impl FnMut(&Rc<Caller>)) {
        let mut current = Some(caller.clone());
        while let Some(c) = current {
            visit(&c);
            current = c.previous();
        }
    }
}

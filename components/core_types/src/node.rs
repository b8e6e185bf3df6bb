//! Syntax tree nodes.
//!
//! A single `Node` record with a tag and node-specific payload; introspection
//! (source section, enclosing function name) is tag-dispatched. The parser is
//! an external collaborator, so nodes are constructed through the builder
//! functions here — by the host, or directly by tests.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::source::SourceSection;
use crate::value::{Signature, Value};

/// One argument position in a call node.
#[derive(Debug, Clone)]
pub struct Argument {
    /// Supplied name, if the argument was named.
    pub name: Option<Rc<str>>,
    /// Argument expression; `NodeKind::MissingArg` for an empty position.
    pub value: Rc<Node>,
}

/// Node-specific payload, selected by tag.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A literal value.
    Constant(Value),
    /// Read a variable through the enclosing chain.
    Lookup(Rc<str>),
    /// Reference to the caller's variadic arguments (`...`).
    Varargs,
    /// An empty argument position.
    MissingArg,
    /// A function call with (possibly named) arguments.
    Call {
        /// Callee expression.
        function: Rc<Node>,
        /// Supplied arguments in source order.
        args: Vec<Argument>,
    },
    /// A function definition.
    FunctionDef {
        /// Name the function is usually bound to, for diagnostics.
        name: Option<Rc<str>>,
        /// Formal signature.
        signature: Signature,
        /// Body expression.
        body: Rc<Node>,
    },
    /// Bind `value` to `name`; `superassign` writes through the enclosing
    /// chain instead of the local frame.
    Assign {
        /// Target identifier.
        name: Rc<str>,
        /// Right-hand side.
        value: Rc<Node>,
        /// Whether this is the non-local assignment operator.
        superassign: bool,
    },
    /// A sequence of statements; evaluates to the last one.
    Block(Vec<Rc<Node>>),
    /// Early return from the innermost function.
    Return(Option<Rc<Node>>),
}

/// A syntax tree node.
///
/// `root_name` is the name of the function definition whose body contains
/// this node, stamped when the definition is built. The profiler uses it to
/// decide whether a stack entry belongs to a user function.
#[derive(Debug)]
pub struct Node {
    /// The tag and payload.
    pub kind: NodeKind,
    source: RefCell<Option<SourceSection>>,
    root_name: RefCell<Option<Rc<str>>>,
}

impl Node {
    fn build(kind: NodeKind) -> Rc<Node> {
        Rc::new(Node {
            kind,
            source: RefCell::new(None),
            root_name: RefCell::new(None),
        })
    }

    /// A literal value node.
    pub fn constant(value: Value) -> Rc<Node> {
        Node::build(NodeKind::Constant(value))
    }

    /// A variable read node.
    pub fn lookup(name: &str) -> Rc<Node> {
        Node::build(NodeKind::Lookup(Rc::from(name)))
    }

    /// A `...` reference node.
    pub fn varargs() -> Rc<Node> {
        Node::build(NodeKind::Varargs)
    }

    /// An empty argument position.
    pub fn missing_arg() -> Rc<Node> {
        Node::build(NodeKind::MissingArg)
    }

    /// A call node with positional and named arguments.
    pub fn call(function: Rc<Node>, args: Vec<Argument>) -> Rc<Node> {
        Node::build(NodeKind::Call { function, args })
    }

    /// A call node addressing the callee by name.
    pub fn call_named(function: &str, args: Vec<Argument>) -> Rc<Node> {
        Node::call(Node::lookup(function), args)
    }

    /// A function definition node. The body subtree is stamped with `name`
    /// so the profiler can attribute statements to this function.
    pub fn function_def(name: Option<&str>, signature: Signature, body: Rc<Node>) -> Rc<Node> {
        let name: Option<Rc<str>> = name.map(Rc::from);
        if let Some(name) = &name {
            stamp_root(&body, name);
        }
        Node::build(NodeKind::FunctionDef {
            name,
            signature,
            body,
        })
    }

    /// An assignment node.
    pub fn assign(name: &str, value: Rc<Node>, superassign: bool) -> Rc<Node> {
        Node::build(NodeKind::Assign {
            name: Rc::from(name),
            value,
            superassign,
        })
    }

    /// A statement block node.
    pub fn block(statements: Vec<Rc<Node>>) -> Rc<Node> {
        Node::build(NodeKind::Block(statements))
    }

    /// An early-return node.
    pub fn ret(value: Option<Rc<Node>>) -> Rc<Node> {
        Node::build(NodeKind::Return(value))
    }

    /// Attach a source section, returning the node for chaining.
    pub fn with_source(self: Rc<Node>, source: SourceSection) -> Rc<Node> {
        *self.source.borrow_mut() = Some(source);
        self
    }

    /// Source section of this node, if known.
    pub fn source_section(&self) -> Option<SourceSection> {
        self.source.borrow().clone()
    }

    /// Name of the function whose body contains this node, if any.
    pub fn root_name(&self) -> Option<Rc<str>> {
        self.root_name.borrow().clone()
    }

    /// An argument with no name.
    pub fn arg(value: Rc<Node>) -> Argument {
        Argument { name: None, value }
    }

    /// A named argument.
    pub fn named_arg(name: &str, value: Rc<Node>) -> Argument {
        Argument {
            name: Some(Rc::from(name)),
            value,
        }
    }
}

/// Stamp `name` as the root of `node` and its subtree, stopping at nested
/// function definitions (their bodies belong to the inner function).
fn stamp_root(node: &Rc<Node>, name: &Rc<str>) {
    if node.root_name.borrow().is_some() {
        return;
    }
    *node.root_name.borrow_mut() = Some(name.clone());
    match &node.kind {
        NodeKind::Constant(_)
        | NodeKind::Lookup(_)
        | NodeKind::Varargs
        | NodeKind::MissingArg => {}
        NodeKind::Call { function, args } => {
            stamp_root(function, name);
            for arg in args {
                stamp_root(&arg.value, name);
            }
        }
        NodeKind::FunctionDef { .. } => {}
        NodeKind::Assign { value, .. } => stamp_root(value, name),
        NodeKind::Block(statements) => {
            for statement in statements {
                stamp_root(statement, name);
            }
        }
        NodeKind::Return(value) => {
            if let Some(value) = value {
                stamp_root(value, name);
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Constant(v) => write!(f, "{}", v),
            NodeKind::Lookup(name) => write!(f, "{}", name),
            NodeKind::Varargs => write!(f, "..."),
            NodeKind::MissingArg => Ok(()),
            NodeKind::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(name) = &arg.name {
                        write!(f, "{} = ", name)?;
                    }
                    write!(f, "{}", arg.value)?;
                }
                write!(f, ")")
            }
            NodeKind::FunctionDef { signature, .. } => {
                write!(f, "function({})", signature.names().join(", "))
            }
            NodeKind::Assign {
                name,
                value,
                superassign,
            } => {
                let op = if *superassign { "<<-" } else { "<-" };
                write!(f, "{} {} {}", name, op, value)
            }
            NodeKind::Block(_) => write!(f, "{{ ... }}"),
            NodeKind::Return(Some(v)) => write!(f, "return({})", v),
            NodeKind::Return(None) => write!(f, "return()"),
        }
    }
}

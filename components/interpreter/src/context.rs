//! The execution context.
//!
//! One context owns the slot-change monitor, the environment registry, the
//! data factory, the options, the builtin table and the instrumentation
//! hooks. There is no hidden thread-local state: every operation receives
//! the context explicitly.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use core_types::{Caller, DataFactory, EnvId, FrameDescriptorId, Node, RResult, Value};
use frame_store::{EnvironmentRegistry, Frame, SlotChangeMonitor};

use crate::eval::Interpreter;
use crate::options::RuntimeOptions;

/// A native builtin callable from evaluated code.
pub trait Builtin {
    /// Invoke the builtin. `frame` is the builtin's own activation frame;
    /// `args` are the evaluated arguments with their supplied names.
    fn call(
        &self,
        interp: &mut Interpreter,
        frame: &Frame,
        args: &[(Option<Rc<str>>, Value)],
    ) -> RResult<Value>;
}

/// Observer of statement-entry events.
pub trait StatementListener {
    /// A statement is about to execute. The interpreter is read-only here.
    fn on_statement(&self, interp: &Interpreter, node: &Rc<Node>);
}

/// Handle for deregistering a statement listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementListenerId(usize);

/// The per-interpreter execution context.
pub struct Context {
    monitor: SlotChangeMonitor,
    environments: EnvironmentRegistry,
    data_factory: DataFactory,
    options: RuntimeOptions,
    base_frame: Frame,
    global_frame: Frame,
    interrupt: Cell<bool>,
    builtin_descriptor: Cell<Option<FrameDescriptorId>>,
    builtins: RefCell<HashMap<Rc<str>, Rc<dyn Builtin>>>,
    statement_listeners: RefCell<Vec<(StatementListenerId, Rc<dyn StatementListener>)>>,
    next_listener_id: Cell<usize>,
}

impl Context {
    /// Create a context with a fresh global environment.
    pub fn new(options: RuntimeOptions) -> Rc<Context> {
        let monitor = SlotChangeMonitor::new();
        monitor.set_shared_contexts(options.shared_contexts);
        let environments = EnvironmentRegistry::new();

        // The base environment sits at the bottom of every enclosing
        // chain; search-path rewiring splices between it and global.
        let base_fd = monitor.initialize_non_function_descriptor("base");
        let base_frame = Frame::new(base_fd, Caller::global());
        monitor.set_singleton_frame(base_fd, &base_frame);
        environments.register(&base_frame);

        let global_fd = monitor.initialize_non_function_descriptor("global");
        let global_frame = Frame::new(global_fd, Caller::global());
        monitor.set_singleton_frame(global_fd, &global_frame);
        global_frame.set_enclosing_frame(Some(base_frame.clone()));
        monitor.initialize_enclosing_frame(&global_frame, Some(&base_frame));
        let global_id = environments.register(&global_frame);
        environments.set_global(global_id);

        Rc::new(Context {
            monitor,
            environments,
            data_factory: DataFactory::new(),
            options,
            base_frame,
            global_frame,
            interrupt: Cell::new(false),
            builtin_descriptor: Cell::new(None),
            builtins: RefCell::new(HashMap::new()),
            statement_listeners: RefCell::new(Vec::new()),
            next_listener_id: Cell::new(0),
        })
    }

    /// The slot-change monitor.
    pub fn monitor(&self) -> &SlotChangeMonitor {
        &self.monitor
    }

    /// The environment registry.
    pub fn environments(&self) -> &EnvironmentRegistry {
        &self.environments
    }

    /// The data factory.
    pub fn data_factory(&self) -> &DataFactory {
        &self.data_factory
    }

    /// The runtime options.
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// The global environment's frame.
    pub fn global_frame(&self) -> Frame {
        self.global_frame.clone()
    }

    /// The base environment's frame.
    pub fn base_frame(&self) -> Frame {
        self.base_frame.clone()
    }

    /// The global environment handle.
    pub fn global_env(&self) -> EnvId {
        self.environments.global().expect("global env registered")
    }

    /// Request a cooperative interrupt; observed at the next statement.
    pub fn interrupt(&self) {
        self.interrupt.set(true);
    }

    /// Consume a pending interrupt request.
    pub fn take_interrupt(&self) -> bool {
        self.interrupt.replace(false)
    }

    /// The shared descriptor used for builtin activation frames.
    pub fn builtin_descriptor(&self) -> FrameDescriptorId {
        if let Some(fd) = self.builtin_descriptor.get() {
            return fd;
        }
        let fd = self.monitor.initialize_function_descriptor("builtin");
        self.builtin_descriptor.set(Some(fd));
        fd
    }

    /// Register a builtin under its language-visible name.
    pub fn register_builtin(&self, name: &str, builtin: Rc<dyn Builtin>) {
        self.builtins.borrow_mut().insert(Rc::from(name), builtin);
    }

    /// Resolve a builtin by name.
    pub fn builtin(&self, name: &str) -> Option<Rc<dyn Builtin>> {
        self.builtins.borrow().get(name).cloned()
    }

    /// Register a statement listener.
    pub fn add_statement_listener(&self, listener: Rc<dyn StatementListener>) -> StatementListenerId {
        let id = StatementListenerId(self.next_listener_id.get());
        self.next_listener_id.set(id.0 + 1);
        self.statement_listeners.borrow_mut().push((id, listener));
        id
    }

    /// Deregister a statement listener.
    pub fn remove_statement_listener(&self, id: StatementListenerId) {
        self.statement_listeners
            .borrow_mut()
            .retain(|(lid, _)| *lid != id);
    }

    /// Snapshot the registered statement listeners.
    pub(crate) fn statement_listeners(&self) -> Vec<Rc<dyn StatementListener>> {
        self.statement_listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }
}

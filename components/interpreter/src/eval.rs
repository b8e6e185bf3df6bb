//! The AST evaluator.
//!
//! Walks syntax nodes against the frame store: identifier reads go through
//! the per-site lookup caches with a slow-path walk as fallback, calls
//! create lazy argument promises and activation records, and statement
//! boundaries drive the interrupt check and the statement listeners.

use std::collections::HashMap;
use std::rc::Rc;

use core_types::{
    ArgsAndNames, Caller, ErrorKind, Node, NodeKind, PromiseData, RFunction, RResult,
    RuntimeError, Value, VARARG_NAME,
};
use frame_store::{
    ActiveBinding, Frame, LookupSiteCache, SlotKind, SlotValue,
};

use crate::arguments::{match_arguments, MatchedArg, SuppliedArg, SuppliedPayload};
use crate::context::Context;
use crate::promise;
use crate::stack::FrameStack;

/// Typed non-local control flow: errors unwind to the top, early returns
/// unwind to the owning activation's executor and become a normal value.
enum Unwind {
    Error(RuntimeError),
    Return(Value),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Unwind::Error(err)
    }
}

type EvalResult = Result<Value, Unwind>;

/// The tree-walking interpreter.
pub struct Interpreter {
    ctx: Rc<Context>,
    stack: FrameStack,
    site_caches: HashMap<(usize, Rc<str>), LookupSiteCache>,
}

impl Interpreter {
    /// Create an interpreter rooted at the context's global frame.
    pub fn new(ctx: Rc<Context>) -> Self {
        let stack = FrameStack::new(ctx.global_frame());
        Self {
            ctx,
            stack,
            site_caches: HashMap::new(),
        }
    }

    /// The execution context.
    pub fn ctx(&self) -> &Rc<Context> {
        &self.ctx
    }

    /// The dynamic stack, read-only.
    pub fn stack(&self) -> &FrameStack {
        &self.stack
    }

    /// The current activation record.
    pub fn current_call(&self) -> Rc<Caller> {
        self.stack.current_call()
    }

    /// The current frame.
    pub fn current_frame(&self) -> Frame {
        self.stack.current_frame()
    }

    /// The frame with the given absolute depth (0 = global).
    pub fn get_numbered_frame(&self, depth: u32) -> Option<Frame> {
        self.stack.get_numbered_frame(depth, &self.ctx.global_frame())
    }

    pub(crate) fn push_activation(&mut self, frame: Frame, call: Rc<Caller>) {
        self.stack.push(frame, call);
    }

    pub(crate) fn pop_activation(&mut self) {
        self.stack.pop();
    }

    /// Evaluate top-level statements in the global frame.
    pub fn eval_program(&mut self, statements: &[Rc<Node>]) -> RResult<Value> {
        let global = self.ctx.global_frame();
        let mut last = Value::Null;
        for statement in statements {
            match self.statement_event(statement).and_then(|_| self.eval_node(statement, &global)) {
                Ok(value) => last = value,
                Err(Unwind::Return(value)) => return Ok(value),
                Err(Unwind::Error(err)) => return Err(err),
            }
        }
        Ok(last)
    }

    /// Evaluate a single node in the given frame.
    pub fn eval(&mut self, node: &Rc<Node>, frame: &Frame) -> RResult<Value> {
        match self.eval_node(node, frame) {
            Ok(value) => Ok(value),
            Err(Unwind::Return(value)) => Ok(value),
            Err(Unwind::Error(err)) => Err(err),
        }
    }

    /// Evaluate a node inside a user-held environment. The frame is
    /// flagged irregular and runs under a non-function activation, so
    /// `sys.parent` from callees resolves to the environment.
    pub fn eval_in_env(&mut self, node: &Rc<Node>, env_frame: &Frame) -> RResult<Value> {
        env_frame.set_irregular();
        let env = self.ctx.environments().register(env_frame);
        let record = if env_frame.function().is_none() {
            Caller::non_function(self.stack.current_call(), env, Some(node.clone()))
        } else {
            Caller::irregular(self.stack.current_call(), Some(node.clone()))
        };
        self.stack.push(env_frame.clone(), record);
        let result = self.eval_node(node, env_frame);
        self.stack.pop();
        match result {
            Ok(value) => Ok(value),
            Err(Unwind::Return(value)) => Ok(value),
            Err(Unwind::Error(err)) => Err(err),
        }
    }

    /// Force a value if it is a promise.
    pub fn force_value(&mut self, value: Value) -> RResult<Value> {
        promise::force_value(self, value)
    }

    // --- core dispatch -----------------------------------------------------

    fn eval_node(&mut self, node: &Rc<Node>, frame: &Frame) -> EvalResult {
        match &node.kind {
            NodeKind::Constant(value) => Ok(value.clone()),
            NodeKind::Lookup(name) => self.read_variable(node, frame, name.clone()),
            NodeKind::Varargs => self.read_varargs(frame).map_err(Unwind::from),
            NodeKind::MissingArg => Ok(Value::Missing),
            NodeKind::Block(statements) => {
                let mut last = Value::Null;
                for statement in statements {
                    self.statement_event(statement)?;
                    last = self.eval_node(statement, frame)?;
                }
                Ok(last)
            }
            NodeKind::Assign {
                name,
                value,
                superassign,
            } => {
                let value = self.eval_node(value, frame)?;
                let value = self.force_unwind(value)?;
                if let Value::Vector(vector) = &value {
                    vector.mark_bound();
                }
                if *superassign {
                    self.super_assign(frame, name, value.clone());
                } else {
                    self.local_assign(frame, name, value.clone());
                }
                Ok(value)
            }
            NodeKind::FunctionDef {
                name,
                signature,
                body,
            } => {
                let env = self.ctx.environments().register(frame);
                Ok(Value::Function(RFunction::new(
                    name.clone(),
                    signature.clone(),
                    body.clone(),
                    env,
                )))
            }
            NodeKind::Call { function, args } => {
                let callee = self.eval_node(function, frame)?;
                let callee = self.force_unwind(callee)?;
                match callee {
                    Value::Function(func) => self.apply_closure(node, &func, args, frame),
                    Value::NativeFunction(name) => {
                        self.apply_builtin(node, &name.clone(), args, frame)
                    }
                    other => Err(Unwind::Error(
                        RuntimeError::new(
                            ErrorKind::InvalidCall,
                            format!("attempt to apply non-function ({})", other.type_name()),
                        )
                        .with_call(node.clone()),
                    )),
                }
            }
            NodeKind::Return(value) => {
                let value = match value {
                    Some(value) => {
                        let v = self.eval_node(value, frame)?;
                        self.force_unwind(v)?
                    }
                    None => Value::Null,
                };
                Err(Unwind::Return(value))
            }
        }
    }

    fn statement_event(&mut self, node: &Rc<Node>) -> Result<(), Unwind> {
        if self.ctx.take_interrupt() {
            return Err(Unwind::Error(RuntimeError::new(
                ErrorKind::Interrupted,
                "interrupted",
            )));
        }
        let listeners = self.ctx.statement_listeners();
        for listener in listeners {
            listener.on_statement(self, node);
        }
        Ok(())
    }

    fn force_unwind(&mut self, value: Value) -> EvalResult {
        promise::force_value(self, value).map_err(Unwind::from)
    }

    // --- variable reads ----------------------------------------------------

    fn read_variable(&mut self, node: &Rc<Node>, frame: &Frame, name: Rc<str>) -> EvalResult {
        let key = (Rc::as_ptr(node) as usize, name.clone());
        let descriptor = frame.descriptor();
        let cached = self
            .site_caches
            .get(&key)
            .and_then(|cache| cache.lookup(descriptor));
        if let Some(entry) = cached {
            match entry {
                Some(result) if result.is_valid() => {
                    if let Some(value) = self.use_lookup_result(&result, &name)? {
                        return Ok(value);
                    }
                }
                Some(_) => {
                    // Invalidated; refresh below.
                }
                // Known not cacheable for this descriptor.
                None => return self.slow_lookup(frame, &name),
            }
        }

        let fresh = self.ctx.monitor().lookup(frame, &name);
        self.site_caches
            .entry(key)
            .or_default()
            .update(descriptor, fresh.clone());
        if let Some(result) = fresh {
            if let Some(value) = self.use_lookup_result(&result, &name)? {
                return Ok(value);
            }
        }
        self.slow_lookup(frame, &name)
    }

    /// Use a monitor lookup result; `Ok(None)` means the result could not
    /// be used after all and the caller falls back to the slow path.
    fn use_lookup_result(
        &mut self,
        result: &frame_store::LookupResult,
        name: &str,
    ) -> Result<Option<Value>, Unwind> {
        match result {
            frame_store::LookupResult::Stable { .. } => match result.stable_value() {
                Ok(Some(value)) => match value {
                    Value::Promise(p) => Ok(Some(self.force_unwind(Value::Promise(p))?)),
                    Value::Unbound => Ok(None),
                    value => Ok(Some(value)),
                },
                Ok(None) | Err(_) => Ok(None),
            },
            frame_store::LookupResult::FrameAndSlot {
                assumption,
                frame: target,
                slot,
            } => {
                if !assumption.is_valid() {
                    return Ok(None);
                }
                let read = self.ctx.monitor().get_value(target, *slot);
                match read {
                    SlotValue::Plain(Value::Unbound) => Ok(None),
                    SlotValue::Plain(value) => Ok(Some(self.force_unwind(value)?)),
                    SlotValue::Active(binding) => {
                        Ok(Some(self.call_active_binding(&binding, target)?))
                    }
                }
            }
            frame_store::LookupResult::Missing { assumption } => {
                if !assumption.is_valid() {
                    return Ok(None);
                }
                Err(Unwind::Error(RuntimeError::new(
                    ErrorKind::InvalidArgument,
                    format!("object '{}' not found", name),
                )))
            }
        }
    }

    fn slow_lookup(&mut self, frame: &Frame, name: &str) -> EvalResult {
        let mut current = Some(frame.clone());
        while let Some(f) = current {
            let found = self.ctx.monitor().find_slot(f.descriptor(), name);
            if let Some(slot) = found {
                let read = self.ctx.monitor().get_value(&f, slot);
                match read {
                    SlotValue::Plain(Value::Unbound) => {}
                    SlotValue::Plain(value) => return self.force_unwind(value),
                    SlotValue::Active(binding) => return self.call_active_binding(&binding, &f),
                }
            }
            current = f.enclosing_frame();
        }
        Err(Unwind::Error(RuntimeError::new(
            ErrorKind::InvalidArgument,
            format!("object '{}' not found", name),
        )))
    }

    fn call_active_binding(&mut self, binding: &ActiveBinding, frame: &Frame) -> EvalResult {
        let call_node = Node::call(Node::constant(binding.function().clone()), vec![]);
        match binding.function() {
            Value::Function(func) => self.apply_closure(&call_node, &func.clone(), &[], frame),
            Value::NativeFunction(name) => self.apply_builtin(&call_node, &name.clone(), &[], frame),
            other => Err(Unwind::Error(RuntimeError::new(
                ErrorKind::InvalidCall,
                format!("active binding is not a function ({})", other.type_name()),
            ))),
        }
    }

    fn read_varargs(&mut self, frame: &Frame) -> RResult<Value> {
        let slot = self
            .ctx
            .monitor()
            .find_slot(frame.descriptor(), VARARG_NAME)
            .ok_or_else(|| {
                RuntimeError::new(ErrorKind::InvalidCall, "'...' used in an incorrect context")
            })?;
        match self.ctx.monitor().get_value(frame, slot) {
            SlotValue::Plain(value @ Value::Args(_)) => Ok(value),
            _ => Err(RuntimeError::new(
                ErrorKind::InvalidCall,
                "'...' used in an incorrect context",
            )),
        }
    }

    // --- writes ------------------------------------------------------------

    fn local_assign(&mut self, frame: &Frame, name: &str, value: Value) {
        let descriptor = frame.descriptor();
        let slot = self
            .ctx
            .monitor()
            .find_or_add_slot(descriptor, name, kind_for(&value));
        self.write_slot(frame, slot, value, false);
    }

    /// The non-local assignment operator: find the binding along the
    /// enclosing chain; fall through to defining it in the global
    /// environment.
    fn super_assign(&mut self, frame: &Frame, name: &str, value: Value) {
        let mut current = frame.enclosing_frame();
        while let Some(f) = current {
            let found = self.ctx.monitor().find_slot(f.descriptor(), name);
            if let Some(slot) = found {
                self.write_slot(&f, slot, value, true);
                return;
            }
            current = f.enclosing_frame();
        }
        let global = self.ctx.global_frame();
        let slot = self
            .ctx
            .monitor()
            .find_or_add_slot(global.descriptor(), name, kind_for(&value));
        self.write_slot(&global, slot, value, true);
    }

    fn write_slot(&mut self, frame: &Frame, slot: frame_store::SlotIndex, value: Value, non_local: bool) {
        let monitor = self.ctx.monitor();
        match value {
            Value::Logical(b) => monitor.set_byte_and_invalidate(frame, slot, b, non_local),
            Value::Int(i) => monitor.set_int_and_invalidate(frame, slot, i, non_local),
            Value::Double(d) => monitor.set_double_and_invalidate(frame, slot, d, non_local),
            other => monitor.set_object_and_invalidate(frame, slot, other, non_local),
        }
    }

    // --- calls -------------------------------------------------------------

    /// Expand `...` references among supplied arguments by splicing the
    /// caller's variadic pack; forwarded promises keep their identity.
    fn expand_supplied(
        &mut self,
        args: &[core_types::Argument],
        caller_frame: &Frame,
    ) -> Result<Vec<SuppliedArg>, Unwind> {
        let mut supplied = Vec::with_capacity(args.len());
        for arg in args {
            if matches!(arg.value.kind, NodeKind::Varargs) {
                let pack = self.read_varargs(caller_frame)?;
                let Value::Args(pack) = pack else { unreachable!() };
                for (name, value) in pack.names.iter().zip(pack.values.iter()) {
                    supplied.push(SuppliedArg {
                        name: name.clone(),
                        payload: SuppliedPayload::Value(value.clone()),
                    });
                }
            } else {
                supplied.push(SuppliedArg {
                    name: arg.name.clone(),
                    payload: SuppliedPayload::Expr(arg.value.clone()),
                });
            }
        }
        Ok(supplied)
    }

    fn apply_closure(
        &mut self,
        call_node: &Rc<Node>,
        func: &Rc<RFunction>,
        args: &[core_types::Argument],
        caller_frame: &Frame,
    ) -> EvalResult {
        let supplied = self.expand_supplied(args, caller_frame)?;
        let matched = match_arguments(&func.signature, &supplied)
            .map_err(|e| Unwind::Error(e.with_call(call_node.clone())))?;

        let descriptor = match func.descriptor.get() {
            Some(fd) => fd,
            None => {
                let name = func.name.as_deref().unwrap_or("<anonymous>");
                let fd = self.ctx.monitor().initialize_function_descriptor(name);
                func.descriptor.set(Some(fd));
                fd
            }
        };

        let caller_env = self.ctx.environments().register(caller_frame);
        let current = self.stack.current_call();
        let parent = Caller::unwrap_promise_caller(&current);
        let record = Caller::function(parent, current, call_node.clone());

        let frame = Frame::new(descriptor, record.clone());
        frame.set_function(func.clone());
        frame.set_caller_frame(caller_frame.clone());
        let enclosing = self.ctx.environments().frame(func.env);
        frame.set_enclosing_frame(enclosing.clone());
        self.ctx
            .monitor()
            .initialize_enclosing_frame(&frame, enclosing.as_ref());

        let mut argument_values = Vec::with_capacity(matched.len());
        for (i, matched_arg) in matched.into_iter().enumerate() {
            let formal = func.signature.name(i).clone();
            let value = match matched_arg {
                MatchedArg::Missing => Value::Missing,
                MatchedArg::Supplied(arg) => self.argument_value(arg, caller_env),
                MatchedArg::Varargs(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    let mut names = Vec::with_capacity(items.len());
                    for item in items {
                        names.push(item.name.clone());
                        values.push(self.argument_value(item, caller_env));
                    }
                    Value::Args(Rc::new(ArgsAndNames { values, names }))
                }
            };
            let slot = self
                .ctx
                .monitor()
                .find_or_add_slot(descriptor, &formal, SlotKind::Object);
            self.ctx.monitor().set_object(&frame, slot, value.clone());
            argument_values.push(value);
        }
        frame.set_arguments(argument_values);
        self.ctx.environments().register(&frame);

        self.stack.push(frame.clone(), record);
        let result = self.eval_node(&func.body, &frame);
        self.stack.pop();
        match result {
            Err(Unwind::Return(value)) => Ok(value),
            other => other,
        }
    }

    fn argument_value(&mut self, arg: SuppliedArg, caller_env: core_types::EnvId) -> Value {
        match arg.payload {
            SuppliedPayload::Expr(node) => {
                if matches!(node.kind, NodeKind::MissingArg) {
                    return Value::Missing;
                }
                // Constant arguments are safely evaluable ahead of time;
                // the optimizer may elide their slots until a frame
                // inspection deoptimizes them.
                let eager = matches!(node.kind, NodeKind::Constant(_));
                Value::Promise(PromiseData::new(node, caller_env, eager))
            }
            SuppliedPayload::Value(value) => value,
        }
    }

    fn apply_builtin(
        &mut self,
        call_node: &Rc<Node>,
        name: &str,
        args: &[core_types::Argument],
        caller_frame: &Frame,
    ) -> EvalResult {
        let builtin = self.ctx.builtin(name).ok_or_else(|| {
            Unwind::Error(
                RuntimeError::new(ErrorKind::InvalidCall, format!("could not find function \"{}\"", name))
                    .with_call(call_node.clone()),
            )
        })?;

        let supplied = self.expand_supplied(args, caller_frame)?;
        let mut evaled = Vec::with_capacity(supplied.len());
        for arg in supplied {
            let value = match arg.payload {
                SuppliedPayload::Expr(node) => self.eval_node(&node, caller_frame)?,
                SuppliedPayload::Value(value) => value,
            };
            let value = self.force_unwind(value)?;
            evaled.push((arg.name, value));
        }

        let current = self.stack.current_call();
        let parent = Caller::unwrap_promise_caller(&current);
        let record = Caller::function(parent, current, call_node.clone());
        let frame = Frame::new(self.ctx.builtin_descriptor(), record.clone());
        frame.set_caller_frame(caller_frame.clone());

        self.stack.push(frame.clone(), record);
        let result = builtin.call(self, &frame, &evaled);
        self.stack.pop();
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.call.is_none() => {
                Err(Unwind::Error(err.with_call(call_node.clone())))
            }
            Err(err) => Err(Unwind::Error(err)),
        }
    }
}

fn kind_for(value: &Value) -> SlotKind {
    match value {
        Value::Logical(_) => SlotKind::Byte,
        Value::Int(_) => SlotKind::Int,
        Value::Double(_) => SlotKind::Double,
        _ => SlotKind::Object,
    }
}

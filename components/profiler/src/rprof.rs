//! The sampling profiler.
//!
//! The output is a sequence of call stacks, one per sample interval, with
//! stack entries identified by quoted function names. With memory
//! profiling each stack is preceded by a quad of byte counts
//! `:largeV:smallV:nodes:copied:` allocated in the interval. With line
//! profiling source files are listed as `#File N: path` lines and `N#L`
//! references precede the function names.
//!
//! A timer thread sets a tick flag at each interval; the statement
//! listener drains the flag at the next statement entry and snapshots the
//! caller chain, so samples always observe a consistent state.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use core_types::{
    object_size, AllocationListener, Caller, ListenerId, Node, RResult, Value,
    LARGE_VECTOR_THRESHOLD,
};
use interpreter::{Context, Interpreter, StatementListener, StatementListenerId};

/// Parameters of a profiling session.
#[derive(Debug, Clone)]
pub struct ProfParams {
    /// Output file; empty disables profiling.
    pub filename: String,
    /// Append to the output file instead of truncating it.
    pub append: bool,
    /// Sample interval in seconds.
    pub interval: f64,
    /// Account allocations and copies per sample.
    pub mem_profiling: bool,
    /// Accepted and reported as unsupported.
    pub gc_profiling: bool,
    /// Emit source file and line references.
    pub line_profiling: bool,
}

impl ProfParams {
    /// Parameters with the given output file and interval, everything
    /// else off.
    pub fn new(filename: &str, interval: f64) -> Self {
        Self {
            filename: filename.to_string(),
            append: false,
            interval,
            mem_profiling: false,
            gc_profiling: false,
            line_profiling: false,
        }
    }
}

/// Allocation byte counts for one sample interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryQuad {
    /// Bytes in vectors at or above the large-vector threshold.
    pub large_v: u64,
    /// Bytes in smaller vectors.
    pub small_v: u64,
    /// Bytes in non-vector values.
    pub nodes: u64,
    /// Bytes copied by duplications.
    pub copied: u64,
}

#[derive(Debug, Default)]
struct MemoryCounters {
    large_v: Cell<u64>,
    small_v: Cell<u64>,
    nodes: Cell<u64>,
    copied: Cell<u64>,
}

impl MemoryCounters {
    fn copy_and_clear(&self) -> MemoryQuad {
        MemoryQuad {
            large_v: self.large_v.replace(0),
            small_v: self.small_v.replace(0),
            nodes: self.nodes.replace(0),
            copied: self.copied.replace(0),
        }
    }
}

/// One captured stack element, innermost first in the capture buffer.
#[derive(Debug, Clone)]
struct StackElement {
    name: Option<Rc<str>>,
    path: Option<Rc<str>>,
    line: u32,
}

impl StackElement {
    fn of(node: &Node) -> Self {
        let source = node.source_section();
        Self {
            name: node.root_name(),
            path: source.as_ref().map(|s| s.path.clone()),
            line: source.map_or(0, |s| s.line),
        }
    }
}

/// Emulates a sampling timer: collects the stack of functions whenever the
/// sample interval has rolled over at a statement entry.
struct SampleListener {
    tick: Arc<AtomicBool>,
    memory_profiling: bool,
    counters: MemoryCounters,
    stacks: RefCell<Vec<Vec<StackElement>>>,
    memory: RefCell<Vec<MemoryQuad>>,
}

impl SampleListener {
    fn new(tick: Arc<AtomicBool>, memory_profiling: bool) -> Self {
        Self {
            tick,
            memory_profiling,
            counters: MemoryCounters::default(),
            stacks: RefCell::new(Vec::new()),
            memory: RefCell::new(Vec::new()),
        }
    }

    fn collect_stack(&self, interp: &Interpreter, node: &Rc<Node>) {
        let mut stack = vec![StackElement::of(node)];
        interp.stack().iterate_frames(|entry| {
            let call = Caller::unwrap_promise_caller(&entry.call);
            if call.is_valid() {
                if let Some(syntax) = call.syntax() {
                    stack.push(StackElement::of(&syntax));
                }
            }
        });
        self.stacks.borrow_mut().push(stack);
        if self.memory_profiling {
            self.memory.borrow_mut().push(self.counters.copy_and_clear());
        }
    }
}

impl StatementListener for SampleListener {
    fn on_statement(&self, interp: &Interpreter, node: &Rc<Node>) {
        if self.tick.load(Ordering::Acquire) {
            self.collect_stack(interp, node);
            self.tick.store(false, Ordering::Release);
        }
    }
}

impl AllocationListener for SampleListener {
    fn report_allocation(&self, value: &Value) {
        let size = object_size(value);
        if value.is_vector() {
            if size >= LARGE_VECTOR_THRESHOLD {
                self.counters.large_v.set(self.counters.large_v.get() + size);
            } else {
                self.counters.small_v.set(self.counters.small_v.get() + size);
            }
        } else {
            self.counters.nodes.set(self.counters.nodes.get() + size);
        }
    }

    fn report_copying(&self, source: &Value) {
        self.counters
            .copied
            .set(self.counters.copied.get() + object_size(source));
    }
}

struct ProfilerState {
    filename: String,
    append: bool,
    interval_ms: u64,
    line_profiling: bool,
    memory_profiling: bool,
    listener: Rc<SampleListener>,
    statement_id: StatementListenerId,
    alloc_id: Option<ListenerId>,
    running: Arc<AtomicBool>,
}

/// The profiler: `{disabled -> enabled -> disabled}`.
///
/// `start` while enabled performs an implicit `stop` first; an empty
/// output filename is a `stop`. Stopping writes the collected samples and
/// deregisters all listeners. The timer thread is detached; its one
/// possible post-stop tick is ignored because the statement listener is
/// already removed.
pub struct Profiler {
    state: RefCell<Option<ProfilerState>>,
}

impl Profiler {
    /// Create a disabled profiler.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(None),
        }
    }

    /// Whether a profiling session is active.
    pub fn is_enabled(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Start a profiling session.
    pub fn start(&self, ctx: &Context, params: ProfParams) -> RResult<()> {
        if params.filename.is_empty() {
            return self.stop(ctx);
        }
        if self.is_enabled() {
            self.stop(ctx)?;
        }
        if params.gc_profiling {
            eprintln!("Rprof: gc profiling not supported");
        }
        // Open eagerly so the initiating call reports the I/O error.
        let file = open_output(&params.filename, params.append)?;
        drop(file);

        let interval_ms = (params.interval * 1e3) as u64;
        let tick = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let listener = Rc::new(SampleListener::new(tick.clone(), params.mem_profiling));

        let statement_id = ctx.add_statement_listener(listener.clone());
        let alloc_id = if params.mem_profiling {
            Some(ctx.data_factory().add_listener(listener.clone()))
        } else {
            None
        };

        {
            let running = running.clone();
            thread::spawn(move || {
                while running.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(interval_ms.max(1)));
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    tick.store(true, Ordering::Release);
                }
            });
        }

        *self.state.borrow_mut() = Some(ProfilerState {
            filename: params.filename,
            append: params.append,
            interval_ms,
            line_profiling: params.line_profiling,
            memory_profiling: params.mem_profiling,
            listener,
            statement_id,
            alloc_id,
            running,
        });
        Ok(())
    }

    /// Stop the session, write the output file and deregister listeners.
    /// A no-op when disabled.
    pub fn stop(&self, ctx: &Context) -> RResult<()> {
        let Some(state) = self.state.borrow_mut().take() else {
            return Ok(());
        };
        state.running.store(false, Ordering::Release);
        ctx.remove_statement_listener(state.statement_id);
        if let Some(id) = state.alloc_id {
            ctx.data_factory().remove_listener(id);
        }
        write_output(&state)
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

fn open_output(filename: &str, append: bool) -> RResult<std::fs::File> {
    let mut options = OpenOptions::new();
    options.create(true).write(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    Ok(options.open(filename)?)
}

fn write_output(state: &ProfilerState) -> RResult<()> {
    let mut out = open_output(&state.filename, state.append)?;
    let stacks = state.listener.stacks.borrow();
    let memory = state.listener.memory.borrow();

    let mut header = String::new();
    if state.memory_profiling {
        header.push_str("memory profiling: ");
    }
    if state.line_profiling {
        header.push_str("line profiling: ");
    }
    header.push_str(&format!("sample.interval={}\n", state.interval_ms * 1000));
    out.write_all(header.as_bytes())?;

    // Assign file indexes in first-seen order across all captured stacks.
    let mut file_map: HashMap<Rc<str>, usize> = HashMap::new();
    if state.line_profiling {
        let mut next_index = 0;
        for stack in stacks.iter() {
            for element in stack.iter().rev() {
                if let Some(path) = &element.path {
                    if !file_map.contains_key(path) {
                        next_index += 1;
                        file_map.insert(path.clone(), next_index);
                        out.write_all(format!("#File {}: {}\n", next_index, path).as_bytes())?;
                    }
                }
            }
        }
    }

    for (index, stack) in stacks.iter().enumerate() {
        let mut parts: Vec<String> = Vec::new();
        // The sampled statement's source position, once per sample.
        if state.line_profiling {
            if let Some(element) = stack.iter().find(|e| e.path.is_some()) {
                if let Some(file_index) = element.path.as_ref().and_then(|p| file_map.get(p)) {
                    parts.push(format!("{}#{}", file_index, element.line));
                }
            }
        }
        // Stack entries outer-to-inner; non-function frames are skipped.
        for element in stack.iter().rev() {
            if let Some(name) = &element.name {
                parts.push(format!("\"{}\"", name));
            }
        }
        let mut line = String::new();
        if state.memory_profiling {
            let quad = memory.get(index).copied().unwrap_or_default();
            line.push_str(&format!(
                ":{}:{}:{}:{}:",
                quad.large_v, quad.small_v, quad.nodes, quad.copied
            ));
            if !parts.is_empty() {
                line.push(' ');
            }
        }
        line.push_str(&parts.join(" "));
        line.push('\n');
        out.write_all(line.as_bytes())?;
    }
    Ok(())
}

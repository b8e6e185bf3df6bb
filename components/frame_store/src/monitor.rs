//! The slot-change monitor: descriptor metadata, enclosing-chain
//! assumptions and the cross-frame lookup cache.
//!
//! The monitor maintains information about the current hierarchy of
//! environments. The information is described as assumptions that are
//! invalidated when the layout changes, so cached lookups are never
//! observed stale. Most function lookups can be answered from this
//! knowledge alone.
//!
//! All mutating operations go through one monitor handle; they are
//! slow-path operations invoked off the hot read path.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use core_types::{FrameDescriptorId, InvalidAssumption, RResult, Value};

use crate::active_binding::ActiveBinding;
use crate::assumption::{Assumption, StableValue};
use crate::frame::{Frame, FrameCell, SlotIndex, SlotKind, WeakFrame};
use crate::multi_slot::MultiSlotData;
use crate::slot_info::FrameSlotInfo;

/// Result of a previous lookup that can be answered from hierarchy
/// knowledge alone. Stored for caching and invalidation.
#[derive(Debug, Clone)]
pub enum LookupResult {
    /// The binding has a known-stable value.
    Stable {
        /// Valid while no binding on the consulted chain was redefined.
        assumption: Assumption,
        /// The stable binding, with its own change assumption.
        stable: Rc<StableValue<Value>>,
    },
    /// The binding lives in a known singleton frame; re-read on use.
    FrameAndSlot {
        /// Valid while no binding on the consulted chain was redefined.
        assumption: Assumption,
        /// The singleton frame holding the binding.
        frame: Frame,
        /// The slot within that frame.
        slot: SlotIndex,
    },
    /// The identifier is known absent along the chain.
    Missing {
        /// Valid while no binding on the consulted chain was redefined.
        assumption: Assumption,
    },
}

impl LookupResult {
    /// Whether the result may still be used.
    pub fn is_valid(&self) -> bool {
        match self {
            LookupResult::Stable { assumption, stable } => {
                assumption.is_valid() && stable.assumption().is_valid()
            }
            LookupResult::FrameAndSlot { assumption, .. } => assumption.is_valid(),
            LookupResult::Missing { assumption } => assumption.is_valid(),
        }
    }

    fn invalidate(&self) {
        match self {
            LookupResult::Stable { assumption, .. } => assumption.invalidate(),
            LookupResult::FrameAndSlot { assumption, .. } => assumption.invalidate(),
            LookupResult::Missing { assumption } => assumption.invalidate(),
        }
    }

    /// The stable value, with a forced promise unwrapped to its result.
    /// Fails when any guarding assumption has been invalidated.
    pub fn stable_value(&self) -> Result<Option<Value>, InvalidAssumption> {
        match self {
            LookupResult::Stable { assumption, stable } => {
                assumption.check()?;
                stable.assumption().check()?;
                let value = stable.value().clone();
                if let Value::Promise(p) = &value {
                    if p.is_forced() {
                        return Ok(p.forced_value());
                    }
                }
                Ok(Some(value))
            }
            LookupResult::FrameAndSlot { assumption, .. } => {
                assumption.check()?;
                Ok(None)
            }
            LookupResult::Missing { assumption } => {
                assumption.check()?;
                Ok(None)
            }
        }
    }
}

/// A slot read, distinguishing plain values from active bindings.
#[derive(Debug, Clone)]
pub enum SlotValue {
    /// An ordinary value.
    Plain(Value),
    /// A function-backed binding; the reader must invoke the getter.
    Active(ActiveBinding),
}

struct SlotDescriptor {
    identifier: Rc<str>,
    kind: Cell<SlotKind>,
    info: Rc<FrameSlotInfo>,
}

/// Every frame descriptor is associated with one metadata record. For
/// function descriptors one record corresponds to many frames; manually
/// created environments have exactly one (singleton) frame.
struct DescriptorMetaData {
    name: String,
    singleton_frame: Option<WeakFrame>,
    sub_descriptors: HashSet<FrameDescriptorId>,
    /// All identifiers ever looked up "across" this descriptor. A binding
    /// change for one of these names must check this descriptor and all
    /// sub-descriptors.
    previous_lookups: HashSet<Rc<str>>,
    /// Lookups that started in this descriptor.
    lookup_results: HashMap<Rc<str>, LookupResult>,
    enclosing: Option<FrameDescriptorId>,
    enclosing_assumption: Assumption,
    no_active_binding: Assumption,
}

struct DescriptorData {
    slots: Vec<SlotDescriptor>,
    index: HashMap<Rc<str>, usize>,
    meta: DescriptorMetaData,
}

/// Central store of descriptor metadata, slot assumptions and the lookup
/// cache, plus the multi-context slot machinery.
pub struct SlotChangeMonitor {
    descriptors: RefCell<Vec<DescriptorData>>,
    shared_contexts: Cell<bool>,
    context_count: Cell<usize>,
    current_context: Cell<usize>,
}

impl Default for SlotChangeMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotChangeMonitor {
    /// Create an empty monitor with a single context.
    pub fn new() -> Self {
        Self {
            descriptors: RefCell::new(Vec::new()),
            shared_contexts: Cell::new(false),
            context_count: Cell::new(1),
            current_context: Cell::new(0),
        }
    }

    // --- descriptor registration -------------------------------------------

    /// Register a descriptor for function frames (no singleton frame).
    pub fn initialize_function_descriptor(&self, name: &str) -> FrameDescriptorId {
        self.push_descriptor(name, None)
    }

    /// Register a descriptor for a non-function frame. The singleton frame
    /// must be attached with [`SlotChangeMonitor::set_singleton_frame`]
    /// once it exists.
    pub fn initialize_non_function_descriptor(&self, name: &str) -> FrameDescriptorId {
        self.push_descriptor(name, None)
    }

    fn push_descriptor(&self, name: &str, singleton: Option<WeakFrame>) -> FrameDescriptorId {
        let mut descs = self.descriptors.borrow_mut();
        let id = FrameDescriptorId(descs.len());
        descs.push(DescriptorData {
            slots: Vec::new(),
            index: HashMap::new(),
            meta: DescriptorMetaData {
                name: name.to_string(),
                singleton_frame: singleton,
                sub_descriptors: HashSet::new(),
                previous_lookups: HashSet::new(),
                lookup_results: HashMap::new(),
                enclosing: None,
                enclosing_assumption: Assumption::new("enclosing frame descriptor"),
                no_active_binding: Assumption::new("contains no active binding"),
            },
        });
        id
    }

    /// Attach the one frame of a non-function descriptor.
    pub fn set_singleton_frame(&self, descriptor: FrameDescriptorId, frame: &Frame) {
        let mut descs = self.descriptors.borrow_mut();
        descs[descriptor.0].meta.singleton_frame = Some(frame.downgrade());
    }

    /// Diagnostic name of a descriptor.
    pub fn descriptor_name(&self, descriptor: FrameDescriptorId) -> String {
        self.descriptors.borrow()[descriptor.0].meta.name.clone()
    }

    /// The singleton frame of a descriptor, if it has one and it is alive.
    pub fn singleton_frame(&self, descriptor: FrameDescriptorId) -> Option<Frame> {
        self.descriptors.borrow()[descriptor.0]
            .meta
            .singleton_frame
            .as_ref()
            .and_then(WeakFrame::upgrade)
    }

    // --- slots -------------------------------------------------------------

    /// Find an existing slot by identifier.
    pub fn find_slot(&self, descriptor: FrameDescriptorId, identifier: &str) -> Option<SlotIndex> {
        self.descriptors.borrow()[descriptor.0]
            .index
            .get(identifier)
            .map(|&i| SlotIndex(i))
    }

    /// Find or create a slot. Creating a slot invalidates cached lookups
    /// for the identifier in the descriptor's subtree: a new binding can
    /// shadow anything resolved through here before.
    pub fn find_or_add_slot(
        &self,
        descriptor: FrameDescriptorId,
        identifier: &str,
        kind: SlotKind,
    ) -> SlotIndex {
        let mut descs = self.descriptors.borrow_mut();
        if let Some(&i) = descs[descriptor.0].index.get(identifier) {
            return SlotIndex(i);
        }
        let identifier: Rc<str> = Rc::from(identifier);
        invalidate_names_rec(&mut descs, descriptor, std::slice::from_ref(&identifier));
        let data = &mut descs[descriptor.0];
        let is_singleton = data.meta.singleton_frame.is_some();
        let is_global = data.meta.name == "global";
        let is_new_env = data.meta.name.starts_with("<new-env-");
        let info = Rc::new(FrameSlotInfo::new(
            is_singleton,
            is_global,
            &identifier,
            is_new_env,
        ));
        let index = data.slots.len();
        data.slots.push(SlotDescriptor {
            identifier: identifier.clone(),
            kind: Cell::new(kind),
            info,
        });
        data.index.insert(identifier, index);
        SlotIndex(index)
    }

    /// Number of slots in a descriptor.
    pub fn slot_count(&self, descriptor: FrameDescriptorId) -> usize {
        self.descriptors.borrow()[descriptor.0].slots.len()
    }

    /// Identifier of a slot.
    pub fn slot_identifier(&self, descriptor: FrameDescriptorId, slot: SlotIndex) -> Rc<str> {
        self.descriptors.borrow()[descriptor.0].slots[slot.0]
            .identifier
            .clone()
    }

    /// All identifiers of a descriptor, in slot order.
    pub fn identifiers(&self, descriptor: FrameDescriptorId) -> Vec<Rc<str>> {
        self.descriptors.borrow()[descriptor.0]
            .slots
            .iter()
            .map(|s| s.identifier.clone())
            .collect()
    }

    /// Declared kind of a slot.
    pub fn slot_kind(&self, descriptor: FrameDescriptorId, slot: SlotIndex) -> SlotKind {
        self.descriptors.borrow()[descriptor.0].slots[slot.0].kind.get()
    }

    /// Per-slot metadata handle.
    pub fn slot_info(&self, descriptor: FrameDescriptorId, slot: SlotIndex) -> Rc<FrameSlotInfo> {
        self.descriptors.borrow()[descriptor.0].slots[slot.0].info.clone()
    }

    /// The not-changed-non-locally assumption of a slot.
    pub fn not_changed_non_locally(
        &self,
        descriptor: FrameDescriptorId,
        slot: SlotIndex,
    ) -> Assumption {
        self.slot_info(descriptor, slot).non_local_modified().clone()
    }

    /// The contains-no-active-binding assumption of a descriptor.
    pub fn no_active_binding_assumption(&self, descriptor: FrameDescriptorId) -> Assumption {
        self.descriptors.borrow()[descriptor.0]
            .meta
            .no_active_binding
            .clone()
    }

    // --- enclosing chain ---------------------------------------------------

    /// The enclosing descriptor currently assumed for `descriptor`.
    pub fn enclosing_descriptor(&self, descriptor: FrameDescriptorId) -> Option<FrameDescriptorId> {
        self.descriptors.borrow()[descriptor.0].meta.enclosing
    }

    /// The assumption guarding the enclosing-descriptor relation.
    pub fn enclosing_assumption(&self, descriptor: FrameDescriptorId) -> Assumption {
        self.descriptors.borrow()[descriptor.0]
            .meta
            .enclosing_assumption
            .clone()
    }

    /// Record the initial enclosing frame of a descriptor and set the
    /// sub-descriptor back-pointer. May be called repeatedly with the same
    /// enclosing descriptor.
    pub fn initialize_enclosing_frame(&self, frame: &Frame, enclosing: Option<&Frame>) {
        let descriptor = frame.descriptor();
        let new_enclosing = enclosing.map(Frame::descriptor);
        let mut descs = self.descriptors.borrow_mut();
        if descs[descriptor.0].meta.enclosing == new_enclosing {
            return;
        }
        debug_assert!(
            descs[descriptor.0].meta.enclosing.is_none(),
            "existing enclosing descriptor while initializing {}",
            descs[descriptor.0].meta.name
        );
        update_enclosing(&mut descs[descriptor.0].meta, new_enclosing);
        if let Some(new_id) = new_enclosing {
            descs[new_id.0].meta.sub_descriptors.insert(descriptor);
        }
    }

    /// Rewire the enclosing frame of `frame`, invalidating every cached
    /// lookup that started in its descriptor's subtree.
    pub fn set_enclosing_frame(&self, frame: &Frame, new_enclosing: Option<&Frame>) {
        let descriptor = frame.descriptor();
        let new_id = new_enclosing.map(Frame::descriptor);
        {
            let mut descs = self.descriptors.borrow_mut();
            invalidate_all_names_rec(&mut descs, descriptor);
            let old_id = descs[descriptor.0].meta.enclosing;
            if let Some(old_id) = old_id {
                descs[old_id.0].meta.sub_descriptors.remove(&descriptor);
            }
            update_enclosing(&mut descs[descriptor.0].meta, new_id);
            if let Some(new_id) = new_id {
                descs[new_id.0].meta.sub_descriptors.insert(descriptor);
            }
        }
        frame.set_enclosing_frame(new_enclosing.cloned());
    }

    /// Insert `new_enclosing` between `frame` and its current enclosing
    /// frame (the `attach` operation on the search path).
    pub fn attach(&self, frame: &Frame, new_enclosing: &Frame) {
        let position_id = frame.descriptor();
        let new_id = new_enclosing.descriptor();
        {
            let mut descs = self.descriptors.borrow_mut();
            let old_id = descs[position_id.0]
                .meta
                .enclosing
                .expect("attach below a frame with no enclosing environment");

            invalidate_all_names_rec(&mut descs, new_id);
            let new_identifiers = descs[new_id.0]
                .slots
                .iter()
                .map(|s| s.identifier.clone())
                .collect::<Vec<_>>();
            invalidate_names_rec(&mut descs, position_id, &new_identifiers);

            let inherited = descs[old_id.0].meta.previous_lookups.clone();
            let new_meta = &mut descs[new_id.0].meta;
            new_meta.previous_lookups.clear();
            new_meta.previous_lookups.extend(inherited);

            update_enclosing(&mut descs[position_id.0].meta, Some(new_id));
            update_enclosing(&mut descs[new_id.0].meta, Some(old_id));
            descs[new_id.0].meta.sub_descriptors.insert(position_id);
            descs[old_id.0].meta.sub_descriptors.remove(&position_id);
            descs[old_id.0].meta.sub_descriptors.insert(new_id);
        }
        let old_enclosing = frame.enclosing_frame();
        new_enclosing.set_enclosing_frame(old_enclosing);
        frame.set_enclosing_frame(Some(new_enclosing.clone()));
    }

    /// Remove the frame directly enclosing `frame` from the chain (the
    /// `detach` operation on the search path).
    pub fn detach(&self, frame: &Frame) {
        let position_id = frame.descriptor();
        {
            let mut descs = self.descriptors.borrow_mut();
            let old_id = descs[position_id.0]
                .meta
                .enclosing
                .expect("detach with no enclosing environment");
            let new_id = descs[old_id.0].meta.enclosing;

            let old_identifiers = descs[old_id.0]
                .slots
                .iter()
                .map(|s| s.identifier.clone())
                .collect::<Vec<_>>();
            invalidate_names_rec(&mut descs, old_id, &old_identifiers);

            update_enclosing(&mut descs[position_id.0].meta, new_id);
            update_enclosing(&mut descs[old_id.0].meta, None);
            descs[old_id.0].meta.sub_descriptors.remove(&position_id);
            if let Some(new_id) = new_id {
                descs[new_id.0].meta.sub_descriptors.remove(&old_id);
                descs[new_id.0].meta.sub_descriptors.insert(position_id);
            }
        }
        let detached = frame.enclosing_frame();
        let new_enclosing = detached.as_ref().and_then(Frame::enclosing_frame);
        if let Some(detached) = detached {
            detached.set_enclosing_frame(None);
        }
        frame.set_enclosing_frame(new_enclosing);
    }

    // --- lookup ------------------------------------------------------------

    /// Try to answer the lookup for `identifier` starting at `frame` from
    /// static knowledge about the hierarchy and stable bindings. Returns
    /// `None` when the lookup cannot be cached (the caller falls back to a
    /// direct per-read walk).
    pub fn lookup(&self, frame: &Frame, identifier: &str) -> Option<LookupResult> {
        let mut descs = self.descriptors.borrow_mut();
        let start_id = frame.descriptor();
        if let Some(result) = descs[start_id.0].meta.lookup_results.get(identifier) {
            if result.is_valid() {
                return Some(result.clone());
            }
        }
        let identifier: Rc<str> = Rc::from(identifier);
        let mut current = frame.clone();
        loop {
            let current_id = current.descriptor();
            if let Some(&slot) = descs[current_id.0].index.get(&identifier) {
                let info = &descs[current_id.0].slots[slot].info;
                let stable = info.stable_value();
                // A stable value holding Unbound is a slot whose binding
                // was removed again; the walk continues past it.
                let unbound = stable
                    .as_ref()
                    .is_some_and(|sv| matches!(sv.value(), Value::Unbound));
                if !unbound {
                    let result = if let Some(stable) = stable {
                        LookupResult::Stable {
                            assumption: Assumption::new(format!("lookup \"{}\"", identifier)),
                            stable,
                        }
                    } else {
                        let singleton = descs[current_id.0]
                            .meta
                            .singleton_frame
                            .as_ref()
                            .and_then(WeakFrame::upgrade);
                        match singleton {
                            Some(singleton) => LookupResult::FrameAndSlot {
                                assumption: Assumption::new(format!("lookup \"{}\"", identifier)),
                                frame: singleton,
                                slot: SlotIndex(slot),
                            },
                            // No stable value and no singleton frame.
                            None => return None,
                        }
                    };
                    add_previous_lookups(&mut descs, frame, &current, &identifier);
                    descs[start_id.0]
                        .meta
                        .lookup_results
                        .insert(identifier, result.clone());
                    return Some(result);
                }
            }
            let next = current.enclosing_frame();
            // The metadata must agree with the actual frame chain; user
            // code can re-parent environments behind our back.
            let next_id = next.as_ref().map(Frame::descriptor);
            if descs[current_id.0].meta.enclosing != next_id {
                return None;
            }
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        add_previous_lookups(&mut descs, frame, &current, &identifier);
        let result = LookupResult::Missing {
            assumption: Assumption::new(format!("lookup \"{}\"", identifier)),
        };
        descs[start_id.0]
            .meta
            .lookup_results
            .insert(identifier, result.clone());
        Some(result)
    }

    /// Invalidate cached lookups for `identifier` in the descriptor and
    /// its subtree. Called for every write of the identifier.
    pub fn invalidate_lookups(&self, descriptor: FrameDescriptorId, identifier: &Rc<str>) {
        let mut descs = self.descriptors.borrow_mut();
        invalidate_names_rec(&mut descs, descriptor, std::slice::from_ref(identifier));
    }

    /// The lookup result cached in a descriptor for an identifier, if any,
    /// without validity filtering. Diagnostic surface for hosts and tests.
    pub fn cached_lookup(&self, descriptor: FrameDescriptorId, identifier: &str) -> Option<LookupResult> {
        self.descriptors.borrow()[descriptor.0]
            .meta
            .lookup_results
            .get(identifier)
            .cloned()
    }

    // --- slot reads --------------------------------------------------------

    /// Read a slot, resolving multi-context storage to the current
    /// context and surfacing active bindings to the caller.
    pub fn get_value(&self, frame: &Frame, slot: SlotIndex) -> SlotValue {
        match frame.get_cell(slot) {
            FrameCell::Boolean(b) => SlotValue::Plain(Value::logical(b)),
            FrameCell::Byte(b) => SlotValue::Plain(Value::Logical(b)),
            FrameCell::Int(i) => SlotValue::Plain(Value::Int(i)),
            FrameCell::Double(d) => SlotValue::Plain(Value::Double(d)),
            FrameCell::Object(v) => SlotValue::Plain(v),
            FrameCell::Active(binding) => SlotValue::Active(binding),
            FrameCell::Multi(data) => SlotValue::Plain(data.get(self.current_context.get())),
        }
    }

    // --- slot writes -------------------------------------------------------

    /// Typed boolean write without assumption maintenance.
    pub fn set_boolean(&self, frame: &Frame, slot: SlotIndex, value: bool) {
        self.set_plain(frame, slot, FrameCell::Boolean(value), Value::logical(value));
    }

    /// Typed byte write without assumption maintenance.
    pub fn set_byte(&self, frame: &Frame, slot: SlotIndex, value: u8) {
        self.set_plain(frame, slot, FrameCell::Byte(value), Value::Logical(value));
    }

    /// Typed integer write without assumption maintenance.
    pub fn set_int(&self, frame: &Frame, slot: SlotIndex, value: i32) {
        self.set_plain(frame, slot, FrameCell::Int(value), Value::Int(value));
    }

    /// Typed double write without assumption maintenance.
    pub fn set_double(&self, frame: &Frame, slot: SlotIndex, value: f64) {
        self.set_plain(frame, slot, FrameCell::Double(value), Value::Double(value));
    }

    /// Object write without assumption maintenance.
    pub fn set_object(&self, frame: &Frame, slot: SlotIndex, value: Value) {
        self.set_plain(frame, slot, FrameCell::Object(value.clone()), value);
    }

    fn set_plain(&self, frame: &Frame, slot: SlotIndex, cell: FrameCell, value: Value) {
        if self.multi_context_active() {
            let info = self.slot_info(frame.descriptor(), slot);
            if is_multi_slot(&info) {
                self.set_multi_slot(frame, slot, &info, value);
                return;
            }
        }
        frame.set_cell(slot, cell);
    }

    /// Typed boolean write with full assumption maintenance.
    pub fn set_boolean_and_invalidate(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        value: bool,
        is_non_local: bool,
    ) {
        self.set_and_invalidate(
            frame,
            slot,
            FrameCell::Boolean(value),
            Value::logical(value),
            is_non_local,
        );
    }

    /// Typed byte write with full assumption maintenance.
    pub fn set_byte_and_invalidate(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        value: u8,
        is_non_local: bool,
    ) {
        self.set_and_invalidate(
            frame,
            slot,
            FrameCell::Byte(value),
            Value::Logical(value),
            is_non_local,
        );
    }

    /// Typed integer write with full assumption maintenance.
    pub fn set_int_and_invalidate(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        value: i32,
        is_non_local: bool,
    ) {
        self.set_and_invalidate(frame, slot, FrameCell::Int(value), Value::Int(value), is_non_local);
    }

    /// Typed double write with full assumption maintenance.
    pub fn set_double_and_invalidate(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        value: f64,
        is_non_local: bool,
    ) {
        self.set_and_invalidate(
            frame,
            slot,
            FrameCell::Double(value),
            Value::Double(value),
            is_non_local,
        );
    }

    /// Object write with full assumption maintenance.
    pub fn set_object_and_invalidate(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        value: Value,
        is_non_local: bool,
    ) {
        self.set_and_invalidate(
            frame,
            slot,
            FrameCell::Object(value.clone()),
            value,
            is_non_local,
        );
    }

    /// Install an active binding, invalidating the descriptor's
    /// no-active-binding assumption.
    pub fn set_active_binding(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        binding: ActiveBinding,
        is_non_local: bool,
    ) {
        let descriptor = frame.descriptor();
        let info = self.slot_info(descriptor, slot);
        frame.set_cell(slot, FrameCell::Active(binding));
        info.clear_stable_value();
        self.check_and_invalidate(frame, &info, is_non_local);
        let identifier = self.slot_identifier(descriptor, slot);
        self.invalidate_lookups(descriptor, &identifier);
        self.descriptors.borrow()[descriptor.0]
            .meta
            .no_active_binding
            .invalidate();
    }

    fn set_and_invalidate(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        cell: FrameCell,
        value: Value,
        is_non_local: bool,
    ) {
        let descriptor = frame.descriptor();
        let info = self.slot_info(descriptor, slot);
        if self.multi_context_active() && is_multi_slot(&info) {
            self.set_multi_slot(frame, slot, &info, value);
            return;
        }
        frame.set_cell(slot, cell);
        let identifier = self.slot_identifier(descriptor, slot);
        if info.needs_invalidation() {
            info.set_value(value, &identifier);
        }
        self.check_and_invalidate(frame, &info, is_non_local);
        self.invalidate_lookups(descriptor, &identifier);
    }

    /// Invalidate the not-changed-non-locally assumption when the write is
    /// non-local or the frame escaped the regular stack. Also invalidates
    /// for local writes into irregular frames; that false positive is
    /// negligible.
    fn check_and_invalidate(&self, frame: &Frame, info: &FrameSlotInfo, is_non_local: bool) {
        if info.non_local_modified().is_valid() && (is_non_local || frame.is_irregular()) {
            info.non_local_modified().invalidate();
        }
    }

    // --- multi-context slots -----------------------------------------------

    /// Enable or disable shared-context mode.
    pub fn set_shared_contexts(&self, enabled: bool) {
        self.shared_contexts.set(enabled);
    }

    /// Set the number of logical contexts.
    pub fn set_context_count(&self, count: usize) {
        self.context_count.set(count.max(1));
    }

    /// Switch the current context id.
    pub fn set_current_context(&self, index: usize) {
        self.current_context.set(index);
    }

    /// The current context id.
    pub fn current_context(&self) -> usize {
        self.current_context.get()
    }

    fn multi_context_active(&self) -> bool {
        self.shared_contexts.get() && self.context_count.get() > 1
    }

    /// Route a write to the per-context entry, promoting the slot on its
    /// first multi-context write. Promotion preserves the initial
    /// context's value at index 0.
    fn set_multi_slot(&self, frame: &Frame, slot: SlotIndex, info: &FrameSlotInfo, value: Value) {
        if info.stable_value().is_none() {
            if let FrameCell::Multi(data) = frame.get_cell(slot) {
                data.set(self.current_context.get(), value);
                return;
            }
        }
        info.non_local_modified().invalidate();
        info.clear_stable_value();
        info.no_multi_slot().invalidate();
        let data = MultiSlotData::new(self.context_count.get());
        if let SlotValue::Plain(prev) = self.get_value(frame, slot) {
            data.set(0, prev);
        }
        data.set(self.current_context.get(), value);
        frame.set_cell(slot, FrameCell::Multi(data));
    }

    /// Promote every slot of a search-path frame to multi-context storage,
    /// replicating the initial context's value into `indices`. Promise
    /// bindings are first forced through `forcer` when `force_promises` is
    /// set. Global-frame slots are promoted with `replicate = false`.
    pub fn handle_all_multi_slots(
        &self,
        frame: &Frame,
        indices: &[usize],
        replicate: bool,
        force_promises: bool,
        forcer: &mut dyn FnMut(&Value) -> RResult<Value>,
    ) -> RResult<()> {
        let count = self.slot_count(frame.descriptor());
        for i in 0..count {
            self.handle_search_path_multi_slot(frame, SlotIndex(i), indices, replicate, force_promises, forcer)?;
        }
        Ok(())
    }

    fn handle_search_path_multi_slot(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        indices: &[usize],
        replicate: bool,
        force_promises: bool,
        forcer: &mut dyn FnMut(&Value) -> RResult<Value>,
    ) -> RResult<()> {
        let info = self.slot_info(frame.descriptor(), slot);
        loop {
            let cell = frame.get_cell(slot);
            let (prev_value, prev_multi) = match &cell {
                FrameCell::Multi(data) => (data.get(0), Some(data.clone())),
                FrameCell::Active(_) => return Ok(()),
                other => (cell_value(other), None),
            };
            let stable = info.stable_value();
            let stable_is_mutable = stable
                .as_ref()
                .is_some_and(|sv| is_mutable_shareable(sv.value()));
            if stable.is_none() || stable_is_mutable || is_mutable_shareable(&prev_value) || !replicate {
                info.clear_stable_value();
                info.non_local_modified().invalidate();
                info.no_multi_slot().invalidate();
                let data = if let Some(prev_multi) = prev_multi {
                    // Multi slots from an earlier promotion are kept and
                    // extended; only the new child contexts get the
                    // replicated value.
                    let data = MultiSlotData::extended_from(&prev_multi, self.context_count.get());
                    if replicate {
                        for &index in indices {
                            data.set(index, copy_if_mutable(&prev_value));
                        }
                    }
                    data
                } else {
                    let mut prev_value = prev_value;
                    if force_promises {
                        prev_value = forcer(&prev_value)?;
                    }
                    let data = MultiSlotData::new(self.context_count.get());
                    if replicate {
                        if let Value::PairList(list) = &prev_value {
                            data.set_all_deep_copy(list);
                        } else {
                            data.set_all(&prev_value);
                        }
                    } else {
                        data.set(0, prev_value);
                    }
                    data
                };
                frame.set_cell(slot, FrameCell::Multi(data));
                return Ok(());
            }
            if !force_promises || !self.eval_and_set_promise(frame, slot, &info, forcer)? {
                return Ok(());
            }
            // The promise was materialized; the stable value may now be
            // gone and the slot turned into a multi slot on re-entry.
        }
    }

    fn eval_and_set_promise(
        &self,
        frame: &Frame,
        slot: SlotIndex,
        info: &FrameSlotInfo,
        forcer: &mut dyn FnMut(&Value) -> RResult<Value>,
    ) -> RResult<bool> {
        let Some(stable) = info.stable_value() else {
            return Ok(false);
        };
        if !matches!(stable.value(), Value::Promise(_)) {
            return Ok(false);
        }
        let forced = forcer(stable.value())?;
        let identifier = self.slot_identifier(frame.descriptor(), slot);
        match forced {
            Value::Logical(b) => {
                frame.set_cell(slot, FrameCell::Byte(b));
                info.set_byte(b, &identifier);
            }
            Value::Int(i) => {
                frame.set_cell(slot, FrameCell::Int(i));
                info.set_int(i, &identifier);
            }
            Value::Double(d) => {
                frame.set_cell(slot, FrameCell::Double(d));
                info.set_double(d, &identifier);
            }
            other => {
                frame.set_cell(slot, FrameCell::Object(other.clone()));
                info.set_value(other, &identifier);
            }
        }
        Ok(true)
    }

    /// Nullify per-context entries of promoted slots when child contexts
    /// exit. With no explicit indices, every context but the initial one
    /// is cleared.
    pub fn clean_multi_slots(&self, frame: &Frame, indices: Option<&[usize]>) {
        let count = self.slot_count(frame.descriptor());
        for i in 0..count {
            if let FrameCell::Multi(data) = frame.get_cell(SlotIndex(i)) {
                match indices {
                    Some(indices) => {
                        for &index in indices {
                            debug_assert!(index != 0, "cannot clean the initial context");
                            data.set(index, Value::Unbound);
                        }
                    }
                    None => {
                        let initial = data.get(0);
                        data.set_all(&Value::Unbound);
                        data.set(0, initial);
                    }
                }
            }
        }
    }
}

fn update_enclosing(meta: &mut DescriptorMetaData, new_enclosing: Option<FrameDescriptorId>) {
    meta.enclosing_assumption.invalidate();
    meta.enclosing = new_enclosing;
    meta.enclosing_assumption = Assumption::new("enclosing frame descriptor");
}

fn add_previous_lookups(descs: &mut [DescriptorData], from: &Frame, to: &Frame, identifier: &Rc<str>) {
    let mut mark = from.clone();
    loop {
        descs[mark.descriptor().0]
            .meta
            .previous_lookups
            .insert(identifier.clone());
        if mark.same_frame(to) {
            break;
        }
        match mark.enclosing_frame() {
            Some(next) => mark = next,
            None => break,
        }
    }
}

fn invalidate_names_rec(descs: &mut Vec<DescriptorData>, fd: FrameDescriptorId, ids: &[Rc<str>]) {
    let mut removed_any = false;
    for id in ids {
        if descs[fd.0].meta.previous_lookups.remove(id) {
            removed_any = true;
        }
    }
    if !removed_any {
        return;
    }
    for id in ids {
        if let Some(result) = descs[fd.0].meta.lookup_results.remove(id) {
            result.invalidate();
        }
    }
    let subs: Vec<FrameDescriptorId> = descs[fd.0].meta.sub_descriptors.iter().copied().collect();
    for sub in subs {
        invalidate_names_rec(descs, sub, ids);
    }
}

fn invalidate_all_names_rec(descs: &mut Vec<DescriptorData>, fd: FrameDescriptorId) {
    for (_, result) in descs[fd.0].meta.lookup_results.drain() {
        result.invalidate();
    }
    if !descs[fd.0].meta.previous_lookups.is_empty() {
        descs[fd.0].meta.previous_lookups.clear();
        let subs: Vec<FrameDescriptorId> = descs[fd.0].meta.sub_descriptors.iter().copied().collect();
        for sub in subs {
            invalidate_all_names_rec(descs, sub);
        }
    }
}

fn is_multi_slot(info: &FrameSlotInfo) -> bool {
    info.possible_multi_slot() || !info.no_multi_slot().is_valid()
}

fn is_mutable_shareable(value: &Value) -> bool {
    matches!(value, Value::PairList(_))
}

fn copy_if_mutable(value: &Value) -> Value {
    match value {
        Value::PairList(list) => Value::PairList(list.deep_copy()),
        other => other.clone(),
    }
}

fn cell_value(cell: &FrameCell) -> Value {
    match cell {
        FrameCell::Boolean(b) => Value::logical(*b),
        FrameCell::Byte(b) => Value::Logical(*b),
        FrameCell::Int(i) => Value::Int(*i),
        FrameCell::Double(d) => Value::Double(*d),
        FrameCell::Object(v) => v.clone(),
        FrameCell::Active(_) | FrameCell::Multi(_) => Value::Unbound,
    }
}

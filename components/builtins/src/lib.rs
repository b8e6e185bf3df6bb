//! Stack introspection builtins and base functions for the Strata runtime.
//!
//! [`install_builtins`] registers every builtin with a context; evaluated
//! code reaches them through `NativeFunction` values bound to their
//! language-visible names.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod args;
mod base;
mod frame_functions;
mod match_call;

use std::rc::Rc;

use core_types::Value;
use frame_store::SlotKind;
use interpreter::Context;

pub use args::{int_arg_or, logical_arg_or, named_or_pos, BuiltinArgs};
pub use base::{Add, Duplicate, Numeric};
pub use frame_functions::{
    FrameHelper, ParentFrame, SysCall, SysCalls, SysFrame, SysFrames, SysFunction, SysNFrame,
    SysParent, SysParents,
};
pub use match_call::MatchCall;

/// Register all builtins with a context and bind their names in the
/// global environment.
pub fn install_builtins(ctx: &Context) {
    let names: [(&str, Rc<dyn interpreter::Builtin>); 13] = [
        ("sys.call", Rc::new(SysCall)),
        ("sys.frame", Rc::new(SysFrame)),
        ("sys.frames", Rc::new(SysFrames)),
        ("sys.nframe", Rc::new(SysNFrame)),
        ("sys.parent", Rc::new(SysParent)),
        ("sys.parents", Rc::new(SysParents)),
        ("sys.calls", Rc::new(SysCalls)),
        ("sys.function", Rc::new(SysFunction)),
        ("parent.frame", Rc::new(ParentFrame)),
        ("match.call", Rc::new(MatchCall)),
        ("numeric", Rc::new(Numeric)),
        ("duplicate", Rc::new(Duplicate)),
        ("+", Rc::new(Add)),
    ];
    let global = ctx.global_frame();
    for (name, builtin) in names {
        ctx.register_builtin(name, builtin);
        let slot = ctx
            .monitor()
            .find_or_add_slot(global.descriptor(), name, SlotKind::Object);
        ctx.monitor()
            .set_object_and_invalidate(&global, slot, Value::NativeFunction(Rc::from(name)), false);
    }
}

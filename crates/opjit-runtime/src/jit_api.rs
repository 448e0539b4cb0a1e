//! JIT runtime API.
//!
//! The C ABI between compiled units and the interpreter. Every function here
//! is `extern "C"` and is registered by name with the code engine, so
//! generated code calls it as an imported symbol.
//!
//! ```text
//! Native code                     Interp
//! -----------                     ------
//!    |-- opjit_pad_sv() ---------->|  box in a pad slot
//!    |-- opjit_sv_nv() ----------->|  numeric value of a box
//!    |-- opjit_sv_set_*() -------->|  store into a box
//!    |-- opjit_new_mortal_sv() --->|  temporary box
//!    |-- opjit_push_sv()/pop_sv -->|  value stack
//!    |-- opjit_call_runloop() ---->|  run a detached fragment
//!    |-- opjit_op_next() --------->|  where to resume
//! ```
//!
//! Helpers never unwind into native code. Failures are recorded on the
//! interpreter and surface once control returns to the dispatch loop.

use opjit_common_core::{OpId, PadIndex};

use crate::error::RuntimeError;
use crate::interp::{runloop, Interp};
use crate::scalar::Scalar;

/// Entry point of a compiled unit. Returns the raw id of the op to resume
/// at (`OpId::NONE_RAW` to stop).
pub type NativeFn = unsafe extern "C" fn(ctx: *mut Interp) -> u32;

// =============================================================================
// Pad
// =============================================================================

/// Box stored in a pad slot. An out-of-range slot faults and yields a
/// temporary so the caller can keep going.
///
/// # Safety
/// - `ctx` must be the interpreter that called the unit
#[no_mangle]
pub extern "C" fn opjit_pad_sv(ctx: *mut Interp, slot: u32) -> *mut Scalar {
    let interp = unsafe { &mut *ctx };
    match interp.pad_slot(PadIndex(slot)) {
        Ok(sv) => sv,
        Err(err) => {
            interp.fail(err);
            interp.new_mortal(Scalar::Undef)
        }
    }
}

/// Save a slot's value for unwind and reset it to undef (`my $x`).
#[no_mangle]
pub extern "C" fn opjit_save_clearsv(ctx: *mut Interp, slot: u32) {
    let interp = unsafe { &mut *ctx };
    if let Err(err) = interp.save_clearsv(PadIndex(slot)) {
        interp.fail(err);
    }
}

// =============================================================================
// Box access
// =============================================================================

#[no_mangle]
pub extern "C" fn opjit_sv_nv(_ctx: *mut Interp, sv: *mut Scalar) -> f64 {
    if sv.is_null() {
        return 0.0;
    }
    unsafe { (*sv).num() }
}

#[no_mangle]
pub extern "C" fn opjit_sv_set_nv(_ctx: *mut Interp, sv: *mut Scalar, value: f64) {
    if !sv.is_null() {
        unsafe { *sv = Scalar::Num(value) };
    }
}

#[no_mangle]
pub extern "C" fn opjit_sv_set_iv(_ctx: *mut Interp, sv: *mut Scalar, value: i64) {
    if !sv.is_null() {
        unsafe { *sv = Scalar::Int(value) };
    }
}

#[no_mangle]
pub extern "C" fn opjit_sv_set_uv(_ctx: *mut Interp, sv: *mut Scalar, value: u64) {
    if !sv.is_null() {
        unsafe { *sv = Scalar::UInt(value) };
    }
}

/// Copy `src`'s contents into `dst`.
#[no_mangle]
pub extern "C" fn opjit_sv_set_sv(_ctx: *mut Interp, dst: *mut Scalar, src: *mut Scalar) {
    if dst.is_null() || src.is_null() || dst == src {
        return;
    }
    unsafe { *dst = (*src).clone() };
}

/// Fresh undef box, freed at the next statement boundary.
#[no_mangle]
pub extern "C" fn opjit_new_mortal_sv(ctx: *mut Interp) -> *mut Scalar {
    let interp = unsafe { &mut *ctx };
    interp.new_mortal(Scalar::Undef)
}

// =============================================================================
// Value stack
// =============================================================================

#[no_mangle]
pub extern "C" fn opjit_push_sv(ctx: *mut Interp, sv: *mut Scalar) {
    let interp = unsafe { &mut *ctx };
    interp.push(sv);
}

/// Pop the top of the stack. Underflow faults and yields an undef
/// temporary.
#[no_mangle]
pub extern "C" fn opjit_pop_sv(ctx: *mut Interp) -> *mut Scalar {
    let interp = unsafe { &mut *ctx };
    let at = interp.current().unwrap_or(OpId(OpId::NONE_RAW));
    match interp.pop(at) {
        Ok(sv) => sv,
        Err(err) => {
            interp.fail(err);
            interp.new_mortal(Scalar::Undef)
        }
    }
}

// =============================================================================
// Control
// =============================================================================

/// Run the detached fragment rooted at `root` until it falls off its end.
/// Its result, if any, is left on the value stack.
///
/// # Safety
/// - `ctx` must be the interpreter that called the unit
/// - `root` must have been detached with its exits cleared, or the loop
///   continues into the code that followed it
#[no_mangle]
pub extern "C" fn opjit_call_runloop(ctx: *mut Interp, root: u32) {
    let (start, frame) = {
        let interp = unsafe { &mut *ctx };
        let root = OpId(root);
        if interp.graph().get(root).is_none() {
            interp.fail(RuntimeError::UnknownOp(root));
            return;
        }
        (interp.graph().start_of(root), interp.enter_callback())
    };
    unsafe { runloop(ctx, start) };
    let interp = unsafe { &mut *ctx };
    interp.leave_callback(frame);
}

/// Successor of the native op currently executing.
#[no_mangle]
pub extern "C" fn opjit_op_next(ctx: *mut Interp) -> u32 {
    let interp = unsafe { &*ctx };
    OpId::to_raw(interp.current_next())
}

// =============================================================================
// Symbol Registration
// =============================================================================

/// (name, address) pairs to register with the code engine.
pub fn runtime_symbols() -> Vec<(&'static str, *const u8)> {
    vec![
        ("opjit_pad_sv", opjit_pad_sv as *const u8),
        ("opjit_save_clearsv", opjit_save_clearsv as *const u8),
        ("opjit_sv_nv", opjit_sv_nv as *const u8),
        ("opjit_sv_set_nv", opjit_sv_set_nv as *const u8),
        ("opjit_sv_set_iv", opjit_sv_set_iv as *const u8),
        ("opjit_sv_set_uv", opjit_sv_set_uv as *const u8),
        ("opjit_sv_set_sv", opjit_sv_set_sv as *const u8),
        ("opjit_new_mortal_sv", opjit_new_mortal_sv as *const u8),
        ("opjit_push_sv", opjit_push_sv as *const u8),
        ("opjit_pop_sv", opjit_pop_sv as *const u8),
        ("opjit_call_runloop", opjit_call_runloop as *const u8),
        ("opjit_op_next", opjit_op_next as *const u8),
    ]
}

//! Runtime side of opjit.
//!
//! - `Scalar`: the boxed dynamic value
//! - `OpGraph`/`Interp`: a reference host with an instruction graph, value
//!   stack, pad and dispatch loop
//! - `jit_api`: the `extern "C"` helpers compiled code calls
//! - `EditSet`: replacements and detachments produced by the compiler,
//!   applied with `OpGraph::apply_edits`

pub mod edit;
pub mod error;
pub mod graph;
pub mod interp;
pub mod jit_api;
pub mod scalar;

pub use edit::{CompiledUnit, Edit, EditSet};
pub use error::RuntimeError;
pub use graph::{ArithOp, HostOp, HostOpKind, NativeOp, OpGraph, OpState};
pub use interp::Interp;
pub use jit_api::{runtime_symbols, NativeFn};
pub use scalar::Scalar;

pub use opjit_common_core::{Context, OpId, OwnerId, PadIndex};

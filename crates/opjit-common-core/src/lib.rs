//! # opjit-common-core
//!
//! Types shared between the semantic tree (`opjit-ast`) and the host
//! runtime (`opjit-runtime`):
//! - `OpId` - identity of one host instruction
//! - `PadIndex` - lexical storage slot
//! - `OwnerId` - the code unit a set of instructions belongs to
//! - `Context` - evaluation context requested of a tree node

pub mod context;
pub mod ids;

pub use context::Context;
pub use ids::{OpId, OwnerId, PadIndex};

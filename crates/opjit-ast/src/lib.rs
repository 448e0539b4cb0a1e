//! Semantic tree model for opjit.
//!
//! The front end (an external collaborator) builds one `Term` tree per
//! program fragment, plus a `Scope` holding the fragment's variable
//! declarations. The compiler reads the tree; it never mutates it.
//!
//! - `Type`: value representation lattice
//! - `OpCode`: closed operator catalog with static flags
//! - `Term`: tree node (tagged union over node kinds)
//! - `Scope`/`TypeAnnotations`: declaration arena and declared-type side table

pub mod dump;
pub mod ops;
pub mod scope;
pub mod term;
pub mod types;

pub use dump::TermDump;
pub use ops::{OpClass, OpCode, OpFlags};
pub use scope::{DeclId, Scope, TypeAnnotations, VariableDeclaration};
pub use term::{
    Constant, For, Foreach, ListTransform, Op, Origin, Term, TermKind, Walk, While,
};
pub use types::{Type, TypeParseError};

pub use opjit_common_core::{Context, OpId, PadIndex};

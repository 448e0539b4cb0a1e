//! Runtime errors.

use thiserror::Error;

use opjit_common_core::{OpId, OwnerId, PadIndex};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("unknown op {0}")]
    UnknownOp(OpId),

    #[error("edit for {found} applied to graph of {expected}")]
    OwnerMismatch { expected: OwnerId, found: OwnerId },

    #[error("{first}..{last} is not a contiguous sibling range")]
    NotContiguous { first: OpId, last: OpId },

    #[error("stack underflow at {0}")]
    StackUnderflow(OpId),

    #[error("pad slot {0} out of range")]
    BadPadSlot(PadIndex),

    #[error("op {0} cannot be executed here")]
    NotExecutable(OpId),

    #[error("graph has no entry op; call link() first")]
    NotLinked,

    #[error("Illegal modulus zero")]
    IllegalModulus,
}

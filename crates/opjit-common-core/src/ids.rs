//! Host identifiers.

use std::fmt;

/// Identity of one instruction in the host's instruction graph.
///
/// Native code passes these across the runtime ABI as `u32`; `u32::MAX`
/// is reserved as the "no instruction" encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl OpId {
    /// Raw ABI encoding of "no next instruction".
    pub const NONE_RAW: u32 = u32::MAX;

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn to_raw(op: Option<OpId>) -> u32 {
        op.map_or(Self::NONE_RAW, |op| op.0)
    }

    #[inline]
    pub fn from_raw(raw: u32) -> Option<OpId> {
        (raw != Self::NONE_RAW).then_some(OpId(raw))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Lexical storage slot (pad index) of a variable or an op target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadIndex(pub u32);

impl PadIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PadIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pad[{}]", self.0)
    }
}

/// The code unit (function body) owning an instruction graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code#{}", self.0)
    }
}

//! Evaluation context.

use num_enum::TryFromPrimitive;

/// What the caller requires a node to produce.
///
/// Assigned once by the front end from the node's position in the tree;
/// the compiler only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive)]
#[repr(u8)]
pub enum Context {
    /// Not assigned yet.
    #[default]
    Unresolved = 0,
    /// Nothing is produced.
    Void = 1,
    /// Exactly one value is produced.
    Scalar = 2,
    /// Any number of values are produced.
    List = 3,
    /// Decided at run time by whoever called the enclosing code.
    Caller = 4,
}

impl Context {
    /// Decode the host's raw context byte. Unknown encodings map to
    /// `Unresolved`.
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        Self::try_from(v).unwrap_or(Context::Unresolved)
    }

    pub fn name(self) -> &'static str {
        match self {
            Context::Unresolved => "unresolved",
            Context::Void => "void",
            Context::Scalar => "scalar",
            Context::List => "list",
            Context::Caller => "caller",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8() {
        assert_eq!(Context::from_u8(1), Context::Void);
        assert_eq!(Context::from_u8(4), Context::Caller);
        assert_eq!(Context::from_u8(200), Context::Unresolved);
    }
}

//! Value representation types.
//!
//! A deliberately small, closed lattice: the compiler only needs to know
//! whether a value is an unboxed native number (and which kind) or the
//! host's uniform boxed value.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Representation of a value, either declared on a variable or produced by
/// emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    /// IEEE-754 double.
    Double,
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit integer.
    UnsignedInt,
    /// The host's boxed dynamic value.
    Scalar,
    /// Nothing is known statically.
    #[default]
    Unspecified,
    /// Declared-only: the variable's shape is intentionally hidden, forcing
    /// interpretation of everything that touches it.
    Opaque,
}

impl Type {
    pub fn is_integer(self) -> bool {
        matches!(self, Type::Int | Type::UnsignedInt)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self == Type::Double
    }

    pub fn is_opaque(self) -> bool {
        self == Type::Opaque
    }

    /// Values of this type live in a host box.
    pub fn is_boxed(self) -> bool {
        matches!(self, Type::Scalar | Type::Unspecified)
    }

    /// Can emitted code convert a value of `self` into `target`?
    ///
    /// Numbers widen to double and can be stored into a box; boxes can be
    /// numified. Nothing converts to or from `Opaque`, and integers are
    /// never produced by narrowing.
    pub fn can_coerce_to(self, target: Type) -> bool {
        if self == target {
            return !self.is_opaque();
        }
        match target {
            Type::Double => self.is_numeric() || self.is_boxed(),
            Type::Scalar | Type::Unspecified => self.is_numeric() || self.is_boxed(),
            Type::Int | Type::UnsignedInt | Type::Opaque => false,
        }
    }

    /// Annotation name, as written in a typed declaration.
    pub fn name(self) -> &'static str {
        match self {
            Type::Double => "Double",
            Type::Int => "Int",
            Type::UnsignedInt => "UInt",
            Type::Scalar => "Scalar",
            Type::Unspecified => "Any",
            Type::Opaque => "Opaque",
        }
    }

    /// Parse an annotation name.
    pub fn parse(s: &str) -> Result<Type, TypeParseError> {
        match s.trim() {
            "Double" => Ok(Type::Double),
            "Int" => Ok(Type::Int),
            "UInt" => Ok(Type::UnsignedInt),
            "Scalar" => Ok(Type::Scalar),
            "Any" => Ok(Type::Unspecified),
            "Opaque" => Ok(Type::Opaque),
            "" => Err(TypeParseError::Empty),
            other => Err(TypeParseError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Type {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Type::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    #[error("missing type name")]
    Empty,
    #[error("'{0}' does not name a type")]
    Unknown(String),
}

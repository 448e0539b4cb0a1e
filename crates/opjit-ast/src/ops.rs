//! Operator catalog.
//!
//! The catalog is closed: every operator the front end can express as an
//! `Op` term is listed here with its static properties. Whether an
//! operator can actually be compiled is decided by the analyzer, not here.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Static operator properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpFlags: u8 {
        /// Only some kids are evaluated (short-circuit, ternary).
        const KIDS_CONDITIONAL = 1 << 0;
        /// Kids may be absent.
        const KIDS_OPTIONAL = 1 << 1;
        /// Has an `op=` assignment form.
        const HAS_ASSIGNMENT_FORM = 1 << 2;
        /// Operands may carry user-defined overloading.
        const OVERLOAD = 1 << 3;
    }
}

/// Arity class of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    Baseop,
    Unop,
    Binop,
    Listop,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // === Baseop ===
    Time,

    // === Unop ===
    Negate,
    Sin,
    Cos,
    Abs,
    Sqrt,
    Log,
    Exp,
    /// Truncation to integer.
    Int,
    BitNot,
    BoolNot,
    Rand,

    // === Binop ===
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Atan2,
    Pow,
    LeftShift,
    RightShift,
    BitAnd,
    BitOr,
    BitXor,
    NumEq,
    NumNe,
    NumLt,
    NumLe,
    NumGt,
    NumGe,
    BoolAnd,
    BoolOr,
    /// Scalar assignment.
    Sassign,

    // === Listop ===
    Ternary,

    // === Block ===
    Do,
}

impl OpCode {
    pub const ALL: &'static [OpCode] = &[
        OpCode::Time,
        OpCode::Negate,
        OpCode::Sin,
        OpCode::Cos,
        OpCode::Abs,
        OpCode::Sqrt,
        OpCode::Log,
        OpCode::Exp,
        OpCode::Int,
        OpCode::BitNot,
        OpCode::BoolNot,
        OpCode::Rand,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Modulo,
        OpCode::Atan2,
        OpCode::Pow,
        OpCode::LeftShift,
        OpCode::RightShift,
        OpCode::BitAnd,
        OpCode::BitOr,
        OpCode::BitXor,
        OpCode::NumEq,
        OpCode::NumNe,
        OpCode::NumLt,
        OpCode::NumLe,
        OpCode::NumGt,
        OpCode::NumGe,
        OpCode::BoolAnd,
        OpCode::BoolOr,
        OpCode::Sassign,
        OpCode::Ternary,
        OpCode::Do,
    ];

    pub fn class(self) -> OpClass {
        use OpCode::*;
        match self {
            Time => OpClass::Baseop,
            Negate | Sin | Cos | Abs | Sqrt | Log | Exp | Int | BitNot | BoolNot | Rand => {
                OpClass::Unop
            }
            Add | Subtract | Multiply | Divide | Modulo | Atan2 | Pow | LeftShift | RightShift
            | BitAnd | BitOr | BitXor | NumEq | NumNe | NumLt | NumLe | NumGt | NumGe
            | BoolAnd | BoolOr | Sassign => OpClass::Binop,
            Ternary => OpClass::Listop,
            Do => OpClass::Block,
        }
    }

    pub fn flags(self) -> OpFlags {
        use OpCode::*;
        let overload = OpFlags::OVERLOAD;
        let assign = OpFlags::HAS_ASSIGNMENT_FORM;
        match self {
            Time => OpFlags::empty(),
            Rand => OpFlags::KIDS_OPTIONAL,
            Negate | Sin | Cos | Abs | Sqrt | Log | Exp | Int | BitNot | BoolNot => overload,
            Add | Subtract | Multiply | Divide | Modulo | Pow | LeftShift | RightShift | BitAnd
            | BitOr | BitXor => overload | assign,
            Atan2 | NumEq | NumNe | NumLt | NumLe | NumGt | NumGe => overload,
            BoolAnd | BoolOr => OpFlags::KIDS_CONDITIONAL | assign,
            Sassign => OpFlags::empty(),
            Ternary => OpFlags::KIDS_CONDITIONAL,
            Do => OpFlags::empty(),
        }
    }

    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            Time => "time",
            Negate => "negate",
            Sin => "sin",
            Cos => "cos",
            Abs => "abs",
            Sqrt => "sqrt",
            Log => "log",
            Exp => "exp",
            Int => "int",
            BitNot => "bitwise_not",
            BoolNot => "bool_not",
            Rand => "rand",
            Add => "add",
            Subtract => "subtract",
            Multiply => "multiply",
            Divide => "divide",
            Modulo => "modulo",
            Atan2 => "atan2",
            Pow => "pow",
            LeftShift => "left_shift",
            RightShift => "right_shift",
            BitAnd => "bitwise_and",
            BitOr => "bitwise_or",
            BitXor => "bitwise_xor",
            NumEq => "eq",
            NumNe => "ne",
            NumLt => "lt",
            NumLe => "le",
            NumGt => "gt",
            NumGe => "ge",
            BoolAnd => "bool_and",
            BoolOr => "bool_or",
            Sassign => "sassign",
            Ternary => "ternary",
            Do => "do",
        }
    }

    #[inline]
    pub fn may_be_overloaded(self) -> bool {
        self.flags().contains(OpFlags::OVERLOAD)
    }

    #[inline]
    pub fn has_assignment_form(self) -> bool {
        self.flags().contains(OpFlags::HAS_ASSIGNMENT_FORM)
    }

    #[inline]
    pub fn kids_conditional(self) -> bool {
        self.flags().contains(OpFlags::KIDS_CONDITIONAL)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

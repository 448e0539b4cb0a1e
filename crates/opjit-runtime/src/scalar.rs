//! Boxed dynamic value.

use std::fmt;

/// The host's uniform value box. Pads, the value stack and temporaries all
/// hold these; native code only ever sees `*mut Scalar`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    #[default]
    Undef,
    Int(i64),
    UInt(u64),
    Num(f64),
    Str(String),
}

impl Scalar {
    /// Numeric value. Strings use their longest numeric prefix, so
    /// `"3 apples"` is 3 and `"apples"` is 0.
    pub fn num(&self) -> f64 {
        match self {
            Scalar::Undef => 0.0,
            Scalar::Int(i) => *i as f64,
            Scalar::UInt(u) => *u as f64,
            Scalar::Num(n) => *n,
            Scalar::Str(s) => numeric_prefix(s),
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Scalar::Undef => false,
            Scalar::Int(i) => *i != 0,
            Scalar::UInt(u) => *u != 0,
            Scalar::Num(n) => *n != 0.0,
            Scalar::Str(s) => !s.is_empty() && s != "0",
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Scalar::Undef)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Undef => Ok(()),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::UInt(u) => write!(f, "{u}"),
            Scalar::Num(n) => write!(f, "{n}"),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

fn numeric_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_from = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_from || (end == digits_from + 1 && bytes[digits_from] == b'.') {
        return 0.0;
    }
    // Exponent only counts if digits follow it.
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

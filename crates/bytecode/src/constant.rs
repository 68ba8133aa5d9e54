use std::cmp::Ordering;
use std::fmt;

use crate::opcode::DataType;

/// A literal operand carried by a `push` instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    /// 16-bit immediate packed into the instruction word (`push.e`).
    Short(i16),
    Bool(bool),
    String(String),
}

impl Constant {
    pub fn data_type(&self) -> DataType {
        match self {
            Constant::Double(_) => DataType::Double,
            Constant::Float(_) => DataType::Float,
            Constant::Int(_) => DataType::Int,
            Constant::Long(_) => DataType::Long,
            Constant::Short(_) => DataType::Short,
            Constant::Bool(_) => DataType::Bool,
            Constant::String(_) => DataType::String,
        }
    }

    /// Integral value of a numeric or boolean constant.
    ///
    /// Floating constants qualify only when they have no fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(*v as i64),
            Constant::Long(v) => Some(*v),
            Constant::Short(v) => Some(*v as i64),
            Constant::Bool(b) => Some(*b as i64),
            Constant::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Constant::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Constant::Double(v) => Some(*v),
            Constant::Float(v) => Some(*v as f64),
            Constant::Int(v) => Some(*v as f64),
            Constant::Long(v) => Some(*v as f64),
            Constant::Short(v) => Some(*v as f64),
            Constant::Bool(b) => Some(*b as i64 as f64),
            Constant::String(_) => None,
        }
    }

    /// Total order used to sort switch cases: numbers ascending, then strings.
    pub fn sort_cmp(&self, other: &Constant) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => match (self, other) {
                (Constant::String(a), Constant::String(b)) => a.cmp(b),
                _ => Ordering::Equal,
            },
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Double(v) => write!(f, "{}", v),
            Constant::Float(v) => write!(f, "{}", v),
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Long(v) => write!(f, "{}", v),
            Constant::Short(v) => write!(f, "{}", v),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::String(s) => write!(f, "\"{}\"", escape_string(s)),
        }
    }
}

/// Escape a string for a double-quoted literal.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

//! Literal values.
//!
//! `Constant` is a leaf payload: it has no children and is never mutated in
//! place, so both tree representations can share it freely.
//!
//! Doubles compare and hash by bit pattern, so `Constant` satisfies
//! `Eq + Hash` and whole trees can be used as hash keys (the subexpression
//! optimizer relies on this).

use std::fmt;
use std::hash::{Hash, Hasher};

/// A protobuf-style duration: whole seconds plus a nanosecond adjustment
/// carrying the same sign.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i32,
}

/// A protobuf-style timestamp: seconds since the Unix epoch plus nanos.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

/// Literal value of a constant expression.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    /// No value has been set.
    #[default]
    NotSet,
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Duration(Duration),
    Timestamp(Timestamp),
}

/// Discriminant of a [`Constant`], used in diagnostics and dispatch.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ConstantKind {
    NotSet,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
}

impl Constant {
    /// The discriminant of this constant.
    pub fn kind(&self) -> ConstantKind {
        match self {
            Constant::NotSet => ConstantKind::NotSet,
            Constant::Null => ConstantKind::Null,
            Constant::Bool(_) => ConstantKind::Bool,
            Constant::Int(_) => ConstantKind::Int,
            Constant::Uint(_) => ConstantKind::Uint,
            Constant::Double(_) => ConstantKind::Double,
            Constant::String(_) => ConstantKind::String,
            Constant::Bytes(_) => ConstantKind::Bytes,
            Constant::Duration(_) => ConstantKind::Duration,
            Constant::Timestamp(_) => ConstantKind::Timestamp,
        }
    }

    /// Returns `true` unless this is [`Constant::NotSet`].
    pub fn is_set(&self) -> bool {
        !matches!(self, Constant::NotSet)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Constant::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::NotSet, Constant::NotSet) | (Constant::Null, Constant::Null) => true,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Uint(a), Constant::Uint(b)) => a == b,
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            (Constant::Bytes(a), Constant::Bytes(b)) => a == b,
            (Constant::Duration(a), Constant::Duration(b)) => a == b,
            (Constant::Timestamp(a), Constant::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Constant::NotSet | Constant::Null => {}
            Constant::Bool(b) => b.hash(state),
            Constant::Int(v) => v.hash(state),
            Constant::Uint(v) => v.hash(state),
            Constant::Double(v) => v.to_bits().hash(state),
            Constant::String(s) => s.hash(state),
            Constant::Bytes(b) => b.hash(state),
            Constant::Duration(d) => d.hash(state),
            Constant::Timestamp(t) => t.hash(state),
        }
    }
}

impl From<bool> for Constant {
    fn from(v: bool) -> Self {
        Constant::Bool(v)
    }
}

impl From<i64> for Constant {
    fn from(v: i64) -> Self {
        Constant::Int(v)
    }
}

impl From<u64> for Constant {
    fn from(v: u64) -> Self {
        Constant::Uint(v)
    }
}

impl From<f64> for Constant {
    fn from(v: f64) -> Self {
        Constant::Double(v)
    }
}

impl From<&str> for Constant {
    fn from(v: &str) -> Self {
        Constant::String(v.to_owned())
    }
}

impl From<String> for Constant {
    fn from(v: String) -> Self {
        Constant::String(v)
    }
}

impl fmt::Display for ConstantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstantKind::NotSet => "not_set",
            ConstantKind::Null => "null",
            ConstantKind::Bool => "bool",
            ConstantKind::Int => "int",
            ConstantKind::Uint => "uint",
            ConstantKind::Double => "double",
            ConstantKind::String => "string",
            ConstantKind::Bytes => "bytes",
            ConstantKind::Duration => "duration",
            ConstantKind::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

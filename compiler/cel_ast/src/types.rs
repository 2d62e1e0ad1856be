//! Checker annotations: inferred types and resolved references.
//!
//! The tree core never infers types itself. A type checker outside this
//! crate fills these in, and rewrites that need them (comprehension
//! mangling) read them back through [`TypeAnnotations`](crate::TypeAnnotations).

use std::fmt;
use std::sync::Arc;

use crate::Constant;

/// A CEL type as reported by the checker.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CelType {
    Dyn,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    Error,
    List(Arc<CelType>),
    Map(Arc<CelType>, Arc<CelType>),
    Message(String),
    TypeParam(String),
    Type(Arc<CelType>),
    Optional(Arc<CelType>),
}

impl CelType {
    pub fn list(elem: CelType) -> Self {
        CelType::List(Arc::new(elem))
    }

    pub fn map(key: CelType, value: CelType) -> Self {
        CelType::Map(Arc::new(key), Arc::new(value))
    }

    pub fn optional(inner: CelType) -> Self {
        CelType::Optional(Arc::new(inner))
    }

    /// Type of the values an iteration over a range of this type binds:
    /// list elements, map keys. `Dyn` for anything else.
    pub fn iteration_elem(&self) -> CelType {
        match self {
            CelType::List(elem) => elem.as_ref().clone(),
            CelType::Map(key, _) => key.as_ref().clone(),
            _ => CelType::Dyn,
        }
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CelType::Dyn => f.write_str("dyn"),
            CelType::Null => f.write_str("null_type"),
            CelType::Bool => f.write_str("bool"),
            CelType::Int => f.write_str("int"),
            CelType::Uint => f.write_str("uint"),
            CelType::Double => f.write_str("double"),
            CelType::String => f.write_str("string"),
            CelType::Bytes => f.write_str("bytes"),
            CelType::Duration => f.write_str("google.protobuf.Duration"),
            CelType::Timestamp => f.write_str("google.protobuf.Timestamp"),
            CelType::Error => f.write_str("*error*"),
            CelType::List(elem) => write!(f, "list({elem})"),
            CelType::Map(key, value) => write!(f, "map({key}, {value})"),
            CelType::Message(name) | CelType::TypeParam(name) => f.write_str(name),
            CelType::Type(inner) => write!(f, "type({inner})"),
            CelType::Optional(inner) => write!(f, "optional_type({inner})"),
        }
    }
}

/// A checker-resolved reference: an identifier's qualified name, the
/// overloads a call resolved to, or the value of an enum constant.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reference {
    pub name: String,
    pub overload_ids: Vec<String>,
    pub value: Option<Constant>,
}

impl Reference {
    pub fn ident(name: impl Into<String>) -> Self {
        Reference {
            name: name.into(),
            ..Reference::default()
        }
    }

    pub fn overloads<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reference {
            overload_ids: ids.into_iter().map(Into::into).collect(),
            ..Reference::default()
        }
    }
}

//! Immutable expression tree.
//!
//! `Expr` is a tagged union over the nine CEL node kinds. Compound payloads
//! sit behind `Arc`, so cloning an `Expr` is cheap and subtrees are shared
//! structurally between trees. Nothing here mutates in place: changing a
//! node means rebuilding the path from the root to it. For in-place surgery
//! convert to [`MutableExpr`](crate::MutableExpr) and back.
//!
//! Equality and hashing are structural and include every node id.

use std::fmt;
use std::sync::Arc;

use crate::{AstError, Constant, ExprId};

/// Expression node.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Expr {
    id: ExprId,
    kind: ExprKind,
}

/// Node kinds. Exactly one is active per node.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ExprKind {
    /// Placeholder with no payload.
    NotSet,
    /// Literal value.
    Constant(Constant),
    /// Variable or function-name reference: `x`.
    Ident(Ident),
    /// Field selection `operand.field`, or presence test `has(operand.field)`.
    Select(Arc<Select>),
    /// Global call `f(args)` or receiver call `target.f(args)`.
    Call(Arc<Call>),
    /// List literal `[a, b, ?c]`.
    List(Arc<CreateList>),
    /// Message construction `Msg{field: value}`.
    Struct(Arc<CreateStruct>),
    /// Map literal `{k: v}`.
    Map(Arc<CreateMap>),
    /// Desugared loop produced by macros.
    Comprehension(Arc<Comprehension>),
}

/// Payload-free discriminant of a node kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ExprKindTag {
    NotSet,
    Constant,
    Ident,
    Select,
    Call,
    List,
    Struct,
    Map,
    Comprehension,
}

impl fmt::Display for ExprKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExprKindTag::NotSet => "not_set",
            ExprKindTag::Constant => "constant",
            ExprKindTag::Ident => "ident",
            ExprKindTag::Select => "select",
            ExprKindTag::Call => "call",
            ExprKindTag::List => "list",
            ExprKindTag::Struct => "struct",
            ExprKindTag::Map => "map",
            ExprKindTag::Comprehension => "comprehension",
        };
        f.write_str(name)
    }
}

/// Identifier reference.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Ident {
    pub name: String,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Ident { name: name.into() }
    }
}

/// Field selection.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Select {
    pub operand: Expr,
    pub field: String,
    /// `true` for the presence test form produced by `has()`.
    pub test_only: bool,
}

/// Function call.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Call {
    /// Receiver for member-style calls.
    pub target: Option<Expr>,
    pub function: String,
    pub args: Vec<Expr>,
}

impl Call {
    /// A global call `function(args)`.
    pub fn global(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Call {
            target: None,
            function: function.into(),
            args,
        }
    }

    /// A receiver-style call `target.function(args)`.
    pub fn member(target: Expr, function: impl Into<String>, args: Vec<Expr>) -> Self {
        Call {
            target: Some(target),
            function: function.into(),
            args,
        }
    }
}

/// List construction.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CreateList {
    pub elements: Vec<Expr>,
    /// Positions of elements written as `?elem`.
    pub optional_indices: Vec<usize>,
}

impl CreateList {
    pub fn new(elements: Vec<Expr>) -> Self {
        CreateList {
            elements,
            optional_indices: Vec::new(),
        }
    }
}

/// Key of a struct entry: a message field name, or an expression key for
/// the legacy map-in-struct form.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum EntryKey {
    Field(String),
    Map(Expr),
}

/// One `key: value` entry of a struct construction.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StructEntry {
    id: ExprId,
    key: EntryKey,
    value: Expr,
    optional_entry: bool,
}

impl StructEntry {
    /// Build an entry from its raw parts.
    ///
    /// Exactly one of `field_key` and `map_key` must be given, and `value`
    /// must not be a not-set node.
    pub fn new(
        id: ExprId,
        field_key: Option<String>,
        map_key: Option<Expr>,
        value: Expr,
        optional_entry: bool,
    ) -> Result<Self, AstError> {
        let key = match (field_key, map_key) {
            (Some(field), None) => EntryKey::Field(field),
            (None, Some(key)) => EntryKey::Map(key),
            _ => return Err(AstError::InvalidEntryKey { id }),
        };
        if value.tag() == ExprKindTag::NotSet {
            return Err(AstError::EmptyEntryValue { id });
        }
        Ok(StructEntry {
            id,
            key,
            value,
            optional_entry,
        })
    }

    /// A field entry `field: value`.
    pub fn field(id: ExprId, field: impl Into<String>, value: Expr) -> Result<Self, AstError> {
        StructEntry::new(id, Some(field.into()), None, value, false)
    }

    /// Entries coming out of an already validated mutable entry.
    pub(crate) fn from_parts(id: ExprId, key: EntryKey, value: Expr, optional_entry: bool) -> Self {
        StructEntry {
            id,
            key,
            value,
            optional_entry,
        }
    }

    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn key(&self) -> &EntryKey {
        &self.key
    }

    pub fn field_key(&self) -> Option<&str> {
        match &self.key {
            EntryKey::Field(field) => Some(field),
            EntryKey::Map(_) => None,
        }
    }

    pub fn map_key(&self) -> Option<&Expr> {
        match &self.key {
            EntryKey::Field(_) => None,
            EntryKey::Map(key) => Some(key),
        }
    }

    pub fn value(&self) -> &Expr {
        &self.value
    }

    pub fn optional_entry(&self) -> bool {
        self.optional_entry
    }
}

/// Message construction.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CreateStruct {
    pub message_name: String,
    pub entries: Vec<StructEntry>,
}

impl CreateStruct {
    pub fn new(message_name: impl Into<String>, entries: Vec<StructEntry>) -> Self {
        CreateStruct {
            message_name: message_name.into(),
            entries,
        }
    }
}

/// One `key: value` entry of a map literal.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MapEntry {
    id: ExprId,
    key: Expr,
    value: Expr,
    optional_entry: bool,
}

impl MapEntry {
    /// Build a map entry. The value must not be a not-set node.
    pub fn new(id: ExprId, key: Expr, value: Expr, optional_entry: bool) -> Result<Self, AstError> {
        if value.tag() == ExprKindTag::NotSet {
            return Err(AstError::EmptyEntryValue { id });
        }
        Ok(MapEntry {
            id,
            key,
            value,
            optional_entry,
        })
    }

    pub(crate) fn from_parts(id: ExprId, key: Expr, value: Expr, optional_entry: bool) -> Self {
        MapEntry {
            id,
            key,
            value,
            optional_entry,
        }
    }

    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn key(&self) -> &Expr {
        &self.key
    }

    pub fn value(&self) -> &Expr {
        &self.value
    }

    pub fn optional_entry(&self) -> bool {
        self.optional_entry
    }
}

/// Map literal.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CreateMap {
    pub entries: Vec<MapEntry>,
}

impl CreateMap {
    pub fn new(entries: Vec<MapEntry>) -> Self {
        CreateMap { entries }
    }
}

/// The five-part loop all macros desugar into.
///
/// Evaluation: `accu_var = accu_init`, then for each element of
/// `iter_range` bound to `iter_var` (and the key/index to `iter_var2` in
/// the two-variable form) while `loop_condition` holds,
/// `accu_var = loop_step`; finally `result`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Comprehension {
    pub iter_var: String,
    pub iter_var2: Option<String>,
    pub iter_range: Expr,
    pub accu_var: String,
    pub accu_init: Expr,
    pub loop_condition: Expr,
    pub loop_step: Expr,
    pub result: Expr,
}

static DEFAULT_CONSTANT: Constant = Constant::NotSet;
static DEFAULT_IDENT: Ident = Ident {
    name: String::new(),
};
static DEFAULT_SELECT: Select = Select {
    operand: Expr::not_set(ExprId::UNSET),
    field: String::new(),
    test_only: false,
};
static DEFAULT_CALL: Call = Call {
    target: None,
    function: String::new(),
    args: Vec::new(),
};
static DEFAULT_LIST: CreateList = CreateList {
    elements: Vec::new(),
    optional_indices: Vec::new(),
};
static DEFAULT_STRUCT: CreateStruct = CreateStruct {
    message_name: String::new(),
    entries: Vec::new(),
};
static DEFAULT_MAP: CreateMap = CreateMap {
    entries: Vec::new(),
};
static DEFAULT_COMPREHENSION: Comprehension = Comprehension {
    iter_var: String::new(),
    iter_var2: None,
    iter_range: Expr::not_set(ExprId::UNSET),
    accu_var: String::new(),
    accu_init: Expr::not_set(ExprId::UNSET),
    loop_condition: Expr::not_set(ExprId::UNSET),
    loop_step: Expr::not_set(ExprId::UNSET),
    result: Expr::not_set(ExprId::UNSET),
};

/// Strict accessor returning `KindMismatch` on the wrong kind, plus an
/// `_or_default` twin falling back to the kind's zero value.
macro_rules! kind_accessors {
    ($($(#[$doc:meta])* $variant:ident => $name:ident, $or_default:ident, $ty:ty, $default:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&self) -> Result<&$ty, AstError> {
                match &self.kind {
                    ExprKind::$variant(payload) => {
                        let payload: &$ty = payload;
                        Ok(payload)
                    }
                    other => Err(AstError::KindMismatch {
                        expected: ExprKindTag::$variant,
                        actual: other.tag(),
                    }),
                }
            }

            /// Like the strict accessor, but yields the zero value on a kind mismatch.
            pub fn $or_default(&self) -> &$ty {
                match &self.kind {
                    ExprKind::$variant(payload) => payload,
                    _ => &$default,
                }
            }
        )*
    };
}

impl Expr {
    /// Node with the given id and kind.
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Expr { id, kind }
    }

    pub const fn not_set(id: ExprId) -> Self {
        Expr {
            id,
            kind: ExprKind::NotSet,
        }
    }

    pub fn new_constant(id: ExprId, value: impl Into<Constant>) -> Self {
        Expr::new(id, ExprKind::Constant(value.into()))
    }

    pub fn new_ident(id: ExprId, name: impl Into<String>) -> Self {
        Expr::new(id, ExprKind::Ident(Ident::new(name)))
    }

    pub fn new_select(
        id: ExprId,
        operand: Expr,
        field: impl Into<String>,
        test_only: bool,
    ) -> Self {
        Expr::new(
            id,
            ExprKind::Select(Arc::new(Select {
                operand,
                field: field.into(),
                test_only,
            })),
        )
    }

    pub fn new_call(id: ExprId, call: Call) -> Self {
        Expr::new(id, ExprKind::Call(Arc::new(call)))
    }

    pub fn new_list(id: ExprId, list: CreateList) -> Self {
        Expr::new(id, ExprKind::List(Arc::new(list)))
    }

    pub fn new_create_struct(id: ExprId, create_struct: CreateStruct) -> Self {
        Expr::new(id, ExprKind::Struct(Arc::new(create_struct)))
    }

    pub fn new_map(id: ExprId, map: CreateMap) -> Self {
        Expr::new(id, ExprKind::Map(Arc::new(map)))
    }

    pub fn new_comprehension(id: ExprId, comprehension: Comprehension) -> Self {
        Expr::new(id, ExprKind::Comprehension(Arc::new(comprehension)))
    }

    #[inline]
    pub fn id(&self) -> ExprId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    #[inline]
    pub fn tag(&self) -> ExprKindTag {
        self.kind.tag()
    }

    /// Same node under another id. Payloads are shared, not copied.
    pub fn with_id(&self, id: ExprId) -> Expr {
        Expr {
            id,
            kind: self.kind.clone(),
        }
    }

    kind_accessors! {
        Constant => constant, constant_or_default, Constant, DEFAULT_CONSTANT;
        Ident => ident, ident_or_default, Ident, DEFAULT_IDENT;
        Select => select, select_or_default, Select, DEFAULT_SELECT;
        Call => call, call_or_default, Call, DEFAULT_CALL;
        List => list, list_or_default, CreateList, DEFAULT_LIST;
        Struct => create_struct, create_struct_or_default, CreateStruct, DEFAULT_STRUCT;
        Map => map, map_or_default, CreateMap, DEFAULT_MAP;
        Comprehension => comprehension, comprehension_or_default, Comprehension, DEFAULT_COMPREHENSION;
    }
}

impl ExprKind {
    pub fn tag(&self) -> ExprKindTag {
        match self {
            ExprKind::NotSet => ExprKindTag::NotSet,
            ExprKind::Constant(_) => ExprKindTag::Constant,
            ExprKind::Ident(_) => ExprKindTag::Ident,
            ExprKind::Select(_) => ExprKindTag::Select,
            ExprKind::Call(_) => ExprKindTag::Call,
            ExprKind::List(_) => ExprKindTag::List,
            ExprKind::Struct(_) => ExprKindTag::Struct,
            ExprKind::Map(_) => ExprKindTag::Map,
            ExprKind::Comprehension(_) => ExprKindTag::Comprehension,
        }
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::not_set(ExprId::UNSET)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?}", self.id, self.kind)
    }
}

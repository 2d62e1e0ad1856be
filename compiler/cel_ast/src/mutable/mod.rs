//! Mutable expression tree.
//!
//! `MutableExpr` mirrors [`Expr`] kind for kind, but every payload is an
//! owned, in-place settable record. A rewrite session converts an `Expr`
//! into a `MutableExpr`, performs its surgery through `&mut` handles into
//! the tree, and converts back at the end.
//!
//! The tree exclusively owns its subtrees: a child borrowed with `*_mut`
//! is a live handle, so writes through it are visible from the parent.
//! `Clone` is a full deep copy; no node or list is shared between a copy
//! and its original.

use crate::expr::{EntryKey, ExprKindTag};
use crate::stack::ensure_sufficient_stack;
use crate::{
    AstError, Call, Comprehension, Constant, CreateList, CreateMap, CreateStruct, Expr, ExprId,
    ExprKind, Ident, MapEntry, StructEntry,
};

/// Mutable expression node.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MutableExpr {
    id: ExprId,
    kind: MutableExprKind,
}

/// Node kinds of the mutable tree.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MutableExprKind {
    NotSet,
    Constant(Constant),
    Ident(Ident),
    Select(Box<MutableSelect>),
    Call(MutableCall),
    List(MutableList),
    Struct(MutableStruct),
    Map(MutableMap),
    Comprehension(Box<MutableComprehension>),
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MutableSelect {
    pub operand: MutableExpr,
    pub field: String,
    pub test_only: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MutableCall {
    pub target: Option<Box<MutableExpr>>,
    pub function: String,
    pub args: Vec<MutableExpr>,
}

impl MutableCall {
    pub fn global(function: impl Into<String>, args: Vec<MutableExpr>) -> Self {
        MutableCall {
            target: None,
            function: function.into(),
            args,
        }
    }

    pub fn member(
        target: MutableExpr,
        function: impl Into<String>,
        args: Vec<MutableExpr>,
    ) -> Self {
        MutableCall {
            target: Some(Box::new(target)),
            function: function.into(),
            args,
        }
    }

    /// Replace the argument at `index`.
    pub fn set_arg(&mut self, index: usize, arg: MutableExpr) -> Result<(), AstError> {
        let len = self.args.len();
        let slot = self
            .args
            .get_mut(index)
            .ok_or(AstError::IndexOutOfBounds { index, len })?;
        *slot = arg;
        Ok(())
    }

    pub fn add_arg(&mut self, arg: MutableExpr) {
        self.args.push(arg);
    }

    pub fn set_target(&mut self, target: MutableExpr) {
        self.target = Some(Box::new(target));
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct MutableList {
    pub elements: Vec<MutableExpr>,
    pub optional_indices: Vec<usize>,
}

impl MutableList {
    pub fn new(elements: Vec<MutableExpr>) -> Self {
        MutableList {
            elements,
            optional_indices: Vec::new(),
        }
    }

    /// Replace the element at `index`.
    pub fn set_element(&mut self, index: usize, element: MutableExpr) -> Result<(), AstError> {
        let len = self.elements.len();
        let slot = self
            .elements
            .get_mut(index)
            .ok_or(AstError::IndexOutOfBounds { index, len })?;
        *slot = element;
        Ok(())
    }
}

/// Key of a mutable struct entry.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MutableEntryKey {
    Field(String),
    Map(MutableExpr),
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MutableStructEntry {
    pub id: ExprId,
    pub key: MutableEntryKey,
    pub value: MutableExpr,
    pub optional_entry: bool,
}

impl MutableStructEntry {
    /// Build an entry; exactly one key kind and a set value are required.
    pub fn new(
        id: ExprId,
        field_key: Option<String>,
        map_key: Option<MutableExpr>,
        value: MutableExpr,
        optional_entry: bool,
    ) -> Result<Self, AstError> {
        let key = match (field_key, map_key) {
            (Some(field), None) => MutableEntryKey::Field(field),
            (None, Some(key)) => MutableEntryKey::Map(key),
            _ => return Err(AstError::InvalidEntryKey { id }),
        };
        if value.tag() == ExprKindTag::NotSet {
            return Err(AstError::EmptyEntryValue { id });
        }
        Ok(MutableStructEntry {
            id,
            key,
            value,
            optional_entry,
        })
    }

    pub fn field(
        id: ExprId,
        field: impl Into<String>,
        value: MutableExpr,
    ) -> Result<Self, AstError> {
        MutableStructEntry::new(id, Some(field.into()), None, value, false)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct MutableStruct {
    pub message_name: String,
    pub entries: Vec<MutableStructEntry>,
}

impl MutableStruct {
    pub fn set_entry(&mut self, index: usize, entry: MutableStructEntry) -> Result<(), AstError> {
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or(AstError::IndexOutOfBounds { index, len })?;
        *slot = entry;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MutableMapEntry {
    pub id: ExprId,
    pub key: MutableExpr,
    pub value: MutableExpr,
    pub optional_entry: bool,
}

impl MutableMapEntry {
    pub fn new(
        id: ExprId,
        key: MutableExpr,
        value: MutableExpr,
        optional_entry: bool,
    ) -> Result<Self, AstError> {
        if value.tag() == ExprKindTag::NotSet {
            return Err(AstError::EmptyEntryValue { id });
        }
        Ok(MutableMapEntry {
            id,
            key,
            value,
            optional_entry,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct MutableMap {
    pub entries: Vec<MutableMapEntry>,
}

impl MutableMap {
    pub fn set_entry(&mut self, index: usize, entry: MutableMapEntry) -> Result<(), AstError> {
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or(AstError::IndexOutOfBounds { index, len })?;
        *slot = entry;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MutableComprehension {
    pub iter_var: String,
    pub iter_var2: Option<String>,
    pub iter_range: MutableExpr,
    pub accu_var: String,
    pub accu_init: MutableExpr,
    pub loop_condition: MutableExpr,
    pub loop_step: MutableExpr,
    pub result: MutableExpr,
}

static DEFAULT_CONSTANT: Constant = Constant::NotSet;
static DEFAULT_IDENT: Ident = Ident {
    name: String::new(),
};
static DEFAULT_SELECT: MutableSelect = MutableSelect {
    operand: MutableExpr::not_set(ExprId::UNSET),
    field: String::new(),
    test_only: false,
};
static DEFAULT_CALL: MutableCall = MutableCall {
    target: None,
    function: String::new(),
    args: Vec::new(),
};
static DEFAULT_LIST: MutableList = MutableList {
    elements: Vec::new(),
    optional_indices: Vec::new(),
};
static DEFAULT_STRUCT: MutableStruct = MutableStruct {
    message_name: String::new(),
    entries: Vec::new(),
};
static DEFAULT_MAP: MutableMap = MutableMap {
    entries: Vec::new(),
};
static DEFAULT_COMPREHENSION: MutableComprehension = MutableComprehension {
    iter_var: String::new(),
    iter_var2: None,
    iter_range: MutableExpr::not_set(ExprId::UNSET),
    accu_var: String::new(),
    accu_init: MutableExpr::not_set(ExprId::UNSET),
    loop_condition: MutableExpr::not_set(ExprId::UNSET),
    loop_step: MutableExpr::not_set(ExprId::UNSET),
    result: MutableExpr::not_set(ExprId::UNSET),
};

/// Strict shared and exclusive accessors plus an `_or_default` fallback.
macro_rules! mutable_kind_accessors {
    ($($variant:ident => $name:ident, $name_mut:ident, $or_default:ident, $ty:ty, $default:expr;)*) => {
        $(
            pub fn $name(&self) -> Result<&$ty, AstError> {
                match &self.kind {
                    MutableExprKind::$variant(payload) => {
                        let payload: &$ty = payload;
                        Ok(payload)
                    }
                    other => Err(AstError::KindMismatch {
                        expected: ExprKindTag::$variant,
                        actual: other.tag(),
                    }),
                }
            }

            pub fn $name_mut(&mut self) -> Result<&mut $ty, AstError> {
                match &mut self.kind {
                    MutableExprKind::$variant(payload) => {
                        let payload: &mut $ty = payload;
                        Ok(payload)
                    }
                    other => Err(AstError::KindMismatch {
                        expected: ExprKindTag::$variant,
                        actual: other.tag(),
                    }),
                }
            }

            pub fn $or_default(&self) -> &$ty {
                match &self.kind {
                    MutableExprKind::$variant(payload) => payload,
                    _ => &$default,
                }
            }
        )*
    };
}

impl MutableExpr {
    pub fn new(id: ExprId, kind: MutableExprKind) -> Self {
        MutableExpr { id, kind }
    }

    pub const fn not_set(id: ExprId) -> Self {
        MutableExpr {
            id,
            kind: MutableExprKind::NotSet,
        }
    }

    pub fn new_constant(id: ExprId, value: impl Into<Constant>) -> Self {
        MutableExpr::new(id, MutableExprKind::Constant(value.into()))
    }

    pub fn new_ident(id: ExprId, name: impl Into<String>) -> Self {
        MutableExpr::new(id, MutableExprKind::Ident(Ident::new(name)))
    }

    pub fn new_select(
        id: ExprId,
        operand: MutableExpr,
        field: impl Into<String>,
        test_only: bool,
    ) -> Self {
        MutableExpr::new(
            id,
            MutableExprKind::Select(Box::new(MutableSelect {
                operand,
                field: field.into(),
                test_only,
            })),
        )
    }

    pub fn new_call(id: ExprId, call: MutableCall) -> Self {
        MutableExpr::new(id, MutableExprKind::Call(call))
    }

    pub fn new_list(id: ExprId, list: MutableList) -> Self {
        MutableExpr::new(id, MutableExprKind::List(list))
    }

    pub fn new_create_struct(id: ExprId, create_struct: MutableStruct) -> Self {
        MutableExpr::new(id, MutableExprKind::Struct(create_struct))
    }

    pub fn new_map(id: ExprId, map: MutableMap) -> Self {
        MutableExpr::new(id, MutableExprKind::Map(map))
    }

    pub fn new_comprehension(id: ExprId, comprehension: MutableComprehension) -> Self {
        MutableExpr::new(id, MutableExprKind::Comprehension(Box::new(comprehension)))
    }

    #[inline]
    pub fn id(&self) -> ExprId {
        self.id
    }

    #[inline]
    pub fn set_id(&mut self, id: ExprId) {
        self.id = id;
    }

    #[inline]
    pub fn kind(&self) -> &MutableExprKind {
        &self.kind
    }

    #[inline]
    pub fn kind_mut(&mut self) -> &mut MutableExprKind {
        &mut self.kind
    }

    #[inline]
    pub fn tag(&self) -> ExprKindTag {
        self.kind.tag()
    }

    pub fn set_not_set(&mut self) {
        self.kind = MutableExprKind::NotSet;
    }

    pub fn set_constant(&mut self, value: impl Into<Constant>) {
        self.kind = MutableExprKind::Constant(value.into());
    }

    pub fn set_ident(&mut self, name: impl Into<String>) {
        self.kind = MutableExprKind::Ident(Ident::new(name));
    }

    pub fn set_select(&mut self, select: MutableSelect) {
        self.kind = MutableExprKind::Select(Box::new(select));
    }

    pub fn set_call(&mut self, call: MutableCall) {
        self.kind = MutableExprKind::Call(call);
    }

    pub fn set_list(&mut self, list: MutableList) {
        self.kind = MutableExprKind::List(list);
    }

    pub fn set_struct(&mut self, create_struct: MutableStruct) {
        self.kind = MutableExprKind::Struct(create_struct);
    }

    pub fn set_map(&mut self, map: MutableMap) {
        self.kind = MutableExprKind::Map(map);
    }

    pub fn set_comprehension(&mut self, comprehension: MutableComprehension) {
        self.kind = MutableExprKind::Comprehension(Box::new(comprehension));
    }

    mutable_kind_accessors! {
        Constant => constant, constant_mut, constant_or_default, Constant, DEFAULT_CONSTANT;
        Ident => ident, ident_mut, ident_or_default, Ident, DEFAULT_IDENT;
        Select => select, select_mut, select_or_default, MutableSelect, DEFAULT_SELECT;
        Call => call, call_mut, call_or_default, MutableCall, DEFAULT_CALL;
        List => list, list_mut, list_or_default, MutableList, DEFAULT_LIST;
        Struct => create_struct, create_struct_mut, create_struct_or_default, MutableStruct, DEFAULT_STRUCT;
        Map => map, map_mut, map_or_default, MutableMap, DEFAULT_MAP;
        Comprehension => comprehension, comprehension_mut, comprehension_or_default, MutableComprehension, DEFAULT_COMPREHENSION;
    }

    /// Direct children in traversal order.
    pub fn children(&self) -> Vec<&MutableExpr> {
        let mut out = Vec::new();
        match &self.kind {
            MutableExprKind::NotSet | MutableExprKind::Constant(_) | MutableExprKind::Ident(_) => {}
            MutableExprKind::Select(select) => out.push(&select.operand),
            MutableExprKind::Call(call) => {
                if let Some(target) = &call.target {
                    out.push(target.as_ref());
                }
                out.extend(call.args.iter());
            }
            MutableExprKind::List(list) => out.extend(list.elements.iter()),
            MutableExprKind::Struct(create_struct) => {
                for entry in &create_struct.entries {
                    if let MutableEntryKey::Map(key) = &entry.key {
                        out.push(key);
                    }
                    out.push(&entry.value);
                }
            }
            MutableExprKind::Map(map) => {
                for entry in &map.entries {
                    out.push(&entry.key);
                    out.push(&entry.value);
                }
            }
            MutableExprKind::Comprehension(comprehension) => {
                out.push(&comprehension.iter_range);
                out.push(&comprehension.accu_init);
                out.push(&comprehension.loop_condition);
                out.push(&comprehension.loop_step);
                out.push(&comprehension.result);
            }
        }
        out
    }

    /// Direct children as live handles, in traversal order.
    pub fn children_mut(&mut self) -> Vec<&mut MutableExpr> {
        let mut out = Vec::new();
        match &mut self.kind {
            MutableExprKind::NotSet | MutableExprKind::Constant(_) | MutableExprKind::Ident(_) => {}
            MutableExprKind::Select(select) => out.push(&mut select.operand),
            MutableExprKind::Call(call) => {
                if let Some(target) = &mut call.target {
                    out.push(target.as_mut());
                }
                out.extend(call.args.iter_mut());
            }
            MutableExprKind::List(list) => out.extend(list.elements.iter_mut()),
            MutableExprKind::Struct(create_struct) => {
                for entry in &mut create_struct.entries {
                    if let MutableEntryKey::Map(key) = &mut entry.key {
                        out.push(key);
                    }
                    out.push(&mut entry.value);
                }
            }
            MutableExprKind::Map(map) => {
                for entry in &mut map.entries {
                    out.push(&mut entry.key);
                    out.push(&mut entry.value);
                }
            }
            MutableExprKind::Comprehension(comprehension) => {
                let c = comprehension.as_mut();
                out.push(&mut c.iter_range);
                out.push(&mut c.accu_init);
                out.push(&mut c.loop_condition);
                out.push(&mut c.loop_step);
                out.push(&mut c.result);
            }
        }
        out
    }

    /// Find the first node (pre-order) with the given id.
    pub fn find(&self, id: ExprId) -> Option<&MutableExpr> {
        if self.id == id {
            return Some(self);
        }
        ensure_sufficient_stack(|| self.children().into_iter().find_map(|child| child.find(id)))
    }

    /// Live handle to the first node (pre-order) with the given id.
    pub fn find_mut(&mut self, id: ExprId) -> Option<&mut MutableExpr> {
        if self.id == id {
            return Some(self);
        }
        ensure_sufficient_stack(move || {
            self.children_mut()
                .into_iter()
                .find_map(|child| child.find_mut(id))
        })
    }

    /// Convert to the immutable representation.
    pub fn to_expr(&self) -> Expr {
        ensure_sufficient_stack(|| match &self.kind {
            MutableExprKind::NotSet => Expr::not_set(self.id),
            MutableExprKind::Constant(constant) => Expr::new_constant(self.id, constant.clone()),
            MutableExprKind::Ident(ident) => Expr::new(self.id, ExprKind::Ident(ident.clone())),
            MutableExprKind::Select(select) => Expr::new_select(
                self.id,
                select.operand.to_expr(),
                select.field.clone(),
                select.test_only,
            ),
            MutableExprKind::Call(call) => Expr::new_call(
                self.id,
                Call {
                    target: call.target.as_ref().map(|target| target.to_expr()),
                    function: call.function.clone(),
                    args: call.args.iter().map(MutableExpr::to_expr).collect(),
                },
            ),
            MutableExprKind::List(list) => Expr::new_list(
                self.id,
                CreateList {
                    elements: list.elements.iter().map(MutableExpr::to_expr).collect(),
                    optional_indices: list.optional_indices.clone(),
                },
            ),
            MutableExprKind::Struct(create_struct) => {
                let entries = create_struct
                    .entries
                    .iter()
                    .map(|entry| {
                        let key = match &entry.key {
                            MutableEntryKey::Field(field) => EntryKey::Field(field.clone()),
                            MutableEntryKey::Map(key) => EntryKey::Map(key.to_expr()),
                        };
                        StructEntry::from_parts(
                            entry.id,
                            key,
                            entry.value.to_expr(),
                            entry.optional_entry,
                        )
                    })
                    .collect();
                Expr::new_create_struct(
                    self.id,
                    CreateStruct::new(create_struct.message_name.clone(), entries),
                )
            }
            MutableExprKind::Map(map) => {
                let entries = map
                    .entries
                    .iter()
                    .map(|entry| {
                        MapEntry::from_parts(
                            entry.id,
                            entry.key.to_expr(),
                            entry.value.to_expr(),
                            entry.optional_entry,
                        )
                    })
                    .collect();
                Expr::new_map(self.id, CreateMap::new(entries))
            }
            MutableExprKind::Comprehension(c) => Expr::new_comprehension(
                self.id,
                Comprehension {
                    iter_var: c.iter_var.clone(),
                    iter_var2: c.iter_var2.clone(),
                    iter_range: c.iter_range.to_expr(),
                    accu_var: c.accu_var.clone(),
                    accu_init: c.accu_init.to_expr(),
                    loop_condition: c.loop_condition.to_expr(),
                    loop_step: c.loop_step.to_expr(),
                    result: c.result.to_expr(),
                },
            ),
        })
    }
}

impl MutableExprKind {
    pub fn tag(&self) -> ExprKindTag {
        match self {
            MutableExprKind::NotSet => ExprKindTag::NotSet,
            MutableExprKind::Constant(_) => ExprKindTag::Constant,
            MutableExprKind::Ident(_) => ExprKindTag::Ident,
            MutableExprKind::Select(_) => ExprKindTag::Select,
            MutableExprKind::Call(_) => ExprKindTag::Call,
            MutableExprKind::List(_) => ExprKindTag::List,
            MutableExprKind::Struct(_) => ExprKindTag::Struct,
            MutableExprKind::Map(_) => ExprKindTag::Map,
            MutableExprKind::Comprehension(_) => ExprKindTag::Comprehension,
        }
    }
}

impl Default for MutableExpr {
    fn default() -> Self {
        MutableExpr::not_set(ExprId::UNSET)
    }
}

impl From<&Expr> for MutableExpr {
    fn from(expr: &Expr) -> Self {
        expr.to_mutable()
    }
}

impl From<Expr> for MutableExpr {
    fn from(expr: Expr) -> Self {
        expr.to_mutable()
    }
}

impl From<&MutableExpr> for Expr {
    fn from(expr: &MutableExpr) -> Self {
        expr.to_expr()
    }
}

impl From<MutableExpr> for Expr {
    fn from(expr: MutableExpr) -> Self {
        expr.to_expr()
    }
}

impl Expr {
    /// Convert to the mutable representation. Every node is freshly
    /// allocated; the result shares nothing with `self`.
    pub fn to_mutable(&self) -> MutableExpr {
        ensure_sufficient_stack(|| {
            let kind = match self.kind() {
                ExprKind::NotSet => MutableExprKind::NotSet,
                ExprKind::Constant(constant) => MutableExprKind::Constant(constant.clone()),
                ExprKind::Ident(ident) => MutableExprKind::Ident(ident.clone()),
                ExprKind::Select(select) => MutableExprKind::Select(Box::new(MutableSelect {
                    operand: select.operand.to_mutable(),
                    field: select.field.clone(),
                    test_only: select.test_only,
                })),
                ExprKind::Call(call) => MutableExprKind::Call(mutable_call(call)),
                ExprKind::List(list) => MutableExprKind::List(MutableList {
                    elements: list.elements.iter().map(Expr::to_mutable).collect(),
                    optional_indices: list.optional_indices.clone(),
                }),
                ExprKind::Struct(create_struct) => MutableExprKind::Struct(MutableStruct {
                    message_name: create_struct.message_name.clone(),
                    entries: create_struct
                        .entries
                        .iter()
                        .map(|entry| MutableStructEntry {
                            id: entry.id(),
                            key: match entry.key() {
                                EntryKey::Field(field) => MutableEntryKey::Field(field.clone()),
                                EntryKey::Map(key) => MutableEntryKey::Map(key.to_mutable()),
                            },
                            value: entry.value().to_mutable(),
                            optional_entry: entry.optional_entry(),
                        })
                        .collect(),
                }),
                ExprKind::Map(map) => MutableExprKind::Map(MutableMap {
                    entries: map
                        .entries
                        .iter()
                        .map(|entry| MutableMapEntry {
                            id: entry.id(),
                            key: entry.key().to_mutable(),
                            value: entry.value().to_mutable(),
                            optional_entry: entry.optional_entry(),
                        })
                        .collect(),
                }),
                ExprKind::Comprehension(c) => {
                    MutableExprKind::Comprehension(Box::new(mutable_comprehension(c)))
                }
            };
            MutableExpr::new(self.id(), kind)
        })
    }
}

fn mutable_call(call: &Call) -> MutableCall {
    MutableCall {
        target: call
            .target
            .as_ref()
            .map(|target| Box::new(target.to_mutable())),
        function: call.function.clone(),
        args: call.args.iter().map(Expr::to_mutable).collect(),
    }
}

fn mutable_comprehension(c: &Comprehension) -> MutableComprehension {
    MutableComprehension {
        iter_var: c.iter_var.clone(),
        iter_var2: c.iter_var2.clone(),
        iter_range: c.iter_range.to_mutable(),
        accu_var: c.accu_var.clone(),
        accu_init: c.accu_init.to_mutable(),
        loop_condition: c.loop_condition.to_mutable(),
        loop_step: c.loop_step.to_mutable(),
        result: c.result.to_mutable(),
    }
}

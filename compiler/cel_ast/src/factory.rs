//! Building fresh expressions, including standard macro expansion.
//!
//! [`ExprFactory`] hands every node it builds a fresh id from its own
//! [`MonotonicIdGenerator`], so a tree assembled from one factory never has
//! duplicate ids. Parser front ends and the optimizer's synthesis helpers
//! both build through it.
//!
//! Macro expansion turns sugar like `xs.exists(x, p)` into a
//! [`Comprehension`] and records the call as written in the factory's
//! macro-call map, keyed by the comprehension id. The record shares the ids
//! of `xs` and `p` with the main tree. Its first argument is the iteration
//! variable as an identifier with an id of its own, which never appears in
//! the main tree. Macro results nested inside a recorded argument are
//! replaced by not-set placeholders carrying the nested result's id.

use std::collections::BTreeMap;

use crate::operators::{
    ADD, CEL_BIND, CONDITIONAL, EQUALS, LOGICAL_AND, LOGICAL_NOT, LOGICAL_OR, NOT_STRICTLY_FALSE,
};
use crate::stack::ensure_sufficient_stack;
use crate::{
    Ast, AstError, Call, Comprehension, Constant, CreateList, CreateMap, CreateStruct, Expr,
    ExprId, ExprKindTag, MapEntry, MonotonicIdGenerator, MutableExpr, SourceInfo, StructEntry,
};

/// Accumulator variable of the standard macros.
pub const ACCUMULATOR_VAR: &str = "@result";

/// Iteration variable of `cel.bind`, which iterates over nothing.
pub const UNUSED_ITER_VAR: &str = "#unused";

pub mod macros {
    pub const HAS: &str = "has";
    pub const ALL: &str = "all";
    pub const EXISTS: &str = "exists";
    pub const EXISTS_ONE: &str = "exists_one";
    pub const MAP: &str = "map";
    pub const FILTER: &str = "filter";
}

/// Id-allocating expression builder.
#[derive(Debug, Default)]
pub struct ExprFactory {
    ids: MonotonicIdGenerator,
    macro_calls: BTreeMap<ExprId, Expr>,
}

impl ExprFactory {
    pub fn new() -> Self {
        ExprFactory::default()
    }

    /// A factory whose first id is `seed + 1`.
    pub fn with_seed(seed: i64) -> Result<Self, AstError> {
        Ok(ExprFactory {
            ids: MonotonicIdGenerator::new(seed)?,
            macro_calls: BTreeMap::new(),
        })
    }

    pub fn next_id(&mut self) -> ExprId {
        self.ids.next_id()
    }

    pub fn last_id(&self) -> ExprId {
        self.ids.last_id()
    }

    pub fn macro_calls(&self) -> &BTreeMap<ExprId, Expr> {
        &self.macro_calls
    }

    pub fn into_macro_calls(self) -> BTreeMap<ExprId, Expr> {
        self.macro_calls
    }

    /// Wrap `root` with the macro calls recorded so far.
    pub fn build_ast(&self, root: Expr) -> Ast {
        let source = SourceInfo {
            macro_calls: self.macro_calls.clone(),
            ..SourceInfo::default()
        };
        Ast::new(root, source)
    }

    pub fn new_constant(&mut self, value: impl Into<Constant>) -> Expr {
        Expr::new_constant(self.next_id(), value)
    }

    pub fn new_bool(&mut self, value: bool) -> Expr {
        self.new_constant(value)
    }

    pub fn new_int(&mut self, value: i64) -> Expr {
        self.new_constant(value)
    }

    pub fn new_uint(&mut self, value: u64) -> Expr {
        self.new_constant(value)
    }

    pub fn new_double(&mut self, value: f64) -> Expr {
        self.new_constant(value)
    }

    pub fn new_string(&mut self, value: impl Into<String>) -> Expr {
        self.new_constant(value.into())
    }

    pub fn new_null(&mut self) -> Expr {
        self.new_constant(Constant::Null)
    }

    pub fn new_ident(&mut self, name: impl Into<String>) -> Expr {
        Expr::new_ident(self.next_id(), name)
    }

    pub fn new_select(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        Expr::new_select(self.next_id(), operand, field, false)
    }

    pub fn new_presence_test(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        Expr::new_select(self.next_id(), operand, field, true)
    }

    pub fn new_global_call(&mut self, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::new_call(self.next_id(), Call::global(function, args))
    }

    pub fn new_receiver_call(
        &mut self,
        function: impl Into<String>,
        target: Expr,
        args: Vec<Expr>,
    ) -> Expr {
        Expr::new_call(self.next_id(), Call::member(target, function, args))
    }

    pub fn new_list(&mut self, elements: Vec<Expr>) -> Expr {
        Expr::new_list(self.next_id(), CreateList::new(elements))
    }

    pub fn new_map(&mut self, entries: Vec<(Expr, Expr)>) -> Result<Expr, AstError> {
        let entries = entries
            .into_iter()
            .map(|(key, value)| MapEntry::new(self.next_id(), key, value, false))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::new_map(self.next_id(), CreateMap::new(entries)))
    }

    pub fn new_struct(
        &mut self,
        message_name: impl Into<String>,
        fields: Vec<(String, Expr)>,
    ) -> Result<Expr, AstError> {
        let entries = fields
            .into_iter()
            .map(|(field, value)| StructEntry::field(self.next_id(), field, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::new_create_struct(
            self.next_id(),
            CreateStruct::new(message_name, entries),
        ))
    }

    pub fn new_comprehension(&mut self, comprehension: Comprehension) -> Expr {
        Expr::new_comprehension(self.next_id(), comprehension)
    }

    pub fn new_accu_ident(&mut self) -> Expr {
        self.new_ident(ACCUMULATOR_VAR)
    }

    /// `has(operand.field)`: the presence-test form of a select.
    pub fn expand_has(&mut self, select: &Expr) -> Result<Expr, AstError> {
        let payload = select.select()?;
        let expanded = self.new_presence_test(payload.operand.clone(), payload.field.clone());
        self.record(expanded.id(), None, macros::HAS, vec![select.clone()]);
        Ok(expanded)
    }

    /// `target.all(iter_var, predicate)`
    pub fn expand_all(&mut self, target: Expr, iter_var: &str, predicate: Expr) -> Expr {
        let record_args = vec![self.new_ident(iter_var), predicate.clone()];
        let init = self.new_bool(true);
        let accu = self.new_accu_ident();
        let condition = self.new_global_call(NOT_STRICTLY_FALSE, vec![accu]);
        let accu = self.new_accu_ident();
        let step = self.new_global_call(LOGICAL_AND, vec![accu, predicate]);
        let result = self.new_accu_ident();
        self.fold(macros::ALL, target, iter_var, init, condition, step, result, record_args)
    }

    /// `target.exists(iter_var, predicate)`
    pub fn expand_exists(&mut self, target: Expr, iter_var: &str, predicate: Expr) -> Expr {
        let record_args = vec![self.new_ident(iter_var), predicate.clone()];
        let init = self.new_bool(false);
        let accu = self.new_accu_ident();
        let not_accu = self.new_global_call(LOGICAL_NOT, vec![accu]);
        let condition = self.new_global_call(NOT_STRICTLY_FALSE, vec![not_accu]);
        let accu = self.new_accu_ident();
        let step = self.new_global_call(LOGICAL_OR, vec![accu, predicate]);
        let result = self.new_accu_ident();
        self.fold(macros::EXISTS, target, iter_var, init, condition, step, result, record_args)
    }

    /// `target.exists_one(iter_var, predicate)`
    pub fn expand_exists_one(&mut self, target: Expr, iter_var: &str, predicate: Expr) -> Expr {
        let record_args = vec![self.new_ident(iter_var), predicate.clone()];
        let init = self.new_int(0);
        let condition = self.new_bool(true);
        let accu = self.new_accu_ident();
        let one = self.new_int(1);
        let incremented = self.new_global_call(ADD, vec![accu, one]);
        let accu = self.new_accu_ident();
        let step = self.new_global_call(CONDITIONAL, vec![predicate, incremented, accu]);
        let accu = self.new_accu_ident();
        let one = self.new_int(1);
        let result = self.new_global_call(EQUALS, vec![accu, one]);
        self.fold(macros::EXISTS_ONE, target, iter_var, init, condition, step, result, record_args)
    }

    /// `target.map(iter_var, transform)` or, with a filter,
    /// `target.map(iter_var, filter, transform)`.
    pub fn expand_map(
        &mut self,
        target: Expr,
        iter_var: &str,
        filter: Option<Expr>,
        transform: Expr,
    ) -> Expr {
        let mut record_args = vec![self.new_ident(iter_var)];
        record_args.extend(filter.iter().cloned());
        record_args.push(transform.clone());

        let init = self.new_list(Vec::new());
        let condition = self.new_bool(true);
        let accu = self.new_accu_ident();
        let wrapped = self.new_list(vec![transform]);
        let appended = self.new_global_call(ADD, vec![accu, wrapped]);
        let step = match filter {
            Some(filter) => {
                let accu = self.new_accu_ident();
                self.new_global_call(CONDITIONAL, vec![filter, appended, accu])
            }
            None => appended,
        };
        let result = self.new_accu_ident();
        self.fold(macros::MAP, target, iter_var, init, condition, step, result, record_args)
    }

    /// `target.filter(iter_var, predicate)`
    pub fn expand_filter(&mut self, target: Expr, iter_var: &str, predicate: Expr) -> Expr {
        let record_args = vec![self.new_ident(iter_var), predicate.clone()];
        let init = self.new_list(Vec::new());
        let condition = self.new_bool(true);
        let accu = self.new_accu_ident();
        let element = self.new_ident(iter_var);
        let wrapped = self.new_list(vec![element]);
        let appended = self.new_global_call(ADD, vec![accu, wrapped]);
        let accu = self.new_accu_ident();
        let step = self.new_global_call(CONDITIONAL, vec![predicate, appended, accu]);
        let result = self.new_accu_ident();
        self.fold(macros::FILTER, target, iter_var, init, condition, step, result, record_args)
    }

    /// `cel.bind(var, init, result)`: evaluate `init` once and make it
    /// visible as `var` inside `result`.
    pub fn expand_bind(&mut self, var: &str, init: Expr, result: Expr) -> Expr {
        let record_args = vec![self.new_ident(var), init.clone(), result.clone()];
        let range = self.new_list(Vec::new());
        let condition = self.new_bool(false);
        let step = self.new_ident(var);
        let expanded = self.new_comprehension(Comprehension {
            iter_var: UNUSED_ITER_VAR.to_owned(),
            iter_var2: None,
            iter_range: range,
            accu_var: var.to_owned(),
            accu_init: init,
            loop_condition: condition,
            loop_step: step,
            result,
        });
        self.record(expanded.id(), None, CEL_BIND, record_args);
        expanded
    }

    #[allow(clippy::too_many_arguments)]
    fn fold(
        &mut self,
        function: &str,
        target: Expr,
        iter_var: &str,
        accu_init: Expr,
        loop_condition: Expr,
        loop_step: Expr,
        result: Expr,
        record_args: Vec<Expr>,
    ) -> Expr {
        let record_target = target.clone();
        let expanded = self.new_comprehension(Comprehension {
            iter_var: iter_var.to_owned(),
            iter_var2: None,
            iter_range: target,
            accu_var: ACCUMULATOR_VAR.to_owned(),
            accu_init,
            loop_condition,
            loop_step,
            result,
        });
        self.record(expanded.id(), Some(record_target), function, record_args);
        expanded
    }

    fn record(&mut self, id: ExprId, target: Option<Expr>, function: &str, args: Vec<Expr>) {
        let target = target.map(|target| collapse_nested_macros(&target, &self.macro_calls));
        let args = args
            .iter()
            .map(|arg| collapse_nested_macros(arg, &self.macro_calls))
            .collect();
        let call = Call {
            target,
            function: function.to_owned(),
            args,
        };
        tracing::trace!(%id, function, "recorded macro call");
        self.macro_calls.insert(id, Expr::new_call(ExprId::UNSET, call));
    }
}

/// Replace every node of `expr` that is itself a recorded macro result by a
/// not-set placeholder with the same id.
pub fn collapse_nested_macros<V>(expr: &Expr, macro_calls: &BTreeMap<ExprId, V>) -> Expr {
    let mut mutable = expr.to_mutable();
    collapse_in_place(&mut mutable, &|id| macro_calls.contains_key(&id));
    mutable.to_expr()
}

pub(crate) fn collapse_in_place(expr: &mut MutableExpr, is_macro: &dyn Fn(ExprId) -> bool) {
    if expr.tag() != ExprKindTag::NotSet && is_macro(expr.id()) {
        expr.set_not_set();
        return;
    }
    ensure_sufficient_stack(|| {
        for child in expr.children_mut() {
            collapse_in_place(child, is_macro);
        }
    });
}

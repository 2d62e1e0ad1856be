//! Render an AST back to CEL source text.
//!
//! Macro sugar is restored from the macro-call map: whenever a node's id has
//! a record, the record is printed instead of the node. Not-set
//! placeholders inside a record resolve through the same map, so nested
//! macros print as nested sugar.
//!
//! Operator calls print infix, with parentheses only where precedence or
//! left associativity requires them. Output is single-line and
//! deterministic; it is meant for tests, diagnostics and round-tripping
//! optimizer output, not for pretty-printing.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::operators::{Operator, OPTIONAL_SELECT};
use crate::stack::ensure_sufficient_stack;
use crate::{Ast, Constant, EntryKey, Expr, ExprId, ExprKind};

/// Failure to render a tree.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum UnparseError {
    /// A not-set node that no macro record accounts for.
    #[error("expression {0} is not set")]
    NotSet(ExprId),

    /// Comprehensions only print through their macro record.
    #[error("comprehension {0} has no macro call to print")]
    BareComprehension(ExprId),

    /// An operator call with the wrong number of arguments.
    #[error("operator call `{function}` at {id} has {found} arguments")]
    MalformedOperator {
        id: ExprId,
        function: String,
        found: usize,
    },
}

/// Render `ast` as CEL source.
pub fn unparse(ast: &Ast) -> Result<String, UnparseError> {
    unparse_expr(&ast.expr, &ast.source.macro_calls)
}

/// Render one expression against a macro-call map.
pub fn unparse_expr(
    expr: &Expr,
    macro_calls: &BTreeMap<ExprId, Expr>,
) -> Result<String, UnparseError> {
    let mut unparser = Unparser {
        macro_calls,
        out: String::new(),
    };
    unparser.visit(expr)?;
    Ok(unparser.out)
}

struct Unparser<'a> {
    macro_calls: &'a BTreeMap<ExprId, Expr>,
    out: String,
}

impl Unparser<'_> {
    fn visit(&mut self, expr: &Expr) -> Result<(), UnparseError> {
        if let Some(record) = self.macro_calls.get(&expr.id()) {
            return self.visit(record);
        }
        ensure_sufficient_stack(|| match expr.kind() {
            ExprKind::NotSet => Err(UnparseError::NotSet(expr.id())),
            ExprKind::Constant(constant) => {
                write_constant(&mut self.out, constant);
                Ok(())
            }
            ExprKind::Ident(ident) => {
                self.out.push_str(&ident.name);
                Ok(())
            }
            ExprKind::Select(select) => {
                if select.test_only {
                    self.out.push_str("has(");
                }
                self.visit_operand(&select.operand, 1)?;
                self.out.push('.');
                self.out.push_str(&select.field);
                if select.test_only {
                    self.out.push(')');
                }
                Ok(())
            }
            ExprKind::Call(call) => {
                if call.target.is_none() {
                    if let Some(op) = Operator::find(&call.function) {
                        return self.visit_operator(expr.id(), op, &call.args);
                    }
                }
                if let Some(target) = &call.target {
                    self.visit_operand(target, 1)?;
                    self.out.push('.');
                }
                self.out.push_str(&call.function);
                self.out.push('(');
                self.visit_list(&call.args)?;
                self.out.push(')');
                Ok(())
            }
            ExprKind::List(list) => {
                self.out.push('[');
                for (i, element) in list.elements.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if list.optional_indices.contains(&i) {
                        self.out.push('?');
                    }
                    self.visit(element)?;
                }
                self.out.push(']');
                Ok(())
            }
            ExprKind::Struct(create_struct) => {
                self.out.push_str(&create_struct.message_name);
                self.out.push('{');
                for (i, entry) in create_struct.entries.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if entry.optional_entry() {
                        self.out.push('?');
                    }
                    match entry.key() {
                        EntryKey::Field(field) => self.out.push_str(field),
                        EntryKey::Map(key) => self.visit(key)?,
                    }
                    self.out.push_str(": ");
                    self.visit(entry.value())?;
                }
                self.out.push('}');
                Ok(())
            }
            ExprKind::Map(map) => {
                self.out.push('{');
                for (i, entry) in map.entries.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if entry.optional_entry() {
                        self.out.push('?');
                    }
                    self.visit(entry.key())?;
                    self.out.push_str(": ");
                    self.visit(entry.value())?;
                }
                self.out.push('}');
                Ok(())
            }
            ExprKind::Comprehension(_) => Err(UnparseError::BareComprehension(expr.id())),
        })
    }

    fn visit_list(&mut self, exprs: &[Expr]) -> Result<(), UnparseError> {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.visit(expr)?;
        }
        Ok(())
    }

    fn visit_operator(
        &mut self,
        id: ExprId,
        op: Operator,
        args: &[Expr],
    ) -> Result<(), UnparseError> {
        if args.len() != op.arity() {
            return Err(UnparseError::MalformedOperator {
                id,
                function: op.function().to_owned(),
                found: args.len(),
            });
        }
        let prec = op.precedence();
        match (op, args) {
            (Operator::Conditional, [cond, then, otherwise]) => {
                self.visit_operand(cond, prec - 1)?;
                self.out.push_str(" ? ");
                self.visit_operand(then, prec - 1)?;
                self.out.push_str(" : ");
                self.visit_operand(otherwise, prec)
            }
            (Operator::LogicalNot | Operator::Negate, [operand]) => {
                self.out.push_str(op.symbol());
                self.visit_operand(operand, prec)
            }
            (Operator::Index | Operator::OptionalIndex, [operand, index]) => {
                self.visit_operand(operand, prec)?;
                self.out
                    .push_str(if op == Operator::Index { "[" } else { "[?" });
                self.visit(index)?;
                self.out.push(']');
                Ok(())
            }
            (Operator::OptionalSelect, [operand, field]) => {
                self.visit_operand(operand, prec)?;
                self.out.push_str(".?");
                match field.kind() {
                    ExprKind::Constant(Constant::String(name)) => {
                        self.out.push_str(name);
                        Ok(())
                    }
                    _ => Err(UnparseError::MalformedOperator {
                        id,
                        function: OPTIONAL_SELECT.to_owned(),
                        found: args.len(),
                    }),
                }
            }
            (_, [left, right]) => {
                self.visit_operand(left, prec)?;
                let _ = write!(self.out, " {} ", op.symbol());
                self.visit_operand(right, prec - 1)
            }
            _ => Err(UnparseError::MalformedOperator {
                id,
                function: op.function().to_owned(),
                found: args.len(),
            }),
        }
    }

    /// Visit `expr`, parenthesised when it binds looser than `max_prec`.
    fn visit_operand(&mut self, expr: &Expr, max_prec: u8) -> Result<(), UnparseError> {
        let needs_parens = self.precedence(expr) > max_prec;
        if needs_parens {
            self.out.push('(');
        }
        self.visit(expr)?;
        if needs_parens {
            self.out.push(')');
        }
        Ok(())
    }

    /// Precedence of the printed form of `expr`; zero for primaries.
    fn precedence(&self, expr: &Expr) -> u8 {
        if self.macro_calls.contains_key(&expr.id()) {
            return 0;
        }
        match expr.kind() {
            ExprKind::Call(call) if call.target.is_none() => Operator::find(&call.function)
                .filter(|op| op.arity() == call.args.len())
                .map_or(0, Operator::precedence),
            _ => 0,
        }
    }
}

fn write_constant(out: &mut String, constant: &Constant) {
    match constant {
        Constant::NotSet => {}
        Constant::Null => out.push_str("null"),
        Constant::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Constant::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Constant::Uint(v) => {
            let _ = write!(out, "{v}u");
        }
        Constant::Double(v) => write_double(out, *v),
        Constant::String(s) => write_string(out, s),
        Constant::Bytes(bytes) => write_bytes(out, bytes),
        Constant::Duration(d) => {
            if d.nanos == 0 {
                let _ = write!(out, "duration(\"{}s\")", d.seconds);
            } else {
                let total = d.seconds as f64 + f64::from(d.nanos) / 1e9;
                let _ = write!(out, "duration(\"{total}s\")");
            }
        }
        Constant::Timestamp(t) => {
            let _ = write!(out, "timestamp({})", t.seconds);
        }
    }
}

fn write_double(out: &mut String, v: f64) {
    if v.is_nan() {
        out.push_str("double(\"NaN\")");
    } else if v.is_infinite() {
        let sign = if v < 0.0 { "-" } else { "" };
        let _ = write!(out, "double(\"{sign}Infinity\")");
    } else {
        // Debug keeps a fractional part on integral values: `1.0`, not `1`.
        let _ = write!(out, "{v:?}");
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_bytes(out: &mut String, bytes: &[u8]) {
    out.push_str("b\"");
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(char::from(b)),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push('"');
}

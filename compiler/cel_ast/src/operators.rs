//! Canonical operator function names.
//!
//! The parser lowers every operator to a call whose function name is one of
//! the constants below (`a + b` becomes `_+_(a, b)`). Rewrites, the
//! unparser and the constant folder key on these names.

pub const CONDITIONAL: &str = "_?_:_";
pub const LOGICAL_AND: &str = "_&&_";
pub const LOGICAL_OR: &str = "_||_";
pub const LOGICAL_NOT: &str = "!_";
pub const EQUALS: &str = "_==_";
pub const NOT_EQUALS: &str = "_!=_";
pub const LESS: &str = "_<_";
pub const LESS_EQUALS: &str = "_<=_";
pub const GREATER: &str = "_>_";
pub const GREATER_EQUALS: &str = "_>=_";
pub const ADD: &str = "_+_";
pub const SUBTRACT: &str = "_-_";
pub const MULTIPLY: &str = "_*_";
pub const DIVIDE: &str = "_/_";
pub const MODULO: &str = "_%_";
pub const NEGATE: &str = "-_";
pub const INDEX: &str = "_[_]";
pub const OPTIONAL_INDEX: &str = "_[?_]";
pub const OPTIONAL_SELECT: &str = "_?._";
pub const IN: &str = "@in";
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";

/// Function names of optimizer-synthesized constructs.
pub const CEL_BIND: &str = "cel.bind";
pub const CEL_BLOCK: &str = "cel.@block";
pub const CEL_BLOCK_INDEX_PREFIX: &str = "@index";

/// An operator that has infix, prefix or ternary surface syntax.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Operator {
    Conditional,
    LogicalOr,
    LogicalAnd,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    In,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    LogicalNot,
    Negate,
    Index,
    OptionalIndex,
    OptionalSelect,
}

impl Operator {
    pub fn find(function: &str) -> Option<Operator> {
        Some(match function {
            CONDITIONAL => Operator::Conditional,
            LOGICAL_OR => Operator::LogicalOr,
            LOGICAL_AND => Operator::LogicalAnd,
            EQUALS => Operator::Equals,
            NOT_EQUALS => Operator::NotEquals,
            LESS => Operator::Less,
            LESS_EQUALS => Operator::LessEquals,
            GREATER => Operator::Greater,
            GREATER_EQUALS => Operator::GreaterEquals,
            IN => Operator::In,
            ADD => Operator::Add,
            SUBTRACT => Operator::Subtract,
            MULTIPLY => Operator::Multiply,
            DIVIDE => Operator::Divide,
            MODULO => Operator::Modulo,
            LOGICAL_NOT => Operator::LogicalNot,
            NEGATE => Operator::Negate,
            INDEX => Operator::Index,
            OPTIONAL_INDEX => Operator::OptionalIndex,
            OPTIONAL_SELECT => Operator::OptionalSelect,
            _ => return None,
        })
    }

    pub fn function(self) -> &'static str {
        match self {
            Operator::Conditional => CONDITIONAL,
            Operator::LogicalOr => LOGICAL_OR,
            Operator::LogicalAnd => LOGICAL_AND,
            Operator::Equals => EQUALS,
            Operator::NotEquals => NOT_EQUALS,
            Operator::Less => LESS,
            Operator::LessEquals => LESS_EQUALS,
            Operator::Greater => GREATER,
            Operator::GreaterEquals => GREATER_EQUALS,
            Operator::In => IN,
            Operator::Add => ADD,
            Operator::Subtract => SUBTRACT,
            Operator::Multiply => MULTIPLY,
            Operator::Divide => DIVIDE,
            Operator::Modulo => MODULO,
            Operator::LogicalNot => LOGICAL_NOT,
            Operator::Negate => NEGATE,
            Operator::Index => INDEX,
            Operator::OptionalIndex => OPTIONAL_INDEX,
            Operator::OptionalSelect => OPTIONAL_SELECT,
        }
    }

    /// Surface symbol. Index-like and ternary operators have no single symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::LogicalOr => "||",
            Operator::LogicalAnd => "&&",
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::Less => "<",
            Operator::LessEquals => "<=",
            Operator::Greater => ">",
            Operator::GreaterEquals => ">=",
            Operator::In => "in",
            Operator::Add => "+",
            Operator::Subtract | Operator::Negate => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::LogicalNot => "!",
            Operator::Conditional
            | Operator::Index
            | Operator::OptionalIndex
            | Operator::OptionalSelect => "",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Operator::Conditional => 3,
            Operator::LogicalNot | Operator::Negate => 1,
            _ => 2,
        }
    }

    /// Binding strength; lower binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Conditional => 8,
            Operator::LogicalOr => 7,
            Operator::LogicalAnd => 6,
            Operator::Equals
            | Operator::NotEquals
            | Operator::Less
            | Operator::LessEquals
            | Operator::Greater
            | Operator::GreaterEquals
            | Operator::In => 5,
            Operator::Add | Operator::Subtract => 4,
            Operator::Multiply | Operator::Divide | Operator::Modulo => 3,
            Operator::LogicalNot | Operator::Negate => 2,
            Operator::Index | Operator::OptionalIndex | Operator::OptionalSelect => 1,
        }
    }

    pub fn is_binary(self) -> bool {
        self.arity() == 2 && !self.symbol().is_empty()
    }

    /// Side-effect-free operators whose literal applications can be folded.
    pub fn is_pure(self) -> bool {
        !matches!(
            self,
            Operator::Index | Operator::OptionalIndex | Operator::OptionalSelect
        )
    }
}

/// Side-effect-free function names the constant folder may evaluate.
pub fn is_pure_function(function: &str) -> bool {
    Operator::find(function).is_some_and(Operator::is_pure) || function == NOT_STRICTLY_FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for function in [CONDITIONAL, ADD, LOGICAL_NOT, IN, OPTIONAL_SELECT] {
            let op = Operator::find(function).unwrap();
            assert_eq!(op.function(), function);
        }
        assert!(Operator::find("size").is_none());
    }

    #[test]
    fn test_precedence_ordering() {
        assert!(Operator::Multiply.precedence() < Operator::Add.precedence());
        assert!(Operator::Add.precedence() < Operator::Equals.precedence());
        assert!(Operator::LogicalAnd.precedence() < Operator::LogicalOr.precedence());
    }

    #[test]
    fn test_purity() {
        assert!(is_pure_function(ADD));
        assert!(is_pure_function(NOT_STRICTLY_FALSE));
        assert!(!is_pure_function(INDEX));
        assert!(!is_pure_function("size"));
    }
}

use quill_ast::expr::Expr;
use quill_ast::options::Dialect;
use quill_ast::types::{BinOp, UnOp};

/// Operator precedence levels (higher = binds tighter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Precedence(pub(crate) u8);

impl Precedence {
    pub(crate) const OR: Self = Precedence(1);
    pub(crate) const AND: Self = Precedence(2);
    pub(crate) const BIT_OR: Self = Precedence(4);
    pub(crate) const BIT_XOR: Self = Precedence(5);
    pub(crate) const BIT_AND: Self = Precedence(6);
    pub(crate) const SHIFT: Self = Precedence(9);
    pub(crate) const ADD: Self = Precedence(10);
    pub(crate) const MUL: Self = Precedence(11);
    pub(crate) const UNARY: Self = Precedence(12);

    pub(crate) const POSTFIX: Self = Precedence(15);
    pub(crate) const ATOM: Self = Precedence(20);

    /// C puts equality below relational tests, and both above the bitwise
    /// operators. Lua ranks every comparison the same, below them.
    fn comparison(op: BinOp, dialect: Dialect) -> Self {
        match (dialect, op) {
            (Dialect::C, BinOp::Eq | BinOp::Ne) => Precedence(7),
            (Dialect::C, _) => Precedence(8),
            (Dialect::Lua, _) => Precedence(3),
        }
    }
}

pub(crate) fn binop_precedence(op: BinOp, dialect: Dialect) -> Precedence {
    match op {
        BinOp::Or => Precedence::OR,
        BinOp::And => Precedence::AND,
        BinOp::Lt | BinOp::Le | BinOp::Eq | BinOp::Ne | BinOp::Ge | BinOp::Gt => {
            Precedence::comparison(op, dialect)
        }
        BinOp::BitOr => Precedence::BIT_OR,
        BinOp::BitXor => Precedence::BIT_XOR,
        BinOp::BitAnd => Precedence::BIT_AND,
        BinOp::Shl | BinOp::Shr => Precedence::SHIFT,
        BinOp::Add | BinOp::Sub => Precedence::ADD,
        BinOp::Mul | BinOp::Div | BinOp::Rem | BinOp::Mod => Precedence::MUL,
    }
}

pub(crate) fn expr_precedence(expr: &Expr, dialect: Dialect) -> Precedence {
    match expr {
        Expr::Binary { op, .. } => binop_precedence(*op, dialect),
        Expr::Unary { .. } => Precedence::UNARY,
        // `- -1` must not print as `--1`
        Expr::Constant(c) if c.to_string().starts_with('-') => Precedence::UNARY,
        _ => Precedence::ATOM,
    }
}

pub(crate) fn binop_str(op: BinOp, dialect: Dialect) -> &'static str {
    match (op, dialect) {
        (BinOp::Mul, _) => "*",
        (BinOp::Div, _) => "/",
        (BinOp::Rem, Dialect::C) => "div",
        (BinOp::Rem, Dialect::Lua) => "//",
        (BinOp::Mod, _) => "%",
        (BinOp::Add, _) => "+",
        (BinOp::Sub, _) => "-",
        (BinOp::BitAnd, _) => "&",
        (BinOp::BitOr, _) => "|",
        (BinOp::BitXor, Dialect::C) => "^",
        (BinOp::BitXor, Dialect::Lua) => "~",
        (BinOp::Shl, _) => "<<",
        (BinOp::Shr, _) => ">>",
        (BinOp::Lt, _) => "<",
        (BinOp::Le, _) => "<=",
        (BinOp::Eq, _) => "==",
        (BinOp::Ne, Dialect::C) => "!=",
        (BinOp::Ne, Dialect::Lua) => "~=",
        (BinOp::Ge, _) => ">=",
        (BinOp::Gt, _) => ">",
        (BinOp::And, Dialect::C) => "&&",
        (BinOp::And, Dialect::Lua) => "and",
        (BinOp::Or, Dialect::C) => "||",
        (BinOp::Or, Dialect::Lua) => "or",
    }
}

pub(crate) fn unop_str(op: UnOp, dialect: Dialect) -> &'static str {
    match (op, dialect) {
        (UnOp::Not, Dialect::C) => "!",
        (UnOp::Not, Dialect::Lua) => "not ",
        (UnOp::Neg, _) => "-",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparisons_rank_per_dialect() {
        // C: a & b == c parses as a & (b == c); Lua reads it as (a & b) == c
        assert!(binop_precedence(BinOp::Eq, Dialect::C) > binop_precedence(BinOp::BitAnd, Dialect::C));
        assert!(binop_precedence(BinOp::Eq, Dialect::Lua) < binop_precedence(BinOp::BitAnd, Dialect::Lua));
        assert!(binop_precedence(BinOp::Lt, Dialect::C) > binop_precedence(BinOp::Eq, Dialect::C));
        assert_eq!(
            binop_precedence(BinOp::Lt, Dialect::Lua),
            binop_precedence(BinOp::Eq, Dialect::Lua)
        );
    }
}

use quill_bytecode::constant::Constant;

use crate::types::{BinOp, UnOp};

/// Which instance a variable belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    /// A static instance resolved at decode time (`self`, `global`, an object).
    Named(String),
    /// An instance id computed at run time and popped from the stack.
    Dynamic(Box<Expr>),
    /// A temporary introduced by the decompiler.
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub name: String,
    pub instance: Instance,
    pub index: Option<Box<Expr>>,
}

impl Var {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: Instance::Local,
            index: None,
        }
    }

    pub fn named(instance: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: Instance::Named(instance.into()),
            index: None,
        }
    }
}

/// An expression tree built by stack simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Constant),
    Var(Var),
    /// A function call; arguments in source order.
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnOp, operand: Box<Expr> },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// The i-th value on the operand stack when the enclosing block was
    /// entered (0 is the bottom-most carried value).
    Incoming(u16),
}

impl Expr {
    pub fn int(value: i32) -> Self {
        Expr::Constant(Constant::Int(value))
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::unary(UnOp::Not, operand)
    }

    /// Whether this is a numeric or boolean literal equal to `value`.
    pub fn is_literal(&self, value: i64) -> bool {
        match self {
            Expr::Constant(c) => c.as_integer() == Some(value),
            _ => false,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Expr::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Logical negation, folding comparisons and double negation.
    pub fn negate(self) -> Expr {
        match self {
            Expr::Binary { op, left, right } if op.is_comparison() => Expr::Binary {
                op: op.inverse().unwrap_or(op),
                left,
                right,
            },
            Expr::Unary {
                op: UnOp::Not,
                operand,
            } => *operand,
            other => Expr::not(other),
        }
    }

    /// Fold `!!x` and `!(a op b)` for comparison operators anywhere in the
    /// tree. Returns whether anything changed.
    pub fn simplify_not(&mut self) -> bool {
        let mut changed = false;
        self.for_each_child_mut(&mut |child| changed |= child.simplify_not());

        if let Expr::Unary {
            op: UnOp::Not,
            operand,
        } = self
        {
            let folded = match operand.as_mut() {
                Expr::Unary {
                    op: UnOp::Not,
                    operand: inner,
                } => Some(std::mem::replace(inner.as_mut(), Expr::Incoming(0))),
                Expr::Binary { op, left, right } if op.is_comparison() => Some(Expr::Binary {
                    op: op.inverse().unwrap_or(*op),
                    left: std::mem::replace(left, Box::new(Expr::Incoming(0))),
                    right: std::mem::replace(right, Box::new(Expr::Incoming(0))),
                }),
                _ => None,
            };
            if let Some(folded) = folded {
                *self = folded;
                changed = true;
            }
        }
        changed
    }

    /// Rebuild a `&&`/`||` chain so it nests to the left:
    /// `a && (b && c)` becomes `(a && b) && c`.
    pub fn left_associate(self) -> Expr {
        match self {
            Expr::Binary { op, left, right } if op.is_logical() => {
                let left = left.left_associate();
                let right = right.left_associate();
                Self::join_left(op, left, right)
            }
            other => other,
        }
    }

    fn join_left(op: BinOp, left: Expr, right: Expr) -> Expr {
        match right {
            Expr::Binary {
                op: inner,
                left: rl,
                right: rr,
            } if inner == op => {
                let left = Self::join_left(op, left, *rl);
                Self::join_left(op, left, *rr)
            }
            right => Expr::binary(op, left, right),
        }
    }

    pub fn for_each_child(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Expr::Constant(_) | Expr::Incoming(_) => {}
            Expr::Var(var) => {
                if let Instance::Dynamic(inst) = &var.instance {
                    f(inst);
                }
                if let Some(index) = &var.index {
                    f(index);
                }
            }
            Expr::Call { args, .. } => args.iter().for_each(f),
            Expr::Unary { operand, .. } => f(operand),
            Expr::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
        }
    }

    pub fn for_each_child_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match self {
            Expr::Constant(_) | Expr::Incoming(_) => {}
            Expr::Var(var) => var.for_each_expr_mut(f),
            Expr::Call { args, .. } => args.iter_mut().for_each(f),
            Expr::Unary { operand, .. } => f(operand),
            Expr::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
        }
    }

    /// Whether any `Incoming` placeholder occurs in the tree.
    pub fn uses_incoming(&self) -> bool {
        if matches!(self, Expr::Incoming(_)) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |child| found |= child.uses_incoming());
        found
    }

    /// Replace `Incoming(i)` with `values[i]`.
    pub fn substitute_incoming(&mut self, values: &[Expr]) {
        if let Expr::Incoming(i) = self {
            if let Some(value) = values.get(*i as usize) {
                *self = value.clone();
            }
            return;
        }
        self.for_each_child_mut(&mut |child| child.substitute_incoming(values));
    }
}

impl Var {
    pub fn for_each_expr_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        if let Instance::Dynamic(inst) = &mut self.instance {
            f(inst);
        }
        if let Some(index) = &mut self.index {
            f(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(Var::named("self", name))
    }

    #[test]
    fn test_negate_folds_comparisons() {
        let e = Expr::binary(BinOp::Lt, var("a"), Expr::int(1));
        assert_eq!(e.negate(), Expr::binary(BinOp::Ge, var("a"), Expr::int(1)));
        assert_eq!(Expr::not(var("a")).negate(), var("a"));
        assert_eq!(var("a").negate(), Expr::not(var("a")));
    }

    #[test]
    fn test_simplify_not_nested() {
        let mut e = Expr::binary(
            BinOp::And,
            Expr::not(Expr::not(var("a"))),
            Expr::not(Expr::binary(BinOp::Eq, var("b"), Expr::int(2))),
        );
        assert!(e.simplify_not());
        assert_eq!(
            e,
            Expr::binary(
                BinOp::And,
                var("a"),
                Expr::binary(BinOp::Ne, var("b"), Expr::int(2))
            )
        );
        assert!(!e.simplify_not());
    }

    #[test]
    fn test_left_associate() {
        let e = Expr::binary(
            BinOp::And,
            var("a"),
            Expr::binary(BinOp::And, var("b"), Expr::binary(BinOp::And, var("c"), var("d"))),
        );
        let expected = Expr::binary(
            BinOp::And,
            Expr::binary(BinOp::And, Expr::binary(BinOp::And, var("a"), var("b")), var("c")),
            var("d"),
        );
        assert_eq!(e.left_associate(), expected);

        // mixed operators keep their grouping
        let mixed = Expr::binary(BinOp::Or, var("a"), Expr::binary(BinOp::And, var("b"), var("c")));
        assert_eq!(mixed.clone().left_associate(), mixed);
    }

    #[test]
    fn test_substitute_incoming() {
        let mut e = Expr::binary(BinOp::Add, Expr::Incoming(1), Expr::Incoming(0));
        assert!(e.uses_incoming());
        e.substitute_incoming(&[Expr::int(10), var("x")]);
        assert_eq!(e, Expr::binary(BinOp::Add, var("x"), Expr::int(10)));
        assert!(!e.uses_incoming());
    }
}

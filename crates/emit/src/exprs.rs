use std::fmt::Write;

use quill_ast::expr::{Expr, Instance, Var};

use crate::precedence::{binop_precedence, binop_str, expr_precedence, unop_str, Precedence};
use crate::Emitter;

impl Emitter<'_> {
    pub(crate) fn emit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Constant(c) => {
                let _ = write!(self.output, "{}", c);
            }

            Expr::Var(var) => self.emit_var(var),

            Expr::Call { name, args } => {
                self.output.push_str(name);
                self.emit_args(args);
            }

            Expr::Unary { op, operand } => {
                self.output.push_str(unop_str(*op, self.dialect));
                // a nested prefix gets parens: `--x` opens a Lua comment
                let min = if expr_precedence(operand, self.dialect) == Precedence::UNARY {
                    Precedence(Precedence::UNARY.0 + 1)
                } else {
                    Precedence::UNARY
                };
                self.emit_expr_parens(operand, min);
            }

            Expr::Binary { op, left, right } => {
                let prec = binop_precedence(*op, self.dialect);
                self.emit_expr_parens(left, prec);
                let _ = write!(self.output, " {} ", binop_str(*op, self.dialect));
                // left-associative: an equal-precedence right operand needs parens
                self.emit_expr_parens(right, Precedence(prec.0 + 1));
            }

            Expr::Incoming(slot) => {
                let _ = write!(self.output, "stack_{}", slot);
            }
        }
    }

    /// Emit `expr`, parenthesized when it binds looser than `min`.
    pub(crate) fn emit_expr_parens(&mut self, expr: &Expr, min: Precedence) {
        if expr_precedence(expr, self.dialect) < min {
            self.output.push('(');
            self.emit_expr(expr);
            self.output.push(')');
        } else {
            self.emit_expr(expr);
        }
    }

    pub(crate) fn emit_args(&mut self, args: &[Expr]) {
        self.output.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.output.push_str(", ");
            }
            self.emit_expr(arg);
        }
        self.output.push(')');
    }

    /// `self` and script locals print bare; other instances qualify the name.
    pub(crate) fn emit_var(&mut self, var: &Var) {
        match &var.instance {
            Instance::Local => {}
            Instance::Named(name) if name == "self" || name == "local" => {}
            Instance::Named(name) => {
                self.output.push_str(name);
                self.output.push('.');
            }
            Instance::Dynamic(inst) => {
                // 100001.x would read as a number
                if matches!(inst.as_ref(), Expr::Constant(_)) {
                    self.output.push('(');
                    self.emit_expr(inst);
                    self.output.push(')');
                } else {
                    self.emit_expr_parens(inst, Precedence::POSTFIX);
                }
                self.output.push('.');
            }
        }
        self.output.push_str(&var.name);
        if let Some(index) = &var.index {
            self.output.push('[');
            self.emit_expr(index);
            self.output.push(']');
        }
    }

    pub(crate) fn expr_string(&mut self, expr: &Expr) -> String {
        let start = self.output.len();
        self.emit_expr(expr);
        self.output.split_off(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_ast::label::LabelArena;
    use quill_ast::options::Dialect;
    use quill_ast::types::{BinOp, UnOp};
    use quill_ast::Constant;

    fn show(expr: &Expr, dialect: Dialect) -> String {
        let labels = LabelArena::new();
        let mut emitter = Emitter::new(&labels, dialect);
        emitter.expr_string(expr)
    }

    fn var(name: &str) -> Expr {
        Expr::Var(Var::named("self", name))
    }

    #[test]
    fn test_parens_follow_precedence() {
        // (a + b) * c - (d - e)
        let expr = Expr::binary(
            BinOp::Sub,
            Expr::binary(
                BinOp::Mul,
                Expr::binary(BinOp::Add, var("a"), var("b")),
                var("c"),
            ),
            Expr::binary(BinOp::Sub, var("d"), var("e")),
        );
        assert_eq!(show(&expr, Dialect::C), "(a + b) * c - (d - e)");
    }

    #[test]
    fn test_logic_operators_per_dialect() {
        let expr = Expr::binary(
            BinOp::Or,
            Expr::not(var("a")),
            Expr::binary(
                BinOp::And,
                Expr::binary(BinOp::Ne, var("b"), Expr::int(1)),
                var("c"),
            ),
        );
        assert_eq!(show(&expr, Dialect::C), "!a || b != 1 && c");
        assert_eq!(show(&expr, Dialect::Lua), "not a or b ~= 1 and c");
    }

    #[test]
    fn test_bitwise_comparison_parens_differ() {
        let expr = Expr::binary(
            BinOp::BitAnd,
            var("a"),
            Expr::binary(BinOp::Eq, var("b"), var("c")),
        );
        assert_eq!(show(&expr, Dialect::C), "a & b == c");
        assert_eq!(show(&expr, Dialect::Lua), "a & (b == c)");
    }

    #[test]
    fn test_instances_and_indices() {
        let mut other = Var::named("global", "score");
        other.index = Some(Box::new(Expr::int(2)));
        assert_eq!(show(&Expr::Var(other), Dialect::C), "global.score[2]");

        let dynamic = Var {
            name: "hp".to_string(),
            instance: Instance::Dynamic(Box::new(Expr::Constant(Constant::Int(100001)))),
            index: None,
        };
        assert_eq!(show(&Expr::Var(dynamic), Dialect::C), "(100001).hp");
        assert_eq!(show(&Expr::Var(Var::local("repeat_0")), Dialect::C), "repeat_0");
    }

    #[test]
    fn test_negated_negative_constant() {
        let expr = Expr::unary(UnOp::Neg, Expr::int(-1));
        assert_eq!(show(&expr, Dialect::Lua), "-(-1)");
        let call = Expr::Call {
            name: "max".to_string(),
            args: vec![Expr::Incoming(0), Expr::int(3)],
        };
        assert_eq!(show(&call, Dialect::C), "max(stack_0, 3)");
    }
}

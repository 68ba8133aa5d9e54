use std::fmt::Write;

use quill_ast::expr::{Expr, Var};
use quill_ast::node::{Block, FakeSwitch, Node, Switch};
use quill_ast::types::BinOp;

use crate::precedence::binop_str;
use crate::Emitter;

/// `x = x op rhs` written as `x op= rhs`.
fn compound<'e>(target: &Var, value: &'e Expr) -> Option<(BinOp, &'e Expr)> {
    let Expr::Binary { op, left, right } = value else {
        return None;
    };
    let sugared = matches!(
        op,
        BinOp::Add
            | BinOp::Sub
            | BinOp::Mul
            | BinOp::Div
            | BinOp::Mod
            | BinOp::BitAnd
            | BinOp::BitOr
            | BinOp::BitXor
    );
    match left.as_ref() {
        Expr::Var(var) if sugared && var == target => Some((*op, right)),
        _ => None,
    }
}

impl Emitter<'_> {
    pub(crate) fn emit_c_block(&mut self, block: &Block) {
        self.emit_c_nodes(&block.body);
    }

    fn emit_c_nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.emit_c_node(node);
        }
    }

    fn emit_c_indented(&mut self, nodes: &[Node]) {
        self.indent += 1;
        self.emit_c_nodes(nodes);
        self.indent -= 1;
    }

    /// `prefix expr suffix` on one line.
    fn c_expr_line(&mut self, prefix: &str, expr: &Expr, suffix: &str) {
        self.write_indent();
        self.output.push_str(prefix);
        self.emit_expr(expr);
        self.output.push_str(suffix);
        self.output.push('\n');
    }

    fn emit_c_node(&mut self, node: &Node) {
        match node {
            Node::Label(id) => {
                let text = format!("{}:", self.label(*id));
                self.line(&text);
            }
            Node::Raw(raw) => {
                let text = format!("// {}", raw.op);
                self.line(&text);
            }
            Node::Push(expr) => self.c_expr_line("push(", expr, ");"),
            Node::Assign { target, value } => self.emit_c_assign(target, value),
            Node::Call { name, args } => {
                self.write_indent();
                self.output.push_str(name);
                self.emit_args(args);
                self.output.push_str(";\n");
            }
            Node::Discard(expr) => self.c_expr_line("", expr, ";"),
            Node::Goto(target) => {
                let text = format!("goto {};", self.label(*target));
                self.line(&text);
            }
            Node::CondGoto { cond, target } => {
                let suffix = format!(") goto {};", self.label(*target));
                self.c_expr_line("if (", cond, &suffix);
            }
            Node::PushEnv { env, skip } => {
                let suffix = format!(")) goto {};", self.label(*skip));
                self.c_expr_line("if (!with_begin(", env, &suffix);
            }
            Node::PopEnv { back } => {
                let text = format!("if (with_next()) goto {};", self.label(*back));
                self.line(&text);
            }
            Node::FakeSwitch(fake) => self.emit_c_dispatch(fake),
            Node::Return(expr) => self.c_expr_line("return ", expr, ";"),
            Node::Exit => self.line("exit;"),
            Node::Break => self.line("break;"),
            Node::Continue => self.line("continue;"),
            Node::BasicBlock(bb) => self.emit_c_nodes(&bb.body),
            Node::Block(block) => self.emit_c_nodes(&block.body),
            Node::Condition {
                cond,
                then_block,
                else_block,
            } => self.emit_c_condition(cond, then_block, else_block),
            Node::While { cond, body } => {
                match cond {
                    Some(cond) => self.c_expr_line("while (", cond, ") {"),
                    None => self.line("while (true) {"),
                }
                self.emit_c_indented(&body.body);
                self.line("}");
            }
            Node::Switch(sw) => self.emit_c_switch(sw),
            Node::With { env, body, .. } => {
                self.c_expr_line("with (", env, ") {");
                self.emit_c_indented(&body.body);
                self.line("}");
            }
        }
    }

    fn emit_c_assign(&mut self, target: &Var, value: &Expr) {
        self.write_indent();
        self.emit_var(target);
        match compound(target, value) {
            Some((BinOp::Add, rhs)) if rhs.is_literal(1) => self.output.push_str("++"),
            Some((BinOp::Sub, rhs)) if rhs.is_literal(1) => self.output.push_str("--"),
            Some((op, rhs)) => {
                let _ = write!(self.output, " {}= ", binop_str(op, self.dialect));
                self.emit_expr(rhs);
            }
            None => {
                self.output.push_str(" = ");
                self.emit_expr(value);
            }
        }
        self.output.push_str(";\n");
    }

    /// `else { if .. }` with nothing else in it prints as `else if`.
    fn emit_c_condition(&mut self, cond: &Expr, then_block: &Block, else_block: &Block) {
        self.c_expr_line("if (", cond, ") {");
        self.emit_c_indented(&then_block.body);

        let mut rest = else_block;
        loop {
            match rest.body.as_slice() {
                [] => break,
                [Node::Condition {
                    cond,
                    then_block,
                    else_block,
                }] => {
                    self.c_expr_line("} else if (", cond, ") {");
                    self.emit_c_indented(&then_block.body);
                    rest = else_block;
                }
                body => {
                    self.line("} else {");
                    self.emit_c_indented(body);
                    break;
                }
            }
        }
        self.line("}");
    }

    fn emit_c_switch(&mut self, sw: &Switch) {
        self.c_expr_line("switch (", &sw.value, ") {");
        self.indent += 1;
        for case in &sw.cases {
            for value in &case.values {
                self.c_expr_line("case ", value, ":");
            }
            if case.is_default {
                self.line("default:");
            }
            self.emit_c_indented(&case.body.body);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn emit_c_dispatch(&mut self, fake: &FakeSwitch) {
        self.c_expr_line("switch (", &fake.value, ") {");
        self.indent += 1;
        for (value, target) in &fake.cases {
            let suffix = format!(": goto {};", self.label(*target));
            self.c_expr_line("case ", value, &suffix);
        }
        let text = format!("default: goto {};", self.label(fake.default));
        self.line(&text);
        self.indent -= 1;
        self.line("}");
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quill_ast::expr::{Expr, Var};
    use quill_ast::label::LabelArena;
    use quill_ast::node::{Block, Node, Switch, SwitchCase};
    use quill_ast::options::Dialect;
    use quill_ast::types::BinOp;

    use crate::render;

    fn var(name: &str) -> Expr {
        Expr::Var(Var::named("self", name))
    }

    fn assign(name: &str, value: Expr) -> Node {
        Node::Assign {
            target: Var::named("self", name),
            value,
        }
    }

    fn show(body: Vec<Node>) -> String {
        let labels = LabelArena::new();
        render(&Block::new(None, body), &labels, Dialect::C)
    }

    #[test]
    fn test_compound_assignments() {
        let out = show(vec![
            assign("a", Expr::binary(BinOp::Add, var("a"), Expr::int(1))),
            assign("b", Expr::binary(BinOp::Sub, var("b"), Expr::int(1))),
            assign("c", Expr::binary(BinOp::Mul, var("c"), Expr::int(4))),
            assign("d", Expr::binary(BinOp::Sub, var("e"), Expr::int(1))),
        ]);
        assert_eq!(out, "a++;\nb--;\nc *= 4;\nd = e - 1;\n");
    }

    #[test]
    fn test_else_if_chain() {
        let inner = Node::Condition {
            cond: var("b"),
            then_block: Block::new(None, vec![assign("x", Expr::int(2))]),
            else_block: Block::new(None, vec![assign("x", Expr::int(3))]),
        };
        let out = show(vec![Node::Condition {
            cond: var("a"),
            then_block: Block::new(None, vec![assign("x", Expr::int(1))]),
            else_block: Block::new(None, vec![inner]),
        }]);
        assert_eq!(
            out,
            "if (a) {\n    x = 1;\n} else if (b) {\n    x = 2;\n} else {\n    x = 3;\n}\n"
        );
    }

    #[test]
    fn test_loops_and_with() {
        let out = show(vec![
            Node::While {
                cond: None,
                body: Block::new(
                    None,
                    vec![Node::Condition {
                        cond: var("done"),
                        then_block: Block::new(None, vec![Node::Break]),
                        else_block: Block::default(),
                    }],
                ),
            },
            Node::With {
                env: Expr::Var(Var::local("other")),
                body: Block::new(None, vec![Node::Call {
                    name: "instance_destroy".to_string(),
                    args: vec![],
                }]),
                end: None,
            },
        ]);
        assert_eq!(
            out,
            "while (true) {\n    if (done) {\n        break;\n    }\n}\n\
             with (other) {\n    instance_destroy();\n}\n"
        );
    }

    #[test]
    fn test_switch_layout() {
        let sw = Switch {
            value: var("state"),
            cases: vec![
                SwitchCase {
                    values: vec![Expr::int(1), Expr::int(2)],
                    is_default: false,
                    body: Block::new(None, vec![assign("y", Expr::int(1)), Node::Break]),
                },
                SwitchCase {
                    values: vec![],
                    is_default: true,
                    body: Block::new(None, vec![Node::Exit]),
                },
            ],
        };
        assert_eq!(
            show(vec![Node::Switch(sw)]),
            "switch (state) {\n    case 1:\n    case 2:\n        y = 1;\n        break;\n    \
             default:\n        exit;\n}\n"
        );
    }

    #[test]
    fn test_leftover_jumps_use_label_names() {
        let mut labels = LabelArena::new();
        let top = labels.named("L12".to_string());
        let out = render(
            &Block::new(
                None,
                vec![
                    Node::Label(top),
                    Node::CondGoto {
                        cond: var("x"),
                        target: top,
                    },
                    Node::Return(Expr::int(0)),
                ],
            ),
            &labels,
            Dialect::C,
        );
        assert_eq!(out, "L12:\nif (x) goto L12;\nreturn 0;\n");
    }
}

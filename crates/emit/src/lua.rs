//! Lua output.
//!
//! Lua has no `continue`, so every loop that needs one gets a
//! `::continue_N::` label as its last statement. A switch becomes an
//! `if`/`elseif` chain inside `repeat ... until true` so its `break`s keep
//! working. `return` is only legal at the end of a block; anywhere else it
//! is wrapped in `do ... end`.

use quill_ast::expr::Expr;
use quill_ast::node::{Block, FakeSwitch, Node, Switch};

use crate::precedence::Precedence;
use crate::Emitter;

/// Whether a `continue` in `nodes` belongs to the loop around them.
fn continues_here(nodes: &[Node]) -> bool {
    nodes.iter().any(|node| match node {
        Node::Continue => true,
        Node::While { .. } | Node::With { .. } => false,
        Node::BasicBlock(bb) => continues_here(&bb.body),
        other => other.child_blocks().iter().any(|b| continues_here(&b.body)),
    })
}

impl Emitter<'_> {
    pub(crate) fn emit_lua_body(&mut self, nodes: &[Node]) {
        self.emit_lua_seq(nodes, true);
    }

    /// `tail` says whether the last node of `nodes` ends its Lua block.
    fn emit_lua_seq(&mut self, nodes: &[Node], tail: bool) {
        for (i, node) in nodes.iter().enumerate() {
            self.emit_lua_node(node, tail && i + 1 == nodes.len());
        }
    }

    fn emit_lua_indented(&mut self, nodes: &[Node]) {
        self.indent += 1;
        self.emit_lua_seq(nodes, true);
        self.indent -= 1;
    }

    fn lua_expr_line(&mut self, prefix: &str, expr: &Expr, suffix: &str) {
        self.write_indent();
        self.output.push_str(prefix);
        self.emit_expr(expr);
        self.output.push_str(suffix);
        self.output.push('\n');
    }

    fn emit_lua_node(&mut self, node: &Node, tail: bool) {
        match node {
            Node::Label(id) => {
                let text = format!("::{}::", self.label(*id));
                self.line(&text);
            }
            Node::Raw(raw) => {
                let text = format!("-- {}", raw.op);
                self.line(&text);
            }
            Node::Push(expr) => self.lua_expr_line("push(", expr, ")"),
            Node::Assign { target, value } => {
                self.write_indent();
                self.emit_var(target);
                self.output.push_str(" = ");
                self.emit_expr(value);
                self.output.push('\n');
            }
            Node::Call { name, args } => {
                self.write_indent();
                self.output.push_str(name);
                self.emit_args(args);
                self.output.push('\n');
            }
            // a bare expression is not a Lua statement
            Node::Discard(expr) => self.lua_expr_line("local _ = ", expr, ""),
            Node::Goto(target) => {
                let text = format!("goto {}", self.label(*target));
                self.line(&text);
            }
            Node::CondGoto { cond, target } => {
                let suffix = format!(" then goto {} end", self.label(*target));
                self.lua_expr_line("if ", cond, &suffix);
            }
            Node::PushEnv { env, skip } => {
                let suffix = format!(") then goto {} end", self.label(*skip));
                self.lua_expr_line("if not with_begin(", env, &suffix);
            }
            Node::PopEnv { back } => {
                let text = format!("if with_next() then goto {} end", self.label(*back));
                self.line(&text);
            }
            Node::FakeSwitch(fake) => self.emit_lua_dispatch(fake),
            Node::Return(expr) => {
                if tail {
                    self.lua_expr_line("return ", expr, "");
                } else {
                    self.lua_expr_line("do return ", expr, " end");
                }
            }
            Node::Exit => self.line(if tail { "return" } else { "do return end" }),
            Node::Break => self.line("break"),
            Node::Continue => {
                let text = match self.loops.last_mut() {
                    Some((label, used)) => {
                        *used = true;
                        format!("goto {}", label)
                    }
                    None => "goto continue".to_string(),
                };
                self.line(&text);
            }
            Node::BasicBlock(bb) => self.emit_lua_seq(&bb.body, tail),
            Node::Block(block) => self.emit_lua_seq(&block.body, tail),
            Node::Condition {
                cond,
                then_block,
                else_block,
            } => self.emit_lua_condition(cond, then_block, else_block),
            Node::While { cond, body } => {
                match cond {
                    Some(cond) => self.lua_expr_line("while ", cond, " do"),
                    None => self.line("while true do"),
                }
                self.emit_lua_loop_body(body);
                self.line("end");
            }
            Node::Switch(sw) => self.emit_lua_switch(sw),
            Node::With { env, body, .. } => {
                self.lua_expr_line("for _, self in with_instances(", env, ") do");
                self.emit_lua_loop_body(body);
                self.line("end");
            }
        }
    }

    fn emit_lua_loop_body(&mut self, body: &Block) {
        let label = format!("continue_{}", self.next_loop);
        self.next_loop += 1;
        let labelled = continues_here(&body.body);

        self.loops.push((label, false));
        self.indent += 1;
        self.emit_lua_seq(&body.body, !labelled);
        if let Some((label, true)) = self.loops.pop() {
            let text = format!("::{}::", label);
            self.line(&text);
        }
        self.indent -= 1;
    }

    fn emit_lua_condition(&mut self, cond: &Expr, then_block: &Block, else_block: &Block) {
        self.lua_expr_line("if ", cond, " then");
        self.emit_lua_indented(&then_block.body);

        let mut rest = else_block;
        loop {
            match rest.body.as_slice() {
                [] => break,
                [Node::Condition {
                    cond,
                    then_block,
                    else_block,
                }] => {
                    self.lua_expr_line("elseif ", cond, " then");
                    self.emit_lua_indented(&then_block.body);
                    rest = else_block;
                }
                body => {
                    self.line("else");
                    self.emit_lua_indented(body);
                    break;
                }
            }
        }
        self.line("end");
    }

    /// `switch_value == a or switch_value == b` for one case.
    fn emit_lua_case_test(&mut self, values: &[Expr]) {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.output.push_str(" or ");
            }
            self.output.push_str("switch_value == ");
            self.emit_expr_parens(value, Precedence::ATOM);
        }
    }

    fn emit_lua_switch(&mut self, sw: &Switch) {
        self.line("repeat");
        self.indent += 1;
        self.lua_expr_line("local switch_value = ", &sw.value, "");

        let default = sw.cases.iter().find(|c| c.is_default);
        let mut first = true;
        for case in sw.cases.iter().filter(|c| !c.is_default && !c.values.is_empty()) {
            self.write_indent();
            self.output.push_str(if first { "if " } else { "elseif " });
            self.emit_lua_case_test(&case.values);
            self.output.push_str(" then\n");
            self.emit_lua_indented(&case.body.body);
            first = false;
        }
        match (first, default) {
            (true, Some(case)) => self.emit_lua_seq(&case.body.body, true),
            (true, None) => {}
            (false, Some(case)) => {
                self.line("else");
                self.emit_lua_indented(&case.body.body);
                self.line("end");
            }
            (false, None) => self.line("end"),
        }

        self.indent -= 1;
        self.line("until true");
    }

    fn emit_lua_dispatch(&mut self, fake: &FakeSwitch) {
        for (value, target) in &fake.cases {
            self.write_indent();
            self.output.push_str("if ");
            self.emit_expr_parens(&fake.value, Precedence::ATOM);
            self.output.push_str(" == ");
            self.emit_expr_parens(value, Precedence::ATOM);
            let text = format!(" then goto {} end\n", self.label(*target));
            self.output.push_str(&text);
        }
        let text = format!("goto {}", self.label(fake.default));
        self.line(&text);
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
        render(&Block::new(None, body), &labels, Dialect::Lua)
    }

    #[test]
    fn test_no_compound_assignment() {
        let out = show(vec![assign(
            "a",
            Expr::binary(BinOp::Add, var("a"), Expr::int(1)),
        )]);
        assert_eq!(out, "a = a + 1\n");
    }

    #[test]
    fn test_if_elseif_else() {
        let inner = Node::Condition {
            cond: Expr::binary(BinOp::Ne, var("b"), Expr::int(0)),
            then_block: Block::new(None, vec![assign("x", Expr::int(2))]),
            else_block: Block::new(None, vec![assign("x", Expr::int(3))]),
        };
        let out = show(vec![Node::Condition {
            cond: Expr::not(var("a")),
            then_block: Block::new(None, vec![assign("x", Expr::int(1))]),
            else_block: Block::new(None, vec![inner]),
        }]);
        assert_eq!(
            out,
            "if not a then\n    x = 1\nelseif b ~= 0 then\n    x = 2\nelse\n    x = 3\nend\n"
        );
    }

    #[test]
    fn test_continue_becomes_goto_to_loop_end() {
        let body = vec![
            Node::Condition {
                cond: var("skip"),
                then_block: Block::new(None, vec![Node::Continue]),
                else_block: Block::default(),
            },
            Node::Return(Expr::int(1)),
        ];
        let out = show(vec![Node::While {
            cond: Some(var("running")),
            body: Block::new(None, body),
        }]);
        assert_eq!(
            out,
            "while running do\n    if skip then\n        goto continue_0\n    end\n    \
             do return 1 end\n    ::continue_0::\nend\n"
        );
    }

    #[test]
    fn test_switch_as_repeat_block() {
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
                    body: Block::new(None, vec![assign("y", Expr::int(0)), Node::Break]),
                },
            ],
        };
        assert_eq!(
            show(vec![Node::Switch(sw)]),
            "repeat\n    local switch_value = state\n    \
             if switch_value == 1 or switch_value == 2 then\n        y = 1\n        break\n    \
             else\n        y = 0\n        break\n    end\nuntil true\n"
        );
    }

    #[test]
    fn test_with_and_exit() {
        let out = show(vec![
            Node::With {
                env: Expr::Var(Var::local("other")),
                body: Block::new(None, vec![Node::Exit, assign("dead", Expr::int(0))]),
                end: None,
            },
            Node::Discard(Expr::Call {
                name: "show_debug_message".to_string(),
                args: vec![Expr::int(1)],
            }),
        ]);
        assert_eq!(
            out,
            "for _, self in with_instances(other) do\n    do return end\n    dead = 0\nend\n\
             local _ = show_debug_message(1)\n"
        );
    }
}

//! Indented tree dump for stage snapshots. Shows every node kind,
//! including the raw and block-level ones no source printer expects.

use std::fmt::Write;

use quill_ast::expr::Expr;
use quill_ast::label::LabelArena;
use quill_ast::node::{BasicBlock, Block, Node};
use quill_ast::options::Dialect;

use crate::Emitter;

pub fn dump(block: &Block, labels: &LabelArena) -> String {
    let mut emitter = Emitter::new(labels, Dialect::C);
    emitter.dump_block("block", block);
    emitter.output
}

pub fn dump_nodes(nodes: &[Node], labels: &LabelArena) -> String {
    let mut emitter = Emitter::new(labels, Dialect::C);
    emitter.dump_list(nodes);
    emitter.output
}

pub fn dump_blocks(blocks: &[BasicBlock], labels: &LabelArena) -> String {
    let mut emitter = Emitter::new(labels, Dialect::C);
    for bb in blocks {
        emitter.dump_basic_block(bb);
    }
    emitter.output
}

impl Emitter<'_> {
    fn dump_list(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.dump_node(node);
        }
    }

    fn dump_block(&mut self, head: &str, block: &Block) {
        match block.entry {
            Some(entry) => {
                let text = format!("{} (entry {})", head, self.label(entry));
                self.line(&text);
            }
            None => self.line(head),
        }
        self.indent += 1;
        self.dump_list(&block.body);
        self.indent -= 1;
    }

    fn dump_basic_block(&mut self, bb: &BasicBlock) {
        let text = format!("basic block (depth {})", bb.entry_depth);
        self.line(&text);
        self.indent += 1;
        self.dump_list(&bb.body);
        self.indent -= 1;
    }

    fn dump_line(&mut self, head: &str, expr: &Expr, tail: &str) {
        let expr = self.expr_string(expr);
        let text = format!("{}{}{}", head, expr, tail);
        self.line(&text);
    }

    fn dump_node(&mut self, node: &Node) {
        match node {
            Node::Label(id) => {
                let text = format!("label {}", self.label(*id));
                self.line(&text);
            }
            Node::Raw(raw) => {
                let text = format!("raw {:>5}  {}", raw.offset, raw.op);
                self.line(&text);
            }
            Node::Push(expr) => self.dump_line("push ", expr, ""),
            Node::Assign { target, value } => {
                let start = self.output.len();
                self.emit_var(target);
                let target = self.output.split_off(start);
                self.dump_line(&format!("assign {} = ", target), value, "");
            }
            Node::Call { name, args } => {
                let start = self.output.len();
                self.emit_args(args);
                let args = self.output.split_off(start);
                let text = format!("call {}{}", name, args);
                self.line(&text);
            }
            Node::Discard(expr) => self.dump_line("discard ", expr, ""),
            Node::Goto(target) => {
                let text = format!("goto {}", self.label(*target));
                self.line(&text);
            }
            Node::CondGoto { cond, target } => {
                let tail = format!(" goto {}", self.label(*target));
                self.dump_line("if ", cond, &tail);
            }
            Node::PushEnv { env, skip } => {
                let tail = format!(" else {}", self.label(*skip));
                self.dump_line("pushenv ", env, &tail);
            }
            Node::PopEnv { back } => {
                let text = format!("popenv back {}", self.label(*back));
                self.line(&text);
            }
            Node::FakeSwitch(fake) => {
                self.dump_line("dispatch ", &fake.value, "");
                self.indent += 1;
                for (value, target) in &fake.cases {
                    let tail = format!(" -> {}", self.label(*target));
                    self.dump_line("case ", value, &tail);
                }
                let text = format!("default -> {}", self.label(fake.default));
                self.line(&text);
                self.indent -= 1;
            }
            Node::Return(expr) => self.dump_line("return ", expr, ""),
            Node::Exit => self.line("exit"),
            Node::Break => self.line("break"),
            Node::Continue => self.line("continue"),
            Node::BasicBlock(bb) => self.dump_basic_block(bb),
            Node::Block(block) => self.dump_block("block", block),
            Node::Condition {
                cond,
                then_block,
                else_block,
            } => {
                self.dump_line("condition ", cond, "");
                self.indent += 1;
                self.dump_block("then", then_block);
                self.dump_block("else", else_block);
                self.indent -= 1;
            }
            Node::While { cond, body } => {
                let head = match cond {
                    Some(cond) => format!("while {}", self.expr_string(cond)),
                    None => "while true".to_string(),
                };
                self.dump_block(&head, body);
            }
            Node::Switch(sw) => {
                self.dump_line("switch ", &sw.value, "");
                self.indent += 1;
                for case in &sw.cases {
                    let mut head = String::from("case");
                    for (i, value) in case.values.iter().enumerate() {
                        let value = self.expr_string(value);
                        let _ = write!(head, "{} {}", if i > 0 { "," } else { "" }, value);
                    }
                    if case.is_default {
                        head.push_str(" default");
                    }
                    self.dump_block(&head, &case.body);
                }
                self.indent -= 1;
            }
            Node::With { env, body, end } => {
                let mut head = format!("with {}", self.expr_string(env));
                if let Some(end) = end {
                    let _ = write!(head, " (end {})", self.label(*end));
                }
                self.dump_block(&head, body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_ast::expr::Var;
    use quill_ast::node::RawOp;
    use quill_ast::Constant;

    #[test]
    fn test_dump_shows_raw_and_blocks() {
        let mut labels = LabelArena::new();
        let entry = labels.named("L0".to_string());
        let bb = BasicBlock {
            entry_depth: 1,
            body: vec![
                Node::Label(entry),
                Node::raw(4, RawOp::Push(Constant::Int(3))),
                Node::Assign {
                    target: Var::named("self", "x"),
                    value: Expr::Incoming(0),
                },
                Node::Goto(entry),
            ],
        };
        assert_eq!(
            dump_blocks(&[bb], &labels),
            "basic block (depth 1)\n    label L0\n    raw     4  push 3\n    \
             assign x = stack_0\n    goto L0\n"
        );
    }

    #[test]
    fn test_dump_structured_tree() {
        let labels = LabelArena::new();
        let block = Block::new(
            None,
            vec![Node::While {
                cond: None,
                body: Block::new(
                    None,
                    vec![Node::Condition {
                        cond: Expr::Var(Var::named("self", "done")),
                        then_block: Block::new(None, vec![Node::Break]),
                        else_block: Block::default(),
                    }],
                ),
            }],
        );
        assert_eq!(
            dump(&block, &labels),
            "block\n    while true\n        condition done\n            then\n                \
             break\n            else\n"
        );
    }
}

//! Peephole rules. Each matches a fixed tail shape at the end of one or two
//! basic blocks and returns the rewrite; only the driver mutates.

mod counted_loop;
mod dead_blocks;
mod join;
mod logic_not;
mod popz;
mod short_circuit;
mod switch;
mod ternary;
mod with_scope;

pub use counted_loop::counted_loop;
pub use dead_blocks::dead_blocks;
pub use join::join;
pub use logic_not::logic_not;
pub use popz::popz;
pub use short_circuit::short_circuit;
pub use switch::switch_dispatch;
pub use ternary::ternary;
pub use with_scope::with_scope;

use quill_ast::expr::Expr;
use quill_ast::node::{BasicBlock, Node, RawOp};
use quill_ast::LabelId;

use crate::rewrite::Rule;

/// Rules over raw blocks, for the idioms that carry values on the operand
/// stack from one block to the next.
pub const RAW_RULES: &[(&str, Rule)] = &[
    ("counted_loop", counted_loop),
    ("switch_dispatch", switch_dispatch),
    ("dead_blocks", dead_blocks),
];

/// Rules over simulated blocks.
pub const EXPR_RULES: &[(&str, Rule)] = &[
    ("with_scope", with_scope),
    ("short_circuit", short_circuit),
    ("ternary", ternary),
    ("join", join),
    ("logic_not", logic_not),
    ("popz", popz),
    ("dead_blocks", dead_blocks),
];

/// Offset of a raw node, 0 for anything else.
fn offset_of(node: &Node) -> u32 {
    match node {
        Node::Raw(raw) => raw.offset,
        _ => 0,
    }
}

/// Whether the first node after the label is a raw `popz`.
fn starts_with_popz(block: &BasicBlock) -> bool {
    block.body.get(1).and_then(Node::as_raw) == Some(&RawOp::Popz)
}

/// `[Label, CondGoto, Goto]` and nothing else.
fn single_branch(block: &BasicBlock) -> Option<(&Expr, LabelId, LabelId)> {
    match block.body.as_slice() {
        [Node::Label(_), Node::CondGoto { cond, target }, Node::Goto(other)] => {
            Some((cond, *target, *other))
        }
        _ => None,
    }
}

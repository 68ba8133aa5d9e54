//! Structural recovery: loops, `with` scopes, conditions and switches over
//! the optimized block list, then flattening and goto elimination.

pub mod cfg;
pub mod conditions;
pub mod dominance;
pub mod flatten;
pub mod gotos;
pub mod loops;
mod structurer;

use quill_ast::node::{BasicBlock, Block, Node};

pub use conditions::find_conditions;
pub use flatten::flatten;
pub use gotos::simplify;
pub use loops::find_loops;

/// The top-level list of a unit, entered at its first block.
pub fn into_block(blocks: Vec<BasicBlock>) -> Block {
    let entry = blocks.first().and_then(BasicBlock::entry_label);
    Block::new(entry, blocks.into_iter().map(Node::BasicBlock).collect())
}

//! Printers for the structured tree: C-like source, Lua source and the
//! indented dump used for stage snapshots.

mod c_like;
mod dump;
mod exprs;
mod lua;
mod precedence;

use quill_ast::label::LabelArena;
use quill_ast::node::Block;
use quill_ast::options::Dialect;

pub use dump::{dump, dump_blocks, dump_nodes};

/// Render a finished tree as source text in `dialect`.
pub fn render(block: &Block, labels: &LabelArena, dialect: Dialect) -> String {
    let mut emitter = Emitter::new(labels, dialect);
    match dialect {
        Dialect::C => emitter.emit_c_block(block),
        Dialect::Lua => emitter.emit_lua_body(&block.body),
    }
    emitter.output
}

/// Shared printer state; the statement forms live in `c_like` and `lua`.
pub(crate) struct Emitter<'a> {
    pub(crate) labels: &'a LabelArena,
    pub(crate) dialect: Dialect,
    pub(crate) output: String,
    pub(crate) indent: usize,
    /// Continue label of each enclosing Lua loop, and whether it was used.
    pub(crate) loops: Vec<(String, bool)>,
    pub(crate) next_loop: usize,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(labels: &'a LabelArena, dialect: Dialect) -> Self {
        Self {
            labels,
            dialect,
            output: String::new(),
            indent: 0,
            loops: Vec::new(),
            next_loop: 0,
        }
    }

    pub(crate) fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
    }

    /// One indented line.
    pub(crate) fn line(&mut self, text: &str) {
        self.write_indent();
        self.output.push_str(text);
        self.output.push('\n');
    }

    pub(crate) fn label(&self, id: quill_ast::LabelId) -> &'a str {
        self.labels.name(id)
    }
}

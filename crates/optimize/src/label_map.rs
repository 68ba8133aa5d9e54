use rustc_hash::FxHashMap;

use quill_ast::node::{BasicBlock, Node};
use quill_ast::LabelId;

/// Reference counts of labels plus the block each entry label starts.
///
/// A side table over the block list; rebuilt whenever the list changes.
#[derive(Debug, Default)]
pub struct LabelMap {
    refs: FxHashMap<LabelId, usize>,
    blocks: FxHashMap<LabelId, usize>,
}

impl LabelMap {
    pub fn build(blocks: &[BasicBlock]) -> Self {
        let mut map = Self::default();
        for (i, block) in blocks.iter().enumerate() {
            if let Some(label) = block.entry_label() {
                map.blocks.insert(label, i);
            }
            for node in &block.body {
                node.visit_targets(&mut |target| *map.refs.entry(target).or_insert(0) += 1);
            }
        }
        map
    }

    /// Count references in an arbitrary node list.
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut map = Self::default();
        for node in nodes {
            node.visit_targets(&mut |target| *map.refs.entry(target).or_insert(0) += 1);
        }
        map
    }

    pub fn refcount(&self, label: LabelId) -> usize {
        self.refs.get(&label).copied().unwrap_or(0)
    }

    /// Index of the block whose entry label is `label`.
    pub fn block(&self, label: LabelId) -> Option<usize> {
        self.blocks.get(&label).copied()
    }
}

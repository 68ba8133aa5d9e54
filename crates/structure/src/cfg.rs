//! Control-flow graph over the items of one statement list.
//!
//! Every item (a basic block, or a block that already holds recovered
//! structure) is one node. A synthetic entry points at the item the list's
//! entry label names, and items ending in `return`/`exit` get an edge to a
//! synthetic exit.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use rustc_hash::FxHashMap;

use quill_ast::node::Node;
use quill_ast::LabelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgNode {
    Entry,
    Exit,
    /// Position of the item in the list the graph was built from.
    Item(usize),
}

pub type CfgGraph = StableDiGraph<CfgNode, ()>;

pub struct Cfg {
    pub graph: CfgGraph,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
    items: Vec<NodeIndex>,
    /// Every label defined anywhere inside an item maps to that item.
    owners: FxHashMap<LabelId, usize>,
}

impl Cfg {
    pub fn build(items: &[Node], entry: Option<LabelId>) -> Self {
        let mut graph = CfgGraph::default();
        let entry_node = graph.add_node(CfgNode::Entry);
        let exit_node = graph.add_node(CfgNode::Exit);
        let nodes: Vec<NodeIndex> = (0..items.len())
            .map(|i| graph.add_node(CfgNode::Item(i)))
            .collect();

        let mut owners = FxHashMap::default();
        for (i, item) in items.iter().enumerate() {
            item.visit_labels(&mut |label| {
                owners.insert(label, i);
            });
        }

        let first = entry
            .and_then(|label| owners.get(&label).copied())
            .or(if items.is_empty() { None } else { Some(0) });
        if let Some(first) = first {
            graph.add_edge(entry_node, nodes[first], ());
        }

        for (i, item) in items.iter().enumerate() {
            let own_label = first_label(item);
            item.visit_targets(&mut |target| {
                let Some(&j) = owners.get(&target) else {
                    return;
                };
                // a jump inside the item is only a back edge when it goes to
                // the item's own entry
                if j != i || own_label == Some(target) {
                    graph.update_edge(nodes[i], nodes[j], ());
                }
            });
            if ends_function(item) {
                graph.update_edge(nodes[i], exit_node, ());
            }
        }

        Self {
            graph,
            entry: entry_node,
            exit: exit_node,
            items: nodes,
            owners,
        }
    }

    pub fn node(&self, item: usize) -> NodeIndex {
        self.items[item]
    }

    pub fn item(&self, node: NodeIndex) -> Option<usize> {
        match self.graph.node_weight(node) {
            Some(CfgNode::Item(i)) => Some(*i),
            _ => None,
        }
    }

    /// The item holding `label`, if it belongs to this list.
    pub fn item_of(&self, label: LabelId) -> Option<usize> {
        self.owners.get(&label).copied()
    }

    pub fn node_of(&self, label: LabelId) -> Option<NodeIndex> {
        self.item_of(label).map(|i| self.items[i])
    }

    /// The node control enters the list at.
    pub fn first(&self) -> NodeIndex {
        self.graph
            .neighbors_directed(self.entry, Direction::Outgoing)
            .next()
            .unwrap_or(self.exit)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn first_label(item: &Node) -> Option<LabelId> {
    match item {
        Node::BasicBlock(bb) => bb.entry_label(),
        Node::Label(label) => Some(*label),
        _ => None,
    }
}

fn ends_function(item: &Node) -> bool {
    match item {
        Node::BasicBlock(bb) => matches!(bb.body.last(), Some(Node::Return(_) | Node::Exit)),
        Node::Return(_) | Node::Exit => true,
        _ => false,
    }
}

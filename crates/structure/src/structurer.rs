//! State shared by loop and condition recovery over one statement list.

use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;
use rustc_hash::FxHashSet;

use quill_ast::diag::Diagnostics;
use quill_ast::error::{remove_or_err, DecompileError};
use quill_ast::label::LabelArena;
use quill_ast::node::{Block, Node};

use crate::cfg::Cfg;
use crate::dominance::Dominators;

/// Positions of the items a recovery step may still claim.
pub type Scope = FxHashSet<usize>;

pub struct Structurer<'a> {
    pub(crate) cfg: Cfg,
    pub(crate) dom: Dominators,
    /// Items of the list; a slot is emptied when its item is placed.
    slots: Vec<Option<Node>>,
    pub(crate) labels: &'a mut LabelArena,
    pub(crate) diags: &'a mut Diagnostics,
}

impl<'a> Structurer<'a> {
    /// Take ownership of the list's items and build its graph.
    pub fn new(block: &mut Block, labels: &'a mut LabelArena, diags: &'a mut Diagnostics) -> Self {
        let cfg = Cfg::build(&block.body, block.entry);
        let dom = Dominators::compute(&cfg.graph, cfg.entry);
        let slots = std::mem::take(&mut block.body).into_iter().map(Some).collect();
        Self {
            cfg,
            dom,
            slots,
            labels,
            diags,
        }
    }

    pub fn full_scope(&self) -> Scope {
        (0..self.slots.len()).collect()
    }

    pub(crate) fn slot(&self, item: usize) -> Option<&Node> {
        self.slots.get(item).and_then(Option::as_ref)
    }

    pub(crate) fn slot_mut(&mut self, item: usize) -> Option<&mut Node> {
        self.slots.get_mut(item).and_then(Option::as_mut)
    }

    /// Move an item out of the list. Each item is placed exactly once.
    pub(crate) fn take(&mut self, item: usize) -> Result<Node, DecompileError> {
        self.slots
            .get_mut(item)
            .and_then(Option::take)
            .ok_or_else(|| DecompileError::Invariant(format!("item {} was placed twice", item)))
    }

    pub(crate) fn node(&self, item: usize) -> NodeIndex {
        self.cfg.node(item)
    }

    /// Remove `items` from `scope`; every one of them must be present.
    pub(crate) fn claim(scope: &mut Scope, items: &Scope) -> Result<(), DecompileError> {
        for item in items {
            remove_or_err(scope, item)?;
        }
        Ok(())
    }

    /// Items in `scope` reachable from `head` without leaving the region
    /// `head` dominates.
    pub(crate) fn dominated(&self, scope: &Scope, head: NodeIndex) -> Scope {
        let mut result = Scope::default();
        let mut agenda = vec![head];
        while let Some(node) = agenda.pop() {
            let Some(item) = self.cfg.item(node) else {
                continue;
            };
            if scope.contains(&item) && self.dom.dominates(head, node) && result.insert(item) {
                agenda.extend(self.cfg.graph.neighbors_directed(node, Direction::Outgoing));
            }
        }
        result
    }

    /// The natural loop of `head`: everything in scope that reaches one of
    /// its back edges while staying dominated by it.
    pub(crate) fn loop_content(&self, scope: &Scope, head: NodeIndex) -> Scope {
        let mut result = Scope::default();
        let mut agenda: Vec<NodeIndex> = self
            .cfg
            .graph
            .neighbors_directed(head, Direction::Incoming)
            .filter(|&p| self.dom.dominates(head, p))
            .collect();
        while let Some(node) = agenda.pop() {
            let Some(item) = self.cfg.item(node) else {
                continue;
            };
            if scope.contains(&item) && self.dom.dominates(head, node) && result.insert(item) {
                agenda.extend(self.cfg.graph.neighbors_directed(node, Direction::Incoming));
            }
        }
        if let Some(item) = self.cfg.item(head) {
            if scope.contains(&item) {
                result.insert(item);
            }
        }
        result
    }

    /// Number of edges into `node` from places it does not dominate.
    pub(crate) fn entering_edges(&self, node: NodeIndex) -> usize {
        self.cfg
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .filter(|&p| !self.dom.dominates(node, p))
            .count()
    }

    /// Move whatever is left in `scope` out, in list order.
    pub(crate) fn drain(&mut self, scope: Scope) -> Result<Vec<(usize, Node)>, DecompileError> {
        let mut rest: Vec<usize> = scope.into_iter().collect();
        rest.sort_unstable();
        rest.into_iter()
            .map(|item| Ok((item, self.take(item)?)))
            .collect()
    }
}

//! If/else and switch recovery.
//!
//! A depth-first walk of the dominator tree turns every two-way branch into
//! a [`Node::Condition`] and every switch marker into a [`Switch`]. An arm
//! takes the blocks its target dominates only when that target is entered
//! from exactly one place; anything shared stays behind as a jump.

use petgraph::stable_graph::NodeIndex;
use rustc_hash::FxHashSet;

use quill_ast::diag::Diagnostics;
use quill_ast::error::{remove_or_err, DecompileError};
use quill_ast::label::LabelArena;
use quill_ast::node::{BasicBlock, Block, Node, Switch, SwitchCase};
use quill_ast::LabelId;

use crate::structurer::{Scope, Structurer};

/// Recover conditions in `block` and in every loop or `with` body below it.
pub fn find_conditions(
    block: &mut Block,
    labels: &mut LabelArena,
    diags: &mut Diagnostics,
) -> Result<(), DecompileError> {
    for item in &mut block.body {
        let Node::BasicBlock(bb) = item else {
            continue;
        };
        for node in &mut bb.body {
            if let Node::While { body, .. } | Node::With { body, .. } = node {
                find_conditions(body, labels, diags)?;
            }
        }
    }

    // straight-line bodies have nothing to recover
    if block.body.is_empty() || !block.body.iter().all(|n| matches!(n, Node::BasicBlock(_))) {
        return Ok(());
    }
    let mut st = Structurer::new(block, labels, diags);
    let scope = st.full_scope();
    let first = st.cfg.first();
    block.body = st.find_conditions(scope, first)?;
    Ok(())
}

impl Structurer<'_> {
    pub(crate) fn find_conditions(
        &mut self,
        mut scope: Scope,
        entry: NodeIndex,
    ) -> Result<Vec<Node>, DecompileError> {
        let mut result = Vec::new();
        let mut agenda = vec![entry];
        while let Some(node) = agenda.pop() {
            if let Some(item) = self.cfg.item(node) {
                if scope.contains(&item) {
                    let recovered = match self.recover_switch(&mut scope, item)? {
                        Some(node) => Some(node),
                        None => self.recover_condition(&mut scope, item)?,
                    };
                    match recovered {
                        Some(node) => result.push(node),
                        None => {
                            remove_or_err(&mut scope, &item)?;
                            result.push(self.take(item)?);
                        }
                    }
                }
            }
            agenda.extend(self.dom.children(node).iter().rev().copied());
        }

        result.extend(self.drain(scope)?.into_iter().map(|(_, node)| node));
        Ok(result)
    }

    fn take_block(&mut self, item: usize) -> Result<BasicBlock, DecompileError> {
        match self.take(item)? {
            Node::BasicBlock(bb) => Ok(bb),
            _ => Err(DecompileError::Invariant(format!(
                "item {} is not a basic block",
                item
            ))),
        }
    }

    fn recover_condition(
        &mut self,
        scope: &mut Scope,
        item: usize,
    ) -> Result<Option<Node>, DecompileError> {
        let (cond, target, other) = match self.slot(item) {
            Some(Node::BasicBlock(bb)) => match bb.tail(2) {
                Some([Node::CondGoto { cond, target }, Node::Goto(other)]) => {
                    (cond.clone(), *target, *other)
                }
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };

        remove_or_err(scope, &item)?;
        let mut bb = self.take_block(item)?;
        let keep = bb.body.len() - 2;
        bb.body.truncate(keep);

        let then_block = self.arm(scope, target)?;
        let else_block = self.arm(scope, other)?;
        bb.body.push(Node::Condition {
            cond,
            then_block,
            else_block,
        });
        Ok(Some(Node::BasicBlock(bb)))
    }

    /// The code under one side of a branch. Left empty (just the entry jump)
    /// when its target is reachable from elsewhere too.
    fn arm(&mut self, scope: &mut Scope, label: LabelId) -> Result<Block, DecompileError> {
        let mut block = Block::new(Some(label), Vec::new());
        if let Some(node) = self.cfg.node_of(label) {
            if self.entering_edges(node) == 1 {
                let content = self.dominated(scope, node);
                Structurer::claim(scope, &content)?;
                block.body = self.find_conditions(content, node)?;
            }
        }
        Ok(block)
    }

    fn switch_break(&mut self) -> Node {
        let label = self.labels.fresh("SwitchBreak");
        Node::BasicBlock(BasicBlock {
            entry_depth: 0,
            body: vec![Node::Label(label), Node::Break],
        })
    }

    fn recover_switch(
        &mut self,
        scope: &mut Scope,
        item: usize,
    ) -> Result<Option<Node>, DecompileError> {
        let (fake, fall) = match self.slot(item) {
            Some(Node::BasicBlock(bb)) => match bb.tail(2) {
                Some([Node::FakeSwitch(fake), Node::Goto(fall)]) => (fake.clone(), *fall),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };

        remove_or_err(scope, &item)?;
        let mut bb = self.take_block(item)?;
        let keep = bb.body.len() - 2;
        bb.body.truncate(keep);

        // a target in another target's frontier is a join point of several
        // cases and cannot be owned by either
        let mut frontiers: FxHashSet<NodeIndex> = FxHashSet::default();
        let targets = fake.cases.iter().map(|(_, label)| *label).chain([fall]);
        for label in targets {
            if let Some(node) = self.cfg.node_of(label) {
                frontiers.extend(self.dom.frontier(node).filter(|&f| f != node));
            }
        }

        let mut cases: Vec<SwitchCase> = Vec::new();
        let mut entries: Vec<LabelId> = Vec::new();
        for (value, label) in fake.cases {
            if let Some(pos) = entries.iter().position(|&l| l == label) {
                cases[pos].values.push(value);
                continue;
            }
            let mut body = Block::new(Some(label), Vec::new());
            if let Some(node) = self.cfg.node_of(label) {
                if !frontiers.contains(&node) {
                    let content = self.dominated(scope, node);
                    Structurer::claim(scope, &content)?;
                    body.body = self.find_conditions(content, node)?;
                    body.body.push(self.switch_break());
                }
            }
            entries.push(label);
            cases.push(SwitchCase {
                values: vec![value],
                is_default: false,
                body,
            });
        }
        sort_cases(&mut cases);
        tracing::debug!(item, cases = cases.len(), "switch recovered");

        let mut has_default = false;
        if let Some(node) = self.cfg.node_of(fall) {
            if !frontiers.contains(&node) {
                let content = self.dominated(scope, node);
                if !content.is_empty() {
                    Structurer::claim(scope, &content)?;
                    let mut body = Block::new(Some(fall), self.find_conditions(content, node)?);
                    body.body.push(self.switch_break());
                    cases.push(SwitchCase {
                        values: Vec::new(),
                        is_default: true,
                        body,
                    });
                    has_default = true;
                }
            }
        }

        bb.body.push(Node::Switch(Switch {
            value: fake.value,
            cases,
        }));
        if !has_default {
            bb.body.push(Node::Goto(fall));
        }
        Ok(Some(Node::BasicBlock(bb)))
    }
}

/// Order cases by value when every value is a literal.
fn sort_cases(cases: &mut [SwitchCase]) {
    let all_constant = cases
        .iter()
        .flat_map(|c| c.values.iter())
        .all(|v| v.as_constant().is_some());
    if !all_constant {
        return;
    }
    for case in cases.iter_mut() {
        case.values.sort_by(|a, b| match (a.as_constant(), b.as_constant()) {
            (Some(a), Some(b)) => a.sort_cmp(b),
            _ => std::cmp::Ordering::Equal,
        });
    }
    cases.sort_by(|a, b| match (a.values.first(), b.values.first()) {
        (Some(a), Some(b)) => match (a.as_constant(), b.as_constant()) {
            (Some(a), Some(b)) => a.sort_cmp(b),
            _ => std::cmp::Ordering::Equal,
        },
        _ => std::cmp::Ordering::Equal,
    });
}

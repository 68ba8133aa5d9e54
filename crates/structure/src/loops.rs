//! Loop and `with` recovery.
//!
//! Walks the dominator tree breadth first so the widest loop is found
//! first. A header whose block is just a two-way test with one side inside
//! the loop becomes `while (cond)`; any other header becomes an endless
//! loop whose exits stay as jumps for goto elimination to turn into
//! `break`.

use std::collections::VecDeque;

use petgraph::stable_graph::NodeIndex;

use quill_ast::diag::Diagnostics;
use quill_ast::error::{remove_or_err, DecompileError};
use quill_ast::expr::Expr;
use quill_ast::label::LabelArena;
use quill_ast::node::{BasicBlock, Block, Node};
use quill_ast::LabelId;

use crate::structurer::{Scope, Structurer};

/// Recover loops and `with` scopes in a flat list of basic blocks.
pub fn find_loops(
    block: &mut Block,
    labels: &mut LabelArena,
    diags: &mut Diagnostics,
) -> Result<(), DecompileError> {
    let mut st = Structurer::new(block, labels, diags);
    let scope = st.full_scope();
    let first = st.cfg.first();
    block.body = st.find_loops(scope, first, false)?;
    Ok(())
}

impl Structurer<'_> {
    pub(crate) fn find_loops(
        &mut self,
        mut scope: Scope,
        entry: NodeIndex,
        exclude_entry: bool,
    ) -> Result<Vec<Node>, DecompileError> {
        let mut placed: Vec<(usize, Node)> = Vec::new();
        let mut agenda = VecDeque::from([entry]);
        while let Some(node) = agenda.pop_front() {
            if let Some(item) = self.cfg.item(node) {
                if scope.contains(&item) {
                    self.recover_with(&mut scope, item)?;
                    if self.dom.in_frontier(node, node) && (node != entry || !exclude_entry) {
                        self.recover_loop(&mut scope, item, &mut placed)?;
                    }
                }
            }
            agenda.extend(self.dom.children(node).iter().copied());
        }

        placed.extend(self.drain(scope)?);
        placed.sort_by_key(|(item, _)| *item);
        Ok(placed.into_iter().map(|(_, node)| node).collect())
    }

    /// `[L, cond goto T, goto F]` and nothing else.
    fn header_branch(&self, item: usize) -> Option<(Expr, LabelId, LabelId)> {
        match self.slot(item) {
            Some(Node::BasicBlock(bb)) => match bb.body.as_slice() {
                [Node::Label(_), Node::CondGoto { cond, target }, Node::Goto(other)] => {
                    Some((cond.clone(), *target, *other))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn recover_loop(
        &mut self,
        scope: &mut Scope,
        item: usize,
        placed: &mut Vec<(usize, Node)>,
    ) -> Result<(), DecompileError> {
        let head = self.node(item);
        let mut contents = self.loop_content(scope, head);

        if let Some((cond, target, other)) = self.header_branch(item) {
            let inside = |label: LabelId| {
                self.cfg
                    .item_of(label)
                    .is_some_and(|i| contents.contains(&i))
            };
            let (target_in, other_in) = (inside(target), inside(other));
            if target_in != other_in {
                remove_or_err(&mut contents, &item)?;
                remove_or_err(scope, &item)?;

                let (cond, enter, exit) = if other_in {
                    (cond.negate(), other, target)
                } else {
                    (cond, target, other)
                };

                // pull in what the header dominates but the exit does not
                if let Some(post) = self.cfg.node_of(exit) {
                    let after = self.dominated(scope, post);
                    let pulled: Vec<usize> = scope
                        .iter()
                        .copied()
                        .filter(|&i| !after.contains(&i) && self.dom.dominates(head, self.node(i)))
                        .collect();
                    contents.extend(pulled);
                }
                Structurer::claim(scope, &contents)?;
                let body = self.find_loops(contents, head, false)?;

                let Node::BasicBlock(mut header) = self.take(item)? else {
                    return Err(DecompileError::Invariant(
                        "loop header is not a basic block".to_string(),
                    ));
                };
                header.body.truncate(1);
                tracing::debug!(item, exit = self.labels.name(exit), "while loop recovered");
                header.body.push(Node::While {
                    cond: Some(cond),
                    body: Block::new(Some(enter), body),
                });
                header.body.push(Node::Goto(exit));
                placed.push((item, Node::BasicBlock(header)));
                return Ok(());
            }
        }

        let head_label = match self.slot(item) {
            Some(Node::BasicBlock(bb)) => bb.entry_label(),
            _ => None,
        };
        let Some(head_label) = head_label else {
            return Err(DecompileError::Invariant(
                "basic block has to start with a label".to_string(),
            ));
        };
        Structurer::claim(scope, &contents)?;
        let body = self.find_loops(contents, head, true)?;
        let label = self.labels.fresh("Loop");
        tracing::debug!(item, label = self.labels.name(label), "endless loop recovered");
        placed.push((
            item,
            Node::BasicBlock(BasicBlock {
                entry_depth: 0,
                body: vec![
                    Node::Label(label),
                    Node::While {
                        cond: None,
                        body: Block::new(Some(head_label), body),
                    },
                ],
            }),
        ));
        Ok(())
    }

    /// `[.., pushenv(env, skip), goto body]` with the skip block
    /// `[skip, popenv(body), goto after]` becomes a `with` over everything
    /// the body entry dominates.
    fn recover_with(&mut self, scope: &mut Scope, item: usize) -> Result<(), DecompileError> {
        let (env, skip, entry) = match self.slot(item) {
            Some(Node::BasicBlock(bb)) => match bb.tail(2) {
                Some([Node::PushEnv { env, skip }, Node::Goto(entry)]) => (env.clone(), *skip, *entry),
                _ => return Ok(()),
            },
            _ => return Ok(()),
        };

        let Some((pop, body, after)) = self.with_parts(scope, item, skip, entry) else {
            let marker = Node::PushEnv { env, skip };
            self.diags
                .error("unexpected skip block for with statement", Some(&marker));
            return Ok(());
        };

        let body_node = self.node(body);
        let mut contents = self.dominated(scope, body_node);
        contents.remove(&pop);
        Structurer::claim(scope, &contents)?;
        remove_or_err(scope, &pop)?;
        self.take(pop)?;
        let inner = self.find_loops(contents, body_node, false)?;

        tracing::debug!(item, after = self.labels.name(after), "with recovered");
        if let Some(Node::BasicBlock(head)) = self.slot_mut(item) {
            let keep = head.body.len() - 2;
            head.body.truncate(keep);
            head.body.push(Node::With {
                env,
                body: Block::new(Some(entry), inner),
                end: Some(skip),
            });
            head.body.push(Node::Goto(after));
        }
        Ok(())
    }

    fn with_parts(
        &self,
        scope: &Scope,
        item: usize,
        skip: LabelId,
        entry: LabelId,
    ) -> Option<(usize, usize, LabelId)> {
        let pop = self.cfg.item_of(skip)?;
        let body = self.cfg.item_of(entry)?;
        if pop == item || body == item || pop == body {
            return None;
        }
        if !scope.contains(&pop) || !scope.contains(&body) {
            return None;
        }
        match self.slot(pop)? {
            Node::BasicBlock(bb) => match bb.body.as_slice() {
                [Node::Label(_), Node::PopEnv { back }, Node::Goto(after)] if *back == entry => {
                    Some((pop, body, *after))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

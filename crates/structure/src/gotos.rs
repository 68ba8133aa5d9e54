//! Goto elimination over the flattened tree.
//!
//! A `goto` is dropped when control would reach its target anyway, and
//! becomes `break`/`continue` when its target is where the innermost loop
//! or switch exits or restarts. Between rounds, dead labels, unreachable
//! statements and empty branches are cleaned up.

use rustc_hash::FxHashSet;

use quill_ast::node::{Block, Node};
use quill_ast::LabelId;
use quill_optimize::LabelMap;

type Labels = FxHashSet<LabelId>;

/// Where control goes when it runs off the end of a list, and what
/// `break`/`continue` would reach from inside it.
#[derive(Debug, Clone, Default)]
struct Flow {
    after: Labels,
    break_to: Option<Labels>,
    continue_to: Option<Labels>,
}

/// Run the cleanup rounds to a stable result.
pub fn simplify(block: &mut Block) {
    remove_redundant_code(block);
    let first = remove_gotos(block);
    remove_redundant_code(block);
    let second = remove_gotos(block);
    remove_redundant_code(block);
    tracing::trace!(first, second, "gotos removed");
}

pub fn remove_gotos(block: &mut Block) -> bool {
    eliminate(&mut block.body, &Flow::default())
}

/// Labels reached from position `from` of `list` without running any code.
fn fallthrough(list: &[Node], from: usize, flow: &Flow) -> Labels {
    let mut set = Labels::default();
    for node in list.iter().skip(from) {
        match node {
            Node::Label(label) => {
                set.insert(*label);
            }
            Node::Goto(target) => {
                set.insert(*target);
                return set;
            }
            _ => return set,
        }
    }
    set.extend(flow.after.iter().copied());
    set
}

fn eliminate(list: &mut Vec<Node>, flow: &Flow) -> bool {
    let mut changed = false;

    for i in 0..list.len() {
        let follow = fallthrough(list, i + 1, flow);
        let preceding: Labels = list[..i]
            .iter()
            .rev()
            .map_while(|n| match n {
                Node::Label(label) => Some(*label),
                _ => None,
            })
            .collect();

        match &mut list[i] {
            Node::Condition {
                then_block,
                else_block,
                ..
            } => {
                let inner = Flow {
                    after: follow,
                    ..flow.clone()
                };
                changed |= eliminate(&mut then_block.body, &inner);
                changed |= eliminate(&mut else_block.body, &inner);
            }
            Node::Block(block) => {
                let inner = Flow {
                    after: follow,
                    ..flow.clone()
                };
                changed |= eliminate(&mut block.body, &inner);
            }
            Node::While { cond, body } => {
                // an endless loop restarts at the top of its body
                let mut restart = preceding;
                if cond.is_none() {
                    restart.extend(fallthrough(&body.body, 0, &Flow::default()));
                }
                let inner = Flow {
                    after: restart.clone(),
                    break_to: Some(follow),
                    continue_to: Some(restart),
                };
                changed |= eliminate(&mut body.body, &inner);
            }
            Node::With { body, end, .. } => {
                let next: Labels = end.iter().copied().collect();
                let inner = Flow {
                    after: next.clone(),
                    break_to: Some(follow),
                    continue_to: Some(next),
                };
                changed |= eliminate(&mut body.body, &inner);
            }
            Node::Switch(sw) => {
                let inner = Flow {
                    after: Labels::default(),
                    break_to: Some(follow),
                    continue_to: flow.continue_to.clone(),
                };
                for case in &mut sw.cases {
                    changed |= eliminate(&mut case.body.body, &inner);
                }
            }
            _ => {}
        }
    }

    let mut i = 0;
    while i < list.len() {
        if let Node::Goto(target) = list[i] {
            if fallthrough(list, i + 1, flow).contains(&target) {
                list.remove(i);
                changed = true;
                continue;
            }
            if flow.break_to.as_ref().is_some_and(|s| s.contains(&target)) {
                list[i] = Node::Break;
                changed = true;
            } else if flow.continue_to.as_ref().is_some_and(|s| s.contains(&target)) {
                list[i] = Node::Continue;
                changed = true;
            }
        }
        i += 1;
    }
    changed
}

/// Drop dead labels, unreachable statements, redundant `continue`s and
/// empty branches, plus the implicit `exit` at the very end.
pub fn remove_redundant_code(block: &mut Block) -> bool {
    let refs = LabelMap::from_nodes(&block.body);
    let mut changed = prune(&mut block.body, &refs);
    if matches!(block.body.last(), Some(Node::Exit)) {
        block.body.pop();
        changed = true;
    }
    changed
}

fn prune(list: &mut Vec<Node>, refs: &LabelMap) -> bool {
    let before = list.len();
    list.retain(|n| !matches!(n, Node::Label(label) if refs.refcount(*label) == 0));

    let mut dead = false;
    list.retain(|n| {
        if let Node::Label(_) = n {
            dead = false;
        }
        let keep = !dead;
        if n.is_unconditional() {
            dead = true;
        }
        keep
    });
    let mut changed = list.len() != before;

    for node in list.iter_mut() {
        match node {
            Node::Condition {
                cond,
                then_block,
                else_block,
            } => {
                changed |= prune(&mut then_block.body, refs);
                changed |= prune(&mut else_block.body, refs);
                if then_block.body.is_empty() && !else_block.body.is_empty() {
                    std::mem::swap(then_block, else_block);
                    let negated = std::mem::replace(cond, quill_ast::expr::Expr::int(0)).negate();
                    *cond = negated;
                    cond.simplify_not();
                    changed = true;
                }
            }
            Node::While { body, .. } => {
                changed |= prune(&mut body.body, refs);
                changed |= drop_trailing_continue(&mut body.body);
            }
            Node::With { body, end, .. } => {
                changed |= prune(&mut body.body, refs);
                if end.is_some() {
                    changed |= drop_trailing_continue(&mut body.body);
                }
            }
            Node::Switch(sw) => {
                for case in &mut sw.cases {
                    changed |= prune(&mut case.body.body, refs);
                }
            }
            Node::Block(block) => changed |= prune(&mut block.body, refs),
            _ => {}
        }
    }
    changed
}

fn drop_trailing_continue(body: &mut Vec<Node>) -> bool {
    let mut changed = false;
    while matches!(body.last(), Some(Node::Continue)) {
        body.pop();
        changed = true;
    }
    changed
}

use rustc_hash::FxHashSet;

use quill_ast::diag::Diagnostics;
use quill_ast::label::LabelArena;
use quill_ast::node::{Node, RawOp};
use quill_ast::types::BinOp;
use quill_ast::{Constant, LabelId};

use super::{offset_of, starts_with_popz};
use crate::rewrite::{Rewrite, RuleCtx};

/// One `dup 0; push c; seq; bt case; b next` test of a dispatch chain.
fn case_test(tail: &[Node]) -> Option<((Constant, LabelId), LabelId)> {
    let [dup, push, cmp, bt, goto] = tail else {
        return None;
    };
    if dup.as_raw() != Some(&RawOp::Dup(0)) || cmp.as_raw() != Some(&RawOp::Binary(BinOp::Eq)) {
        return None;
    }
    let Some(RawOp::Push(value)) = push.as_raw() else {
        return None;
    };
    let Some(&RawOp::Bt(case)) = bt.as_raw() else {
        return None;
    };
    let &Node::Goto(next) = goto else {
        return None;
    };
    Some(((value.clone(), case), next))
}

/// Whether the head is a later link of a chain that starts further up.
fn is_continuation(ctx: &RuleCtx<'_>) -> bool {
    let head = ctx.head();
    let Some(label) = head.entry_label() else {
        return false;
    };
    head.body.len() == 6
        && ctx.refcount(label) == 1
        && ctx.blocks.iter().any(|b| {
            b.tail(5)
                .and_then(case_test)
                .map_or(false, |(_, next)| next == label)
        })
}

/// Depth-first search for the first block that starts with `popz`.
fn find_popz(ctx: &RuleCtx<'_>, start: LabelId) -> Option<LabelId> {
    let mut seen = FxHashSet::default();
    let mut stack = vec![start];
    while let Some(label) = stack.pop() {
        if !seen.insert(label) {
            continue;
        }
        let Some(block) = ctx.block(label) else {
            continue;
        };
        if starts_with_popz(block) {
            return Some(label);
        }
        let successors: Vec<LabelId> = block.body.iter().flat_map(Node::branch_targets).collect();
        stack.extend(successors.into_iter().rev());
    }
    None
}

/// A switch compiles to a chain of equality tests on a duplicated value
/// that stays on the stack until a `popz` after the last case.
///
/// The chain collapses into one `SwitchDispatch` and the `popz` goes away.
pub fn switch_dispatch(
    ctx: &RuleCtx<'_>,
    _labels: &mut LabelArena,
    diags: &mut Diagnostics,
) -> Option<Rewrite> {
    let head = ctx.head();
    let (first, mut next) = case_test(head.tail(5)?)?;
    if is_continuation(ctx) {
        return None;
    }
    let mut cases = vec![first];
    let mut chain: Vec<LabelId> = Vec::new();

    let default = loop {
        if chain.contains(&next) || ctx.refcount(next) != 1 {
            return None;
        }
        let block = ctx.other(next)?;
        chain.push(next);
        match block.body.as_slice() {
            [Node::Label(_), Node::Goto(target)] => break *target,
            [Node::Label(_), rest @ ..] => {
                let (case, following) = case_test(rest)?;
                cases.push(case);
                next = following;
            }
            _ => return None,
        }
    };

    let end = if ctx.other(default).map_or(false, starts_with_popz) {
        default
    } else {
        let from_default = find_popz(ctx, default);
        let from_case = find_popz(ctx, cases[0].1);
        match (from_default, from_case) {
            (Some(a), Some(b)) if a == b => a,
            _ => {
                let bt = &head.body[head.body.len() - 2];
                diags.error("cannot find end of switch", Some(bt));
                return None;
            }
        }
    };
    if chain.contains(&end) {
        return None;
    }
    let mut end_block = ctx.other(end)?.clone();
    end_block.body.remove(1);

    let at = offset_of(&head.body[head.body.len() - 5]);
    let mut new_head = head.clone();
    new_head.body.truncate(head.body.len() - 5);
    new_head
        .body
        .push(Node::raw(at, RawOp::SwitchDispatch { cases, default }));
    new_head.body.push(Node::Goto(default));

    let mut rewrite = Rewrite::head(new_head).replacing(end_block);
    for label in chain {
        rewrite = rewrite.removing(label);
    }
    Some(rewrite)
}

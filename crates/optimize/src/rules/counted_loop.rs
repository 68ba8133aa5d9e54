use quill_ast::diag::Diagnostics;
use quill_ast::label::LabelArena;
use quill_ast::node::{BasicBlock, Node, RawOp};
use quill_ast::types::BinOp;
use quill_ast::Constant;

use super::{offset_of, starts_with_popz};
use crate::rewrite::{Rewrite, RuleCtx};

/// The compiler's counted loop keeps its counter on the operand stack:
///
/// ```text
/// head:  <count> dup 0; push 0; sle; bt exit; b body
/// tail:  push dec; sub; dup 0; bt body; b exit
/// exit:  popz; ...
/// ```
///
/// Rewritten to keep the counter in a `repeat_N` temporary, tested by a new
/// `Repeat_N` block in front of the body.
pub fn counted_loop(
    ctx: &RuleCtx<'_>,
    labels: &mut LabelArena,
    _diags: &mut Diagnostics,
) -> Option<Rewrite> {
    let head = ctx.head();
    let [dup, zero, cmp, bt, goto] = head.tail(5)? else {
        return None;
    };
    if dup.as_raw() != Some(&RawOp::Dup(0)) || cmp.as_raw() != Some(&RawOp::Binary(BinOp::Le)) {
        return None;
    }
    match zero.as_raw() {
        Some(RawOp::Push(c)) if c.as_integer() == Some(0) => {}
        _ => return None,
    }
    let Some(&RawOp::Bt(exit)) = bt.as_raw() else {
        return None;
    };
    let &Node::Goto(body) = goto else {
        return None;
    };
    if exit == body {
        return None;
    }

    let (tail_at, dec) = ctx.blocks.iter().enumerate().find_map(|(i, block)| {
        let [push, sub, dup, bt, goto] = block.tail(5)? else {
            return None;
        };
        let Some(RawOp::Push(dec)) = push.as_raw() else {
            return None;
        };
        let matches = sub.as_raw() == Some(&RawOp::Binary(BinOp::Sub))
            && dup.as_raw() == Some(&RawOp::Dup(0))
            && bt.as_raw() == Some(&RawOp::Bt(body))
            && *goto == Node::Goto(exit);
        matches.then(|| (i, dec.clone()))
    })?;
    let exit_at = ctx.map.block(exit)?;
    if tail_at == ctx.pos || exit_at == ctx.pos || exit_at == tail_at {
        return None;
    }
    if !starts_with_popz(&ctx.blocks[exit_at]) {
        return None;
    }

    let n = labels.next_index("Repeat");
    let counter = format!("repeat_{}", n);
    let repeat = labels.named(format!("Repeat_{}", n));
    let at = offset_of(bt);

    let mut new_head = head.clone();
    new_head.body.truncate(head.body.len() - 5);
    new_head.body.push(Node::raw(at, RawOp::PopLocal(counter.clone())));
    new_head.body.push(Node::Goto(repeat));

    let test = BasicBlock {
        entry_depth: 0,
        body: vec![
            Node::Label(repeat),
            Node::raw(at, RawOp::PushLocal(counter.clone())),
            Node::raw(at, RawOp::Push(Constant::Int(0))),
            Node::raw(at, RawOp::Binary(BinOp::Le)),
            Node::raw(at, RawOp::Bt(exit)),
            Node::Goto(body),
        ],
    };

    let old_tail = &ctx.blocks[tail_at];
    let at = old_tail.tail(5).map(|t| offset_of(&t[0])).unwrap_or(at);
    let mut tail = old_tail.clone();
    tail.body.truncate(old_tail.body.len() - 5);
    tail.body.extend([
        Node::raw(at, RawOp::PushLocal(counter.clone())),
        Node::raw(at, RawOp::Push(dec)),
        Node::raw(at, RawOp::Binary(BinOp::Sub)),
        Node::raw(at, RawOp::PopLocal(counter)),
        Node::Goto(repeat),
    ]);

    let mut exit_block = ctx.blocks[exit_at].clone();
    exit_block.body.remove(1);

    Some(
        Rewrite::head(new_head)
            .inserting(test)
            .replacing(tail)
            .replacing(exit_block),
    )
}

use quill_ast::diag::Diagnostics;
use quill_ast::expr::Expr;
use quill_ast::label::LabelArena;
use quill_ast::node::Node;
use quill_ast::types::BinOp;
use quill_ast::LabelId;

use super::single_branch;
use crate::rewrite::{Rewrite, RuleCtx};

/// `[Label, Push(x), Goto(fall)]`, referenced once, nothing carried in.
fn arm<'a>(ctx: &RuleCtx<'a>, label: LabelId) -> Option<(&'a Expr, LabelId)> {
    if ctx.refcount(label) != 1 {
        return None;
    }
    let block = ctx.other(label)?;
    if block.entry_depth != 0 {
        return None;
    }
    match block.body.as_slice() {
        [Node::Label(_), Node::Push(value), Node::Goto(fall)] => Some((value, *fall)),
        _ => None,
    }
}

/// `cond ? a : b` where one arm is a literal 0 or 1, as a logical expression.
fn fold(cond: &Expr, on_true: &Expr, on_false: &Expr) -> Option<Expr> {
    let cond = cond.clone();
    let value = if on_true.is_literal(1) {
        Expr::binary(BinOp::Or, cond, on_false.clone())
    } else if on_true.is_literal(0) {
        Expr::binary(BinOp::And, cond.negate(), on_false.clone())
    } else if on_false.is_literal(1) {
        Expr::binary(BinOp::Or, cond.negate(), on_true.clone())
    } else if on_false.is_literal(0) {
        Expr::binary(BinOp::And, cond, on_true.clone())
    } else {
        return None;
    };
    Some(value.left_associate())
}

/// Resolve a branch whose two arms each push one value and meet again.
///
/// When the meeting block only branches on that value, the value is threaded
/// into its condition; otherwise it is pushed at the end of the head.
pub fn ternary(
    ctx: &RuleCtx<'_>,
    _labels: &mut LabelArena,
    _diags: &mut Diagnostics,
) -> Option<Rewrite> {
    let head = ctx.head();
    let [Node::CondGoto { cond, target }, Node::Goto(other)] = head.tail(2)? else {
        return None;
    };
    let (t, f) = (*target, *other);
    if t == f {
        return None;
    }
    let (on_true, fall) = arm(ctx, t)?;
    let (on_false, fall_f) = arm(ctx, f)?;
    if fall != fall_f || fall == t || fall == f {
        return None;
    }
    let value = fold(cond, on_true, on_false)?;

    let mut new_head = head.clone();
    new_head.body.truncate(head.body.len() - 2);

    let threaded = ctx
        .other(fall)
        .filter(|b| b.entry_depth == 1 && ctx.refcount(fall) == 2)
        .and_then(single_branch);
    if let Some((next_cond, next_target, next_other)) = threaded {
        let mut cond = next_cond.clone();
        cond.substitute_incoming(std::slice::from_ref(&value));
        new_head.body.push(Node::CondGoto {
            cond,
            target: next_target,
        });
        new_head.body.push(Node::Goto(next_other));
        return Some(
            Rewrite::head(new_head)
                .removing(t)
                .removing(f)
                .removing(fall),
        );
    }

    new_head.body.push(Node::Push(value));
    new_head.body.push(Node::Goto(fall));
    Some(Rewrite::head(new_head).removing(t).removing(f))
}

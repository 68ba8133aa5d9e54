use quill_ast::diag::Diagnostics;
use quill_ast::expr::Expr;
use quill_ast::label::LabelArena;
use quill_ast::node::Node;

use crate::rewrite::{Rewrite, RuleCtx};

/// Replace `Incoming` placeholders in `node` and everything nested in it.
pub(crate) fn substitute(node: &mut Node, values: &[Expr]) {
    node.for_each_expr_mut(&mut |e| e.substitute_incoming(values));
    for block in node.child_blocks_mut() {
        for child in &mut block.body {
            substitute(child, values);
        }
    }
}

/// Absorb the block a straight-line head jumps to when nothing else
/// jumps there. Values the head leaves on the stack replace the absorbed
/// block's `Incoming` placeholders.
pub fn join(ctx: &RuleCtx<'_>, _labels: &mut LabelArena, _diags: &mut Diagnostics) -> Option<Rewrite> {
    let head = ctx.head();
    let &Node::Goto(next_label) = head.body.last()? else {
        return None;
    };
    if ctx.refcount(next_label) != 1 || head.body.iter().any(Node::is_conditional_branch) {
        return None;
    }
    let next_at = ctx.map.block(next_label)?;
    if next_at == ctx.pos || next_at == 0 {
        return None;
    }
    let next = &ctx.blocks[next_at];

    let depth = next.entry_depth as usize;
    let goto_at = head.body.len() - 1;
    if goto_at < depth + 1 {
        return None;
    }
    let keep = goto_at - depth;
    let values = head.body[keep..goto_at]
        .iter()
        .map(|node| match node {
            Node::Push(value) => Some(value.clone()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    let mut new_head = head.clone();
    new_head.body.truncate(keep);
    for node in &next.body[1..] {
        let mut node = node.clone();
        substitute(&mut node, &values);
        new_head.body.push(node);
    }
    Some(Rewrite::head(new_head).removing(next_label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::node::BasicBlock;
    use quill_ast::types::BinOp;
    use quill_ast::LabelId;

    use crate::label_map::LabelMap;

    fn run(blocks: &[BasicBlock], pos: usize) -> Option<Rewrite> {
        let map = LabelMap::build(blocks);
        let ctx = RuleCtx { blocks, map: &map, pos };
        join(&ctx, &mut LabelArena::new(), &mut Diagnostics::default())
    }

    #[test]
    fn test_join_substitutes_pushed_values() {
        let blocks = vec![
            BasicBlock {
                entry_depth: 0,
                body: vec![
                    Node::Label(LabelId(0)),
                    Node::Push(Expr::int(4)),
                    Node::Push(Expr::int(5)),
                    Node::Goto(LabelId(1)),
                ],
            },
            BasicBlock {
                entry_depth: 2,
                body: vec![
                    Node::Label(LabelId(1)),
                    Node::Discard(Expr::binary(BinOp::Sub, Expr::Incoming(0), Expr::Incoming(1))),
                    Node::Exit,
                ],
            },
        ];
        let rewrite = run(&blocks, 0).unwrap();
        assert_eq!(rewrite.remove, vec![LabelId(1)]);
        assert_eq!(
            rewrite.head.unwrap().body,
            vec![
                Node::Label(LabelId(0)),
                Node::Discard(Expr::binary(BinOp::Sub, Expr::int(4), Expr::int(5))),
                Node::Exit,
            ]
        );
    }

    #[test]
    fn test_no_join_after_conditional_or_into_entry() {
        let blocks = vec![
            BasicBlock {
                entry_depth: 0,
                body: vec![
                    Node::Label(LabelId(0)),
                    Node::CondGoto {
                        cond: Expr::int(1),
                        target: LabelId(2),
                    },
                    Node::Goto(LabelId(1)),
                ],
            },
            BasicBlock {
                entry_depth: 0,
                body: vec![Node::Label(LabelId(1)), Node::Goto(LabelId(0))],
            },
            BasicBlock {
                entry_depth: 0,
                body: vec![Node::Label(LabelId(2)), Node::Exit],
            },
        ];
        assert!(run(&blocks, 0).is_none());
        assert!(run(&blocks, 1).is_none());
    }
}

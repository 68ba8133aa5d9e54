use quill_ast::diag::Diagnostics;
use quill_ast::label::LabelArena;
use quill_ast::node::Node;

use crate::rewrite::{Rewrite, RuleCtx};

fn simplify(node: &mut Node) -> bool {
    let mut changed = false;
    node.for_each_expr_mut(&mut |e| changed |= e.simplify_not());
    for block in node.child_blocks_mut() {
        for child in &mut block.body {
            changed |= simplify(child);
        }
    }
    changed
}

/// Fold `!!x` and negated comparisons.
pub fn logic_not(
    ctx: &RuleCtx<'_>,
    _labels: &mut LabelArena,
    _diags: &mut Diagnostics,
) -> Option<Rewrite> {
    let mut head = ctx.head().clone();
    let mut changed = false;
    for node in &mut head.body {
        changed |= simplify(node);
    }
    changed.then(|| Rewrite::head(head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::expr::{Expr, Var};
    use quill_ast::node::BasicBlock;
    use quill_ast::types::BinOp;
    use quill_ast::LabelId;

    use crate::label_map::LabelMap;

    #[test]
    fn test_negated_comparison_in_branch() {
        let x = Expr::Var(Var::named("self", "x"));
        let blocks = vec![BasicBlock {
            entry_depth: 0,
            body: vec![
                Node::Label(LabelId(0)),
                Node::CondGoto {
                    cond: Expr::not(Expr::binary(BinOp::Eq, x.clone(), Expr::int(3))),
                    target: LabelId(0),
                },
                Node::Exit,
            ],
        }];
        let map = LabelMap::build(&blocks);
        let ctx = RuleCtx {
            blocks: &blocks,
            map: &map,
            pos: 0,
        };
        let mut labels = LabelArena::new();
        let mut diags = Diagnostics::default();
        let head = logic_not(&ctx, &mut labels, &mut diags).unwrap().head.unwrap();
        assert_eq!(
            head.body[1],
            Node::CondGoto {
                cond: Expr::binary(BinOp::Ne, x, Expr::int(3)),
                target: LabelId(0),
            }
        );

        let blocks = vec![head];
        let map = LabelMap::build(&blocks);
        let ctx = RuleCtx {
            blocks: &blocks,
            map: &map,
            pos: 0,
        };
        assert!(logic_not(&ctx, &mut labels, &mut diags).is_none());
    }
}

use quill_ast::diag::Diagnostics;
use quill_ast::expr::Expr;
use quill_ast::label::LabelArena;
use quill_ast::node::Node;
use quill_ast::types::BinOp;

use super::single_branch;
use crate::rewrite::{Rewrite, RuleCtx};

/// Fuse two conditional branches that share a target into one `&&` / `||`
/// condition.
///
/// The second branch must sit alone in a block entered only from the first,
/// with nothing carried on the stack.
pub fn short_circuit(
    ctx: &RuleCtx<'_>,
    _labels: &mut LabelArena,
    _diags: &mut Diagnostics,
) -> Option<Rewrite> {
    let head = ctx.head();
    let [Node::CondGoto { cond: c1, target: t1 }, Node::Goto(f1)] = head.tail(2)? else {
        return None;
    };
    let (t1, f1) = (*t1, *f1);

    // the fallthrough first, then the taken side
    for (inner_label, via_true) in [(f1, false), (t1, true)] {
        if ctx.refcount(inner_label) != 1 {
            continue;
        }
        let Some(inner) = ctx.other(inner_label) else {
            continue;
        };
        if inner.entry_depth != 0 {
            continue;
        }
        let Some((c2, t2, f2)) = single_branch(inner) else {
            continue;
        };
        let (c1, c2) = (c1.clone(), c2.clone());

        let fused = match (via_true, t1 == t2, t1 == f2, f1 == f2, f1 == t2) {
            // c1 jumps to T, else test c2
            (false, true, _, _, _) => Expr::binary(BinOp::Or, c1, c2),
            (false, _, true, _, _) => Expr::binary(BinOp::And, c1.negate(), c2),
            // c1 enters the test of c2, else F
            (true, _, _, true, _) => Expr::binary(BinOp::And, c1, c2),
            (true, _, _, _, true) => Expr::binary(BinOp::Or, c1.negate(), c2),
            _ => continue,
        };

        let mut new_head = head.clone();
        new_head.body.truncate(head.body.len() - 2);
        new_head.body.push(Node::CondGoto {
            cond: fused.left_associate(),
            target: t2,
        });
        new_head.body.push(Node::Goto(f2));
        return Some(Rewrite::head(new_head).removing(inner_label));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::expr::Var;
    use quill_ast::node::BasicBlock;
    use quill_ast::LabelId;

    use crate::label_map::LabelMap;

    fn var(name: &str) -> Expr {
        Expr::Var(Var::named("self", name))
    }

    fn branch(label: u32, cond: Expr, target: u32, other: u32) -> BasicBlock {
        BasicBlock {
            entry_depth: 0,
            body: vec![
                Node::Label(LabelId(label)),
                Node::CondGoto {
                    cond,
                    target: LabelId(target),
                },
                Node::Goto(LabelId(other)),
            ],
        }
    }

    fn exit(label: u32) -> BasicBlock {
        BasicBlock {
            entry_depth: 0,
            body: vec![Node::Label(LabelId(label)), Node::Exit],
        }
    }

    fn fire(blocks: &[BasicBlock]) -> Option<Rewrite> {
        let map = LabelMap::build(blocks);
        let ctx = RuleCtx {
            blocks,
            map: &map,
            pos: 0,
        };
        short_circuit(&ctx, &mut LabelArena::new(), &mut Diagnostics::default())
    }

    #[test]
    fn test_or_through_fallthrough() {
        // if a goto T; if b goto T; goto F
        let blocks = vec![
            branch(0, var("a"), 5, 1),
            branch(1, var("b"), 5, 6),
            exit(5),
            exit(6),
        ];
        let rewrite = fire(&blocks).unwrap();
        assert_eq!(rewrite.remove, vec![LabelId(1)]);
        let head = rewrite.head.unwrap();
        assert_eq!(
            head.body[1],
            Node::CondGoto {
                cond: Expr::binary(BinOp::Or, var("a"), var("b")),
                target: LabelId(5),
            }
        );
        assert_eq!(head.body[2], Node::Goto(LabelId(6)));
    }

    #[test]
    fn test_and_through_taken_branch_left_associates() {
        // if a goto N else F; N: if (b && c) goto T else F
        let inner = Expr::binary(BinOp::And, var("b"), var("c"));
        let blocks = vec![
            branch(0, var("a"), 1, 6),
            branch(1, inner, 5, 6),
            exit(5),
            exit(6),
        ];
        let head = fire(&blocks).unwrap().head.unwrap();
        let expected = Expr::binary(
            BinOp::And,
            Expr::binary(BinOp::And, var("a"), var("b")),
            var("c"),
        );
        assert_eq!(
            head.body[1],
            Node::CondGoto {
                cond: expected,
                target: LabelId(5),
            }
        );
    }

    #[test]
    fn test_negated_when_first_skips_to_false() {
        // if a goto F; if b goto T; goto F   =>   if (!a && b) goto T
        let lt = Expr::binary(BinOp::Lt, var("a"), Expr::int(0));
        let blocks = vec![
            branch(0, lt, 6, 1),
            branch(1, var("b"), 5, 6),
            exit(5),
            exit(6),
        ];
        let head = fire(&blocks).unwrap().head.unwrap();
        assert_eq!(
            head.body[1],
            Node::CondGoto {
                cond: Expr::binary(
                    BinOp::And,
                    Expr::binary(BinOp::Ge, var("a"), Expr::int(0)),
                    var("b")
                ),
                target: LabelId(5),
            }
        );
    }

    #[test]
    fn test_shared_inner_block_is_not_fused() {
        let mut blocks = vec![
            branch(0, var("a"), 5, 1),
            branch(1, var("b"), 5, 6),
            exit(5),
            exit(6),
        ];
        // a second reference to the inner block
        blocks[2].body.insert(1, Node::CondGoto {
            cond: var("c"),
            target: LabelId(1),
        });
        assert!(fire(&blocks).is_none());
    }
}

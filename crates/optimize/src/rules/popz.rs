use quill_ast::diag::Diagnostics;
use quill_ast::expr::Expr;
use quill_ast::label::LabelArena;
use quill_ast::node::Node;

use crate::rewrite::{Rewrite, RuleCtx};

fn promote(node: &mut Node) -> bool {
    let mut changed = false;
    if let Node::Discard(Expr::Call { name, args }) = node {
        *node = Node::Call {
            name: std::mem::take(name),
            args: std::mem::take(args),
        };
        changed = true;
    }
    for block in node.child_blocks_mut() {
        for child in &mut block.body {
            changed |= promote(child);
        }
    }
    changed
}

/// A discarded call result is a plain call statement.
pub fn popz(ctx: &RuleCtx<'_>, _labels: &mut LabelArena, _diags: &mut Diagnostics) -> Option<Rewrite> {
    let head = ctx.head();
    if !head
        .body
        .iter()
        .any(|n| n.count(&|n| matches!(n, Node::Discard(Expr::Call { .. }))) > 0)
    {
        return None;
    }
    let mut head = head.clone();
    for node in &mut head.body {
        promote(node);
    }
    Some(Rewrite::head(head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::node::{BasicBlock, Block};
    use quill_ast::LabelId;

    use crate::label_map::LabelMap;

    #[test]
    fn test_discarded_calls_become_statements() {
        let call = Expr::Call {
            name: "instance_destroy".into(),
            args: vec![],
        };
        let blocks = vec![BasicBlock {
            entry_depth: 0,
            body: vec![
                Node::Label(LabelId(0)),
                Node::Discard(call.clone()),
                Node::With {
                    env: Expr::int(-2),
                    body: Block::new(None, vec![Node::Discard(call)]),
                    end: None,
                },
                Node::Discard(Expr::int(1)),
                Node::Exit,
            ],
        }];
        let map = LabelMap::build(&blocks);
        let ctx = RuleCtx {
            blocks: &blocks,
            map: &map,
            pos: 0,
        };
        let head = popz(&ctx, &mut LabelArena::new(), &mut Diagnostics::default())
            .unwrap()
            .head
            .unwrap();
        let statement = Node::Call {
            name: "instance_destroy".into(),
            args: vec![],
        };
        assert_eq!(head.body[1], statement);
        let Node::With { body, .. } = &head.body[2] else {
            panic!("expected with");
        };
        assert_eq!(body.body, vec![statement]);
        assert_eq!(head.body[3], Node::Discard(Expr::int(1)));
    }
}

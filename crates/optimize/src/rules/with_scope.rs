use quill_ast::diag::Diagnostics;
use quill_ast::label::LabelArena;
use quill_ast::node::{Block, Node};

use crate::rewrite::{Rewrite, RuleCtx};

/// Statements a collapsed `with` body may hold.
fn straight_line(node: &Node) -> bool {
    matches!(
        node,
        Node::Assign { .. } | Node::Call { .. } | Node::Discard(_) | Node::With { .. }
    )
}

/// Collapse a scope whose body is straight-line code:
///
/// ```text
/// head:  ... pushenv(env, skip: pop); goto body
/// body:  <statements>; goto pop
/// pop:   popenv(back: body); goto after
/// ```
///
/// Branching bodies are left to structural recovery.
pub fn with_scope(
    ctx: &RuleCtx<'_>,
    _labels: &mut LabelArena,
    _diags: &mut Diagnostics,
) -> Option<Rewrite> {
    let head = ctx.head();
    let [Node::PushEnv { env, skip }, Node::Goto(body_label)] = head.tail(2)? else {
        return None;
    };
    let (skip, body_label) = (*skip, *body_label);
    if skip == body_label || ctx.refcount(body_label) != 2 || ctx.refcount(skip) != 2 {
        return None;
    }

    let pop = ctx.other(skip)?;
    let [Node::Label(_), Node::PopEnv { back }, Node::Goto(after)] = pop.body.as_slice() else {
        return None;
    };
    if *back != body_label {
        return None;
    }

    let body = ctx.other(body_label)?;
    let [Node::Label(_), statements @ .., Node::Goto(end)] = body.body.as_slice() else {
        return None;
    };
    if *end != skip || body.entry_depth != 0 || !statements.iter().all(straight_line) {
        return None;
    }

    let mut new_head = head.clone();
    new_head.body.truncate(head.body.len() - 2);
    new_head.body.push(Node::With {
        env: env.clone(),
        body: Block::new(None, statements.to_vec()),
        end: None,
    });
    new_head.body.push(Node::Goto(*after));
    Some(
        Rewrite::head(new_head)
            .removing(body_label)
            .removing(skip),
    )
}

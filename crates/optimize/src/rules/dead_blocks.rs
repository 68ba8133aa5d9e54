use quill_ast::diag::Diagnostics;
use quill_ast::label::LabelArena;

use crate::rewrite::{Rewrite, RuleCtx};

/// Drop a block nothing jumps to. The first block is the function entry
/// and always stays.
pub fn dead_blocks(
    ctx: &RuleCtx<'_>,
    labels: &mut LabelArena,
    diags: &mut Diagnostics,
) -> Option<Rewrite> {
    if ctx.pos == 0 {
        return None;
    }
    let head = ctx.head();
    let label = head.entry_label()?;
    if ctx.refcount(label) != 0 {
        return None;
    }
    if head.body.len() > 2 {
        diags.warning(
            format!("removed unreachable block {}", labels.name(label)),
            head.body.get(1),
        );
    }
    Some(Rewrite::remove_head())
}

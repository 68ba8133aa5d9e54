use quill_ast::diag::Diagnostics;
use quill_ast::error::DecompileError;
use quill_ast::label::LabelArena;
use quill_ast::node::BasicBlock;
use quill_ast::LabelId;

use crate::label_map::LabelMap;

/// What a rule sees: the whole block list, its label map and the block
/// the rule is tried on.
pub struct RuleCtx<'a> {
    pub blocks: &'a [BasicBlock],
    pub map: &'a LabelMap,
    pub pos: usize,
}

impl<'a> RuleCtx<'a> {
    pub fn head(&self) -> &'a BasicBlock {
        &self.blocks[self.pos]
    }

    /// The block starting with `label`.
    pub fn block(&self, label: LabelId) -> Option<&'a BasicBlock> {
        self.map.block(label).map(|i| &self.blocks[i])
    }

    /// The block starting with `label`, unless it is the head.
    pub fn other(&self, label: LabelId) -> Option<&'a BasicBlock> {
        match self.map.block(label) {
            Some(i) if i != self.pos => Some(&self.blocks[i]),
            _ => None,
        }
    }

    pub fn refcount(&self, label: LabelId) -> usize {
        self.map.refcount(label)
    }
}

/// The edit a rule asks for. Applied all at once or not at all.
#[derive(Debug, Default)]
pub struct Rewrite {
    /// New head block; `None` deletes the head.
    pub head: Option<BasicBlock>,
    /// Blocks replacing the blocks with the same entry label.
    pub replace: Vec<BasicBlock>,
    /// Entry labels of blocks to delete.
    pub remove: Vec<LabelId>,
    /// Blocks inserted right after the head.
    pub insert: Vec<BasicBlock>,
}

impl Rewrite {
    pub fn head(head: BasicBlock) -> Self {
        Self {
            head: Some(head),
            ..Self::default()
        }
    }

    pub fn remove_head() -> Self {
        Self::default()
    }

    pub fn replacing(mut self, block: BasicBlock) -> Self {
        self.replace.push(block);
        self
    }

    pub fn removing(mut self, label: LabelId) -> Self {
        self.remove.push(label);
        self
    }

    pub fn inserting(mut self, block: BasicBlock) -> Self {
        self.insert.push(block);
        self
    }
}

/// A pure rewrite rule over the block list.
pub type Rule = fn(&RuleCtx<'_>, &mut LabelArena, &mut Diagnostics) -> Option<Rewrite>;

/// Index of the single block starting with `label`.
fn locate(blocks: &[BasicBlock], label: LabelId) -> Result<usize, DecompileError> {
    let mut found = blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.entry_label() == Some(label))
        .map(|(i, _)| i);
    match (found.next(), found.next()) {
        (Some(i), None) => Ok(i),
        _ => Err(DecompileError::Invariant(format!(
            "rewrite target #{} is not present exactly once",
            label.0
        ))),
    }
}

/// Apply `rewrite` to the block at `pos`. Returns the index to resume at.
pub fn apply(
    blocks: &mut Vec<BasicBlock>,
    pos: usize,
    rewrite: Rewrite,
) -> Result<usize, DecompileError> {
    let head_label = blocks[pos].entry_label();

    // validate everything before touching the list
    let mut replace_at = Vec::with_capacity(rewrite.replace.len());
    for block in &rewrite.replace {
        let label = block
            .entry_label()
            .ok_or_else(|| DecompileError::Invariant("replacement block has no label".to_string()))?;
        let i = locate(blocks, label)?;
        if i == pos {
            return Err(DecompileError::Invariant(
                "rewrite replaces its own head".to_string(),
            ));
        }
        replace_at.push(i);
    }
    let mut remove_at = Vec::with_capacity(rewrite.remove.len() + 1);
    for &label in &rewrite.remove {
        let i = locate(blocks, label)?;
        if i == pos || replace_at.contains(&i) || remove_at.contains(&i) {
            return Err(DecompileError::Invariant(format!(
                "rewrite claims block #{} twice",
                label.0
            )));
        }
        remove_at.push(i);
    }

    for (block, i) in rewrite.replace.into_iter().zip(replace_at) {
        blocks[i] = block;
    }
    match rewrite.head {
        Some(head) => blocks[pos] = head,
        None => remove_at.push(pos),
    }
    let inserted = rewrite.insert.len();
    if inserted > 0 {
        blocks.splice(pos + 1..pos + 1, rewrite.insert);
        for i in &mut remove_at {
            if *i > pos {
                *i += inserted;
            }
        }
    }

    remove_at.sort_unstable();
    let removed_before = remove_at.iter().filter(|&&i| i < pos).count();
    let head_removed = remove_at.contains(&pos);
    for &i in remove_at.iter().rev() {
        blocks.remove(i);
    }
    tracing::trace!(?head_label, removed = remove_at.len(), inserted, "rewrite applied");

    let head_at = pos - removed_before;
    Ok(if head_removed { head_at } else { head_at + 1 })
}

/// Run `rules` over every block until a full sweep changes nothing.
///
/// Returns the number of sweeps taken, the last one being the quiet one.
pub fn run_fixpoint(
    blocks: &mut Vec<BasicBlock>,
    rules: &[(&'static str, Rule)],
    labels: &mut LabelArena,
    diags: &mut Diagnostics,
    max_sweeps: usize,
) -> Result<usize, DecompileError> {
    let mut sweeps = 0;
    loop {
        if sweeps >= max_sweeps {
            return Err(DecompileError::FixpointExceeded { sweeps });
        }
        sweeps += 1;

        let mut changed = false;
        for &(name, rule) in rules {
            let mut map = LabelMap::build(blocks);
            let mut pos = 0;
            while pos < blocks.len() {
                let ctx = RuleCtx {
                    blocks: blocks.as_slice(),
                    map: &map,
                    pos,
                };
                match rule(&ctx, labels, diags) {
                    Some(rewrite) => {
                        tracing::debug!(
                            rule = name,
                            block = blocks[pos].entry_label().map(|l| labels.name(l)).unwrap_or("?"),
                            "rule fired"
                        );
                        pos = apply(blocks, pos, rewrite)?;
                        map = LabelMap::build(blocks);
                        changed = true;
                    }
                    None => pos += 1,
                }
            }
        }

        if !changed {
            tracing::debug!(sweeps, blocks = blocks.len(), "fixpoint reached");
            return Ok(sweeps);
        }
    }
}

use quill_ast::error::DecompileError;
use quill_ast::label::LabelArena;
use quill_ast::node::{BasicBlock, Node};

/// Split a flat node list into basic blocks.
///
/// A block starts at every label and ends after every branch, return or
/// exit. Conditional branches and fallthroughs into a label get an
/// explicit `Goto`, so every block ends in an unconditional transfer.
pub fn partition(
    nodes: Vec<Node>,
    labels: &mut LabelArena,
) -> Result<Vec<BasicBlock>, DecompileError> {
    let mut blocks = Vec::new();
    let mut current: Option<BasicBlock> = None;
    let mut iter = nodes.into_iter().peekable();

    while let Some(node) = iter.next() {
        if let Node::Label(id) = node {
            if let Some(mut block) = current.take() {
                block.body.push(Node::Goto(id));
                blocks.push(block);
            }
            current = Some(BasicBlock::new(id));
            continue;
        }

        let block = current.get_or_insert_with(|| BasicBlock::new(labels.fresh("Block")));
        let unconditional = node.is_unconditional();
        let conditional = node.is_conditional_branch();
        block.body.push(node);

        if unconditional {
            blocks.extend(current.take());
        } else if conditional {
            let next = match iter.peek() {
                Some(Node::Label(id)) => *id,
                _ => labels.fresh("Block"),
            };
            block.body.push(Node::Goto(next));
            blocks.extend(current.take());
            if !matches!(iter.peek(), Some(Node::Label(_))) {
                current = Some(BasicBlock::new(next));
            }
        }
    }

    if let Some(mut block) = current.take() {
        block.body.push(Node::Exit);
        blocks.push(block);
    }
    if blocks.is_empty() {
        let mut block = BasicBlock::new(labels.fresh("Block"));
        block.body.push(Node::Exit);
        blocks.push(block);
    }

    for block in &blocks {
        block.check()?;
    }
    tracing::debug!(blocks = blocks.len(), "partitioned");
    Ok(blocks)
}

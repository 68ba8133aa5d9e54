use quill_ast::error::DecompileError;
use quill_ast::node::{Block, Node, Switch, SwitchCase};

/// Splice every basic block into its parent list. A block's entry marker
/// becomes an explicit leading `goto`, so the tree no longer needs entries.
pub fn flatten(block: Block) -> Result<Block, DecompileError> {
    let mut out = Vec::with_capacity(block.body.len());
    if let Some(entry) = block.entry {
        out.push(Node::Goto(entry));
    }
    for node in block.body {
        match node {
            Node::BasicBlock(bb) => {
                bb.check()?;
                for inner in bb.body {
                    out.push(flatten_node(inner)?);
                }
            }
            other => out.push(flatten_node(other)?),
        }
    }
    Ok(Block::new(None, out))
}

fn flatten_node(node: Node) -> Result<Node, DecompileError> {
    Ok(match node {
        Node::Condition {
            cond,
            then_block,
            else_block,
        } => Node::Condition {
            cond,
            then_block: flatten(then_block)?,
            else_block: flatten(else_block)?,
        },
        Node::While { cond, body } => Node::While {
            cond,
            body: flatten(body)?,
        },
        Node::With { env, body, end } => Node::With {
            env,
            body: flatten(body)?,
            end,
        },
        Node::Switch(sw) => Node::Switch(Switch {
            value: sw.value,
            cases: sw
                .cases
                .into_iter()
                .map(|case| {
                    Ok(SwitchCase {
                        values: case.values,
                        is_default: case.is_default,
                        body: flatten(case.body)?,
                    })
                })
                .collect::<Result<_, DecompileError>>()?,
        }),
        Node::Block(inner) => Node::Block(flatten(inner)?),
        Node::BasicBlock(bb) => {
            bb.check()?;
            Node::Block(flatten(Block::new(None, vec![Node::BasicBlock(bb)]))?)
        }
        other => other,
    })
}

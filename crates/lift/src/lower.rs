use quill_bytecode::instruction::{Instruction, Operand};
use quill_bytecode::opcode::{DataType, OpCode};
use quill_bytecode::InstructionSet;

use quill_ast::error::DecompileError;
use quill_ast::node::{Node, RawOp};
use quill_ast::types::{BinOp, UnOp};

/// Turn each instruction into one raw node, with a `Label` node in front
/// of every instruction that is a branch target.
///
/// `b` and `exit` lower straight to `Goto` / `Exit`; `conv`, no-op fillers
/// and the scope-break form of `popenv` produce nothing.
pub fn lower(set: &InstructionSet) -> Result<Vec<Node>, DecompileError> {
    let mut nodes = Vec::with_capacity(set.instructions.len() + set.labels.len());
    for insn in &set.instructions {
        if let Some(id) = set.labels.at_offset(insn.offset) {
            nodes.push(Node::Label(id));
        }
        if let Some(node) = lower_one(insn)? {
            nodes.push(node);
        }
    }
    tracing::trace!(instructions = set.instructions.len(), nodes = nodes.len(), "lowered");
    Ok(nodes)
}

fn lower_one(insn: &Instruction) -> Result<Option<Node>, DecompileError> {
    let op = match insn.op {
        OpCode::BadOp | OpCode::Conv | OpCode::Break => return Ok(None),
        OpCode::Exit => return Ok(Some(Node::Exit)),
        OpCode::B => return Ok(Some(Node::Goto(target(insn)?))),
        OpCode::Neg | OpCode::Not => match UnOp::from_opcode(insn.op) {
            Some(op) => RawOp::Unary(op),
            None => return Err(malformed(insn)),
        },
        OpCode::Push => match &insn.operand {
            Operand::Constant(c) => RawOp::Push(c.clone()),
            Operand::Var(var) => RawOp::PushVar(var.clone()),
            _ => return Err(malformed(insn)),
        },
        OpCode::Pop => match &insn.operand {
            Operand::Var(var) => RawOp::Pop {
                var: var.clone(),
                swapped: insn.first_type() == Some(DataType::Int),
            },
            _ => return Err(malformed(insn)),
        },
        OpCode::Dup => RawOp::Dup(insn.extra),
        OpCode::Call => match &insn.operand {
            Operand::Call { name, argc } => RawOp::Call {
                name: name.clone(),
                argc: *argc,
            },
            _ => return Err(malformed(insn)),
        },
        OpCode::Popz => RawOp::Popz,
        OpCode::Ret => RawOp::Ret,
        OpCode::Bt => RawOp::Bt(target(insn)?),
        OpCode::Bf => RawOp::Bf(target(insn)?),
        OpCode::PushEnv => RawOp::PushEnv(target(insn)?),
        OpCode::PopEnv => match insn.target() {
            Some(back) => RawOp::PopEnv(back),
            None => return Ok(None),
        },
        op => match BinOp::from_opcode(op) {
            Some(op) => RawOp::Binary(op),
            None => return Err(malformed(insn)),
        },
    };
    Ok(Some(Node::raw(insn.offset, op)))
}

fn target(insn: &Instruction) -> Result<quill_bytecode::label::LabelId, DecompileError> {
    insn.target().ok_or_else(|| malformed(insn))
}

fn malformed(insn: &Instruction) -> DecompileError {
    DecompileError::Invariant(format!(
        "instruction {:?} at offset {} has an unexpected operand",
        insn.op, insn.offset
    ))
}

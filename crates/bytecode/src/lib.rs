pub mod constant;
pub mod error;
pub mod instruction;
pub mod label;
pub mod module;
pub mod opcode;

#[cfg(any(test, feature = "fixtures"))]
pub mod asm;

use std::fmt::Write;
use std::ops::Range;

use crate::error::DecodeError;
use crate::instruction::Instruction;
use crate::label::{LabelId, LabelTable};
use crate::module::BinaryModule;

/// The decoded instructions of one code unit plus its labels.
#[derive(Debug, Clone)]
pub struct InstructionSet {
    /// Instructions ordered by offset, including filler `exit`s that anchor
    /// labels past the end of the code.
    pub instructions: Vec<Instruction>,
    pub labels: LabelTable,
}

impl InstructionSet {
    /// The instruction a label is bound to.
    pub fn instruction_at(&self, label: LabelId) -> Option<&Instruction> {
        let offset = self.labels.get(label).offset;
        self.instructions
            .binary_search_by_key(&offset, |insn| insn.offset)
            .ok()
            .map(|i| &self.instructions[i])
    }

    /// Raw assembly listing with label headers.
    pub fn disassemble(&self, module: &BinaryModule) -> String {
        let mut out = String::new();
        for insn in &self.instructions {
            if let Some(id) = self.labels.at_offset(insn.offset) {
                let _ = writeln!(out, "{}:", self.labels.get(id).name);
            }
            let _ = writeln!(
                out,
                "{:6}  {}",
                insn.offset,
                insn.to_asm(&self.labels, module)
            );
        }
        out
    }
}

/// Decode a code unit.
///
/// Labels whose target lies at or past the end of the code get a filler
/// `exit` instruction so every label has an anchor.
pub fn decode(code: &[u8], module: &BinaryModule) -> Result<InstructionSet, DecodeError> {
    if code.len() % 4 != 0 {
        return Err(DecodeError::Misaligned { len: code.len() });
    }

    let mut labels = LabelTable::default();
    let mut instructions = Vec::new();
    let mut input = code;
    let mut offset = 0u32;
    while !input.is_empty() {
        let (rest, insn) = Instruction::parse(input, offset, module, &mut labels)?;
        offset += insn.size;
        instructions.push(insn);
        input = rest;
    }
    let end = offset;

    let mut fillers: Vec<u32> = labels
        .iter()
        .map(|l| l.offset)
        .filter(|&o| o >= end)
        .collect();
    fillers.sort_unstable();
    instructions.extend(fillers.into_iter().map(Instruction::filler_exit));

    for label in labels.iter() {
        if instructions
            .binary_search_by_key(&label.offset, |insn| insn.offset)
            .is_err()
        {
            return Err(DecodeError::BranchTarget {
                offset: label.callers.first().copied().unwrap_or(0),
                target: label.offset as i64,
            });
        }
    }

    Ok(InstructionSet {
        instructions,
        labels,
    })
}

/// Decode the code unit stored at `range` of a larger buffer.
pub fn read_instructions(
    bytes: &[u8],
    range: Range<usize>,
    module: &BinaryModule,
) -> Result<InstructionSet, DecodeError> {
    let code = bytes.get(range.clone()).ok_or(DecodeError::OutOfRange {
        start: range.start,
        end: range.end,
        len: bytes.len(),
    })?;
    decode(code, module)
}

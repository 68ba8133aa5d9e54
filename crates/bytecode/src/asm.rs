//! Word-level assembler for building decoder fixtures.

use rustc_hash::FxHashMap;

use crate::opcode::{DataType, OpCode};

/// Builds an instruction stream word by word.
///
/// Branches name their target label; labels that are never bound resolve to
/// the end of the stream.
#[derive(Debug, Default)]
pub struct Assembler {
    words: Vec<u32>,
    bound: FxHashMap<String, u32>,
    fixups: Vec<(usize, String)>,
}

pub fn encode(op: OpCode, first: DataType, second: DataType, extra: u16) -> u32 {
    (op as u32) << 24 | (second as u32 & 0xF) << 20 | (first as u32 & 0xF) << 16 | extra as u32
}

fn var_word(name: u32, array: bool) -> u32 {
    if array {
        name
    } else {
        0xA000_0000 | name
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pc(&self) -> u32 {
        self.words.len() as u32
    }

    pub fn label(mut self, name: &str) -> Self {
        self.bound.insert(name.to_string(), self.pc());
        self
    }

    pub fn word(mut self, word: u32) -> Self {
        self.words.push(word);
        self
    }

    pub fn op(self, op: OpCode) -> Self {
        self.word((op as u32) << 24)
    }

    pub fn op_typed(self, op: OpCode, first: DataType, second: DataType) -> Self {
        self.word(encode(op, first, second, 0))
    }

    pub fn push_int(self, value: i32) -> Self {
        self.word(encode(OpCode::Push, DataType::Int, DataType::Double, 0))
            .word(value as u32)
    }

    pub fn push_short(self, value: i16) -> Self {
        self.word(encode(OpCode::Push, DataType::Short, DataType::Double, value as u16))
    }

    pub fn push_double(self, value: f64) -> Self {
        let bits = value.to_bits();
        self.word(encode(OpCode::Push, DataType::Double, DataType::Double, 0))
            .word(bits as u32)
            .word((bits >> 32) as u32)
    }

    pub fn push_string(self, index: u32) -> Self {
        self.word(encode(OpCode::Push, DataType::String, DataType::Double, 0))
            .word(index)
    }

    pub fn push_var(self, instance: i16, name: u32, array: bool) -> Self {
        self.word(encode(OpCode::Push, DataType::Var, DataType::Double, instance as u16))
            .word(var_word(name, array))
    }

    /// `pop.v.v`: index and instance above the value.
    pub fn pop_var(self, instance: i16, name: u32, array: bool) -> Self {
        self.word(encode(OpCode::Pop, DataType::Var, DataType::Var, instance as u16))
            .word(var_word(name, array))
    }

    /// `pop.i.v`: the value above index and instance.
    pub fn pop_var_swapped(self, instance: i16, name: u32, array: bool) -> Self {
        self.word(encode(OpCode::Pop, DataType::Int, DataType::Var, instance as u16))
            .word(var_word(name, array))
    }

    pub fn binary(self, op: OpCode) -> Self {
        self.op_typed(op, DataType::Var, DataType::Var)
    }

    pub fn dup(self, extra: u16) -> Self {
        self.word(encode(OpCode::Dup, DataType::Var, DataType::Double, extra))
    }

    pub fn call(self, name: u32, argc: u16) -> Self {
        self.word(encode(OpCode::Call, DataType::Int, DataType::Double, argc))
            .word(name)
    }

    pub fn branch(mut self, op: OpCode, label: &str) -> Self {
        self.fixups.push((self.words.len(), label.to_string()));
        self.op(op)
    }

    pub fn popenv_break(self) -> Self {
        self.word(crate::instruction::POPENV_BREAK)
    }

    /// Resolve branch targets and return the little-endian byte stream.
    pub fn finish(&self) -> Vec<u8> {
        let end = self.pc();
        let mut words = self.words.clone();
        for (index, label) in &self.fixups {
            let target = self.bound.get(label).copied().unwrap_or(end);
            let delta = target as i64 - *index as i64;
            words[*index] |= (delta as u32) & 0x00FF_FFFF;
        }
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

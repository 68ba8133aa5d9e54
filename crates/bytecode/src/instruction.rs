use std::fmt::Write;

use nom::number::complete::{le_f32, le_f64, le_i32, le_i64, le_u32};
use nom::IResult;

use crate::constant::Constant;
use crate::error::DecodeError;
use crate::label::{LabelId, LabelTable};
use crate::module::BinaryModule;
use crate::opcode::{DataType, OpCode};

/// Index bits of a string or variable operand.
const INDEX_MASK: u32 = 0x1F_FFFF;

/// The exact word of the scope-break form of `popenv`.
pub const POPENV_BREAK: u32 = 0xBCF0_0000;

/// A variable reference operand of `push.v` / `pop`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: String,
    /// Encoded instance: 0 means the instance is on the stack.
    pub instance: i16,
    /// Whether an array index is on the stack.
    pub array: bool,
}

impl VarRef {
    /// Number of stack values the reference itself consumes.
    pub fn stack_operands(&self) -> usize {
        (self.instance == 0) as usize + self.array as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Constant(Constant),
    Var(VarRef),
    Call { name: String, argc: u16 },
    Label(LabelId),
    /// `dup` extra flag: 0 duplicates one value, 1 duplicates two.
    Dup(u16),
}

/// A decoded instruction. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset in 32-bit words from the start of the code.
    pub offset: u32,
    pub op: OpCode,
    /// Raw first and second type nibbles.
    pub types: (u8, u8),
    /// Low 16 bits of the instruction word.
    pub extra: u16,
    pub operand: Operand,
    /// Size in 32-bit words.
    pub size: u32,
}

type Parsed<'a, T> = Result<(&'a [u8], T), DecodeError>;

fn field<'a, T>(
    input: &'a [u8],
    offset: u32,
    parser: fn(&'a [u8]) -> IResult<&'a [u8], T>,
) -> Parsed<'a, T> {
    parser(input).map_err(|_| DecodeError::Truncated { offset })
}

fn string_at(module: &BinaryModule, offset: u32, index: u32) -> Result<String, DecodeError> {
    module
        .string(index)
        .map(str::to_string)
        .ok_or(DecodeError::StringIndex { offset, index })
}

impl Instruction {
    pub fn first_type(&self) -> Option<DataType> {
        DataType::from_nibble(self.types.0)
    }

    pub fn second_type(&self) -> Option<DataType> {
        DataType::from_nibble(self.types.1)
    }

    /// Branch target label, if this is a branch with a target.
    pub fn target(&self) -> Option<LabelId> {
        match self.operand {
            Operand::Label(id) => Some(id),
            _ => None,
        }
    }

    /// The filler `exit` anchoring a label that points past the last instruction.
    pub fn filler_exit(offset: u32) -> Self {
        Self {
            offset,
            op: OpCode::Exit,
            types: (0, 0),
            extra: 0,
            operand: Operand::None,
            size: 0,
        }
    }

    /// Decode one instruction at word offset `offset`.
    ///
    /// Branch targets are registered in `labels` as they are found.
    pub fn parse<'a>(
        input: &'a [u8],
        offset: u32,
        module: &BinaryModule,
        labels: &mut LabelTable,
    ) -> Parsed<'a, Self> {
        let (input, word) = field(input, offset, le_u32)?;
        let opcode = (word >> 24) as u8;
        let op = OpCode::from_byte(opcode).ok_or(DecodeError::UnknownOpcode { offset, opcode })?;
        let types = (((word >> 16) & 0xF) as u8, ((word >> 20) & 0xF) as u8);
        let extra = (word & 0xFFFF) as u16;
        let unsupported = || DecodeError::UnsupportedType {
            offset,
            op: op.mnemonic(),
            nibble: types.0,
        };

        let (input, operand, size) = match op {
            OpCode::Push => {
                let ty = DataType::from_nibble(types.0).ok_or_else(unsupported)?;
                match ty {
                    DataType::Double => {
                        let (input, v) = field(input, offset, le_f64)?;
                        (input, Operand::Constant(Constant::Double(v)), 3)
                    }
                    DataType::Long => {
                        let (input, v) = field(input, offset, le_i64)?;
                        (input, Operand::Constant(Constant::Long(v)), 3)
                    }
                    DataType::Float => {
                        let (input, v) = field(input, offset, le_f32)?;
                        (input, Operand::Constant(Constant::Float(v)), 2)
                    }
                    DataType::Int => {
                        let (input, v) = field(input, offset, le_i32)?;
                        (input, Operand::Constant(Constant::Int(v)), 2)
                    }
                    DataType::Bool => {
                        let (input, v) = field(input, offset, le_i32)?;
                        (input, Operand::Constant(Constant::Bool(v != 0)), 2)
                    }
                    DataType::String => {
                        let (input, v) = field(input, offset, le_u32)?;
                        let s = string_at(module, offset, v & INDEX_MASK)?;
                        (input, Operand::Constant(Constant::String(s)), 2)
                    }
                    DataType::Var => {
                        let (input, var) = Self::parse_var(input, offset, extra, module)?;
                        (input, Operand::Var(var), 2)
                    }
                    DataType::Short => (input, Operand::Constant(Constant::Short(extra as i16)), 1),
                    DataType::Instance => return Err(unsupported()),
                }
            }
            OpCode::Pop => {
                let (input, var) = Self::parse_var(input, offset, extra, module)?;
                (input, Operand::Var(var), 2)
            }
            OpCode::Call => {
                let (input, v) = field(input, offset, le_u32)?;
                let name = string_at(module, offset, v & INDEX_MASK)?;
                (input, Operand::Call { name, argc: extra }, 2)
            }
            OpCode::Dup => (input, Operand::Dup(extra), 1),
            OpCode::PopEnv if word == POPENV_BREAK => (input, Operand::None, 1),
            op if op.is_branch() => {
                let raw = word & 0x00FF_FFFF;
                let delta = if raw & 0x0080_0000 != 0 {
                    (raw | 0xFF00_0000) as i32
                } else {
                    raw as i32
                };
                let target = offset as i64 + delta as i64;
                if target < 0 {
                    return Err(DecodeError::BranchTarget { offset, target });
                }
                let id = labels.add_caller(target as u32, offset);
                (input, Operand::Label(id), 1)
            }
            _ => (input, Operand::None, 1),
        };

        Ok((
            input,
            Self {
                offset,
                op,
                types,
                extra,
                operand,
                size,
            },
        ))
    }

    fn parse_var<'a>(
        input: &'a [u8],
        offset: u32,
        extra: u16,
        module: &BinaryModule,
    ) -> Parsed<'a, VarRef> {
        let (input, raw) = field(input, offset, le_i32)?;
        let name = string_at(module, offset, raw as u32 & INDEX_MASK)?;
        Ok((
            input,
            VarRef {
                name,
                instance: extra as i16,
                array: raw >= 0,
            },
        ))
    }

    /// One line of assembly, e.g. `push.v self.x` or `bt L12`.
    pub fn to_asm(&self, labels: &LabelTable, module: &BinaryModule) -> String {
        let mut out = String::from(self.op.mnemonic());
        match self.op {
            OpCode::Push | OpCode::Pop | OpCode::Dup | OpCode::Conv => {
                if let Some(t) = self.first_type() {
                    out.push('.');
                    out.push(t.suffix());
                }
                if matches!(self.op, OpCode::Pop | OpCode::Conv) {
                    if let Some(t) = self.second_type() {
                        out.push('.');
                        out.push(t.suffix());
                    }
                }
            }
            _ => {}
        }
        match &self.operand {
            Operand::None => {
                if self.op == OpCode::PopEnv {
                    out.push_str(" <break>");
                }
            }
            Operand::Constant(c) => {
                let _ = write!(out, " {}", c);
            }
            Operand::Var(var) => {
                let instance = if var.instance == 0 {
                    "[stack]".to_string()
                } else {
                    module.instance_name(var.instance as i32)
                };
                let _ = write!(out, " {}.{}", instance, var.name);
                if var.array {
                    out.push_str("[]");
                }
            }
            Operand::Call { name, argc } => {
                let _ = write!(out, " {}(argc={})", name, argc);
            }
            Operand::Label(id) => {
                let _ = write!(out, " {}", labels.get(*id).name);
            }
            Operand::Dup(extra) => {
                let _ = write!(out, " {}", extra);
            }
        }
        out
    }
}

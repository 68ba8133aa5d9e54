use thiserror::Error;

/// Fatal decoding failures. Instruction sizes depend on the opcode, so the
/// decoder cannot resynchronize after any of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("code length {len} is not a multiple of 4")]
    Misaligned { len: usize },

    #[error("byte range {start}..{end} is outside a {len}-byte buffer")]
    OutOfRange { start: usize, end: usize, len: usize },

    #[error("truncated instruction at offset {offset}")]
    Truncated { offset: u32 },

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { offset: u32, opcode: u8 },

    #[error("unsupported operand type {nibble} for `{op}` at offset {offset}")]
    UnsupportedType {
        offset: u32,
        op: &'static str,
        nibble: u8,
    },

    #[error("string index {index} out of range at offset {offset}")]
    StringIndex { offset: u32, index: u32 },

    #[error("branch at offset {offset} targets {target}, which is not an instruction boundary")]
    BranchTarget { offset: u32, target: i64 },
}

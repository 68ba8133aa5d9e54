/// Script bytecode opcodes.
///
/// The opcode lives in the top byte of every instruction word. Each variant
/// documents its stack effect.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Filler word, no effect.
    BadOp = 0x00,
    /// CONV: convert top of stack between types (no effect on the tree)
    Conv = 0x03,
    /// MUL: a * b
    Mul = 0x04,
    /// DIV: a / b
    Div = 0x05,
    /// REM: integer division (`div`)
    Rem = 0x06,
    /// MOD: a % b
    Mod = 0x07,
    /// ADD: a + b
    Add = 0x08,
    /// SUB: a - b
    Sub = 0x09,
    /// AND: a & b
    And = 0x0a,
    /// OR: a | b
    Or = 0x0b,
    /// XOR: a ^ b
    Xor = 0x0c,
    /// NEG: -a
    Neg = 0x0d,
    /// NOT: !a
    Not = 0x0e,
    /// SHL: a << b
    Shl = 0x0f,
    /// SHR: a >> b
    Shr = 0x10,
    /// SLT: a < b
    Slt = 0x11,
    /// SLE: a <= b
    Sle = 0x12,
    /// SEQ: a == b
    Seq = 0x13,
    /// SNE: a != b
    Sne = 0x14,
    /// SGE: a >= b
    Sge = 0x15,
    /// SGT: a > b
    Sgt = 0x16,
    /// POP: store top of stack into a variable
    Pop = 0x41,
    /// DUP: duplicate one (extra 0) or two (extra 1) values
    Dup = 0x82,
    /// RET: return top of stack
    Ret = 0x9d,
    /// EXIT: leave the script without a value
    Exit = 0x9e,
    /// POPZ: discard top of stack
    Popz = 0x9f,
    /// B: pc += offset
    B = 0xb7,
    /// BT: if pop() then pc += offset
    Bt = 0xb8,
    /// BF: if !pop() then pc += offset
    Bf = 0xb9,
    /// PUSHENV: enter the instances of pop(); skip to offset when there are none
    PushEnv = 0xbb,
    /// POPENV: next instance jumps back to offset, otherwise leave the scope
    PopEnv = 0xbc,
    /// PUSH: push a constant or variable
    Push = 0xc0,
    /// CALL: call a function with `extra` arguments
    Call = 0xda,
    /// BREAK: debugger trap
    Break = 0xff,
}

impl OpCode {
    /// Decode an opcode from its byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let op = match byte {
            0x00 => OpCode::BadOp,
            0x03 => OpCode::Conv,
            0x04 => OpCode::Mul,
            0x05 => OpCode::Div,
            0x06 => OpCode::Rem,
            0x07 => OpCode::Mod,
            0x08 => OpCode::Add,
            0x09 => OpCode::Sub,
            0x0a => OpCode::And,
            0x0b => OpCode::Or,
            0x0c => OpCode::Xor,
            0x0d => OpCode::Neg,
            0x0e => OpCode::Not,
            0x0f => OpCode::Shl,
            0x10 => OpCode::Shr,
            0x11 => OpCode::Slt,
            0x12 => OpCode::Sle,
            0x13 => OpCode::Seq,
            0x14 => OpCode::Sne,
            0x15 => OpCode::Sge,
            0x16 => OpCode::Sgt,
            0x41 => OpCode::Pop,
            0x82 => OpCode::Dup,
            0x9d => OpCode::Ret,
            0x9e => OpCode::Exit,
            0x9f => OpCode::Popz,
            0xb7 => OpCode::B,
            0xb8 => OpCode::Bt,
            0xb9 => OpCode::Bf,
            0xbb => OpCode::PushEnv,
            0xbc => OpCode::PopEnv,
            0xc0 => OpCode::Push,
            0xda => OpCode::Call,
            0xff => OpCode::Break,
            _ => return None,
        };
        Some(op)
    }

    /// Whether this opcode carries a 24-bit branch offset.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            OpCode::B | OpCode::Bt | OpCode::Bf | OpCode::PushEnv | OpCode::PopEnv
        )
    }

    /// Lower-case assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::BadOp => "badop",
            OpCode::Conv => "conv",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Rem => "rem",
            OpCode::Mod => "mod",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::And => "and",
            OpCode::Or => "or",
            OpCode::Xor => "xor",
            OpCode::Neg => "neg",
            OpCode::Not => "not",
            OpCode::Shl => "shl",
            OpCode::Shr => "shr",
            OpCode::Slt => "slt",
            OpCode::Sle => "sle",
            OpCode::Seq => "seq",
            OpCode::Sne => "sne",
            OpCode::Sge => "sge",
            OpCode::Sgt => "sgt",
            OpCode::Pop => "pop",
            OpCode::Dup => "dup",
            OpCode::Ret => "ret",
            OpCode::Exit => "exit",
            OpCode::Popz => "popz",
            OpCode::B => "b",
            OpCode::Bt => "bt",
            OpCode::Bf => "bf",
            OpCode::PushEnv => "pushenv",
            OpCode::PopEnv => "popenv",
            OpCode::Push => "push",
            OpCode::Call => "call",
            OpCode::Break => "break",
        }
    }
}

/// Operand type nibble.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Double = 0,
    Float = 1,
    Int = 2,
    Long = 3,
    Bool = 4,
    Var = 5,
    String = 6,
    Instance = 7,
    Short = 15,
}

impl DataType {
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        let ty = match nibble {
            0 => DataType::Double,
            1 => DataType::Float,
            2 => DataType::Int,
            3 => DataType::Long,
            4 => DataType::Bool,
            5 => DataType::Var,
            6 => DataType::String,
            7 => DataType::Instance,
            15 => DataType::Short,
            _ => return None,
        };
        Some(ty)
    }

    /// One-letter suffix used by the assembler (`push.i`, `pop.v.v`).
    pub fn suffix(self) -> char {
        match self {
            DataType::Double => 'd',
            DataType::Float => 'f',
            DataType::Int => 'i',
            DataType::Long => 'l',
            DataType::Bool => 'b',
            DataType::Var => 'v',
            DataType::String => 's',
            DataType::Instance => 'n',
            DataType::Short => 'e',
        }
    }
}

use quill_bytecode::opcode::OpCode;

/// Binary operators, including the short-circuit forms recovered from
/// branch chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Mul,
    Div,
    /// Integer division (`div`).
    Rem,
    Mod,
    Add,
    Sub,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    And,
    Or,
}

impl BinOp {
    pub fn from_opcode(op: OpCode) -> Option<Self> {
        let op = match op {
            OpCode::Mul => BinOp::Mul,
            OpCode::Div => BinOp::Div,
            OpCode::Rem => BinOp::Rem,
            OpCode::Mod => BinOp::Mod,
            OpCode::Add => BinOp::Add,
            OpCode::Sub => BinOp::Sub,
            OpCode::And => BinOp::BitAnd,
            OpCode::Or => BinOp::BitOr,
            OpCode::Xor => BinOp::BitXor,
            OpCode::Shl => BinOp::Shl,
            OpCode::Shr => BinOp::Shr,
            OpCode::Slt => BinOp::Lt,
            OpCode::Sle => BinOp::Le,
            OpCode::Seq => BinOp::Eq,
            OpCode::Sne => BinOp::Ne,
            OpCode::Sge => BinOp::Ge,
            OpCode::Sgt => BinOp::Gt,
            _ => return None,
        };
        Some(op)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Le | BinOp::Eq | BinOp::Ne | BinOp::Ge | BinOp::Gt
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    /// The comparison that holds exactly when `self` does not.
    pub fn inverse(self) -> Option<Self> {
        let op = match self {
            BinOp::Lt => BinOp::Ge,
            BinOp::Le => BinOp::Gt,
            BinOp::Eq => BinOp::Ne,
            BinOp::Ne => BinOp::Eq,
            BinOp::Ge => BinOp::Lt,
            BinOp::Gt => BinOp::Le,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Not,
    Neg,
}

impl UnOp {
    pub fn from_opcode(op: OpCode) -> Option<Self> {
        match op {
            OpCode::Not => Some(UnOp::Not),
            OpCode::Neg => Some(UnOp::Neg),
            _ => None,
        }
    }
}

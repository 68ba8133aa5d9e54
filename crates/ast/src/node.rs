use std::fmt;

use quill_bytecode::constant::Constant;
use quill_bytecode::instruction::VarRef;
use quill_bytecode::label::LabelId;

use crate::error::DecompileError;
use crate::expr::{Expr, Var};
use crate::types::{BinOp, UnOp};

/// An instruction-level operation, before stack simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOp {
    Push(Constant),
    PushVar(VarRef),
    /// Store into a variable. `swapped` means the value sits above the
    /// index and instance instead of below them.
    Pop { var: VarRef, swapped: bool },
    /// Load a decompiler temporary.
    PushLocal(String),
    /// Store into a decompiler temporary.
    PopLocal(String),
    Dup(u16),
    Binary(BinOp),
    Unary(UnOp),
    Call { name: String, argc: u16 },
    Popz,
    Ret,
    Bt(LabelId),
    Bf(LabelId),
    PushEnv(LabelId),
    PopEnv(LabelId),
    /// A recognized switch dispatch chain; pops the switch value.
    SwitchDispatch {
        cases: Vec<(Constant, LabelId)>,
        default: LabelId,
    },
}

impl RawOp {
    /// `(pops, pushes)`, or `None` for a `dup` with an unsupported flag.
    pub fn stack_effect(&self) -> Option<(usize, usize)> {
        let effect = match self {
            RawOp::Push(_) | RawOp::PushLocal(_) => (0, 1),
            RawOp::PushVar(var) => (var.stack_operands(), 1),
            RawOp::Pop { var, .. } => (var.stack_operands() + 1, 0),
            RawOp::PopLocal(_) => (1, 0),
            RawOp::Dup(0) => (1, 2),
            RawOp::Dup(1) => (2, 4),
            RawOp::Dup(_) => return None,
            RawOp::Binary(_) => (2, 1),
            RawOp::Unary(_) => (1, 1),
            RawOp::Call { argc, .. } => (*argc as usize, 1),
            RawOp::Popz | RawOp::Ret | RawOp::Bt(_) | RawOp::Bf(_) | RawOp::PushEnv(_) => (1, 0),
            RawOp::SwitchDispatch { .. } => (1, 0),
            RawOp::PopEnv(_) => (0, 0),
        };
        Some(effect)
    }
}

impl fmt::Display for RawOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawOp::Push(c) => write!(f, "push {}", c),
            RawOp::PushVar(var) => write!(f, "push.v {}", var.name),
            RawOp::Pop { var, swapped } => {
                write!(f, "pop{} {}", if *swapped { ".i.v" } else { ".v.v" }, var.name)
            }
            RawOp::PushLocal(name) => write!(f, "push.local {}", name),
            RawOp::PopLocal(name) => write!(f, "pop.local {}", name),
            RawOp::Dup(extra) => write!(f, "dup {}", extra),
            RawOp::Binary(op) => write!(f, "{:?}", op),
            RawOp::Unary(op) => write!(f, "{:?}", op),
            RawOp::Call { name, argc } => write!(f, "call {}(argc={})", name, argc),
            RawOp::Popz => write!(f, "popz"),
            RawOp::Ret => write!(f, "ret"),
            RawOp::Bt(l) => write!(f, "bt #{}", l.0),
            RawOp::Bf(l) => write!(f, "bf #{}", l.0),
            RawOp::PushEnv(l) => write!(f, "pushenv #{}", l.0),
            RawOp::PopEnv(l) => write!(f, "popenv #{}", l.0),
            RawOp::SwitchDispatch { cases, default } => {
                write!(f, "switch ({} cases, default #{})", cases.len(), default.0)
            }
        }
    }
}

/// A raw operation and the offset of the instruction it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub offset: u32,
    pub op: RawOp,
}

/// A statement list. `entry` marks the label control enters at until the
/// tree is flattened.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub entry: Option<LabelId>,
    pub body: Vec<Node>,
}

impl Block {
    pub fn new(entry: Option<LabelId>, body: Vec<Node>) -> Self {
        Self { entry, body }
    }
}

/// A straight-line run of nodes: one entry label, one exit transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Operand stack depth when control enters the block.
    pub entry_depth: u16,
    pub body: Vec<Node>,
}

impl BasicBlock {
    pub fn new(label: LabelId) -> Self {
        Self {
            entry_depth: 0,
            body: vec![Node::Label(label)],
        }
    }

    pub fn entry_label(&self) -> Option<LabelId> {
        match self.body.first() {
            Some(Node::Label(id)) => Some(*id),
            _ => None,
        }
    }

    /// The last `n` nodes, if the block holds at least `n` nodes after its label.
    pub fn tail(&self, n: usize) -> Option<&[Node]> {
        if self.body.len() < n + 1 {
            return None;
        }
        Some(&self.body[self.body.len() - n..])
    }

    /// Target of the final unconditional `goto`.
    pub fn goto_target(&self) -> Option<LabelId> {
        match self.body.last() {
            Some(Node::Goto(target)) => Some(*target),
            _ => None,
        }
    }

    /// Whether the block is `[Label, <n nodes>, Goto]` and nothing else.
    pub fn is_single(&self, n: usize) -> bool {
        self.body.len() == n + 2 && self.goto_target().is_some()
    }

    /// Check the block shape required between partitioning and flattening.
    pub fn check(&self) -> Result<(), DecompileError> {
        if self.entry_label().is_none() {
            return Err(DecompileError::Invariant(
                "basic block has to start with a label".to_string(),
            ));
        }
        match self.body.last() {
            Some(node) if node.is_unconditional() || node.is_structured() => Ok(()),
            _ => Err(DecompileError::Invariant(
                "basic block has to end with unconditional control flow".to_string(),
            )),
        }
    }
}

/// The switch marker produced by the dispatch idiom, expanded into a
/// [`Switch`] by condition recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeSwitch {
    pub value: Expr,
    pub cases: Vec<(Expr, LabelId)>,
    pub default: LabelId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub is_default: bool,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub value: Expr,
    pub cases: Vec<SwitchCase>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Label(LabelId),
    Raw(Raw),
    /// A value left on the operand stack at the end of a block.
    Push(Expr),
    Assign { target: Var, value: Expr },
    Call { name: String, args: Vec<Expr> },
    /// A value popped and thrown away.
    Discard(Expr),
    Goto(LabelId),
    CondGoto { cond: Expr, target: LabelId },
    /// Enter the instances of `env`; jump to `skip` when there are none.
    PushEnv { env: Expr, skip: LabelId },
    /// Jump back to `back` for the next instance, else fall through.
    PopEnv { back: LabelId },
    FakeSwitch(FakeSwitch),
    Return(Expr),
    Exit,
    Break,
    Continue,
    BasicBlock(BasicBlock),
    Block(Block),
    Condition {
        cond: Expr,
        then_block: Block,
        else_block: Block,
    },
    /// `cond == None` loops forever.
    While { cond: Option<Expr>, body: Block },
    Switch(Switch),
    /// `end` is the label that finishes one iteration of the body, if any.
    With {
        env: Expr,
        body: Block,
        end: Option<LabelId>,
    },
}

impl Node {
    pub fn raw(offset: u32, op: RawOp) -> Self {
        Node::Raw(Raw { offset, op })
    }

    pub fn as_raw(&self) -> Option<&RawOp> {
        match self {
            Node::Raw(raw) => Some(&raw.op),
            _ => None,
        }
    }

    /// Control never falls through this node.
    pub fn is_unconditional(&self) -> bool {
        matches!(
            self,
            Node::Goto(_)
                | Node::Return(_)
                | Node::Exit
                | Node::Break
                | Node::Continue
                | Node::Raw(Raw {
                    op: RawOp::Ret,
                    ..
                })
        )
    }

    /// A branch that may or may not be taken.
    pub fn is_conditional_branch(&self) -> bool {
        match self {
            Node::CondGoto { .. }
            | Node::PushEnv { .. }
            | Node::PopEnv { .. }
            | Node::FakeSwitch(_) => true,
            Node::Raw(raw) => matches!(
                raw.op,
                RawOp::Bt(_)
                    | RawOp::Bf(_)
                    | RawOp::PushEnv(_)
                    | RawOp::PopEnv(_)
                    | RawOp::SwitchDispatch { .. }
            ),
            _ => false,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            Node::Condition { .. }
                | Node::While { .. }
                | Node::Switch(_)
                | Node::With { .. }
                | Node::Block(_)
        )
    }

    /// Labels this node itself may transfer control to.
    pub fn branch_targets(&self) -> Vec<LabelId> {
        match self {
            Node::Goto(target) => vec![*target],
            Node::CondGoto { target, .. } => vec![*target],
            Node::PushEnv { skip, .. } => vec![*skip],
            Node::PopEnv { back } => vec![*back],
            Node::FakeSwitch(fs) => fs
                .cases
                .iter()
                .map(|(_, l)| *l)
                .chain(std::iter::once(fs.default))
                .collect(),
            Node::Raw(raw) => match &raw.op {
                RawOp::Bt(l) | RawOp::Bf(l) | RawOp::PushEnv(l) | RawOp::PopEnv(l) => vec![*l],
                RawOp::SwitchDispatch { cases, default } => cases
                    .iter()
                    .map(|(_, l)| *l)
                    .chain(std::iter::once(*default))
                    .collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Immediate child blocks of structured nodes.
    pub fn child_blocks(&self) -> Vec<&Block> {
        match self {
            Node::Block(block) => vec![block],
            Node::Condition {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Node::While { body, .. } | Node::With { body, .. } => vec![body],
            Node::Switch(sw) => sw.cases.iter().map(|c| &c.body).collect(),
            _ => Vec::new(),
        }
    }

    pub fn child_blocks_mut(&mut self) -> Vec<&mut Block> {
        match self {
            Node::Block(block) => vec![block],
            Node::Condition {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Node::While { body, .. } | Node::With { body, .. } => vec![body],
            Node::Switch(sw) => sw.cases.iter_mut().map(|c| &mut c.body).collect(),
            _ => Vec::new(),
        }
    }

    /// Visit every branch target in this node and everything nested in it,
    /// including block entry markers.
    pub fn visit_targets(&self, f: &mut impl FnMut(LabelId)) {
        for target in self.branch_targets() {
            f(target);
        }
        if let Node::BasicBlock(bb) = self {
            for node in &bb.body {
                node.visit_targets(f);
            }
        }
        for block in self.child_blocks() {
            if let Some(entry) = block.entry {
                f(entry);
            }
            for node in &block.body {
                node.visit_targets(f);
            }
        }
    }

    /// Visit every label defined in this node and everything nested in it.
    pub fn visit_labels(&self, f: &mut impl FnMut(LabelId)) {
        match self {
            Node::Label(id) => f(*id),
            Node::BasicBlock(bb) => {
                for node in &bb.body {
                    node.visit_labels(f);
                }
            }
            _ => {
                for block in self.child_blocks() {
                    for node in &block.body {
                        node.visit_labels(f);
                    }
                }
            }
        }
    }

    /// Visit every expression directly held by this node (not nested blocks).
    pub fn for_each_expr_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match self {
            Node::Push(e) | Node::Discard(e) | Node::Return(e) => f(e),
            Node::Assign { target, value } => {
                target.for_each_expr_mut(f);
                f(value);
            }
            Node::Call { args, .. } => args.iter_mut().for_each(f),
            Node::CondGoto { cond, .. } => f(cond),
            Node::PushEnv { env, .. } | Node::With { env, .. } => f(env),
            Node::FakeSwitch(fs) => {
                f(&mut fs.value);
                for (value, _) in &mut fs.cases {
                    f(value);
                }
            }
            Node::Condition { cond, .. } => f(cond),
            Node::While { cond: Some(cond), .. } => f(cond),
            Node::Switch(sw) => {
                f(&mut sw.value);
                for case in &mut sw.cases {
                    case.values.iter_mut().for_each(&mut *f);
                }
            }
            _ => {}
        }
    }

    /// Count nodes matching `pred` in this subtree.
    pub fn count(&self, pred: &impl Fn(&Node) -> bool) -> usize {
        let own = pred(self) as usize;
        let nested: usize = match self {
            Node::BasicBlock(bb) => bb.body.iter().map(|n| n.count(pred)).sum(),
            _ => self
                .child_blocks()
                .iter()
                .flat_map(|b| b.body.iter())
                .map(|n| n.count(pred))
                .sum(),
        };
        own + nested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_requires_label_and_terminal() {
        let mut bb = BasicBlock::new(LabelId(0));
        bb.body.push(Node::Discard(Expr::int(1)));
        let err = bb.check().unwrap_err();
        assert_eq!(
            err.to_string(),
            "basic block has to end with unconditional control flow"
        );

        bb.body.push(Node::Exit);
        assert!(bb.check().is_ok());

        bb.body.remove(0);
        assert_eq!(
            bb.check().unwrap_err().to_string(),
            "basic block has to start with a label"
        );
    }

    #[test]
    fn test_visit_targets_includes_nested() {
        let node = Node::While {
            cond: None,
            body: Block::new(
                Some(LabelId(1)),
                vec![Node::BasicBlock(BasicBlock {
                    entry_depth: 0,
                    body: vec![
                        Node::Label(LabelId(1)),
                        Node::CondGoto {
                            cond: Expr::int(1),
                            target: LabelId(2),
                        },
                        Node::Goto(LabelId(1)),
                    ],
                })],
            ),
        };
        let mut targets = Vec::new();
        node.visit_targets(&mut |l| targets.push(l));
        assert_eq!(targets, vec![LabelId(1), LabelId(2), LabelId(1)]);

        let mut labels = Vec::new();
        node.visit_labels(&mut |l| labels.push(l));
        assert_eq!(labels, vec![LabelId(1)]);
    }

    #[test]
    fn test_dup_stack_effect() {
        assert_eq!(RawOp::Dup(0).stack_effect(), Some((1, 2)));
        assert_eq!(RawOp::Dup(1).stack_effect(), Some((2, 4)));
        assert_eq!(RawOp::Dup(3).stack_effect(), None);
    }
}

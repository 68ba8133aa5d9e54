use quill_bytecode::error::DecodeError;
use thiserror::Error;

use crate::node::Node;

/// Errors that end the decompilation of one unit.
///
/// Stack discipline errors carry the statements built so far so the caller
/// can print a best-effort result.
#[derive(Debug, Error)]
pub enum DecompileError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("stack underflow at offset {offset} (`{instruction}`): needs {needed} value(s), {available} available")]
    StackUnderflow {
        offset: u32,
        instruction: String,
        needed: usize,
        available: usize,
        partial: Vec<Node>,
    },

    #[error("dup at offset {offset} has unsupported extra flag {extra}")]
    DupArity {
        offset: u32,
        extra: u16,
        partial: Vec<Node>,
    },

    #[error("unbalanced environment: {open} scope push(es) still open at end of function")]
    UnbalancedEnvironment { open: usize, partial: Vec<Node> },

    #[error("popenv at offset {offset} has no matching pushenv")]
    UnmatchedPopEnv { offset: u32, partial: Vec<Node> },

    #[error("inconsistent stack depth at {label}: {expected} vs {found}")]
    InconsistentStack {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("{0}")]
    Invariant(String),

    #[error("optimizer did not settle after {sweeps} sweeps")]
    FixpointExceeded { sweeps: usize },
}

impl DecompileError {
    /// Statements built before the failure, if the error carries them.
    pub fn partial(&self) -> Option<&[Node]> {
        match self {
            DecompileError::StackUnderflow { partial, .. }
            | DecompileError::DupArity { partial, .. }
            | DecompileError::UnbalancedEnvironment { partial, .. }
            | DecompileError::UnmatchedPopEnv { partial, .. } => Some(partial),
            _ => None,
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        DecompileError::Invariant(message.into())
    }
}

/// Remove `item` from `set`, failing when it is not there.
///
/// Structural passes claim each block exactly once; a missing element means
/// a block was claimed twice.
pub fn remove_or_err<T: std::hash::Hash + Eq + std::fmt::Debug>(
    set: &mut rustc_hash::FxHashSet<T>,
    item: &T,
) -> Result<(), DecompileError> {
    if set.remove(item) {
        Ok(())
    } else {
        Err(DecompileError::invariant(format!(
            "{:?} is not in the scope it is removed from",
            item
        )))
    }
}

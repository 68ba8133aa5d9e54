//! Peephole optimizer: a library of block rewrite rules run to a bounded
//! fixpoint, first over raw blocks and then over simulated ones.

pub mod label_map;
pub mod rewrite;
pub mod rules;

use quill_ast::diag::Diagnostics;
use quill_ast::error::DecompileError;
use quill_ast::label::LabelArena;
use quill_ast::node::BasicBlock;

pub use label_map::LabelMap;
pub use rewrite::{Rewrite, Rule, RuleCtx};

/// Rewrite the stack-carrying idioms (counted loops, switch dispatch)
/// before stack simulation.
pub fn optimize_raw(
    blocks: &mut Vec<BasicBlock>,
    labels: &mut LabelArena,
    diags: &mut Diagnostics,
    max_sweeps: usize,
) -> Result<usize, DecompileError> {
    rewrite::run_fixpoint(blocks, rules::RAW_RULES, labels, diags, max_sweeps)
}

/// Run the expression-level rules to a fixpoint.
pub fn optimize(
    blocks: &mut Vec<BasicBlock>,
    labels: &mut LabelArena,
    diags: &mut Diagnostics,
    max_sweeps: usize,
) -> Result<usize, DecompileError> {
    rewrite::run_fixpoint(blocks, rules::EXPR_RULES, labels, diags, max_sweeps)
}

#[cfg(test)]
pub(crate) mod testing {
    use quill_ast::diag::Diagnostics;
    use quill_ast::label::LabelArena;
    use quill_ast::node::BasicBlock;
    use quill_ast::options::DEFAULT_MAX_SWEEPS;
    use quill_bytecode::decode;
    use quill_bytecode::module::BinaryModule;

    fn module(strings: &[&str]) -> BinaryModule {
        BinaryModule::new(strings.iter().map(|s| s.to_string()).collect(), vec![])
    }

    /// Decode, lower and partition.
    pub fn lift_raw(code: &[u8], strings: &[&str]) -> (Vec<BasicBlock>, LabelArena, Diagnostics) {
        let set = decode(code, &module(strings)).unwrap();
        let mut labels = LabelArena::from_table(&set.labels);
        let nodes = quill_lift::lower(&set).unwrap();
        let blocks = quill_lift::partition(nodes, &mut labels).unwrap();
        (blocks, labels, Diagnostics::new("test"))
    }

    pub fn run_raw(blocks: &mut Vec<BasicBlock>, labels: &mut LabelArena, diags: &mut Diagnostics) {
        super::optimize_raw(blocks, labels, diags, DEFAULT_MAX_SWEEPS).unwrap();
    }

    /// The whole lift: raw idioms, simulation and the expression rules.
    pub fn lift(code: &[u8], strings: &[&str]) -> (Vec<BasicBlock>, LabelArena, Diagnostics) {
        let (mut blocks, mut labels, mut diags) = lift_raw(code, strings);
        run_raw(&mut blocks, &mut labels, &mut diags);
        let mut blocks = quill_lift::simulate(blocks, &module(strings), &labels).unwrap();
        super::optimize(&mut blocks, &mut labels, &mut diags, DEFAULT_MAX_SWEEPS).unwrap();
        (blocks, labels, diags)
    }
}

//! Tree types shared by every pipeline stage: expressions, nodes, labels,
//! plus the diagnostics, errors, options and timing the stages report through.

pub mod diag;
pub mod error;
pub mod expr;
pub mod label;
pub mod node;
pub mod options;
pub mod timing;
pub mod types;

pub use quill_bytecode::constant::Constant;
pub use quill_bytecode::label::LabelId;

//! From decoded instructions to simulated basic blocks.
//!
//! [`lower`] and [`partition`] produce raw blocks; the stack-carrying idioms
//! are rewritten on those before [`simulate`] builds expression trees.

pub mod blocks;
pub mod lower;
pub mod simulate;

pub use blocks::partition;
pub use lower::lower;
pub use simulate::simulate;

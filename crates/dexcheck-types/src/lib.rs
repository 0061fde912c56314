//! Register types
//!
//! The lattice of values a register may hold during verification, the
//! interning table that owns every lattice element, and the program-model
//! oracle that answers class, field and method questions.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::arithmetic_side_effects)]

mod lattice;
mod pool;
mod program;
mod reg_type;
mod table;
mod tests;

pub use lattice::*;
pub use pool::*;
pub use program::*;
pub use reg_type::*;
pub use table::*;

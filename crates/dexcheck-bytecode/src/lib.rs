//! Method bodies
//!
//! Defines the in-memory form of a register-based method body as it is
//! handed to the verifier: opcodes and their control-flow metadata,
//! instructions, labels, try/catch ranges and the declaring method's
//! signature.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::arithmetic_side_effects)]

extern crate alloc;

mod builder;
mod descriptor;
mod flags;
mod instruction;
mod label;
mod method;
mod opcode;
mod tests;

pub use builder::*;
pub use descriptor::*;
pub use flags::*;
pub use instruction::*;
pub use label::*;
pub use method::*;
pub use opcode::*;

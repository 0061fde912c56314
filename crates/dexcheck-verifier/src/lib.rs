//! Method verification
//!
//! Checks register-based method bytecode for type safety by abstract
//! interpretation. Every register is tracked through a
//! [`TypeLattice`](dexcheck_types::TypeLattice) until the states at every
//! join point stop changing, and each instruction is checked against the
//! types it reads.
//!
//! A method either fails hard, which rejects it, or passes with zero or
//! more soft failures that the runtime must recheck.
//!
//! The pass runs in three stages:
//! - [`normalize`] collapses adjacent labels so every join point has one
//!   canonical label.
//! - [`InstructionIndex`] records try coverage and branch targets.
//! - The engine iterates transfer functions to a fixed point, storing a
//!   [`RegisterState`] at each branch target.

#![warn(missing_docs)]

mod engine;
mod error;
mod index;
mod normalize;
mod shape;
mod state;
mod tests;
mod verifier;

pub use error::*;
pub use index::*;
pub use normalize::*;
pub use shape::MAX_LIST_ARGS;
pub use state::*;
pub use verifier::{VerifiedMethod, Verifier};

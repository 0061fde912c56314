use alloc::{string::String, vec::Vec};
use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::{FieldRef, LabelId, MethodRef, Opcode, TypeDesc};

/// A register number.
pub type Reg = u16;

/// The constant operand of a [`Instruction::Const`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// A 32-bit literal (`const`, `*/lit8`, `*/lit16`).
    Int(i32),
    /// A 64-bit literal (`const-wide`).
    Wide(i64),
    /// A string pool entry.
    String(String),
    /// A type pool entry.
    Type(TypeDesc),
    /// A field pool entry.
    Field(FieldRef),
    /// A method pool entry.
    Method(MethodRef),
    /// A `fill-array-data` payload: element width in bytes and element count.
    ArrayData {
        /// Width of each element in bytes.
        width: u8,
        /// Number of elements.
        len: u32,
    },
}

impl Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "#{v}"),
            Self::Wide(v) => write!(f, "#{v}L"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Type(t) => write!(f, "{t}"),
            Self::Field(fr) => write!(f, "{fr}"),
            Self::Method(m) => write!(f, "{m}"),
            Self::ArrayData { width, len } => write!(f, "array-data[{len} x {width}]"),
        }
    }
}

/// An instruction of a method body.
///
/// Register operands are listed in the order the opcode defines them:
/// destination (or stored value) first, then sources. `invoke-*` and
/// `filled-new-array*` list their argument registers in call order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Places a label at this program point.
    Label(LabelId),
    /// An opcode with register operands only.
    Simple {
        /// The opcode
        op: Opcode,
        /// Register operands
        regs: Vec<Reg>,
    },
    /// An opcode with register operands and one constant operand.
    Const {
        /// The opcode
        op: Opcode,
        /// Register operands
        regs: Vec<Reg>,
        /// Constant operand
        constant: Constant,
    },
    /// A branch with a single target label.
    Target {
        /// The opcode
        op: Opcode,
        /// Register operands
        regs: Vec<Reg>,
        /// Branch target
        target: LabelId,
    },
    /// A multi-way branch.
    Switch {
        /// The opcode
        op: Opcode,
        /// Register operands
        regs: Vec<Reg>,
        /// Case keys, parallel to `targets`
        keys: Vec<i32>,
        /// Case labels, parallel to `keys`
        targets: Vec<LabelId>,
    },
}

impl Instruction {
    /// Creates an [`Instruction::Simple`].
    pub fn simple(op: Opcode, regs: &[Reg]) -> Self {
        Self::Simple {
            op,
            regs: regs.to_vec(),
        }
    }

    /// Creates an [`Instruction::Const`].
    pub fn constant(op: Opcode, regs: &[Reg], constant: Constant) -> Self {
        Self::Const {
            op,
            regs: regs.to_vec(),
            constant,
        }
    }

    /// Creates an [`Instruction::Target`].
    pub fn target(op: Opcode, regs: &[Reg], target: LabelId) -> Self {
        Self::Target {
            op,
            regs: regs.to_vec(),
            target,
        }
    }

    /// The opcode, or `None` for a label marker.
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Self::Label(_) => None,
            Self::Simple { op, .. }
            | Self::Const { op, .. }
            | Self::Target { op, .. }
            | Self::Switch { op, .. } => Some(*op),
        }
    }

    /// The register operands.
    pub fn regs(&self) -> &[Reg] {
        match self {
            Self::Label(_) => &[],
            Self::Simple { regs, .. }
            | Self::Const { regs, .. }
            | Self::Target { regs, .. }
            | Self::Switch { regs, .. } => regs,
        }
    }

    /// The placed label if this is a label marker.
    pub fn as_label(&self) -> Option<LabelId> {
        match self {
            Self::Label(l) => Some(*l),
            _ => None,
        }
    }

    /// The constant operand, if any.
    pub fn constant_operand(&self) -> Option<&Constant> {
        match self {
            Self::Const { constant, .. } => Some(constant),
            _ => None,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn regs(f: &mut fmt::Formatter<'_>, regs: &[Reg]) -> fmt::Result {
            for (i, r) in regs.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, " v{r}")?;
            }
            Ok(())
        }

        match self {
            Self::Label(l) => write!(f, "{l}"),
            Self::Simple { op, regs: r } => {
                write!(f, "{op}")?;
                regs(f, r)
            }
            Self::Const {
                op,
                regs: r,
                constant,
            } => {
                write!(f, "{op}")?;
                regs(f, r)?;
                write!(f, ", {constant}")
            }
            Self::Target { op, regs: r, target } => {
                write!(f, "{op}")?;
                regs(f, r)?;
                if !r.is_empty() {
                    f.write_str(",")?;
                }
                write!(f, " {target}")
            }
            Self::Switch {
                op,
                regs: r,
                keys,
                targets,
            } => {
                write!(f, "{op}")?;
                regs(f, r)?;
                f.write_str(", {")?;
                for (i, (k, t)) in keys.iter().zip(targets).enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {k} -> {t}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

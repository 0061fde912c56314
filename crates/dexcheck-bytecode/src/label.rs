use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Labels are branch targets, try-range bounds and line-number anchors.
///
/// A label is a small integer naming a slot in its method body's label
/// table; it carries no address of its own. The address of a label is the
/// position of the [`Instruction::Label`](crate::Instruction::Label) marker
/// that places it.
#[derive(Copy, Clone, Debug, Default, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelId(pub u32);

impl LabelId {
    /// Returns the label table slot as an index.
    pub fn index(self) -> usize {
        // u32 always fits in usize on supported targets.
        self.0 as usize
    }
}

impl Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":L{}", self.0)
    }
}

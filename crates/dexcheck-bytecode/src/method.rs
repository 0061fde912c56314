use alloc::{string::String, vec::Vec};
use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::{AccessFlags, Instruction, LabelId, Proto, TypeDesc};

/// One typed handler of a [`TryCatchRange`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CatchHandler {
    /// The caught exception class.
    pub exception: TypeDesc,
    /// Where the handler starts.
    pub label: LabelId,
}

/// A contiguous span of protected instructions and its handlers.
///
/// The span covers every instruction from the `start` marker up to, but
/// not including, the `end` marker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TryCatchRange {
    /// First protected program point.
    pub start: LabelId,
    /// First program point after the protected span.
    pub end: LabelId,
    /// Typed handlers, in match order.
    pub handlers: Vec<CatchHandler>,
    /// Handler for any exception not matched above.
    pub catch_all: Option<LabelId>,
}

impl TryCatchRange {
    /// Every handler label including the catch-all.
    pub fn handler_labels(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.handlers
            .iter()
            .map(|h| h.label)
            .chain(self.catch_all)
    }
}

/// Associates a source line with a program point.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LineNumber {
    /// The program point.
    pub label: LabelId,
    /// Source line.
    pub line: u32,
}

/// A method body: instructions plus the metadata that refers into them.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    /// Instructions, including label markers.
    pub instructions: Vec<Instruction>,
    /// Try/catch ranges.
    pub try_ranges: Vec<TryCatchRange>,
    /// Line-number anchors.
    pub line_numbers: Vec<LineNumber>,
    /// Size of the label table. Every [`LabelId`] used in this body is
    /// below this bound.
    pub label_count: u32,
}

impl MethodBody {
    /// Creates an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh, unplaced label.
    pub fn new_label(&mut self) -> LabelId {
        let l = LabelId(self.label_count);
        self.label_count = self.label_count.saturating_add(1);
        l
    }

    /// Number of non-label instructions.
    pub fn op_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| !matches!(i, Instruction::Label(_)))
            .count()
    }
}

/// The method under verification.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Method {
    /// Declaring class.
    pub class: TypeDesc,
    /// Method name.
    pub name: String,
    /// Declared prototype.
    pub proto: Proto,
    /// Access flags.
    pub flags: AccessFlags,
    /// Number of local (non-argument) registers.
    pub locals: u16,
    /// Number of argument registers, including the receiver.
    pub ins: u16,
    /// The code.
    pub body: MethodBody,
}

impl Method {
    /// Creates a method whose argument register count is derived from its
    /// prototype and flags.
    pub fn new(
        class: impl Into<TypeDesc>,
        name: &str,
        proto: Proto,
        flags: AccessFlags,
        locals: u16,
        body: MethodBody,
    ) -> Self {
        let mut m = Self {
            class: class.into(),
            name: String::from(name),
            proto,
            flags,
            locals,
            ins: 0,
            body,
        };
        m.ins = u16::try_from(m.expected_ins()).unwrap_or(u16::MAX);
        m
    }

    /// `static`
    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    /// `<init>`
    pub fn is_constructor(&self) -> bool {
        !self.is_static() && self.name == "<init>"
    }

    /// `<clinit>`
    pub fn is_class_initializer(&self) -> bool {
        self.is_static() && self.name == "<clinit>"
    }

    /// The argument register count implied by the prototype.
    pub fn expected_ins(&self) -> usize {
        let receiver = usize::from(!self.is_static());
        self.proto.arg_slots().saturating_add(receiver)
    }

    /// Total register count.
    pub fn registers(&self) -> usize {
        usize::from(self.locals).saturating_add(usize::from(self.ins))
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.proto)
    }
}

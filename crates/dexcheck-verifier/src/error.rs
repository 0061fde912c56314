use core::fmt;

use buggy::Bug;

/// Whether a failure rejects the method or only flags it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Severity {
    /// The method can never be loaded.
    Hard,
    /// The method is accepted but must run with runtime rechecks.
    Soft,
}

/// The kinds of verification failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyErrorKind {
    /// A type-safety violation.
    #[error("bad class (hard)")]
    BadClassHard,
    /// A type-safety violation the runtime can recheck, such as an
    /// unresolvable array component type.
    #[error("bad class (soft)")]
    BadClassSoft,
    /// A class could not be resolved.
    #[error("no class")]
    NoClass,
    /// A field could not be resolved.
    #[error("no field")]
    NoField,
    /// A method could not be resolved.
    #[error("no method")]
    NoMethod,
    /// An inaccessible class.
    #[error("illegal class access")]
    AccessClass,
    /// A private field accessed from another class, or a final field
    /// written outside its class.
    #[error("illegal field access")]
    AccessField,
    /// A private method called from another class.
    #[error("illegal method access")]
    AccessMethod,
    /// An interface used as a class, a static member used as an instance
    /// member, or the reverse.
    #[error("class change")]
    ClassChange,
    /// An interface, abstract class, array or primitive passed to
    /// `new-instance`.
    #[error("instantiation")]
    Instantiation,
    /// Unbalanced monitor-enter and monitor-exit.
    #[error("locking")]
    Locking,
    /// The configured instruction-visit budget ran out.
    #[error("visit budget exhausted")]
    VisitBudgetExhausted,
    /// An implementation bug.
    #[error("bug: {0}")]
    Bug(Bug),
}

impl VerifyErrorKind {
    /// How this kind of failure affects the method.
    pub fn severity(&self) -> Severity {
        match self {
            Self::BadClassSoft | Self::NoClass | Self::NoField | Self::NoMethod | Self::Locking => {
                Severity::Soft
            }
            Self::BadClassHard
            | Self::AccessClass
            | Self::AccessField
            | Self::AccessMethod
            | Self::ClassChange
            | Self::Instantiation
            | Self::VisitBudgetExhausted
            | Self::Bug(_) => Severity::Hard,
        }
    }
}

/// An error returned by [`Verifier::verify`](crate::Verifier::verify), or
/// a soft failure recorded on a [`VerifiedMethod`](crate::VerifiedMethod).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub struct VerifyError {
    /// What went wrong.
    #[source]
    pub kind: VerifyErrorKind,
    /// Details.
    pub message: String,
    /// Dense index of the failing instruction, when known.
    pub pc: Option<usize>,
}

impl VerifyError {
    /// Creates a `VerifyError` with no position.
    pub fn new(kind: VerifyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pc: None,
        }
    }

    /// A [`VerifyErrorKind::BadClassHard`] error.
    pub fn hard(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorKind::BadClassHard, message)
    }

    /// How this failure affects the method.
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// Attaches `pc` unless a position is already known.
    pub(crate) fn at(mut self, pc: usize) -> Self {
        if self.pc.is_none() {
            self.pc = Some(pc);
        }
        self
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pc {
            Some(pc) => write!(f, "{} at [{pc:#x}]: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl From<Bug> for VerifyError {
    fn from(err: Bug) -> Self {
        Self::new(VerifyErrorKind::Bug(err), "internal error")
    }
}

impl From<RegisterError> for VerifyError {
    fn from(err: RegisterError) -> Self {
        Self::hard(err.to_string())
    }
}

/// A misuse of a [`RegisterState`](crate::RegisterState).
///
/// Every variant is a type-safety violation in the method being verified,
/// reported as [`VerifyErrorKind::BadClassHard`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RegisterError {
    /// A register number past the end of the frame.
    #[error("register v{reg} out of range ({count} registers)")]
    OutOfRange {
        /// The register.
        reg: usize,
        /// Registers in the frame.
        count: usize,
    },
    /// One half of a wide value written as a scalar.
    #[error("half of a wide value written alone to v{0}")]
    HalfWrite(usize),
    /// A wide write whose halves do not pair up.
    #[error("mismatched wide pair written to v{0}")]
    BadWidePair(usize),
    /// A `move-result*` with no pending result.
    #[error("no pending result")]
    NoResult,
    /// A `move-result*` whose flavor does not match the pending result.
    #[error("pending result does not match {0}")]
    ResultMismatch(&'static str),
}

use alloc::{collections::BTreeSet, vec::Vec};

use crate::{
    CatchHandler, Constant, FieldRef, Instruction, LabelId, LineNumber, MethodBody, MethodRef,
    Opcode, Reg, TryCatchRange, TypeDesc,
};

/// An error produced by [`CodeBuilder::finish`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// A label was referenced but never placed.
    #[error("label {0} was referenced but never placed")]
    UnplacedLabel(LabelId),
    /// A label was placed more than once.
    #[error("label {0} was placed more than once")]
    DuplicateLabel(LabelId),
}

/// Assembles a [`MethodBody`] without hand-allocating labels.
///
/// ```
/// use dexcheck_bytecode::{CodeBuilder, Opcode};
///
/// let mut b = CodeBuilder::new();
/// let done = b.new_label();
/// b.const_int(0, 1);
/// b.branch(Opcode::IfEqz, &[0], done);
/// b.const_int(0, 2);
/// b.place(done);
/// b.op(Opcode::ReturnVoid, &[]);
/// let body = b.finish()?;
/// assert_eq!(body.op_count(), 4);
/// # Ok::<(), dexcheck_bytecode::BuildError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct CodeBuilder {
    body: MethodBody,
}

impl CodeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a label to be placed later.
    pub fn new_label(&mut self) -> LabelId {
        self.body.new_label()
    }

    /// Places `label` at the current program point.
    pub fn place(&mut self, label: LabelId) -> &mut Self {
        self.push(Instruction::Label(label))
    }

    /// Allocates a label and places it at the current program point.
    pub fn here(&mut self) -> LabelId {
        let l = self.new_label();
        self.place(l);
        l
    }

    /// Appends an instruction as-is.
    pub fn push(&mut self, instr: Instruction) -> &mut Self {
        self.body.instructions.push(instr);
        self
    }

    /// Appends an opcode with register operands only.
    pub fn op(&mut self, op: Opcode, regs: &[Reg]) -> &mut Self {
        self.push(Instruction::simple(op, regs))
    }

    /// Appends an opcode with a constant operand.
    pub fn op_const(&mut self, op: Opcode, regs: &[Reg], constant: Constant) -> &mut Self {
        self.push(Instruction::constant(op, regs, constant))
    }

    /// Appends a branch.
    pub fn branch(&mut self, op: Opcode, regs: &[Reg], target: LabelId) -> &mut Self {
        self.push(Instruction::target(op, regs, target))
    }

    /// Appends `goto`.
    pub fn goto(&mut self, target: LabelId) -> &mut Self {
        self.branch(Opcode::Goto, &[], target)
    }

    /// Appends a switch.
    pub fn switch(
        &mut self,
        op: Opcode,
        reg: Reg,
        cases: &[(i32, LabelId)],
    ) -> &mut Self {
        self.push(Instruction::Switch {
            op,
            regs: alloc::vec![reg],
            keys: cases.iter().map(|(k, _)| *k).collect(),
            targets: cases.iter().map(|(_, t)| *t).collect(),
        })
    }

    /// Appends `const`.
    pub fn const_int(&mut self, dst: Reg, value: i32) -> &mut Self {
        self.op_const(Opcode::Const, &[dst], Constant::Int(value))
    }

    /// Appends `const-wide`.
    pub fn const_wide(&mut self, dst: Reg, value: i64) -> &mut Self {
        self.op_const(Opcode::ConstWide, &[dst], Constant::Wide(value))
    }

    /// Appends an opcode whose constant is a type.
    pub fn op_type(&mut self, op: Opcode, regs: &[Reg], ty: impl Into<TypeDesc>) -> &mut Self {
        self.op_const(op, regs, Constant::Type(ty.into()))
    }

    /// Appends a field access.
    pub fn op_field(&mut self, op: Opcode, regs: &[Reg], field: FieldRef) -> &mut Self {
        self.op_const(op, regs, Constant::Field(field))
    }

    /// Appends an invoke.
    pub fn invoke(&mut self, op: Opcode, args: &[Reg], method: MethodRef) -> &mut Self {
        self.op_const(op, args, Constant::Method(method))
    }

    /// Declares a try range.
    pub fn try_range(
        &mut self,
        start: LabelId,
        end: LabelId,
        handlers: &[(TypeDesc, LabelId)],
        catch_all: Option<LabelId>,
    ) -> &mut Self {
        self.body.try_ranges.push(TryCatchRange {
            start,
            end,
            handlers: handlers
                .iter()
                .map(|(exception, label)| CatchHandler {
                    exception: exception.clone(),
                    label: *label,
                })
                .collect(),
            catch_all,
        });
        self
    }

    /// Anchors a source line at `label`.
    pub fn line(&mut self, label: LabelId, line: u32) -> &mut Self {
        self.body.line_numbers.push(LineNumber { label, line });
        self
    }

    /// Checks that every referenced label is placed exactly once and returns
    /// the body.
    pub fn finish(self) -> Result<MethodBody, BuildError> {
        let mut placed = BTreeSet::new();
        for instr in &self.body.instructions {
            if let Instruction::Label(l) = instr {
                if !placed.insert(*l) {
                    return Err(BuildError::DuplicateLabel(*l));
                }
            }
        }

        let mut referenced: Vec<LabelId> = Vec::new();
        for instr in &self.body.instructions {
            match instr {
                Instruction::Target { target, .. } => referenced.push(*target),
                Instruction::Switch { targets, .. } => referenced.extend(targets),
                _ => {}
            }
        }
        for range in &self.body.try_ranges {
            referenced.push(range.start);
            referenced.push(range.end);
            referenced.extend(range.handler_labels());
        }
        referenced.extend(self.body.line_numbers.iter().map(|l| l.label));

        if let Some(l) = referenced.into_iter().find(|l| !placed.contains(l)) {
            return Err(BuildError::UnplacedLabel(l));
        }
        Ok(self.body)
    }

    /// Returns the body without checking label placement.
    pub fn finish_unchecked(self) -> MethodBody {
        self.body
    }
}

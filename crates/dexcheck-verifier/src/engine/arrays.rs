//! `aget*` and `aput*`.

use dexcheck_bytecode::{Opcode, Reg};
use dexcheck_types::{RegType, RegTypeKind};

use super::{Engine, hard, operands, primitive_compatible};
use crate::{VerifyError, VerifyErrorKind};

/// The element type named by an array opcode. `None` for the object forms.
fn element(op: Opcode) -> Option<RegType> {
    use Opcode as O;
    match op {
        O::Aget | O::Aput => Some(RegType::INTEGER),
        O::AgetWide | O::AputWide => Some(RegType::LONG_LO),
        O::AgetBoolean | O::AputBoolean => Some(RegType::BOOLEAN),
        O::AgetByte | O::AputByte => Some(RegType::BYTE),
        O::AgetChar | O::AputChar => Some(RegType::CHAR),
        O::AgetShort | O::AputShort => Some(RegType::SHORT),
        _ => None,
    }
}

impl Engine<'_> {
    fn check_index(&mut self, index: usize) -> Result<(), VerifyError> {
        let ty = self.get(index)?;
        if !self.lattice.kind(ty).is_integral_types() {
            return hard(format!("array index in v{index} has type {}", self.show(ty)));
        }
        Ok(())
    }

    pub(super) fn op_aget(&mut self, op: Opcode, regs: &[Reg]) -> Result<(), VerifyError> {
        let [dst, array, index] = operands(regs)?;
        let lattice = self.lattice;
        let insn = element(op);
        self.check_index(index)?;

        let array_ty = self.get(array)?;
        let ak = lattice.kind(array_ty);
        if ak.is_zero() {
            // Always throws at runtime; pick a type that merges cleanly.
            return match insn {
                None => self.set(dst, RegType::ZERO),
                Some(RegType::INTEGER) => {
                    let one = lattice.constant(1, self.config.precise_constants);
                    self.set(dst, one)
                }
                Some(RegType::LONG_LO) => self.set(dst, RegType::CONSTANT_LO),
                Some(ty) => self.set(dst, ty),
            };
        }
        if matches!(ak, RegTypeKind::UnresolvedMerged) {
            if insn.is_some() {
                return hard(format!("{op} on unresolved array type"));
            }
            self.soft(
                VerifyErrorKind::NoClass,
                format!("cannot verify {op} on unresolved array type"),
            )?;
            return self.set(dst, lattice.object());
        }
        if !lattice.is_array_types(array_ty) {
            return hard(format!("{op} on non-array {}", self.show(array_ty)));
        }

        let component = lattice.component_type(array_ty);
        let ck = lattice.kind(component);
        match insn {
            None if !ck.is_reference_types() => hard(format!(
                "aget-object on primitive array {}",
                self.show(array_ty)
            )),
            None => self.set(dst, component),
            Some(_) if ck.is_non_zero_reference_types() => hard(format!(
                "{op} on reference array {}",
                self.show(array_ty)
            )),
            Some(ty) if !primitive_compatible(ty, ck) => hard(format!(
                "{op} incompatible with array {}",
                self.show(array_ty)
            )),
            // The component is more precise than the instruction, which
            // cannot tell ints from floats or longs from doubles.
            Some(_) => self.set(dst, component),
        }
    }

    pub(super) fn op_aput(&mut self, op: Opcode, regs: &[Reg]) -> Result<(), VerifyError> {
        let [value, array, index] = operands(regs)?;
        let lattice = self.lattice;
        let insn = element(op);
        self.check_index(index)?;

        let array_ty = self.get(array)?;
        let ak = lattice.kind(array_ty);
        if ak.is_zero() {
            // Always throws at runtime; the value must still fit the
            // instruction.
            let expected = match insn {
                None => lattice.object(),
                Some(RegType::INTEGER) if self.kind(value)? == RegTypeKind::Float => RegType::FLOAT,
                Some(RegType::LONG_LO) if self.kind(value)? == RegTypeKind::DoubleLo => {
                    RegType::DOUBLE_LO
                }
                Some(ty) => ty,
            };
            return self.expect_type(value, expected);
        }
        if matches!(ak, RegTypeKind::UnresolvedMerged) {
            if insn.is_some() {
                return hard(format!("{op} on unresolved array type"));
            }
            return self.soft(
                VerifyErrorKind::NoClass,
                format!("cannot verify {op} on unresolved array type"),
            );
        }
        if !lattice.is_array_types(array_ty) {
            return hard(format!("{op} on non-array {}", self.show(array_ty)));
        }

        let component = lattice.component_type(array_ty);
        let ck = lattice.kind(component);
        let Some(insn) = insn else {
            if !ck.is_reference_types() {
                return hard(format!(
                    "aput-object on primitive array {}",
                    self.show(array_ty)
                ));
            }
            // Stores are rechecked at runtime, so only the value's
            // referenceness is certain here.
            self.expect(value, lattice.object())?;
            let stored = self.get(value)?;
            if !lattice.is_assignable_from(component, stored) {
                self.soft(
                    VerifyErrorKind::BadClassSoft,
                    format!(
                        "aput-object of {} into {}",
                        self.show(stored),
                        self.show(array_ty)
                    ),
                )?;
            }
            return Ok(());
        };

        if !primitive_compatible(insn, ck) {
            return hard(format!(
                "{op} incompatible with array {}",
                self.show(array_ty)
            ));
        }
        let vk = self.kind(value)?;
        let value_ok = match ck {
            RegTypeKind::Float => vk.is_float_types(),
            RegTypeKind::LongLo | RegTypeKind::DoubleLo => {
                return self.expect_wide(value, component);
            }
            _ => vk.is_integral_types(),
        };
        if !value_ok {
            return hard(format!(
                "{op} value v{value} of {} does not fit array {}",
                self.show(self.get(value)?),
                self.show(array_ty)
            ));
        }
        Ok(())
    }
}

//! Allocation, casts and whole-array operations.

use buggy::{BugExt as _, bug};
use dexcheck_bytecode::{Constant, DescKind, Opcode, Reg, TypeDesc};
use dexcheck_types::RegType;

use super::{Engine, hard, operands};
use crate::{VerifyError, VerifyErrorKind};

/// Element width in bytes of a primitive array, as used by
/// `fill-array-data`.
fn element_width(kind: DescKind) -> Option<u8> {
    match kind {
        DescKind::Boolean | DescKind::Byte => Some(1),
        DescKind::Char | DescKind::Short => Some(2),
        DescKind::Int | DescKind::Float => Some(4),
        DescKind::Long | DescKind::Double => Some(8),
        DescKind::Void | DescKind::Class | DescKind::Array => None,
    }
}

impl Engine<'_> {
    /// `check-cast` and `instance-of`.
    pub(super) fn op_type_check(
        &mut self,
        op: Opcode,
        regs: &[Reg],
        desc: &TypeDesc,
    ) -> Result<(), VerifyError> {
        let lattice = self.lattice;
        if !desc.is_reference() {
            return hard(format!("{op} on non-reference type {desc}"));
        }
        self.check_class_access(desc)?;
        let cast = lattice.reference(desc, false);

        let (dst, src) = if op == Opcode::CheckCast {
            let [obj] = operands(regs)?;
            (obj, obj)
        } else {
            let [dst, src] = operands(regs)?;
            (dst, src)
        };
        let ty = self.get(src)?;
        let k = lattice.kind(ty);
        if !k.is_reference_types() {
            return hard(format!("{op} on non-reference v{src} of {}", self.show(ty)));
        }
        if k.is_uninitialized_types() {
            return hard(format!("{op} on uninitialized reference in v{src}"));
        }

        if op == Opcode::CheckCast {
            self.set(dst, cast)
        } else {
            self.set(dst, RegType::BOOLEAN)
        }
    }

    pub(super) fn op_array_length(&mut self, regs: &[Reg]) -> Result<(), VerifyError> {
        let [dst, array] = operands(regs)?;
        let ty = self.get(array)?;
        if !(self.lattice.kind(ty).is_zero() || self.lattice.is_array_types(ty)) {
            return hard(format!("array-length on non-array {}", self.show(ty)));
        }
        self.set(dst, RegType::INTEGER)
    }

    /// `new-instance` yields an uninitialized object tagged with this
    /// instruction. Any copy left over from an earlier pass through the same
    /// instruction is invalidated first.
    pub(super) fn op_new_instance(&mut self, regs: &[Reg], desc: &TypeDesc) -> Result<(), VerifyError> {
        let [dst] = operands(regs)?;
        let lattice = self.lattice;
        if desc.kind() != Some(DescKind::Class) {
            return Err(VerifyError::new(
                VerifyErrorKind::Instantiation,
                format!("new-instance on non-class type {desc}"),
            ));
        }
        self.check_class_access(desc)?;
        match lattice.program().class(desc) {
            None => {
                self.soft(
                    VerifyErrorKind::NoClass,
                    format!("unable to resolve class {desc}"),
                )?;
            }
            Some(class) if class.is_interface() || class.is_abstract() => {
                return Err(VerifyError::new(
                    VerifyErrorKind::Instantiation,
                    format!("new-instance on interface or abstract class {desc}"),
                ));
            }
            Some(_) => {}
        }

        let alloc_pc = u32::try_from(self.pc)
            .ok()
            .assume("instruction index must fit in u32")?;
        let uninit = lattice.uninitialized(lattice.reference(desc, true), alloc_pc);
        self.work.invalidate_refs(uninit);
        self.set(dst, uninit)
    }

    pub(super) fn op_new_array(&mut self, regs: &[Reg], desc: &TypeDesc) -> Result<(), VerifyError> {
        let [dst, size] = operands(regs)?;
        if !desc.is_array() {
            return hard(format!("new-array on non-array type {desc}"));
        }
        self.check_class_access(desc)?;
        self.expect(size, RegType::INTEGER)?;
        let array = self.lattice.reference(desc, true);
        self.set(dst, array)
    }

    /// `filled-new-array` builds an `int` or reference array from its
    /// argument registers and leaves it as the pending result.
    pub(super) fn op_filled_new_array(
        &mut self,
        regs: &[Reg],
        desc: &TypeDesc,
    ) -> Result<(), VerifyError> {
        let lattice = self.lattice;
        let Some(component) = desc.component() else {
            return hard(format!("filled-new-array on non-array type {desc}"));
        };
        if !(component.is_reference() || component.kind() == Some(DescKind::Int)) {
            return hard(format!(
                "filled-new-array of {component} is not supported, only int or references"
            ));
        }
        self.check_class_access(desc)?;
        let expected = lattice.from_descriptor(&component, false);
        for &r in regs {
            self.expect(usize::from(r), expected)?;
        }
        let array = lattice.reference(desc, true);
        self.work.set_result(&lattice, array);
        Ok(())
    }

    pub(super) fn op_fill_array_data(
        &mut self,
        regs: &[Reg],
        constant: &Constant,
    ) -> Result<(), VerifyError> {
        let [array] = operands(regs)?;
        let Constant::ArrayData { width, .. } = constant else {
            bug!("fill-array-data without a payload");
        };
        let ty = self.get(array)?;
        if self.lattice.kind(ty).is_zero() {
            return Ok(());
        }
        if !self.lattice.is_array_types(ty) {
            return hard(format!("fill-array-data on non-array {}", self.show(ty)));
        }
        let component = self
            .lattice
            .descriptor(ty)
            .and_then(|d| d.component())
            .assume("array type must have a component")?;
        if component.is_array() || !component.is_primitive() {
            return hard(format!("fill-array-data on array of {component}"));
        }
        let expected = component.kind().and_then(element_width);
        if expected != Some(*width) {
            return hard(format!(
                "fill-array-data element width {width} does not match array of {component}"
            ));
        }
        Ok(())
    }
}

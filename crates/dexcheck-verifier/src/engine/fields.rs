//! Instance and static field access.

use dexcheck_bytecode::{FieldRef, Opcode, Reg};
use dexcheck_types::{RegType, RegTypeKind};

use super::{Engine, hard, operands, primitive_compatible};
use crate::{VerifyError, VerifyErrorKind};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct FieldOp {
    is_static: bool,
    put: bool,
    /// The primitive type named by the opcode, `None` for the object forms.
    insn: Option<RegType>,
}

fn classify(op: Opcode) -> FieldOp {
    use Opcode as O;

    let name = op.name();
    let is_static = name.starts_with('s');
    let put = name.contains("put");
    let insn = match op {
        O::Iget | O::Iput | O::Sget | O::Sput => Some(RegType::INTEGER),
        O::IgetWide | O::IputWide | O::SgetWide | O::SputWide => Some(RegType::LONG_LO),
        O::IgetBoolean | O::IputBoolean | O::SgetBoolean | O::SputBoolean => Some(RegType::BOOLEAN),
        O::IgetByte | O::IputByte | O::SgetByte | O::SputByte => Some(RegType::BYTE),
        O::IgetChar | O::IputChar | O::SgetChar | O::SputChar => Some(RegType::CHAR),
        O::IgetShort | O::IputShort | O::SgetShort | O::SputShort => Some(RegType::SHORT),
        _ => None,
    };
    FieldOp {
        is_static,
        put,
        insn,
    }
}

impl Engine<'_> {
    pub(super) fn op_field(
        &mut self,
        op: Opcode,
        regs: &[Reg],
        field: &FieldRef,
    ) -> Result<(), VerifyError> {
        let lattice = self.lattice;
        let FieldOp {
            is_static,
            put,
            insn,
        } = classify(op);
        let (value, object) = if is_static {
            let [value] = operands(regs)?;
            (value, None)
        } else {
            let [value, object] = operands(regs)?;
            (value, Some(object))
        };

        self.check_class_access(&field.owner)?;
        let owner = match lattice
            .program()
            .resolve_field(&field.owner, &field.name, &field.ty)
        {
            None => {
                self.soft(
                    VerifyErrorKind::NoField,
                    format!("unable to resolve field {field}"),
                )?;
                field.owner.clone()
            }
            Some(def) => {
                if def.flags.is_static() != is_static {
                    let expected = if is_static { "static" } else { "instance" };
                    return Err(VerifyError::new(
                        VerifyErrorKind::ClassChange,
                        format!("expected field {field} to be {expected}"),
                    ));
                }
                if !self.can_access_member(&def.owner, def.flags) {
                    return Err(VerifyError::new(
                        VerifyErrorKind::AccessField,
                        format!("illegal access to field {field} from {}", self.method.class),
                    ));
                }
                if put && def.flags.is_final() && def.owner != self.method.class {
                    return Err(VerifyError::new(
                        VerifyErrorKind::AccessField,
                        format!("cannot modify final field {field} from {}", self.method.class),
                    ));
                }
                def.owner.clone()
            }
        };

        let field_ty = lattice.from_descriptor(&field.ty, false);
        if field_ty == RegType::CONFLICT {
            return hard(format!("bad type on field {field}"));
        }
        let fk = lattice.kind(field_ty);

        if let Some(object) = object {
            let obj = self.get(object)?;
            let ok = lattice.kind(obj);
            if !ok.is_reference_types() {
                return hard(format!(
                    "instance field access on non-reference v{object} of {}",
                    self.show(obj)
                ));
            }
            if ok.is_uninitialized_types() {
                // Only a constructor may touch its own fields before the
                // superclass constructor has run.
                let own_field = ok.is_uninitialized_this()
                    && self.method.is_constructor()
                    && owner == self.method.class;
                if !own_field {
                    return hard(format!(
                        "cannot access field {field} of a not fully initialized object"
                    ));
                }
            } else if !ok.is_zero() {
                let owner_ty = lattice.reference(&owner, false);
                if !lattice.is_assignable_from(owner_ty, obj) {
                    self.soft(
                        VerifyErrorKind::BadClassSoft,
                        format!("cannot access field {field} through {}", self.show(obj)),
                    )?;
                }
            }
        }

        match (put, insn) {
            (false, Some(insn)) => {
                if primitive_compatible(insn, fk) {
                    return self.set(value, field_ty);
                }
                let message = format!("{op} on field {field} of type {}", self.show(field_ty));
                if !fk.is_reference_types() {
                    return hard(message);
                }
                self.soft(VerifyErrorKind::BadClassSoft, message)?;
                self.set(value, insn)
            }
            (false, None) => {
                if !fk.is_reference_types() {
                    return hard(format!("{op} on primitive field {field}"));
                }
                self.set(value, field_ty)
            }
            (true, Some(insn)) => {
                if !primitive_compatible(insn, fk) {
                    return hard(format!("{op} on field {field} of type {}", self.show(field_ty)));
                }
                let vk = self.kind(value)?;
                let value_ok = match fk {
                    RegTypeKind::Float => vk.is_float_types(),
                    RegTypeKind::LongLo | RegTypeKind::DoubleLo => {
                        return self.expect_wide(value, field_ty);
                    }
                    _ => vk.is_integral_types(),
                };
                if !value_ok {
                    return hard(format!(
                        "{op} of {} into field {field}",
                        self.show(self.get(value)?)
                    ));
                }
                Ok(())
            }
            (true, None) => {
                if !fk.is_reference_types() {
                    return hard(format!("{op} on primitive field {field}"));
                }
                self.expect(value, field_ty)
            }
        }
    }
}

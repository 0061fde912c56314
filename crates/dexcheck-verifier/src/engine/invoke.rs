//! Method invocation.

use buggy::BugExt as _;
use dexcheck_bytecode::{MethodRef, Opcode, Reg, TypeDesc};
use dexcheck_types::{RegType, ResolutionKind};

use super::{Engine, hard};
use crate::{VerifyError, VerifyErrorKind};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum InvokeKind {
    Direct,
    Static,
    Virtual,
    Super,
    Interface,
}

impl InvokeKind {
    fn of(op: Opcode) -> Self {
        use Opcode as O;
        match op {
            O::InvokeDirect | O::InvokeDirectRange => Self::Direct,
            O::InvokeStatic | O::InvokeStaticRange => Self::Static,
            O::InvokeSuper | O::InvokeSuperRange => Self::Super,
            O::InvokeInterface | O::InvokeInterfaceRange => Self::Interface,
            _ => Self::Virtual,
        }
    }

    fn resolution(self) -> ResolutionKind {
        match self {
            Self::Direct | Self::Static => ResolutionKind::Direct,
            Self::Virtual | Self::Super => ResolutionKind::Virtual,
            Self::Interface => ResolutionKind::Interface,
        }
    }
}

impl Engine<'_> {
    /// Resolves `target` and checks the invoke kind and access against it.
    /// Resolution failures are soft; the call is then checked against the
    /// reference's own prototype.
    fn resolve_invoke(
        &mut self,
        op: Opcode,
        kind: InvokeKind,
        target: &MethodRef,
    ) -> Result<(), VerifyError> {
        let program = self.lattice.program();
        // Array types inherit every method from java.lang.Object.
        let owner = if target.owner.is_array() {
            TypeDesc::object()
        } else {
            target.owner.clone()
        };

        let Some(class) = program.class(&owner) else {
            return self.soft(
                VerifyErrorKind::NoClass,
                format!("unable to resolve class {} for {target}", target.owner),
            );
        };
        if kind == InvokeKind::Interface && !class.is_interface() {
            return Err(VerifyError::new(
                VerifyErrorKind::ClassChange,
                format!("{op} on non-interface class {owner}"),
            ));
        }
        if kind == InvokeKind::Virtual && class.is_interface() {
            return Err(VerifyError::new(
                VerifyErrorKind::ClassChange,
                format!("{op} on interface {owner}"),
            ));
        }

        let Some(def) =
            program.resolve_method(&owner, &target.name, &target.proto, kind.resolution())
        else {
            return self.soft(
                VerifyErrorKind::NoMethod,
                format!("unable to resolve method {target}"),
            );
        };
        let is_static = def.flags.is_static();
        let mismatch = match kind {
            InvokeKind::Direct => !def.is_direct() || is_static,
            InvokeKind::Static => !is_static,
            InvokeKind::Virtual | InvokeKind::Super | InvokeKind::Interface => def.is_direct(),
        };
        if mismatch {
            return Err(VerifyError::new(
                VerifyErrorKind::ClassChange,
                format!("{op} does not match the kind of method {target}"),
            ));
        }
        if !self.can_access_member(&def.owner, def.flags) {
            return Err(VerifyError::new(
                VerifyErrorKind::AccessMethod,
                format!("illegal access to method {target} from {}", self.method.class),
            ));
        }
        if kind == InvokeKind::Super {
            let method = self.method;
            let here = &method.class;
            if def.owner == *here || !program.is_subclass_of(here, &def.owner) {
                return self.soft(
                    VerifyErrorKind::NoMethod,
                    format!("invoke-super to {target} outside the superclasses of {here}"),
                );
            }
        }
        Ok(())
    }

    /// Checks the receiver of an instance call. Returns the uninitialized
    /// type a constructor call will initialize.
    fn check_receiver(
        &mut self,
        op: Opcode,
        target: &MethodRef,
        recv: usize,
    ) -> Result<Option<RegType>, VerifyError> {
        let lattice = self.lattice;
        let ty = self.get(recv)?;
        let k = lattice.kind(ty);
        if !k.is_reference_types() {
            return hard(format!(
                "{op} receiver v{recv} of {} is not a reference",
                self.show(ty)
            ));
        }

        if target.is_constructor() {
            if k.is_zero() {
                return Ok(None);
            }
            if !k.is_uninitialized_types() {
                return hard(format!(
                    "constructor {target} called on initialized {}",
                    self.show(ty)
                ));
            }
            let method = self.method;
            let here = &method.class;
            if k.is_uninitialized_this() {
                let Some(class) = lattice.program().class(here) else {
                    self.soft(
                        VerifyErrorKind::NoClass,
                        format!("unable to resolve declaring class {here} for {target}"),
                    )?;
                    return Ok(Some(ty));
                };
                let superclass = class.superclass.as_ref();
                if target.owner != *here && Some(&target.owner) != superclass {
                    return hard(format!(
                        "constructor call on this must target {here} or its superclass, not {}",
                        target.owner
                    ));
                }
            } else if lattice.descriptor(ty).as_ref() != Some(&target.owner) {
                return hard(format!(
                    "constructor of {} called on {}",
                    target.owner,
                    self.show(ty)
                ));
            }
            return Ok(Some(ty));
        }

        if k.is_uninitialized_types() {
            return hard(format!("{op} on uninitialized reference in v{recv}"));
        }
        if !k.is_zero() {
            let owner = lattice.reference(&target.owner, false);
            if !lattice.is_assignable_from(owner, ty) {
                self.soft(
                    VerifyErrorKind::BadClassSoft,
                    format!(
                        "receiver {} is not an instance of {}",
                        self.show(ty),
                        target.owner
                    ),
                )?;
            }
        }
        Ok(None)
    }

    /// `invoke-*`: resolution, receiver and argument checks, then the
    /// return type goes to the result slots. A constructor call
    /// initializes every copy of its receiver.
    pub(super) fn op_invoke(
        &mut self,
        op: Opcode,
        regs: &[Reg],
        target: &MethodRef,
    ) -> Result<(), VerifyError> {
        let lattice = self.lattice;
        let kind = InvokeKind::of(op);

        if target.is_class_initializer() {
            return hard(format!("call to class initializer {target}"));
        }
        if target.is_constructor() && kind != InvokeKind::Direct {
            return hard(format!("non-direct call to constructor {target}"));
        }
        if !target.owner.is_reference() {
            return hard(format!("method owner {} is not a reference type", target.owner));
        }
        self.check_class_access(&target.owner)?;
        self.resolve_invoke(op, kind, target)?;

        let receiver = usize::from(kind != InvokeKind::Static);
        let expected = target
            .proto
            .arg_slots()
            .checked_add(receiver)
            .assume("argument count must fit")?;
        if regs.len() != expected {
            return hard(format!(
                "{op} {target} expects {expected} argument registers, got {}",
                regs.len()
            ));
        }

        let mut init = None;
        if receiver == 1 {
            let recv = usize::from(*regs.first().assume("receiver register must exist")?);
            init = self.check_receiver(op, target, recv)?;
        }

        let mut at = receiver;
        for p in &target.proto.params {
            let reg = usize::from(*regs.get(at).assume("argument register must exist")?);
            let expected = lattice.from_descriptor(p, false);
            if expected == RegType::CONFLICT {
                return hard(format!("bad parameter type {p} in {target}"));
            }
            if lattice.kind(expected).is_low_half() {
                let next = at.checked_add(1).assume("argument index must fit")?;
                let hi = usize::from(*regs.get(next).assume("argument register must exist")?);
                if reg.checked_add(1) != Some(hi) {
                    return hard(format!(
                        "wide argument {p} split across v{reg} and v{hi}"
                    ));
                }
                self.expect_wide(reg, expected)?;
            } else {
                self.expect(reg, expected)?;
            }
            at = at.checked_add(p.slots()).assume("argument index must fit")?;
        }

        if let Some(uninit) = init {
            self.work.mark_refs_as_initialized(&lattice, uninit);
        }
        if !target.proto.ret.is_void() {
            let ret = lattice.from_descriptor(&target.proto.ret, false);
            if ret == RegType::CONFLICT {
                return hard(format!("bad return type in {target}"));
            }
            self.work.set_result(&lattice, ret);
        }
        Ok(())
    }
}

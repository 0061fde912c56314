//! Moves, constants, returns, monitors, branches and arithmetic.

use buggy::{BugExt as _, bug};
use dexcheck_bytecode::{Constant, Opcode, Reg};
use dexcheck_types::{RegType, RegTypeKind};

use super::{Engine, hard, operands};
use crate::{
    ResultKind, VerifyError, VerifyErrorKind,
    shape::{Arith, Prim, arith},
};

impl Engine<'_> {
    pub(super) fn op_move(&mut self, op: Opcode, regs: &[Reg]) -> Result<(), VerifyError> {
        let [dst, src] = operands(regs)?;
        let lattice = self.lattice;
        if op == Opcode::MoveWide {
            let lo = self.get(src)?;
            let hi = self.get(src.checked_add(1).assume("register must not wrap")?)?;
            if !lattice.check_wide_pair(lo, hi) {
                return hard(format!(
                    "move-wide from v{src} of {}/{}",
                    self.show(lo),
                    self.show(hi)
                ));
            }
            self.work.set_wide(&lattice, dst, lo, hi)?;
            return Ok(());
        }

        let ty = self.get(src)?;
        let k = lattice.kind(ty);
        let ok = k.is_conflict()
            || if op == Opcode::MoveObject {
                k.is_reference_types()
            } else {
                k.is_category1_types()
            };
        if !ok {
            return hard(format!("{op} v{dst}, v{src} of type {}", self.show(ty)));
        }
        self.work.set_scalar(&lattice, dst, ty)?;
        Ok(())
    }

    pub(super) fn op_move_result(&mut self, op: Opcode, regs: &[Reg]) -> Result<(), VerifyError> {
        let [dst] = operands(regs)?;
        let kind = match op {
            Opcode::MoveResult => ResultKind::Scalar,
            Opcode::MoveResultWide => ResultKind::Wide,
            _ => ResultKind::Object,
        };
        self.work.consume_result(&self.lattice, dst, kind)?;
        Ok(())
    }

    /// `move-exception` must open a handler. Its type is the join of every
    /// type the handler catches.
    pub(super) fn op_move_exception(&mut self, regs: &[Reg]) -> Result<(), VerifyError> {
        let [dst] = operands(regs)?;
        let lattice = self.lattice;
        let handler = match self.pc.checked_sub(1) {
            Some(prev) => self.index.info(prev)?,
            None => return hard("move-exception at method entry"),
        };
        if !handler.is_handler() {
            return hard("move-exception not at the start of a handler");
        }

        let throwable = lattice.throwable();
        let mut caught: Option<RegType> = None;
        for c in &handler.catches {
            let ty = match c {
                None => throwable,
                Some(desc) => {
                    let ty = lattice.reference(desc, false);
                    if ty == RegType::CONFLICT {
                        return hard(format!("catch type {desc} is not a class"));
                    }
                    if !lattice.is_assignable_from(throwable, ty) {
                        return hard(format!("catch type {desc} is not a Throwable"));
                    }
                    ty
                }
            };
            caught = Some(caught.map_or(ty, |prev| lattice.merge(prev, ty)));
        }
        let ty = caught.assume("a handler catches at least one type")?;
        self.work.set_scalar(&lattice, dst, ty)?;
        Ok(())
    }

    pub(super) fn op_return(&mut self, op: Opcode, regs: &[Reg]) -> Result<(), VerifyError> {
        let lattice = self.lattice;
        let declared = &self.method.proto.ret;
        let ret = lattice.from_descriptor(declared, false);
        let rk = lattice.kind(ret);

        match op {
            Opcode::ReturnVoid => {
                if !declared.is_void() {
                    return hard(format!("return-void in a method returning {declared}"));
                }
                if self.method.is_constructor() && !self.work.this_initialized() {
                    return hard("constructor returns without calling a superclass constructor");
                }
            }
            Opcode::Return => {
                let [src] = operands(regs)?;
                if !rk.is_category1_types() {
                    return hard(format!("return in a method returning {declared}"));
                }
                // Narrow integral return types accept any int.
                let narrow = matches!(
                    rk,
                    RegTypeKind::Boolean | RegTypeKind::Byte | RegTypeKind::Short | RegTypeKind::Char
                );
                if !(narrow && self.kind(src)? == RegTypeKind::Integer) {
                    self.expect(src, ret)?;
                }
            }
            Opcode::ReturnWide => {
                let [src] = operands(regs)?;
                if !rk.is_low_half() {
                    return hard(format!("return-wide in a method returning {declared}"));
                }
                self.expect_wide(src, ret)?;
            }
            _ => {
                let [src] = operands(regs)?;
                if !rk.is_reference_types() {
                    return hard(format!("return-object in a method returning {declared}"));
                }
                let actual = self.get(src)?;
                let ak = lattice.kind(actual);
                if ak.is_uninitialized_types() {
                    return hard(format!("returning uninitialized object in v{src}"));
                }
                if !ak.is_reference_types() || !lattice.is_assignable_from(ret, actual) {
                    return hard(format!(
                        "returning {} from a method declared to return {declared}",
                        self.show(actual)
                    ));
                }
            }
        }

        if let Some(depth @ 1..) = self.work.monitor_depth() {
            self.soft(
                VerifyErrorKind::Locking,
                format!("returning with {depth} monitors held"),
            )?;
        }
        Ok(())
    }

    pub(super) fn op_const(
        &mut self,
        op: Opcode,
        regs: &[Reg],
        constant: &Constant,
    ) -> Result<(), VerifyError> {
        let [dst] = operands(regs)?;
        let lattice = self.lattice;
        match (op, constant) {
            (Opcode::Const, Constant::Int(v)) => {
                let ty = lattice.constant(*v, self.config.precise_constants);
                self.work.set_scalar(&lattice, dst, ty)?;
            }
            (Opcode::ConstWide, Constant::Wide(_)) => {
                self.work
                    .set_wide(&lattice, dst, RegType::CONSTANT_LO, RegType::CONSTANT_HI)?;
            }
            (Opcode::ConstString, Constant::String(_)) => {
                self.work.set_scalar(&lattice, dst, lattice.string())?;
            }
            (Opcode::ConstClass, Constant::Type(desc)) => {
                if !desc.is_reference() {
                    return hard(format!("const-class of non-reference type {desc}"));
                }
                self.check_class_access(desc)?;
                self.work.set_scalar(&lattice, dst, lattice.class_object())?;
            }
            _ => bug!("constant operand does not match the opcode"),
        }
        Ok(())
    }

    pub(super) fn op_monitor(&mut self, op: Opcode, regs: &[Reg]) -> Result<(), VerifyError> {
        let [obj] = operands(regs)?;
        let ty = self.get(obj)?;
        if !self.lattice.kind(ty).is_reference_types() {
            return hard(format!("{op} on non-object {}", self.show(ty)));
        }
        if op == Opcode::MonitorEnter {
            self.work.monitor_enter();
        } else if !self.work.monitor_exit() {
            self.soft(VerifyErrorKind::Locking, "monitor-exit with no monitor held")?;
        }
        Ok(())
    }

    pub(super) fn op_throw(&mut self, regs: &[Reg]) -> Result<(), VerifyError> {
        let [src] = operands(regs)?;
        let ty = self.get(src)?;
        let k = self.lattice.kind(ty);
        if k.is_zero() {
            return Ok(());
        }
        if k.is_uninitialized_types() {
            return hard(format!("thrown exception in v{src} is not initialized"));
        }
        let throwable = self.lattice.throwable();
        if !k.is_reference_types() {
            return hard(format!("throw of non-reference {}", self.show(ty)));
        }
        self.expect(src, throwable)
    }

    pub(super) fn op_switch(&mut self, regs: &[Reg]) -> Result<(), VerifyError> {
        let [key] = operands(regs)?;
        self.expect(key, RegType::INTEGER)
    }

    /// `if-eq` and `if-ne` compare two references or two integral values.
    /// Every other comparison takes integral operands.
    pub(super) fn op_if(&mut self, op: Opcode, regs: &[Reg]) -> Result<(), VerifyError> {
        match op {
            Opcode::IfEq | Opcode::IfNe => {
                let [a, b] = operands(regs)?;
                let (ka, kb) = (self.kind(a)?, self.kind(b)?);
                let refs = ka.is_reference_types() && kb.is_reference_types();
                let ints = ka.is_integral_types() && kb.is_integral_types();
                if !(refs || ints) {
                    return hard(format!(
                        "{op} operands v{a} and v{b} must both be references or both be integral"
                    ));
                }
            }
            Opcode::IfEqz | Opcode::IfNez => {
                let [a] = operands(regs)?;
                let k = self.kind(a)?;
                if !(k.is_reference_types() || k.is_integral_types()) {
                    return hard(format!("{op} on v{a} of type {}", self.show(self.get(a)?)));
                }
            }
            Opcode::IfLtz | Opcode::IfGez | Opcode::IfGtz | Opcode::IfLez => {
                let [a] = operands(regs)?;
                self.expect(a, RegType::INTEGER)?;
            }
            _ => {
                let [a, b] = operands(regs)?;
                self.expect(a, RegType::INTEGER)?;
                self.expect(b, RegType::INTEGER)?;
            }
        }
        Ok(())
    }

    fn write_prim(&mut self, dst: usize, prim: Prim) -> Result<(), VerifyError> {
        self.set(dst, prim.reg_type())
    }

    /// Unary, binary, two-address and literal arithmetic, conversions and
    /// comparisons.
    ///
    /// The bitwise `and`, `or` and `xor` forms produce a boolean when both
    /// operands are boolean.
    pub(super) fn op_arith(
        &mut self,
        op: Opcode,
        regs: &[Reg],
        constant: Option<&Constant>,
    ) -> Result<(), VerifyError> {
        let Some(sig) = arith(op) else {
            bug!("opcode has no transfer function");
        };
        match sig {
            Arith::Unary { dst, src } => {
                let [d, s] = operands(regs)?;
                self.expect_prim(s, src)?;
                self.write_prim(d, dst)
            }
            Arith::Binary { dst, a, b, boolean } => {
                let [d, ra, rb] = operands(regs)?;
                self.expect_prim(ra, a)?;
                self.expect_prim(rb, b)?;
                if boolean && self.kind(ra)?.is_boolean_types() && self.kind(rb)?.is_boolean_types() {
                    return self.set(d, RegType::BOOLEAN);
                }
                self.write_prim(d, dst)
            }
            Arith::TwoAddr { dst, b, boolean } => {
                let [d, rb] = operands(regs)?;
                self.expect_prim(d, dst)?;
                self.expect_prim(rb, b)?;
                if boolean && self.kind(d)?.is_boolean_types() && self.kind(rb)?.is_boolean_types() {
                    return self.set(d, RegType::BOOLEAN);
                }
                self.write_prim(d, dst)
            }
            Arith::Lit { boolean } => {
                let [d, s] = operands(regs)?;
                let Some(Constant::Int(lit)) = constant else {
                    bug!("literal arithmetic without a literal");
                };
                self.expect(s, RegType::INTEGER)?;
                if boolean && self.kind(s)?.is_boolean_types() && matches!(lit, 0 | 1) {
                    return self.set(d, RegType::BOOLEAN);
                }
                self.write_prim(d, Prim::Int)
            }
        }
    }
}

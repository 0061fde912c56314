//! The dataflow pass: a worklist fixed point over a normalized body.

mod arrays;
mod fields;
mod invoke;
mod objects;
mod scalar;

use buggy::{Bug, BugExt as _, bug};
use dexcheck_bytecode::{
    AccessFlags, Constant, Instruction, Method, MethodBody, Opcode, Reg, TypeDesc,
};
use dexcheck_types::{RegType, RegTypeKind, TypeLattice};
use tracing::{debug, trace, warn};

use crate::{
    InstructionIndex, RegisterState, VerifyError, VerifyErrorKind, shape::Prim, verifier::Config,
};

/// Everything a finished run hands back to the [`Verifier`](crate::Verifier).
pub(crate) struct Outcome {
    pub index: InstructionIndex,
    pub soft_failures: Vec<VerifyError>,
    pub visits: usize,
}

/// Where the state flowing along an edge comes from.
#[derive(Copy, Clone)]
enum Source<'s> {
    /// The work state after the current instruction.
    Work,
    /// A snapshot taken before the current instruction.
    Saved(&'s RegisterState),
}

pub(crate) struct Engine<'a> {
    lattice: TypeLattice<'a>,
    config: Config,
    method: &'a Method,
    body: &'a MethodBody,
    index: InstructionIndex,
    work: RegisterState,
    /// The declaring class, as an imprecise reference.
    class_type: RegType,
    soft_failures: Vec<VerifyError>,
    visits: usize,
    pc: usize,
}

fn hard<T>(message: impl Into<String>) -> Result<T, VerifyError> {
    Err(VerifyError::hard(message))
}

/// Splits the register operands of an instruction whose arity has already
/// been checked.
fn operands<const N: usize>(regs: &[Reg]) -> Result<[usize; N], Bug> {
    let regs = <[Reg; N]>::try_from(regs)
        .ok()
        .assume("operand count must match the opcode")?;
    Ok(regs.map(usize::from))
}

impl<'a> Engine<'a> {
    pub fn new(
        lattice: TypeLattice<'a>,
        config: Config,
        method: &'a Method,
        body: &'a MethodBody,
    ) -> Result<Self, VerifyError> {
        let class_type = lattice.reference(&method.class, false);
        if class_type == RegType::CONFLICT {
            return hard(format!("declaring class {} is not a class", method.class));
        }
        Ok(Self {
            lattice,
            config,
            method,
            body,
            index: InstructionIndex::build(body)?,
            work: RegisterState::new(usize::from(method.locals), usize::from(method.ins)),
            class_type,
            soft_failures: Vec::new(),
            visits: 0,
            pc: 0,
        })
    }

    /// Runs the pass to its fixed point.
    pub fn run(mut self) -> Result<Outcome, VerifyError> {
        self.check_tries()?;
        self.seed()?;

        let len = self.index.len();
        let mut start_guess = 0usize;
        loop {
            let next = (start_guess..len)
                .find(|&i| self.index.info(i).is_ok_and(|info| info.changed));
            let Some(pc) = next else {
                if start_guess == 0 {
                    break;
                }
                // Rescan from the top once before concluding.
                start_guess = 0;
                continue;
            };

            self.visits = self.visits.checked_add(1).assume("visit count must not wrap")?;
            if let Some(max) = self.config.max_visits {
                if self.visits > max {
                    return Err(VerifyError::new(
                        VerifyErrorKind::VisitBudgetExhausted,
                        format!("gave up after {max} instruction visits"),
                    )
                    .at(pc));
                }
            }

            self.pc = pc;
            let info = self.index.info(pc)?;
            if info.is_branch_target {
                let state = info
                    .state
                    .as_ref()
                    .assume("queued branch target must have a state")?;
                self.work.copy_from(state);
            }
            self.step(&mut start_guess).map_err(|e| e.at(pc))?;

            let info = self.index.info_mut(pc)?;
            info.visited = true;
            info.changed = false;
        }

        debug!(
            method = %self.method,
            visits = self.visits,
            soft_failures = self.soft_failures.len(),
            "fixed point reached"
        );
        Ok(Outcome {
            index: self.index,
            soft_failures: self.soft_failures,
            visits: self.visits,
        })
    }

    fn check_tries(&self) -> Result<(), VerifyError> {
        for t in self.index.tries() {
            if t.start > t.end {
                return hard(format!(
                    "try range [{}, {}) ends before it starts",
                    t.start, t.end
                ));
            }
        }
        Ok(())
    }

    /// Builds the entry state from the method signature and queues the
    /// entry.
    fn seed(&mut self) -> Result<(), VerifyError> {
        let lattice = self.lattice;
        let m = self.method;
        let mut state = RegisterState::new(usize::from(m.locals), usize::from(m.ins));
        let mut reg = usize::from(m.locals);

        if !m.is_static() {
            let this = if m.is_constructor() && m.class != TypeDesc::object() {
                state.set_this_initialized(false);
                lattice.uninitialized_this(self.class_type)
            } else {
                self.class_type
            };
            state.set_scalar(&lattice, reg, this)?;
            reg = reg.checked_add(1).assume("register count must fit")?;
        }
        for p in &m.proto.params {
            let ty = lattice.from_descriptor(p, false);
            if ty == RegType::CONFLICT {
                return hard(format!("bad parameter type {p}"));
            }
            state.set(&lattice, reg, ty)?;
            reg = reg.checked_add(p.slots()).assume("register count must fit")?;
        }

        trace!(method = %m, "entry state seeded");
        let entry = self.index.info_mut(0)?;
        entry.state = Some(state.clone());
        entry.changed = true;
        self.work = state;
        Ok(())
    }

    /// Applies the instruction at `self.pc` to the work state and pushes
    /// the result along every outgoing edge.
    fn step(&mut self, start_guess: &mut usize) -> Result<(), VerifyError> {
        let body = self.body;
        let pc = self.pc;
        let instr = body.instructions.get(pc).assume("pc must be in range")?;
        let Some(op) = instr.opcode() else {
            return self.fall_through(start_guess);
        };
        trace!(pc, %instr, "visit");

        let saved = if op.can_throw() && self.index.info(pc)?.in_try {
            let mut s = self.work.clone();
            s.clear_result();
            Some(s)
        } else {
            None
        };

        if !op.is_move_result() {
            self.work.clear_result();
        }
        self.transfer(op, instr)?;

        if let Some(saved) = &saved {
            let handlers: Vec<usize> = self.index.handlers_covering(pc).collect();
            for h in handlers {
                self.update(h, Source::Saved(saved))?;
            }
        }

        match instr {
            Instruction::Target { target, .. } if op.can_branch() => {
                let t = self.index.label_index(*target)?;
                self.check_normal_edge(t)?;
                self.update(t, Source::Work)?;
                if !op.can_continue() {
                    *start_guess = t;
                }
            }
            Instruction::Switch { targets, .. } if op.can_switch() => {
                for target in targets {
                    let t = self.index.label_index(*target)?;
                    self.check_normal_edge(t)?;
                    self.update(t, Source::Work)?;
                }
            }
            _ => {}
        }

        if op.can_continue() {
            self.fall_through(start_guess)?;
        }
        Ok(())
    }

    fn fall_through(&mut self, start_guess: &mut usize) -> Result<(), VerifyError> {
        let next = self.pc.checked_add(1).assume("pc must not wrap")?;
        if next >= self.index.len() {
            return hard("execution can fall off the end of the code");
        }
        if self.index.info(next)?.is_branch_target {
            self.check_normal_edge(next)?;
            self.update(next, Source::Work)?;
        } else {
            self.index.info_mut(next)?.changed = true;
        }
        *start_guess = next;
        Ok(())
    }

    /// Rejects a non-exceptional edge into a handler that begins with
    /// `move-exception`.
    fn check_normal_edge(&self, target: usize) -> Result<(), VerifyError> {
        if !self.index.info(target)?.is_handler() {
            return Ok(());
        }
        let first = target
            .checked_add(1)
            .and_then(|i| self.body.instructions.get(i))
            .and_then(Instruction::opcode);
        if first == Some(Opcode::MoveException) {
            return hard("non-exceptional edge into move-exception");
        }
        Ok(())
    }

    /// Copies or merges a state into the branch target `target`, queueing
    /// it if its stored state changed.
    fn update(&mut self, target: usize, source: Source<'_>) -> Result<(), VerifyError> {
        let lattice = self.lattice;
        let from = match source {
            Source::Work => &self.work,
            Source::Saved(s) => s,
        };
        let info = self.index.info_mut(target)?;
        let mut lock_mismatch = None;
        let changed = if let Some(state) = info.state.as_mut() {
            if let (Some(have), Some(incoming)) = (state.monitor_depth(), from.monitor_depth()) {
                if have != incoming {
                    lock_mismatch = Some((have, incoming));
                }
            }
            state.merge(&lattice, from)
        } else {
            info.state = Some(from.clone());
            true
        };
        if changed {
            info.changed = true;
            trace!(target, "state changed");
        }
        if let Some((have, incoming)) = lock_mismatch {
            self.soft(
                VerifyErrorKind::Locking,
                format!("monitor depth {incoming} does not match {have} at join [{target:#x}]"),
            )?;
        }
        Ok(())
    }

    /// Records a soft failure, or returns it when soft failures are not
    /// allowed.
    fn soft(&mut self, kind: VerifyErrorKind, message: impl Into<String>) -> Result<(), VerifyError> {
        let err = VerifyError::new(kind, message).at(self.pc);
        if !self.config.allow_soft_failures {
            return Err(err);
        }
        if !self.soft_failures.contains(&err) {
            warn!(method = %self.method, %err, "soft verification failure");
            self.soft_failures.push(err);
        }
        Ok(())
    }

    fn transfer(&mut self, op: Opcode, instr: &Instruction) -> Result<(), VerifyError> {
        use Opcode as O;

        let regs = instr.regs();
        match op {
            O::Nop | O::Goto => Ok(()),
            O::Move | O::MoveWide | O::MoveObject => self.op_move(op, regs),
            O::MoveResult | O::MoveResultWide | O::MoveResultObject => self.op_move_result(op, regs),
            O::MoveException => self.op_move_exception(regs),
            O::ReturnVoid | O::Return | O::ReturnWide | O::ReturnObject => self.op_return(op, regs),
            O::Const | O::ConstWide | O::ConstString | O::ConstClass => {
                self.op_const(op, regs, constant(instr)?)
            }
            O::MonitorEnter | O::MonitorExit => self.op_monitor(op, regs),
            O::CheckCast | O::InstanceOf => self.op_type_check(op, regs, type_operand(instr)?),
            O::ArrayLength => self.op_array_length(regs),
            O::NewInstance => self.op_new_instance(regs, type_operand(instr)?),
            O::NewArray => self.op_new_array(regs, type_operand(instr)?),
            O::FilledNewArray | O::FilledNewArrayRange => {
                self.op_filled_new_array(regs, type_operand(instr)?)
            }
            O::FillArrayData => self.op_fill_array_data(regs, constant(instr)?),
            O::Throw => self.op_throw(regs),
            O::PackedSwitch | O::SparseSwitch => self.op_switch(regs),
            O::IfEq
            | O::IfNe
            | O::IfLt
            | O::IfGe
            | O::IfGt
            | O::IfLe
            | O::IfEqz
            | O::IfNez
            | O::IfLtz
            | O::IfGez
            | O::IfGtz
            | O::IfLez => self.op_if(op, regs),
            O::Aget
            | O::AgetWide
            | O::AgetObject
            | O::AgetBoolean
            | O::AgetByte
            | O::AgetChar
            | O::AgetShort => self.op_aget(op, regs),
            O::Aput
            | O::AputWide
            | O::AputObject
            | O::AputBoolean
            | O::AputByte
            | O::AputChar
            | O::AputShort => self.op_aput(op, regs),
            O::Iget
            | O::IgetWide
            | O::IgetObject
            | O::IgetBoolean
            | O::IgetByte
            | O::IgetChar
            | O::IgetShort
            | O::Iput
            | O::IputWide
            | O::IputObject
            | O::IputBoolean
            | O::IputByte
            | O::IputChar
            | O::IputShort
            | O::Sget
            | O::SgetWide
            | O::SgetObject
            | O::SgetBoolean
            | O::SgetByte
            | O::SgetChar
            | O::SgetShort
            | O::Sput
            | O::SputWide
            | O::SputObject
            | O::SputBoolean
            | O::SputByte
            | O::SputChar
            | O::SputShort => {
                let Constant::Field(field) = constant(instr)? else {
                    bug!("field instruction without a field operand");
                };
                self.op_field(op, regs, field)
            }
            _ if op.is_invoke() => {
                let Constant::Method(method) = constant(instr)? else {
                    bug!("invoke without a method operand");
                };
                self.op_invoke(op, regs, method)
            }
            _ => self.op_arith(op, regs, instr.constant_operand()),
        }
    }

    fn get(&self, reg: usize) -> Result<RegType, VerifyError> {
        Ok(self.work.get(reg)?)
    }

    fn kind(&self, reg: usize) -> Result<RegTypeKind, VerifyError> {
        Ok(self.lattice.kind(self.get(reg)?))
    }

    fn show(&self, ty: RegType) -> String {
        self.lattice.display(ty).to_string()
    }

    fn set(&mut self, reg: usize, ty: RegType) -> Result<(), VerifyError> {
        self.work.set(&self.lattice, reg, ty)?;
        Ok(())
    }

    /// Checks that `reg` holds a value assignable to the single-register
    /// type `expected`.
    ///
    /// A mismatch between two initialized references is a soft failure,
    /// since the runtime rechecks class relationships. Anything else is
    /// hard.
    fn expect(&mut self, reg: usize, expected: RegType) -> Result<(), VerifyError> {
        let actual = self.get(reg)?;
        if self.lattice.is_assignable_from(expected, actual) {
            return Ok(());
        }
        let message = format!(
            "register v{reg} has type {} but expected {}",
            self.show(actual),
            self.show(expected)
        );
        let (ke, ka) = (self.lattice.kind(expected), self.lattice.kind(actual));
        if !ke.is_non_zero_reference_types()
            || !ka.is_non_zero_reference_types()
            || ke.is_uninitialized_types()
            || ka.is_uninitialized_types()
        {
            return hard(message);
        }
        self.soft(VerifyErrorKind::BadClassSoft, message)
    }

    /// Checks that `reg` and `reg + 1` hold a wide pair whose low half is
    /// assignable to `expected_lo`.
    fn expect_wide(&self, reg: usize, expected_lo: RegType) -> Result<(), VerifyError> {
        if self.work.verify_wide(&self.lattice, reg, expected_lo)? {
            return Ok(());
        }
        let hi = reg.checked_add(1).assume("register must not wrap")?;
        hard(format!(
            "registers v{reg}/v{hi} have types {}/{} but expected {}",
            self.show(self.get(reg)?),
            self.show(self.get(hi)?),
            self.show(expected_lo)
        ))
    }

    /// Checks a register against any declared type, wide or not.
    fn expect_type(&mut self, reg: usize, expected: RegType) -> Result<(), VerifyError> {
        if self.lattice.kind(expected).is_low_half() {
            self.expect_wide(reg, expected)
        } else {
            self.expect(reg, expected)
        }
    }

    fn expect_prim(&mut self, reg: usize, prim: Prim) -> Result<(), VerifyError> {
        self.expect_type(reg, prim.reg_type())
    }

    /// Checks that the class named by `desc` may be referenced from the
    /// declaring class.
    fn check_class_access(&self, desc: &TypeDesc) -> Result<(), VerifyError> {
        let elem = TypeDesc::new(desc.as_str().trim_start_matches('['));
        let Some(class) = self.lattice.program().class(&elem) else {
            return Ok(());
        };
        if class.flags.contains(AccessFlags::PUBLIC)
            || same_package(&class.desc, &self.method.class)
        {
            return Ok(());
        }
        Err(VerifyError::new(
            VerifyErrorKind::AccessClass,
            format!("illegal access to class {elem} from {}", self.method.class),
        ))
    }

    /// Reports whether a member of `owner` with `flags` is visible from the
    /// declaring class.
    fn can_access_member(&self, owner: &TypeDesc, flags: AccessFlags) -> bool {
        let here = &self.method.class;
        if owner == here || flags.contains(AccessFlags::PUBLIC) {
            return true;
        }
        if flags.is_private() {
            return false;
        }
        if same_package(owner, here) {
            return true;
        }
        flags.contains(AccessFlags::PROTECTED) && self.lattice.program().is_subclass_of(here, owner)
    }
}

/// Reports whether two class descriptors share a package.
fn same_package(a: &TypeDesc, b: &TypeDesc) -> bool {
    fn package(d: &TypeDesc) -> &str {
        let s = d.as_str().trim_start_matches('[');
        s.rfind('/').map_or("", |i| s.get(..i).unwrap_or(""))
    }
    package(a) == package(b)
}

/// Reports whether a primitive access typed `insn` may touch storage of
/// kind `target`. `int` accesses also cover `float` storage and `long`
/// accesses cover `double` storage.
fn primitive_compatible(insn: RegType, target: RegTypeKind) -> bool {
    match target {
        RegTypeKind::Integer | RegTypeKind::Float => insn == RegType::INTEGER,
        RegTypeKind::LongLo | RegTypeKind::DoubleLo => insn == RegType::LONG_LO,
        RegTypeKind::Boolean => insn == RegType::BOOLEAN,
        RegTypeKind::Byte => insn == RegType::BYTE,
        RegTypeKind::Char => insn == RegType::CHAR,
        RegTypeKind::Short => insn == RegType::SHORT,
        _ => false,
    }
}

fn constant(instr: &Instruction) -> Result<&Constant, Bug> {
    instr
        .constant_operand()
        .assume("instruction must carry a constant")
}

fn type_operand(instr: &Instruction) -> Result<&TypeDesc, Bug> {
    match constant(instr)? {
        Constant::Type(t) => Ok(t),
        _ => bug!("instruction must carry a type"),
    }
}

//! Static operand shapes of every opcode, and the checks that run before
//! dataflow.

use dexcheck_bytecode::{Constant, Instruction, Method, MethodBody, Opcode};
use dexcheck_types::RegType;

use crate::VerifyError;

/// Non-range `invoke-*` and `filled-new-array` take at most this many
/// argument registers.
pub const MAX_LIST_ARGS: usize = 5;

/// Which constant an instruction carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ConstKind {
    Int,
    Wide,
    String,
    Type,
    Field,
    Method,
    ArrayData,
}

impl ConstKind {
    fn matches(self, c: &Constant) -> bool {
        matches!(
            (self, c),
            (Self::Int, Constant::Int(_))
                | (Self::Wide, Constant::Wide(_))
                | (Self::String, Constant::String(_))
                | (Self::Type, Constant::Type(_))
                | (Self::Field, Constant::Field(_))
                | (Self::Method, Constant::Method(_))
                | (Self::ArrayData, Constant::ArrayData { .. })
        )
    }
}

/// Which [`Instruction`] variant an opcode is carried by.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Form {
    Simple,
    Const(ConstKind),
    Target,
    Switch,
}

/// How many register operands an opcode takes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Regs {
    Exact(usize),
    /// Up to [`MAX_LIST_ARGS`] arbitrary registers.
    List,
    /// Any number of consecutive registers.
    Range,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Shape {
    pub form: Form,
    pub regs: Regs,
    /// Bit `i` set when register operand `i` names a wide pair.
    pub wide: u8,
}

const fn shape_of(form: Form, regs: usize, wide: u8) -> Shape {
    Shape {
        form,
        regs: Regs::Exact(regs),
        wide,
    }
}

/// A primitive operand category used by the arithmetic table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Prim {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
}

impl Prim {
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// The register type, low half for wide categories.
    pub fn reg_type(self) -> RegType {
        match self {
            Self::Int => RegType::INTEGER,
            Self::Long => RegType::LONG_LO,
            Self::Float => RegType::FLOAT,
            Self::Double => RegType::DOUBLE_LO,
            Self::Byte => RegType::BYTE,
            Self::Char => RegType::CHAR,
            Self::Short => RegType::SHORT,
        }
    }

    fn bit(self) -> u8 {
        u8::from(self.is_wide())
    }
}

/// Operand signature of an arithmetic, conversion or comparison opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Arith {
    /// `op vA, vB`
    Unary { dst: Prim, src: Prim },
    /// `op vA, vB, vC`
    Binary {
        dst: Prim,
        a: Prim,
        b: Prim,
        boolean: bool,
    },
    /// `op vA, vB` computing `vA = vA op vB`
    TwoAddr { dst: Prim, b: Prim, boolean: bool },
    /// `op vA, vB, #lit`
    Lit { boolean: bool },
}

impl Arith {
    fn shape(self) -> Shape {
        match self {
            Self::Unary { dst, src } => shape_of(Form::Simple, 2, dst.bit() | src.bit() << 1),
            Self::Binary { dst, a, b, .. } => {
                shape_of(Form::Simple, 3, dst.bit() | a.bit() << 1 | b.bit() << 2)
            }
            Self::TwoAddr { dst, b, .. } => shape_of(Form::Simple, 2, dst.bit() | b.bit() << 1),
            Self::Lit { .. } => shape_of(Form::Const(ConstKind::Int), 2, 0),
        }
    }
}

/// The arithmetic signature of `op`, if it has one.
pub(crate) fn arith(op: Opcode) -> Option<Arith> {
    use Opcode as O;
    use Prim::{Byte, Char, Double, Float, Int, Long, Short};

    let unary = |dst, src| Some(Arith::Unary { dst, src });
    let bin = |dst, a, b| {
        Some(Arith::Binary {
            dst,
            a,
            b,
            boolean: false,
        })
    };
    let bin_bool = Some(Arith::Binary {
        dst: Int,
        a: Int,
        b: Int,
        boolean: true,
    });
    let two = |dst, b| {
        Some(Arith::TwoAddr {
            dst,
            b,
            boolean: false,
        })
    };
    let two_bool = Some(Arith::TwoAddr {
        dst: Int,
        b: Int,
        boolean: true,
    });
    let lit = Some(Arith::Lit { boolean: false });
    let lit_bool = Some(Arith::Lit { boolean: true });

    match op {
        O::NegInt | O::NotInt => unary(Int, Int),
        O::NegLong | O::NotLong => unary(Long, Long),
        O::NegFloat => unary(Float, Float),
        O::NegDouble => unary(Double, Double),
        O::IntToLong => unary(Long, Int),
        O::IntToFloat => unary(Float, Int),
        O::IntToDouble => unary(Double, Int),
        O::LongToInt => unary(Int, Long),
        O::LongToFloat => unary(Float, Long),
        O::LongToDouble => unary(Double, Long),
        O::FloatToInt => unary(Int, Float),
        O::FloatToLong => unary(Long, Float),
        O::FloatToDouble => unary(Double, Float),
        O::DoubleToInt => unary(Int, Double),
        O::DoubleToLong => unary(Long, Double),
        O::DoubleToFloat => unary(Float, Double),
        O::IntToByte => unary(Byte, Int),
        O::IntToChar => unary(Char, Int),
        O::IntToShort => unary(Short, Int),

        O::CmplFloat | O::CmpgFloat => bin(Int, Float, Float),
        O::CmplDouble | O::CmpgDouble => bin(Int, Double, Double),
        O::CmpLong => bin(Int, Long, Long),

        O::AndInt | O::OrInt | O::XorInt => bin_bool,
        O::AddInt
        | O::SubInt
        | O::MulInt
        | O::DivInt
        | O::RemInt
        | O::ShlInt
        | O::ShrInt
        | O::UshrInt => bin(Int, Int, Int),
        O::AddLong
        | O::SubLong
        | O::MulLong
        | O::DivLong
        | O::RemLong
        | O::AndLong
        | O::OrLong
        | O::XorLong => bin(Long, Long, Long),
        O::ShlLong | O::ShrLong | O::UshrLong => bin(Long, Long, Int),
        O::AddFloat | O::SubFloat | O::MulFloat | O::DivFloat | O::RemFloat => {
            bin(Float, Float, Float)
        }
        O::AddDouble | O::SubDouble | O::MulDouble | O::DivDouble | O::RemDouble => {
            bin(Double, Double, Double)
        }

        O::AndInt2Addr | O::OrInt2Addr | O::XorInt2Addr => two_bool,
        O::AddInt2Addr
        | O::SubInt2Addr
        | O::MulInt2Addr
        | O::DivInt2Addr
        | O::RemInt2Addr
        | O::ShlInt2Addr
        | O::ShrInt2Addr
        | O::UshrInt2Addr => two(Int, Int),
        O::AddLong2Addr
        | O::SubLong2Addr
        | O::MulLong2Addr
        | O::DivLong2Addr
        | O::RemLong2Addr
        | O::AndLong2Addr
        | O::OrLong2Addr
        | O::XorLong2Addr => two(Long, Long),
        O::ShlLong2Addr | O::ShrLong2Addr | O::UshrLong2Addr => two(Long, Int),
        O::AddFloat2Addr
        | O::SubFloat2Addr
        | O::MulFloat2Addr
        | O::DivFloat2Addr
        | O::RemFloat2Addr => two(Float, Float),
        O::AddDouble2Addr
        | O::SubDouble2Addr
        | O::MulDouble2Addr
        | O::DivDouble2Addr
        | O::RemDouble2Addr => two(Double, Double),

        O::AndIntLit16
        | O::OrIntLit16
        | O::XorIntLit16
        | O::AndIntLit8
        | O::OrIntLit8
        | O::XorIntLit8 => lit_bool,
        O::AddIntLit16
        | O::RsubInt
        | O::MulIntLit16
        | O::DivIntLit16
        | O::RemIntLit16
        | O::AddIntLit8
        | O::RsubIntLit8
        | O::MulIntLit8
        | O::DivIntLit8
        | O::RemIntLit8
        | O::ShlIntLit8
        | O::ShrIntLit8
        | O::UshrIntLit8 => lit,

        _ => None,
    }
}

/// The literal bounds of a `/lit8` or `/lit16` opcode.
fn literal_bounds(op: Opcode) -> Option<(i32, i32)> {
    let name = op.name();
    if name.ends_with("/lit8") {
        Some((i8::MIN.into(), i8::MAX.into()))
    } else if name.ends_with("/lit16") || op == Opcode::RsubInt {
        Some((i16::MIN.into(), i16::MAX.into()))
    } else {
        None
    }
}

/// The operand shape of `op`.
pub(crate) fn shape(op: Opcode) -> Shape {
    use ConstKind as K;
    use Opcode as O;

    if let Some(a) = arith(op) {
        return a.shape();
    }
    match op {
        O::Nop | O::ReturnVoid => shape_of(Form::Simple, 0, 0),
        O::Move | O::MoveObject | O::ArrayLength => shape_of(Form::Simple, 2, 0),
        O::MoveWide => shape_of(Form::Simple, 2, 0b11),
        O::MoveResult
        | O::MoveResultObject
        | O::MoveException
        | O::Return
        | O::ReturnObject
        | O::MonitorEnter
        | O::MonitorExit
        | O::Throw => shape_of(Form::Simple, 1, 0),
        O::MoveResultWide | O::ReturnWide => shape_of(Form::Simple, 1, 0b1),

        O::Const => shape_of(Form::Const(K::Int), 1, 0),
        O::ConstWide => shape_of(Form::Const(K::Wide), 1, 0b1),
        O::ConstString => shape_of(Form::Const(K::String), 1, 0),
        O::ConstClass | O::CheckCast | O::NewInstance => shape_of(Form::Const(K::Type), 1, 0),
        O::InstanceOf | O::NewArray => shape_of(Form::Const(K::Type), 2, 0),
        O::FilledNewArray => Shape {
            form: Form::Const(K::Type),
            regs: Regs::List,
            wide: 0,
        },
        O::FilledNewArrayRange => Shape {
            form: Form::Const(K::Type),
            regs: Regs::Range,
            wide: 0,
        },
        O::FillArrayData => shape_of(Form::Const(K::ArrayData), 1, 0),

        O::Goto => shape_of(Form::Target, 0, 0),
        O::PackedSwitch | O::SparseSwitch => shape_of(Form::Switch, 1, 0),
        O::IfEq | O::IfNe | O::IfLt | O::IfGe | O::IfGt | O::IfLe => shape_of(Form::Target, 2, 0),
        O::IfEqz | O::IfNez | O::IfLtz | O::IfGez | O::IfGtz | O::IfLez => {
            shape_of(Form::Target, 1, 0)
        }

        O::AgetWide | O::AputWide => shape_of(Form::Simple, 3, 0b1),
        O::Aget
        | O::AgetObject
        | O::AgetBoolean
        | O::AgetByte
        | O::AgetChar
        | O::AgetShort
        | O::Aput
        | O::AputObject
        | O::AputBoolean
        | O::AputByte
        | O::AputChar
        | O::AputShort => shape_of(Form::Simple, 3, 0),

        O::IgetWide | O::IputWide => shape_of(Form::Const(K::Field), 2, 0b1),
        O::Iget
        | O::IgetObject
        | O::IgetBoolean
        | O::IgetByte
        | O::IgetChar
        | O::IgetShort
        | O::Iput
        | O::IputObject
        | O::IputBoolean
        | O::IputByte
        | O::IputChar
        | O::IputShort => shape_of(Form::Const(K::Field), 2, 0),
        O::SgetWide | O::SputWide => shape_of(Form::Const(K::Field), 1, 0b1),
        O::Sget
        | O::SgetObject
        | O::SgetBoolean
        | O::SgetByte
        | O::SgetChar
        | O::SgetShort
        | O::Sput
        | O::SputObject
        | O::SputBoolean
        | O::SputByte
        | O::SputChar
        | O::SputShort => shape_of(Form::Const(K::Field), 1, 0),

        O::InvokeVirtual | O::InvokeSuper | O::InvokeDirect | O::InvokeStatic | O::InvokeInterface => {
            Shape {
                form: Form::Const(K::Method),
                regs: Regs::List,
                wide: 0,
            }
        }
        O::InvokeVirtualRange
        | O::InvokeSuperRange
        | O::InvokeDirectRange
        | O::InvokeStaticRange
        | O::InvokeInterfaceRange => Shape {
            form: Form::Const(K::Method),
            regs: Regs::Range,
            wide: 0,
        },

        // Every remaining opcode has an arithmetic signature.
        _ => shape_of(Form::Simple, 0, 0),
    }
}

fn check_instruction(op: Opcode, instr: &Instruction, registers: usize) -> Result<(), VerifyError> {
    let shape = shape(op);
    let form_ok = match (shape.form, instr) {
        (Form::Simple, Instruction::Simple { .. })
        | (Form::Target, Instruction::Target { .. })
        | (Form::Switch, Instruction::Switch { .. }) => true,
        (Form::Const(kind), Instruction::Const { constant, .. }) => kind.matches(constant),
        _ => false,
    };
    if !form_ok {
        return Err(VerifyError::hard(format!("malformed operands for {op}")));
    }

    let regs = instr.regs();
    match shape.regs {
        Regs::Exact(n) if regs.len() != n => {
            return Err(VerifyError::hard(format!(
                "{op} takes {n} registers, got {}",
                regs.len()
            )));
        }
        Regs::List if regs.len() > MAX_LIST_ARGS => {
            return Err(VerifyError::hard(format!(
                "{op} takes at most {MAX_LIST_ARGS} registers, got {}",
                regs.len()
            )));
        }
        Regs::Range => {
            let consecutive = regs
                .windows(2)
                .all(|w| w[0].checked_add(1) == Some(w[1]));
            if !consecutive {
                return Err(VerifyError::hard(format!(
                    "{op} registers are not consecutive"
                )));
            }
        }
        Regs::Exact(_) | Regs::List => {}
    }

    for (i, &r) in regs.iter().enumerate() {
        let r = usize::from(r);
        let last = if i < 8 && shape.wide & (1 << i) != 0 {
            r.saturating_add(1)
        } else {
            r
        };
        if last >= registers {
            return Err(VerifyError::hard(format!(
                "register v{last} out of range ({registers} registers)"
            )));
        }
    }

    if let Some((lo, hi)) = literal_bounds(op) {
        if let Some(Constant::Int(v)) = instr.constant_operand() {
            if !(lo..=hi).contains(v) {
                return Err(VerifyError::hard(format!("literal {v} out of range for {op}")));
            }
        }
    }

    if let Instruction::Switch { keys, targets, .. } = instr {
        if keys.len() != targets.len() {
            return Err(VerifyError::hard(format!(
                "{op} has {} keys but {} targets",
                keys.len(),
                targets.len()
            )));
        }
        if op == Opcode::PackedSwitch {
            let consecutive = keys
                .windows(2)
                .all(|w| w[0].checked_add(1) == Some(w[1]));
            if !consecutive {
                return Err(VerifyError::hard("packed-switch keys are not consecutive"));
            }
        }
    }
    Ok(())
}

/// Checks everything about the method that does not depend on register
/// types: argument count, operand shapes, register bounds and switch
/// tables.
pub(crate) fn check_structure(method: &Method, body: &MethodBody) -> Result<(), VerifyError> {
    if usize::from(method.ins) != method.expected_ins() {
        return Err(VerifyError::hard(format!(
            "method declares {} argument registers but its prototype needs {}",
            method.ins,
            method.expected_ins()
        )));
    }
    if method.proto.params.iter().any(|p| !p.is_valid() || p.is_void()) || !method.proto.ret.is_valid() {
        return Err(VerifyError::hard(format!("bad method signature {}", method.proto)));
    }
    let registers = method.registers();
    for (pc, instr) in body.instructions.iter().enumerate() {
        if let Some(op) = instr.opcode() {
            check_instruction(op, instr, registers).map_err(|e| e.at(pc))?;
        }
    }
    Ok(())
}

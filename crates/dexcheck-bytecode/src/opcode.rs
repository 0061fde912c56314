use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Control-flow metadata of an [`Opcode`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct OpFlags(u8);

impl OpFlags {
    /// Execution may continue with the next instruction.
    pub const CONTINUE: Self = Self(1 << 0);
    /// The instruction may transfer control to its label target.
    pub const BRANCH: Self = Self(1 << 1);
    /// The instruction may transfer control to any of its case labels.
    pub const SWITCH: Self = Self(1 << 2);
    /// The instruction may raise an exception.
    pub const THROW: Self = Self(1 << 3);
    /// The instruction leaves a value in the result slots.
    pub const RESULT: Self = Self(1 << 4);

    /// Returns the union of both flag sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

const NONE: OpFlags = OpFlags(0);
const C: OpFlags = OpFlags::CONTINUE;
const T: OpFlags = OpFlags::THROW;
const CT: OpFlags = C.union(T);
const CB: OpFlags = C.union(OpFlags::BRANCH);
const CS: OpFlags = C.union(OpFlags::SWITCH);
const CTR: OpFlags = CT.union(OpFlags::RESULT);
const B: OpFlags = OpFlags::BRANCH;

macro_rules! opcodes {
    ($($(#[$meta:meta])* $name:ident = $text:literal, $flags:expr;)*) => {
        /// The fixed opcode enumeration.
        ///
        /// Encoding-width variants (`/16`, `/32`, `/jumbo`, `/high16`) are
        /// folded into one opcode each since operands are held decoded.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub enum Opcode {
            $(
                $(#[$meta])*
                #[doc = concat!("`", $text, "`")]
                $name,
            )*
        }

        impl Opcode {
            /// Every opcode, in declaration order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// The mnemonic.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => $text,)*
                }
            }

            /// Control-flow metadata.
            pub const fn flags(self) -> OpFlags {
                match self {
                    $(Opcode::$name => $flags,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = "nop", C;

    Move = "move", C;
    MoveWide = "move-wide", C;
    MoveObject = "move-object", C;
    MoveResult = "move-result", C;
    MoveResultWide = "move-result-wide", C;
    MoveResultObject = "move-result-object", C;
    MoveException = "move-exception", C;

    ReturnVoid = "return-void", NONE;
    Return = "return", NONE;
    ReturnWide = "return-wide", NONE;
    ReturnObject = "return-object", NONE;

    Const = "const", C;
    ConstWide = "const-wide", C;
    ConstString = "const-string", CT;
    ConstClass = "const-class", CT;

    MonitorEnter = "monitor-enter", CT;
    MonitorExit = "monitor-exit", CT;

    CheckCast = "check-cast", CT;
    InstanceOf = "instance-of", CT;
    ArrayLength = "array-length", CT;
    NewInstance = "new-instance", CT;
    NewArray = "new-array", CT;
    FilledNewArray = "filled-new-array", CTR;
    FilledNewArrayRange = "filled-new-array/range", CTR;
    FillArrayData = "fill-array-data", CT;

    Throw = "throw", T;
    Goto = "goto", B;
    PackedSwitch = "packed-switch", CS;
    SparseSwitch = "sparse-switch", CS;

    CmplFloat = "cmpl-float", C;
    CmpgFloat = "cmpg-float", C;
    CmplDouble = "cmpl-double", C;
    CmpgDouble = "cmpg-double", C;
    CmpLong = "cmp-long", C;

    IfEq = "if-eq", CB;
    IfNe = "if-ne", CB;
    IfLt = "if-lt", CB;
    IfGe = "if-ge", CB;
    IfGt = "if-gt", CB;
    IfLe = "if-le", CB;
    IfEqz = "if-eqz", CB;
    IfNez = "if-nez", CB;
    IfLtz = "if-ltz", CB;
    IfGez = "if-gez", CB;
    IfGtz = "if-gtz", CB;
    IfLez = "if-lez", CB;

    Aget = "aget", CT;
    AgetWide = "aget-wide", CT;
    AgetObject = "aget-object", CT;
    AgetBoolean = "aget-boolean", CT;
    AgetByte = "aget-byte", CT;
    AgetChar = "aget-char", CT;
    AgetShort = "aget-short", CT;
    Aput = "aput", CT;
    AputWide = "aput-wide", CT;
    AputObject = "aput-object", CT;
    AputBoolean = "aput-boolean", CT;
    AputByte = "aput-byte", CT;
    AputChar = "aput-char", CT;
    AputShort = "aput-short", CT;

    Iget = "iget", CT;
    IgetWide = "iget-wide", CT;
    IgetObject = "iget-object", CT;
    IgetBoolean = "iget-boolean", CT;
    IgetByte = "iget-byte", CT;
    IgetChar = "iget-char", CT;
    IgetShort = "iget-short", CT;
    Iput = "iput", CT;
    IputWide = "iput-wide", CT;
    IputObject = "iput-object", CT;
    IputBoolean = "iput-boolean", CT;
    IputByte = "iput-byte", CT;
    IputChar = "iput-char", CT;
    IputShort = "iput-short", CT;

    Sget = "sget", CT;
    SgetWide = "sget-wide", CT;
    SgetObject = "sget-object", CT;
    SgetBoolean = "sget-boolean", CT;
    SgetByte = "sget-byte", CT;
    SgetChar = "sget-char", CT;
    SgetShort = "sget-short", CT;
    Sput = "sput", CT;
    SputWide = "sput-wide", CT;
    SputObject = "sput-object", CT;
    SputBoolean = "sput-boolean", CT;
    SputByte = "sput-byte", CT;
    SputChar = "sput-char", CT;
    SputShort = "sput-short", CT;

    InvokeVirtual = "invoke-virtual", CTR;
    InvokeSuper = "invoke-super", CTR;
    InvokeDirect = "invoke-direct", CTR;
    InvokeStatic = "invoke-static", CTR;
    InvokeInterface = "invoke-interface", CTR;
    InvokeVirtualRange = "invoke-virtual/range", CTR;
    InvokeSuperRange = "invoke-super/range", CTR;
    InvokeDirectRange = "invoke-direct/range", CTR;
    InvokeStaticRange = "invoke-static/range", CTR;
    InvokeInterfaceRange = "invoke-interface/range", CTR;

    NegInt = "neg-int", C;
    NotInt = "not-int", C;
    NegLong = "neg-long", C;
    NotLong = "not-long", C;
    NegFloat = "neg-float", C;
    NegDouble = "neg-double", C;
    IntToLong = "int-to-long", C;
    IntToFloat = "int-to-float", C;
    IntToDouble = "int-to-double", C;
    LongToInt = "long-to-int", C;
    LongToFloat = "long-to-float", C;
    LongToDouble = "long-to-double", C;
    FloatToInt = "float-to-int", C;
    FloatToLong = "float-to-long", C;
    FloatToDouble = "float-to-double", C;
    DoubleToInt = "double-to-int", C;
    DoubleToLong = "double-to-long", C;
    DoubleToFloat = "double-to-float", C;
    IntToByte = "int-to-byte", C;
    IntToChar = "int-to-char", C;
    IntToShort = "int-to-short", C;

    AddInt = "add-int", C;
    SubInt = "sub-int", C;
    MulInt = "mul-int", C;
    DivInt = "div-int", CT;
    RemInt = "rem-int", CT;
    AndInt = "and-int", C;
    OrInt = "or-int", C;
    XorInt = "xor-int", C;
    ShlInt = "shl-int", C;
    ShrInt = "shr-int", C;
    UshrInt = "ushr-int", C;
    AddLong = "add-long", C;
    SubLong = "sub-long", C;
    MulLong = "mul-long", C;
    DivLong = "div-long", CT;
    RemLong = "rem-long", CT;
    AndLong = "and-long", C;
    OrLong = "or-long", C;
    XorLong = "xor-long", C;
    ShlLong = "shl-long", C;
    ShrLong = "shr-long", C;
    UshrLong = "ushr-long", C;
    AddFloat = "add-float", C;
    SubFloat = "sub-float", C;
    MulFloat = "mul-float", C;
    DivFloat = "div-float", C;
    RemFloat = "rem-float", C;
    AddDouble = "add-double", C;
    SubDouble = "sub-double", C;
    MulDouble = "mul-double", C;
    DivDouble = "div-double", C;
    RemDouble = "rem-double", C;

    AddInt2Addr = "add-int/2addr", C;
    SubInt2Addr = "sub-int/2addr", C;
    MulInt2Addr = "mul-int/2addr", C;
    DivInt2Addr = "div-int/2addr", CT;
    RemInt2Addr = "rem-int/2addr", CT;
    AndInt2Addr = "and-int/2addr", C;
    OrInt2Addr = "or-int/2addr", C;
    XorInt2Addr = "xor-int/2addr", C;
    ShlInt2Addr = "shl-int/2addr", C;
    ShrInt2Addr = "shr-int/2addr", C;
    UshrInt2Addr = "ushr-int/2addr", C;
    AddLong2Addr = "add-long/2addr", C;
    SubLong2Addr = "sub-long/2addr", C;
    MulLong2Addr = "mul-long/2addr", C;
    DivLong2Addr = "div-long/2addr", CT;
    RemLong2Addr = "rem-long/2addr", CT;
    AndLong2Addr = "and-long/2addr", C;
    OrLong2Addr = "or-long/2addr", C;
    XorLong2Addr = "xor-long/2addr", C;
    ShlLong2Addr = "shl-long/2addr", C;
    ShrLong2Addr = "shr-long/2addr", C;
    UshrLong2Addr = "ushr-long/2addr", C;
    AddFloat2Addr = "add-float/2addr", C;
    SubFloat2Addr = "sub-float/2addr", C;
    MulFloat2Addr = "mul-float/2addr", C;
    DivFloat2Addr = "div-float/2addr", C;
    RemFloat2Addr = "rem-float/2addr", C;
    AddDouble2Addr = "add-double/2addr", C;
    SubDouble2Addr = "sub-double/2addr", C;
    MulDouble2Addr = "mul-double/2addr", C;
    DivDouble2Addr = "div-double/2addr", C;
    RemDouble2Addr = "rem-double/2addr", C;

    AddIntLit16 = "add-int/lit16", C;
    RsubInt = "rsub-int", C;
    MulIntLit16 = "mul-int/lit16", C;
    DivIntLit16 = "div-int/lit16", CT;
    RemIntLit16 = "rem-int/lit16", CT;
    AndIntLit16 = "and-int/lit16", C;
    OrIntLit16 = "or-int/lit16", C;
    XorIntLit16 = "xor-int/lit16", C;
    AddIntLit8 = "add-int/lit8", C;
    RsubIntLit8 = "rsub-int/lit8", C;
    MulIntLit8 = "mul-int/lit8", C;
    DivIntLit8 = "div-int/lit8", CT;
    RemIntLit8 = "rem-int/lit8", CT;
    AndIntLit8 = "and-int/lit8", C;
    OrIntLit8 = "or-int/lit8", C;
    XorIntLit8 = "xor-int/lit8", C;
    ShlIntLit8 = "shl-int/lit8", C;
    ShrIntLit8 = "shr-int/lit8", C;
    UshrIntLit8 = "ushr-int/lit8", C;
}

impl Opcode {
    /// Execution may continue with the next instruction.
    pub const fn can_continue(self) -> bool {
        self.flags().contains(OpFlags::CONTINUE)
    }

    /// The instruction may jump to its target label.
    pub const fn can_branch(self) -> bool {
        self.flags().contains(OpFlags::BRANCH)
    }

    /// The instruction may jump to one of its case labels.
    pub const fn can_switch(self) -> bool {
        self.flags().contains(OpFlags::SWITCH)
    }

    /// The instruction may raise an exception.
    pub const fn can_throw(self) -> bool {
        self.flags().contains(OpFlags::THROW)
    }

    /// The instruction leaves a value for a following `move-result*`.
    pub const fn has_result(self) -> bool {
        self.flags().contains(OpFlags::RESULT)
    }

    /// The `move-result` family.
    pub const fn is_move_result(self) -> bool {
        matches!(
            self,
            Self::MoveResult | Self::MoveResultWide | Self::MoveResultObject
        )
    }

    /// Any `invoke-*` opcode.
    pub const fn is_invoke(self) -> bool {
        matches!(
            self,
            Self::InvokeVirtual
                | Self::InvokeSuper
                | Self::InvokeDirect
                | Self::InvokeStatic
                | Self::InvokeInterface
                | Self::InvokeVirtualRange
                | Self::InvokeSuperRange
                | Self::InvokeDirectRange
                | Self::InvokeStaticRange
                | Self::InvokeInterfaceRange
        )
    }

    /// Any `return*` opcode.
    pub const fn is_return(self) -> bool {
        matches!(
            self,
            Self::ReturnVoid | Self::Return | Self::ReturnWide | Self::ReturnObject
        )
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

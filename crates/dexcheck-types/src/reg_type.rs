use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A handle to an interned [`RegTypeKind`].
///
/// Handles are only meaningful for the [`TypeTable`](crate::TypeTable)
/// that produced them. Two handles from the same table are equal exactly
/// when their kinds are equal.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct RegType(pub(crate) u32);

impl RegType {
    /// Never written.
    pub const UNDEFINED: Self = Self(0);
    /// Written on some paths with incompatible values.
    pub const CONFLICT: Self = Self(1);
    /// `boolean`
    pub const BOOLEAN: Self = Self(2);
    /// `byte`
    pub const BYTE: Self = Self(3);
    /// `char`
    pub const CHAR: Self = Self(4);
    /// `short`
    pub const SHORT: Self = Self(5);
    /// `int`
    pub const INTEGER: Self = Self(6);
    /// `float`
    pub const FLOAT: Self = Self(7);
    /// Low half of a `long`.
    pub const LONG_LO: Self = Self(8);
    /// High half of a `long`.
    pub const LONG_HI: Self = Self(9);
    /// Low half of a `double`.
    pub const DOUBLE_LO: Self = Self(10);
    /// High half of a `double`.
    pub const DOUBLE_HI: Self = Self(11);
    /// Low half of a wide constant.
    pub const CONSTANT_LO: Self = Self(12);
    /// High half of a wide constant.
    pub const CONSTANT_HI: Self = Self(13);
    /// A merge of references involving an unresolved class.
    pub const UNRESOLVED_MERGED: Self = Self(14);
    /// The precise constant `0`, which is also `null`.
    pub const ZERO: Self = Self(15);

    /// Kinds interned at fixed positions by every table, in handle order.
    pub(crate) const FIXED: [RegTypeKind; 16] = [
        RegTypeKind::Undefined,
        RegTypeKind::Conflict,
        RegTypeKind::Boolean,
        RegTypeKind::Byte,
        RegTypeKind::Char,
        RegTypeKind::Short,
        RegTypeKind::Integer,
        RegTypeKind::Float,
        RegTypeKind::LongLo,
        RegTypeKind::LongHi,
        RegTypeKind::DoubleLo,
        RegTypeKind::DoubleHi,
        RegTypeKind::ConstantLo,
        RegTypeKind::ConstantHi,
        RegTypeKind::UnresolvedMerged,
        RegTypeKind::Constant {
            lo: 0,
            hi: 0,
            precise: true,
        },
    ];

    /// The raw table index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for RegType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handle to an interned class descriptor.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// `Ljava/lang/Object;`
    pub const OBJECT: Self = Self(0);
    /// `Ljava/lang/String;`
    pub const STRING: Self = Self(1);
    /// `Ljava/lang/Class;`
    pub const CLASS: Self = Self(2);
    /// `Ljava/lang/Throwable;`
    pub const THROWABLE: Self = Self(3);

    /// The raw table index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An element of the register type lattice.
///
/// The integral kinds form the chain
/// `Boolean < Byte < Short < Integer` and `Boolean < Char < Integer`.
/// Wide values occupy two registers, a low half followed by the matching
/// high half.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RegTypeKind {
    /// Never written.
    Undefined,
    /// Written on some paths with incompatible values. Unusable.
    Conflict,
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Integer,
    /// `float`
    Float,
    /// Low half of a `long`.
    LongLo,
    /// High half of a `long`.
    LongHi,
    /// Low half of a `double`.
    DoubleLo,
    /// High half of a `double`.
    DoubleHi,
    /// A 32-bit constant known to lie in `lo..=hi`.
    ///
    /// A precise constant was written by a single `const`; an imprecise
    /// one is the result of a merge or of `precise_constants(false)`.
    Constant {
        /// Smallest possible value.
        lo: i32,
        /// Largest possible value.
        hi: i32,
        /// Whether the value is exactly known.
        precise: bool,
    },
    /// Low half of a wide constant.
    ConstantLo,
    /// High half of a wide constant.
    ConstantHi,
    /// An initialized reference to a resolved class or array.
    Reference {
        /// The class.
        class: ClassId,
        /// Whether the runtime class is exactly `class`.
        precise: bool,
    },
    /// A reference to a class the program model does not know.
    Unresolved {
        /// The named class.
        class: ClassId,
    },
    /// A merge of references involving an unresolved class.
    UnresolvedMerged,
    /// The result of `new-instance` before its constructor runs.
    Uninitialized {
        /// The allocated class.
        class: ClassId,
        /// Instruction index of the allocation.
        alloc_pc: u32,
    },
    /// `this` inside a constructor before the superclass constructor runs.
    UninitializedThis {
        /// The class under construction.
        class: ClassId,
    },
}

impl RegTypeKind {
    /// The constant's bounds, if this is a 32-bit constant.
    pub const fn constant_range(self) -> Option<(i32, i32)> {
        match self {
            Self::Constant { lo, hi, .. } => Some((lo, hi)),
            _ => None,
        }
    }

    fn constant_within(self, min: i32, max: i32) -> bool {
        matches!(self.constant_range(), Some((lo, hi)) if lo >= min && hi <= max)
    }

    /// `Undefined`
    pub const fn is_undefined(self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// `Conflict`
    pub const fn is_conflict(self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Any 32-bit constant.
    pub const fn is_constant(self) -> bool {
        matches!(self, Self::Constant { .. })
    }

    /// A precise 32-bit constant.
    pub const fn is_precise_constant(self) -> bool {
        matches!(self, Self::Constant { precise: true, .. })
    }

    /// The constant `0`, which doubles as `null`.
    pub const fn is_zero(self) -> bool {
        matches!(self, Self::Constant { lo: 0, hi: 0, .. })
    }

    /// Values usable where a `boolean` is expected.
    pub fn is_boolean_types(self) -> bool {
        matches!(self, Self::Boolean) || self.constant_within(0, 1)
    }

    /// Values usable where a `byte` is expected.
    pub fn is_byte_types(self) -> bool {
        matches!(self, Self::Byte | Self::Boolean)
            || self.constant_within(i8::MIN.into(), i8::MAX.into())
    }

    /// Values usable where a `short` is expected.
    pub fn is_short_types(self) -> bool {
        matches!(self, Self::Short | Self::Byte | Self::Boolean)
            || self.constant_within(i16::MIN.into(), i16::MAX.into())
    }

    /// Values usable where a `char` is expected.
    pub fn is_char_types(self) -> bool {
        matches!(self, Self::Char | Self::Boolean) || self.constant_within(0, u16::MAX.into())
    }

    /// Values usable where an `int` is expected.
    pub const fn is_integral_types(self) -> bool {
        matches!(
            self,
            Self::Integer
                | Self::Constant { .. }
                | Self::Byte
                | Self::Short
                | Self::Char
                | Self::Boolean
        )
    }

    /// Values usable where a `float` is expected.
    pub const fn is_float_types(self) -> bool {
        matches!(self, Self::Float | Self::Constant { .. })
    }

    /// Values usable as the low half of a `long`.
    pub const fn is_long_types(self) -> bool {
        matches!(self, Self::LongLo | Self::ConstantLo)
    }

    /// Values usable as the high half of a `long`.
    pub const fn is_long_high_types(self) -> bool {
        matches!(self, Self::LongHi | Self::ConstantHi)
    }

    /// Values usable as the low half of a `double`.
    pub const fn is_double_types(self) -> bool {
        matches!(self, Self::DoubleLo | Self::ConstantLo)
    }

    /// Values usable as the high half of a `double`.
    pub const fn is_double_high_types(self) -> bool {
        matches!(self, Self::DoubleHi | Self::ConstantHi)
    }

    /// The low half of any wide value.
    pub const fn is_low_half(self) -> bool {
        matches!(self, Self::LongLo | Self::DoubleLo | Self::ConstantLo)
    }

    /// The high half of any wide value.
    pub const fn is_high_half(self) -> bool {
        matches!(self, Self::LongHi | Self::DoubleHi | Self::ConstantHi)
    }

    /// Single-register primitive values.
    pub const fn is_category1_types(self) -> bool {
        matches!(
            self,
            Self::Constant { .. }
                | Self::Boolean
                | Self::Byte
                | Self::Char
                | Self::Short
                | Self::Integer
                | Self::Float
        )
    }

    /// Any reference, including `null` and uninitialized objects.
    pub const fn is_reference_types(self) -> bool {
        self.is_zero() || self.is_non_zero_reference_types()
    }

    /// Any reference other than `null`.
    pub const fn is_non_zero_reference_types(self) -> bool {
        matches!(
            self,
            Self::Reference { .. }
                | Self::Unresolved { .. }
                | Self::UnresolvedMerged
                | Self::Uninitialized { .. }
                | Self::UninitializedThis { .. }
        )
    }

    /// Objects whose constructor has not yet completed.
    pub const fn is_uninitialized_types(self) -> bool {
        matches!(
            self,
            Self::Uninitialized { .. } | Self::UninitializedThis { .. }
        )
    }

    /// `UninitializedThis`
    pub const fn is_uninitialized_this(self) -> bool {
        matches!(self, Self::UninitializedThis { .. })
    }

    /// References the program model cannot describe.
    pub const fn is_unresolved_types(self) -> bool {
        matches!(self, Self::Unresolved { .. } | Self::UnresolvedMerged)
    }

    /// The class named by a reference-like kind.
    pub const fn class(self) -> Option<ClassId> {
        match self {
            Self::Reference { class, .. }
            | Self::Unresolved { class }
            | Self::Uninitialized { class, .. }
            | Self::UninitializedThis { class } => Some(class),
            _ => None,
        }
    }

    /// The high half matching a low half.
    pub const fn high_half(self) -> Option<Self> {
        match self {
            Self::LongLo => Some(Self::LongHi),
            Self::DoubleLo => Some(Self::DoubleHi),
            Self::ConstantLo => Some(Self::ConstantHi),
            _ => None,
        }
    }

    /// Reports whether `self` and `hi` form a wide pair.
    pub fn check_wide_pair(self, hi: Self) -> bool {
        self.high_half() == Some(hi)
    }
}

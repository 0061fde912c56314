use core::fmt::{self, Display};

use dexcheck_bytecode::{DescKind, TypeDesc};

use crate::{
    ClassId, JAVA_IO_SERIALIZABLE, JAVA_LANG_CLONEABLE, ProgramModel, RegType, RegTypeKind,
    TypeTable,
};

/// Lattice operations over the types in a [`TypeTable`], resolved against
/// a [`ProgramModel`].
#[derive(Copy, Clone)]
pub struct TypeLattice<'a> {
    table: &'a TypeTable,
    program: &'a dyn ProgramModel,
}

impl fmt::Debug for TypeLattice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeLattice")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<'a> TypeLattice<'a> {
    /// Creates a lattice over `table` resolving classes through `program`.
    pub fn new(table: &'a TypeTable, program: &'a dyn ProgramModel) -> Self {
        Self { table, program }
    }

    /// The backing table.
    pub fn table(&self) -> &'a TypeTable {
        self.table
    }

    /// The program model.
    pub fn program(&self) -> &'a dyn ProgramModel {
        self.program
    }

    /// The kind behind `ty`.
    pub fn kind(&self, ty: RegType) -> RegTypeKind {
        self.table.kind(ty)
    }

    /// Interns `kind`.
    pub fn intern(&self, kind: RegTypeKind) -> RegType {
        self.table.intern(kind)
    }

    /// A 32-bit constant. An imprecise constant still records its value.
    pub fn constant(&self, value: i32, precise: bool) -> RegType {
        self.intern(RegTypeKind::Constant {
            lo: value,
            hi: value,
            precise,
        })
    }

    /// The descriptor of the class a reference-like type names.
    pub fn descriptor(&self, ty: RegType) -> Option<TypeDesc> {
        self.kind(ty)
            .class()
            .and_then(|id| self.table.descriptor(id))
    }

    /// The descriptor behind a class handle.
    pub fn class_descriptor(&self, id: ClassId) -> Option<TypeDesc> {
        self.table.descriptor(id)
    }

    /// Reports whether the program model can describe `desc`. Arrays are
    /// resolvable when their element type is primitive or resolvable.
    pub fn is_resolvable(&self, desc: &TypeDesc) -> bool {
        match desc.kind() {
            Some(DescKind::Class) => self.program.class(desc).is_some(),
            Some(DescKind::Array) => {
                let elem = TypeDesc::new(desc.as_str().trim_start_matches('['));
                elem.is_primitive() || self.program.class(&elem).is_some()
            }
            _ => false,
        }
    }

    /// The type of a reference to `desc`: resolved, unresolved, or
    /// `Conflict` for a descriptor that is not a reference.
    pub fn reference(&self, desc: &TypeDesc, precise: bool) -> RegType {
        if !desc.is_reference() {
            return RegType::CONFLICT;
        }
        let class = self.table.class_id(desc);
        if self.is_resolvable(desc) {
            self.intern(RegTypeKind::Reference { class, precise })
        } else {
            self.intern(RegTypeKind::Unresolved { class })
        }
    }

    /// The register type of a value declared with `desc`.
    ///
    /// Malformed descriptors and `V` yield `Conflict`. Wide types yield
    /// their low half.
    pub fn from_descriptor(&self, desc: &TypeDesc, precise: bool) -> RegType {
        match desc.kind() {
            None | Some(DescKind::Void) => RegType::CONFLICT,
            Some(DescKind::Boolean) => RegType::BOOLEAN,
            Some(DescKind::Byte) => RegType::BYTE,
            Some(DescKind::Char) => RegType::CHAR,
            Some(DescKind::Short) => RegType::SHORT,
            Some(DescKind::Int) => RegType::INTEGER,
            Some(DescKind::Float) => RegType::FLOAT,
            Some(DescKind::Long) => RegType::LONG_LO,
            Some(DescKind::Double) => RegType::DOUBLE_LO,
            Some(DescKind::Class | DescKind::Array) => self.reference(desc, precise),
        }
    }

    /// An imprecise `java.lang.Object`.
    pub fn object(&self) -> RegType {
        self.intern(RegTypeKind::Reference {
            class: ClassId::OBJECT,
            precise: false,
        })
    }

    /// A precise `java.lang.String`.
    pub fn string(&self) -> RegType {
        self.intern(RegTypeKind::Reference {
            class: ClassId::STRING,
            precise: true,
        })
    }

    /// A precise `java.lang.Class`.
    pub fn class_object(&self) -> RegType {
        self.intern(RegTypeKind::Reference {
            class: ClassId::CLASS,
            precise: true,
        })
    }

    /// An imprecise `java.lang.Throwable`.
    pub fn throwable(&self) -> RegType {
        self.intern(RegTypeKind::Reference {
            class: ClassId::THROWABLE,
            precise: false,
        })
    }

    /// The uninitialized form of `ty` allocated at `alloc_pc`.
    pub fn uninitialized(&self, ty: RegType, alloc_pc: u32) -> RegType {
        match self.kind(ty) {
            RegTypeKind::Reference { class, .. } | RegTypeKind::Unresolved { class } => {
                self.intern(RegTypeKind::Uninitialized { class, alloc_pc })
            }
            _ => RegType::CONFLICT,
        }
    }

    /// The uninitialized `this` of a constructor of `ty`.
    pub fn uninitialized_this(&self, ty: RegType) -> RegType {
        match self.kind(ty) {
            RegTypeKind::Reference { class, .. } | RegTypeKind::Unresolved { class } => {
                self.intern(RegTypeKind::UninitializedThis { class })
            }
            _ => RegType::CONFLICT,
        }
    }

    /// The initialized form of an uninitialized type.
    ///
    /// A `new-instance` result becomes a precise reference; `this` becomes
    /// an imprecise one because a subclass may be under construction.
    pub fn initialized(&self, uninit: RegType) -> RegType {
        let (class, precise) = match self.kind(uninit) {
            RegTypeKind::Uninitialized { class, .. } => (class, true),
            RegTypeKind::UninitializedThis { class } => (class, false),
            _ => return RegType::CONFLICT,
        };
        match self.table.descriptor(class) {
            Some(desc) => self.reference(&desc, precise),
            None => RegType::CONFLICT,
        }
    }

    /// The high half matching the low half `lo`.
    pub fn high_half(&self, lo: RegType) -> Option<RegType> {
        self.kind(lo).high_half().map(|k| self.intern(k))
    }

    /// Reports whether `lo` and `hi` form a wide pair.
    pub fn check_wide_pair(&self, lo: RegType, hi: RegType) -> bool {
        self.kind(lo).check_wide_pair(self.kind(hi))
    }

    /// A non-null array reference.
    pub fn is_array_types(&self, ty: RegType) -> bool {
        self.kind(ty).is_non_zero_reference_types()
            && self.descriptor(ty).is_some_and(|d| d.is_array())
    }

    /// A non-null array of references.
    pub fn is_object_array_types(&self, ty: RegType) -> bool {
        self.is_array_types(ty)
            && self
                .descriptor(ty)
                .and_then(|d| d.component())
                .is_some_and(|c| c.is_reference())
    }

    /// Exactly `java.lang.Object`.
    pub fn is_java_lang_object(&self, ty: RegType) -> bool {
        matches!(
            self.kind(ty),
            RegTypeKind::Reference {
                class: ClassId::OBJECT,
                ..
            }
        )
    }

    /// Reports whether `desc` names a known interface.
    pub fn is_interface(&self, desc: &TypeDesc) -> bool {
        self.program.class(desc).is_some_and(|c| c.is_interface())
    }

    /// The element type of an array type, or `Conflict`.
    pub fn component_type(&self, array: RegType) -> RegType {
        let component = match self.kind(array) {
            RegTypeKind::Reference { .. } | RegTypeKind::Unresolved { .. } => {
                self.descriptor(array).and_then(|d| d.component())
            }
            _ => None,
        };
        match component {
            Some(c) => self.from_descriptor(&c, false),
            None => RegType::CONFLICT,
        }
    }

    /// The least upper bound of `a` and `b`.
    pub fn merge(&self, a: RegType, b: RegType) -> RegType {
        if a == b {
            return a;
        }
        let (ka, kb) = (self.kind(a), self.kind(b));
        if ka.is_conflict() || kb.is_conflict() || ka.is_undefined() || kb.is_undefined() {
            return RegType::CONFLICT;
        }
        if let (Some((alo, ahi)), Some((blo, bhi))) = (ka.constant_range(), kb.constant_range()) {
            return self.intern(RegTypeKind::Constant {
                lo: alo.min(blo),
                hi: ahi.max(bhi),
                precise: false,
            });
        }
        if ka.is_integral_types() && kb.is_integral_types() {
            return if ka.is_boolean_types() && kb.is_boolean_types() {
                RegType::BOOLEAN
            } else if ka.is_byte_types() && kb.is_byte_types() {
                RegType::BYTE
            } else if ka.is_short_types() && kb.is_short_types() {
                RegType::SHORT
            } else if ka.is_char_types() && kb.is_char_types() {
                RegType::CHAR
            } else {
                RegType::INTEGER
            };
        }
        let both = |p: fn(RegTypeKind) -> bool| p(ka) && p(kb);
        if both(RegTypeKind::is_float_types) {
            RegType::FLOAT
        } else if both(RegTypeKind::is_long_types) {
            RegType::LONG_LO
        } else if both(RegTypeKind::is_long_high_types) {
            RegType::LONG_HI
        } else if both(RegTypeKind::is_double_types) {
            RegType::DOUBLE_LO
        } else if both(RegTypeKind::is_double_high_types) {
            RegType::DOUBLE_HI
        } else if both(RegTypeKind::is_reference_types) {
            self.merge_references(a, ka, b, kb)
        } else {
            RegType::CONFLICT
        }
    }

    fn merge_references(&self, a: RegType, ka: RegTypeKind, b: RegType, kb: RegTypeKind) -> RegType {
        if ka.is_uninitialized_types() || kb.is_uninitialized_types() {
            return RegType::CONFLICT;
        }
        if ka.is_zero() {
            return b;
        }
        if kb.is_zero() {
            return a;
        }
        if self.is_java_lang_object(a) || self.is_java_lang_object(b) {
            return self.object();
        }
        if ka.is_unresolved_types() || kb.is_unresolved_types() {
            return RegType::UNRESOLVED_MERGED;
        }
        match (self.descriptor(a), self.descriptor(b)) {
            (Some(da), Some(db)) => {
                let join = self.join_classes(&da, &db);
                let class = self.table.class_id(&join);
                self.intern(RegTypeKind::Reference {
                    class,
                    precise: false,
                })
            }
            _ => RegType::CONFLICT,
        }
    }

    /// The closest common superclass of two resolved reference types.
    /// Interfaces and mixed array dimensions join to `java.lang.Object`.
    pub fn join_classes(&self, a: &TypeDesc, b: &TypeDesc) -> TypeDesc {
        if a == b {
            return a.clone();
        }
        match (a.component(), b.component()) {
            (Some(ca), Some(cb)) if ca.is_reference() && cb.is_reference() => {
                return self.join_classes(&ca, &cb).array_of();
            }
            (None, None) => {}
            _ => return TypeDesc::object(),
        }
        if self.program.is_subclass_of(b, a) {
            return a.clone();
        }
        if self.program.is_subclass_of(a, b) {
            return b.clone();
        }
        if self.is_interface(a) || self.is_interface(b) {
            return TypeDesc::object();
        }
        let ancestors = self.program.superclasses(a);
        self.program
            .superclasses(b)
            .into_iter()
            .find(|c| ancestors.iter().any(|x| x.desc == c.desc))
            .map_or_else(TypeDesc::object, |c| c.desc.clone())
    }

    /// Reports whether a value of type `rhs` may be stored where `lhs` is
    /// expected.
    ///
    /// Unresolved classes and interfaces are accepted permissively; the
    /// runtime rechecks them.
    pub fn is_assignable_from(&self, lhs: RegType, rhs: RegType) -> bool {
        if lhs == rhs {
            return true;
        }
        let (kl, kr) = (self.kind(lhs), self.kind(rhs));
        match kl {
            RegTypeKind::Undefined
            | RegTypeKind::Conflict
            | RegTypeKind::ConstantLo
            | RegTypeKind::ConstantHi => false,
            RegTypeKind::Boolean => kr.is_boolean_types(),
            RegTypeKind::Byte => kr.is_byte_types(),
            RegTypeKind::Short => kr.is_short_types(),
            RegTypeKind::Char => kr.is_char_types(),
            RegTypeKind::Integer => kr.is_integral_types(),
            RegTypeKind::Float => kr.is_float_types(),
            RegTypeKind::LongLo => kr.is_long_types(),
            RegTypeKind::LongHi => kr.is_long_high_types(),
            RegTypeKind::DoubleLo => kr.is_double_types(),
            RegTypeKind::DoubleHi => kr.is_double_high_types(),
            RegTypeKind::Constant { lo, hi, .. } => {
                matches!(kr.constant_range(), Some((l, h)) if l >= lo && h <= hi)
            }
            RegTypeKind::UnresolvedMerged => kr.is_reference_types(),
            RegTypeKind::Reference { .. }
            | RegTypeKind::Unresolved { .. }
            | RegTypeKind::Uninitialized { .. }
            | RegTypeKind::UninitializedThis { .. } => {
                if kr.is_zero() {
                    return true;
                }
                if !kr.is_reference_types() {
                    return false;
                }
                if kl.is_uninitialized_types() || kr.is_uninitialized_types() {
                    return false;
                }
                if kl.is_unresolved_types() || kr.is_unresolved_types() {
                    return true;
                }
                match (self.descriptor(lhs), self.descriptor(rhs)) {
                    (Some(dl), Some(dr)) => self.is_desc_assignable(&dl, &dr),
                    _ => false,
                }
            }
        }
    }

    /// Reports whether the reference type `rhs` may be stored where `lhs`
    /// is expected.
    pub fn is_desc_assignable(&self, lhs: &TypeDesc, rhs: &TypeDesc) -> bool {
        if lhs == rhs || *lhs == TypeDesc::object() {
            return true;
        }
        match (lhs.component(), rhs.component()) {
            (Some(cl), Some(cr)) => {
                if cl.is_primitive() || cr.is_primitive() {
                    cl == cr
                } else {
                    self.is_desc_assignable(&cl, &cr)
                }
            }
            (Some(_), None) => false,
            (None, Some(_)) => matches!(lhs.as_str(), JAVA_LANG_CLONEABLE | JAVA_IO_SERIALIZABLE),
            (None, None) => self.is_interface(lhs) || self.program.is_subclass_of(rhs, lhs),
        }
    }

    /// Wraps `ty` for display.
    pub fn display(&self, ty: RegType) -> DisplayType<'_> {
        DisplayType {
            lattice: self,
            ty,
        }
    }
}

/// Human-readable rendering of a [`RegType`].
#[derive(Debug)]
pub struct DisplayType<'l> {
    lattice: &'l TypeLattice<'l>,
    ty: RegType,
}

impl Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = |id: ClassId| {
            self.lattice
                .class_descriptor(id)
                .map_or_else(|| String::from("?"), |d| d.as_str().to_owned())
        };
        match self.lattice.kind(self.ty) {
            RegTypeKind::Undefined => f.write_str("Undefined"),
            RegTypeKind::Conflict => f.write_str("Conflict"),
            RegTypeKind::Boolean => f.write_str("Boolean"),
            RegTypeKind::Byte => f.write_str("Byte"),
            RegTypeKind::Char => f.write_str("Char"),
            RegTypeKind::Short => f.write_str("Short"),
            RegTypeKind::Integer => f.write_str("Integer"),
            RegTypeKind::Float => f.write_str("Float"),
            RegTypeKind::LongLo => f.write_str("Long (Low Half)"),
            RegTypeKind::LongHi => f.write_str("Long (High Half)"),
            RegTypeKind::DoubleLo => f.write_str("Double (Low Half)"),
            RegTypeKind::DoubleHi => f.write_str("Double (High Half)"),
            RegTypeKind::Constant { lo, hi, precise } => {
                let p = if precise { "Precise " } else { "" };
                if lo == hi {
                    write!(f, "{p}Constant: {lo}")
                } else {
                    write!(f, "{p}Constant: {lo}..={hi}")
                }
            }
            RegTypeKind::ConstantLo => f.write_str("Wide Constant (Low Half)"),
            RegTypeKind::ConstantHi => f.write_str("Wide Constant (High Half)"),
            RegTypeKind::Reference { class: c, precise } => {
                let p = if precise { "Precise " } else { "" };
                write!(f, "{p}Reference: {}", class(c))
            }
            RegTypeKind::Unresolved { class: c } => write!(f, "Unresolved Reference: {}", class(c)),
            RegTypeKind::UnresolvedMerged => f.write_str("Unresolved Merged References"),
            RegTypeKind::Uninitialized { class: c, alloc_pc } => {
                write!(f, "Uninitialized Reference: {} Allocation PC: {alloc_pc}", class(c))
            }
            RegTypeKind::UninitializedThis { class: c } => {
                write!(f, "Uninitialized This Reference: {}", class(c))
            }
        }
    }
}

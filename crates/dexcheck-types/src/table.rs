use dexcheck_bytecode::{JAVA_LANG_CLASS, JAVA_LANG_OBJECT, JAVA_LANG_STRING, JAVA_LANG_THROWABLE, TypeDesc};
use indexmap::IndexSet;
use spin::RwLock;

use crate::{ClassId, RegType, RegTypeKind};

/// Owns every [`RegTypeKind`] and class descriptor handed out during
/// verification.
///
/// Interning goes through a lock so a single table can be shared by
/// several verifiers. Handles stay valid for the lifetime of the table.
#[derive(Debug)]
pub struct TypeTable {
    inner: RwLock<Interned>,
}

#[derive(Debug)]
struct Interned {
    kinds: IndexSet<RegTypeKind>,
    classes: IndexSet<TypeDesc>,
}

fn to_id(idx: usize) -> u32 {
    // An index past `u32::MAX` names nothing and reads back as `Conflict`.
    u32::try_from(idx).unwrap_or(u32::MAX)
}

impl TypeTable {
    /// Creates a table holding the fixed primitive kinds and the core
    /// `java.lang` classes.
    pub fn new() -> Self {
        let kinds = RegType::FIXED.into_iter().collect::<IndexSet<_>>();
        let classes = [
            JAVA_LANG_OBJECT,
            JAVA_LANG_STRING,
            JAVA_LANG_CLASS,
            JAVA_LANG_THROWABLE,
        ]
        .into_iter()
        .map(TypeDesc::new)
        .collect::<IndexSet<_>>();
        Self {
            inner: RwLock::new(Interned { kinds, classes }),
        }
    }

    /// Returns the handle for `kind`, interning it if needed.
    pub fn intern(&self, kind: RegTypeKind) -> RegType {
        if let Some(idx) = self.inner.read().kinds.get_index_of(&kind) {
            return RegType(to_id(idx));
        }
        let (idx, _) = self.inner.write().kinds.insert_full(kind);
        RegType(to_id(idx))
    }

    /// Returns the kind behind `ty`.
    ///
    /// A handle from another table reads back as
    /// [`RegTypeKind::Conflict`].
    pub fn kind(&self, ty: RegType) -> RegTypeKind {
        self.inner
            .read()
            .kinds
            .get_index(ty.index())
            .copied()
            .unwrap_or(RegTypeKind::Conflict)
    }

    /// Returns the handle for the class named by `desc`, interning it if
    /// needed.
    pub fn class_id(&self, desc: &TypeDesc) -> ClassId {
        if let Some(idx) = self.inner.read().classes.get_index_of(desc) {
            return ClassId(to_id(idx));
        }
        let (idx, _) = self.inner.write().classes.insert_full(desc.clone());
        ClassId(to_id(idx))
    }

    /// Returns the descriptor behind `id`.
    pub fn descriptor(&self, id: ClassId) -> Option<TypeDesc> {
        self.inner.read().classes.get_index(id.index()).cloned()
    }

    /// The number of interned kinds.
    pub fn len(&self) -> usize {
        self.inner.read().kinds.len()
    }

    /// Always false; the fixed kinds are interned on construction.
    pub fn is_empty(&self) -> bool {
        self.inner.read().kinds.is_empty()
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

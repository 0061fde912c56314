use std::collections::BTreeMap;

use dexcheck_bytecode::{
    AccessFlags, JAVA_LANG_CLASS, JAVA_LANG_OBJECT, JAVA_LANG_STRING, JAVA_LANG_THROWABLE, Proto,
    TypeDesc,
};

use crate::{ClassDef, ProgramModel};

/// `Ljava/lang/Cloneable;`
pub const JAVA_LANG_CLONEABLE: &str = "Ljava/lang/Cloneable;";
/// `Ljava/io/Serializable;`
pub const JAVA_IO_SERIALIZABLE: &str = "Ljava/io/Serializable;";

/// An in-memory [`ProgramModel`].
///
/// A new pool already knows `java.lang.Object`, `String`, `Class`,
/// `Throwable`, `Cloneable` and `java.io.Serializable`, each with a public
/// no-argument constructor where one exists.
#[derive(Clone, Debug)]
pub struct ClassPool {
    classes: BTreeMap<TypeDesc, ClassDef>,
}

impl ClassPool {
    /// Creates a pool holding the core classes.
    pub fn new() -> Self {
        let object = TypeDesc::new(JAVA_LANG_OBJECT);
        let void_ctor = Proto::new(Vec::<TypeDesc>::new(), "V");
        let ctor = AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR;
        let core = [
            ClassDef::new(JAVA_LANG_OBJECT, None)
                .method("<init>", void_ctor.clone(), ctor)
                .method(
                    "hashCode",
                    Proto::new(Vec::<TypeDesc>::new(), "I"),
                    AccessFlags::PUBLIC,
                )
                .method(
                    "equals",
                    Proto::new([JAVA_LANG_OBJECT], "Z"),
                    AccessFlags::PUBLIC,
                )
                .method(
                    "toString",
                    Proto::new(Vec::<TypeDesc>::new(), JAVA_LANG_STRING),
                    AccessFlags::PUBLIC,
                ),
            ClassDef::new(JAVA_LANG_STRING, Some(object.clone()))
                .with_flags(AccessFlags::PUBLIC | AccessFlags::FINAL)
                .implements(JAVA_IO_SERIALIZABLE)
                .method("<init>", void_ctor.clone(), ctor)
                .method(
                    "length",
                    Proto::new(Vec::<TypeDesc>::new(), "I"),
                    AccessFlags::PUBLIC,
                ),
            ClassDef::new(JAVA_LANG_CLASS, Some(object.clone()))
                .with_flags(AccessFlags::PUBLIC | AccessFlags::FINAL),
            ClassDef::new(JAVA_LANG_THROWABLE, Some(object))
                .implements(JAVA_IO_SERIALIZABLE)
                .method("<init>", void_ctor, ctor),
            ClassDef::interface(JAVA_LANG_CLONEABLE),
            ClassDef::interface(JAVA_IO_SERIALIZABLE),
        ];
        let mut pool = Self {
            classes: BTreeMap::new(),
        };
        for class in core {
            pool.insert(class);
        }
        pool
    }

    /// Adds or replaces a class.
    pub fn insert(&mut self, class: ClassDef) -> &mut Self {
        self.classes.insert(class.desc.clone(), class);
        self
    }

    /// Adds or replaces a class, builder style.
    pub fn with(mut self, class: ClassDef) -> Self {
        self.insert(class);
        self
    }

    /// Iterates over every known class.
    pub fn iter(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }
}

impl Default for ClassPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramModel for ClassPool {
    fn class(&self, desc: &TypeDesc) -> Option<&ClassDef> {
        self.classes.get(desc)
    }
}

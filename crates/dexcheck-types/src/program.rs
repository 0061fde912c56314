use dexcheck_bytecode::{AccessFlags, Proto, TypeDesc};
use serde::{Deserialize, Serialize};

/// Bounds every walk of the class hierarchy, so a cyclic model cannot hang
/// the verifier.
pub const MAX_HIERARCHY_DEPTH: usize = 256;

/// A field declared by a class.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Declaring class.
    pub owner: TypeDesc,
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: TypeDesc,
    /// Access flags.
    pub flags: AccessFlags,
}

/// A method declared by a class.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    /// Declaring class.
    pub owner: TypeDesc,
    /// Method name.
    pub name: String,
    /// Prototype.
    pub proto: Proto,
    /// Access flags.
    pub flags: AccessFlags,
}

impl MethodDef {
    /// Reports whether this method is dispatched without a vtable lookup:
    /// static, private, or a constructor.
    pub fn is_direct(&self) -> bool {
        self.flags.is_static() || self.flags.is_private() || self.name.starts_with('<')
    }
}

/// A class known to the program model.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    /// The class descriptor.
    pub desc: TypeDesc,
    /// Direct superclass, `None` only for the root class.
    pub superclass: Option<TypeDesc>,
    /// Directly implemented (or, for interfaces, extended) interfaces.
    pub interfaces: Vec<TypeDesc>,
    /// Access flags.
    pub flags: AccessFlags,
    /// Declared fields.
    pub fields: Vec<FieldDef>,
    /// Declared methods.
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    /// Creates a public class with no members.
    pub fn new(desc: impl Into<TypeDesc>, superclass: Option<TypeDesc>) -> Self {
        Self {
            desc: desc.into(),
            superclass,
            interfaces: Vec::new(),
            flags: AccessFlags::PUBLIC,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Creates a public interface.
    pub fn interface(desc: impl Into<TypeDesc>) -> Self {
        let mut c = Self::new(desc, Some(TypeDesc::object()));
        c.flags = AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
        c
    }

    /// Replaces the access flags.
    pub fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Adds an implemented interface.
    pub fn implements(mut self, iface: impl Into<TypeDesc>) -> Self {
        self.interfaces.push(iface.into());
        self
    }

    /// Declares a field.
    pub fn field(mut self, name: &str, ty: impl Into<TypeDesc>, flags: AccessFlags) -> Self {
        self.fields.push(FieldDef {
            owner: self.desc.clone(),
            name: name.to_owned(),
            ty: ty.into(),
            flags,
        });
        self
    }

    /// Declares a method.
    pub fn method(mut self, name: &str, proto: Proto, flags: AccessFlags) -> Self {
        self.methods.push(MethodDef {
            owner: self.desc.clone(),
            name: name.to_owned(),
            proto,
            flags,
        });
        self
    }

    /// `interface`
    pub fn is_interface(&self) -> bool {
        self.flags.is_interface()
    }

    /// `abstract`
    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract()
    }

    fn declared_field(&self, name: &str, ty: &TypeDesc) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name && f.ty == *ty)
    }

    fn declared_method(&self, name: &str, proto: &Proto) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.proto == *proto)
    }
}

/// How a method reference is looked up.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ResolutionKind {
    /// `invoke-direct` and `invoke-static`.
    Direct,
    /// `invoke-virtual` and `invoke-super`.
    Virtual,
    /// `invoke-interface`.
    Interface,
}

/// Answers questions about the classes a method refers to.
///
/// Only [`ProgramModel::class`] is required. The resolution methods walk
/// the hierarchy it describes.
pub trait ProgramModel {
    /// Looks up a class (never an array) by descriptor.
    fn class(&self, desc: &TypeDesc) -> Option<&ClassDef>;

    /// The superclass chain starting at `desc` itself.
    fn superclasses<'a>(&'a self, desc: &TypeDesc) -> Vec<&'a ClassDef> {
        let mut chain = Vec::new();
        let mut next = self.class(desc);
        while let Some(c) = next {
            if chain.len() >= MAX_HIERARCHY_DEPTH {
                break;
            }
            chain.push(c);
            next = c.superclass.as_ref().and_then(|s| self.class(s));
        }
        chain
    }

    /// Reports whether `sub` is `sup`, extends it, or implements it.
    fn is_subclass_of(&self, sub: &TypeDesc, sup: &TypeDesc) -> bool {
        if sub == sup {
            return true;
        }
        let mut pending = vec![sub.clone()];
        let mut seen = Vec::new();
        while let Some(desc) = pending.pop() {
            if seen.contains(&desc) || seen.len() >= MAX_HIERARCHY_DEPTH {
                continue;
            }
            let Some(c) = self.class(&desc) else {
                seen.push(desc);
                continue;
            };
            if c.superclass.as_ref() == Some(sup) || c.interfaces.contains(sup) {
                return true;
            }
            pending.extend(c.superclass.iter().cloned());
            pending.extend(c.interfaces.iter().cloned());
            seen.push(desc);
        }
        false
    }

    /// Resolves a field reference: the owner, then its interfaces, then
    /// its superclasses.
    fn resolve_field(&self, owner: &TypeDesc, name: &str, ty: &TypeDesc) -> Option<&FieldDef> {
        for c in self.superclasses(owner) {
            if let Some(f) = c.declared_field(name, ty) {
                return Some(f);
            }
            for iface in &c.interfaces {
                if let Some(f) = self.class(iface).and_then(|i| i.declared_field(name, ty)) {
                    return Some(f);
                }
            }
        }
        None
    }

    /// Resolves a method reference.
    ///
    /// Direct and virtual lookups search the owner and its superclasses,
    /// then the interfaces of each. Interface lookups search the owner, its
    /// superinterfaces, then `java.lang.Object`.
    fn resolve_method(
        &self,
        owner: &TypeDesc,
        name: &str,
        proto: &Proto,
        kind: ResolutionKind,
    ) -> Option<&MethodDef> {
        match kind {
            ResolutionKind::Direct | ResolutionKind::Virtual => {
                let chain = self.superclasses(owner);
                if let Some(m) = chain
                    .iter()
                    .copied()
                    .find_map(|c| c.declared_method(name, proto))
                {
                    return Some(m);
                }
                chain
                    .iter()
                    .flat_map(|c| c.interfaces.iter())
                    .find_map(|i| self.resolve_interface_method(i, name, proto))
            }
            ResolutionKind::Interface => self
                .resolve_interface_method(owner, name, proto)
                .or_else(|| {
                    self.class(&TypeDesc::object())
                        .and_then(|o| o.declared_method(name, proto))
                }),
        }
    }

    /// Searches an interface and its superinterfaces.
    fn resolve_interface_method(
        &self,
        iface: &TypeDesc,
        name: &str,
        proto: &Proto,
    ) -> Option<&MethodDef> {
        let mut pending = vec![iface.clone()];
        let mut seen = Vec::new();
        while let Some(desc) = pending.pop() {
            if seen.contains(&desc) || seen.len() >= MAX_HIERARCHY_DEPTH {
                continue;
            }
            if let Some(c) = self.class(&desc) {
                if let Some(m) = c.declared_method(name, proto) {
                    return Some(m);
                }
                pending.extend(c.interfaces.iter().cloned());
            }
            seen.push(desc);
        }
        None
    }
}

use alloc::{
    borrow::ToOwned,
    format,
    string::{String, ToString as _},
    vec::Vec,
};
use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Descriptor of the root of the class hierarchy.
pub const JAVA_LANG_OBJECT: &str = "Ljava/lang/Object;";
/// Descriptor of the string class.
pub const JAVA_LANG_STRING: &str = "Ljava/lang/String;";
/// Descriptor of the class-object class.
pub const JAVA_LANG_CLASS: &str = "Ljava/lang/Class;";
/// Descriptor of the root of all throwable classes.
pub const JAVA_LANG_THROWABLE: &str = "Ljava/lang/Throwable;";

/// Maximum number of array dimensions a descriptor may carry.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// An error produced when parsing a [`TypeDesc`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    /// The descriptor was empty.
    #[error("empty type descriptor")]
    Empty,
    /// The descriptor is not well formed.
    #[error("malformed type descriptor `{0}`")]
    Malformed(String),
    /// The descriptor has too many array dimensions.
    #[error("type descriptor `{0}` exceeds {MAX_ARRAY_DIMENSIONS} array dimensions")]
    TooManyDimensions(String),
}

/// The shape of a well-formed descriptor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DescKind {
    /// `V`
    Void,
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `Lpkg/Name;`
    Class,
    /// `[...`
    Array,
}

impl DescKind {
    /// True for the eight primitive value kinds (not `void`).
    pub const fn is_primitive(self) -> bool {
        !matches!(self, Self::Void | Self::Class | Self::Array)
    }

    /// True for `long` and `double`.
    pub const fn is_wide(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// True for classes and arrays.
    pub const fn is_reference(self) -> bool {
        matches!(self, Self::Class | Self::Array)
    }
}

/// A type descriptor in the `Lpkg/Name;` / `[I` / `J` notation.
///
/// A `TypeDesc` may hold a malformed string: descriptors come from
/// untrusted method bodies and the verifier must reject them rather than
/// refuse to represent them. Use [`TypeDesc::parse`] to validate up front or
/// [`TypeDesc::kind`] to classify lazily.
#[derive(Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDesc(String);

impl TypeDesc {
    /// Wraps a descriptor string without validating it.
    pub fn new(desc: impl Into<String>) -> Self {
        Self(desc.into())
    }

    /// Parses and validates a descriptor.
    pub fn parse(desc: &str) -> Result<Self, DescriptorError> {
        if desc.is_empty() {
            return Err(DescriptorError::Empty);
        }
        let dims = desc.bytes().take_while(|&b| b == b'[').count();
        if dims > MAX_ARRAY_DIMENSIONS {
            return Err(DescriptorError::TooManyDimensions(desc.to_owned()));
        }
        let t = TypeDesc::new(desc);
        match t.kind() {
            Some(_) => Ok(t),
            None => Err(DescriptorError::Malformed(desc.to_owned())),
        }
    }

    /// `Ljava/lang/Object;`
    pub fn object() -> Self {
        Self::new(JAVA_LANG_OBJECT)
    }

    /// Builds a class descriptor from a binary name like `java/lang/String`.
    pub fn class(binary_name: &str) -> Self {
        Self(format!("L{binary_name};"))
    }

    /// The descriptor text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classifies the descriptor, or returns `None` if it is malformed.
    pub fn kind(&self) -> Option<DescKind> {
        let bytes = self.0.as_bytes();
        let (&first, rest) = bytes.split_first()?;
        let kind = match first {
            b'V' => DescKind::Void,
            b'Z' => DescKind::Boolean,
            b'B' => DescKind::Byte,
            b'C' => DescKind::Char,
            b'S' => DescKind::Short,
            b'I' => DescKind::Int,
            b'J' => DescKind::Long,
            b'F' => DescKind::Float,
            b'D' => DescKind::Double,
            b'L' => {
                return valid_class_name(rest).then_some(DescKind::Class);
            }
            b'[' => {
                let dims = bytes.iter().take_while(|&&b| b == b'[').count();
                if dims > MAX_ARRAY_DIMENSIONS {
                    return None;
                }
                let elem = TypeDesc::new(self.0.get(dims..)?);
                return match elem.kind()? {
                    DescKind::Void => None,
                    _ => Some(DescKind::Array),
                };
            }
            _ => return None,
        };
        rest.is_empty().then_some(kind)
    }

    /// True if the descriptor is well formed.
    pub fn is_valid(&self) -> bool {
        self.kind().is_some()
    }

    /// True for `V`.
    pub fn is_void(&self) -> bool {
        self.kind() == Some(DescKind::Void)
    }

    /// True for the eight primitive value types.
    pub fn is_primitive(&self) -> bool {
        self.kind().is_some_and(DescKind::is_primitive)
    }

    /// True for `J` and `D`.
    pub fn is_wide(&self) -> bool {
        self.kind().is_some_and(DescKind::is_wide)
    }

    /// True for class and array descriptors.
    pub fn is_reference(&self) -> bool {
        self.kind().is_some_and(DescKind::is_reference)
    }

    /// True for array descriptors.
    pub fn is_array(&self) -> bool {
        self.kind() == Some(DescKind::Array)
    }

    /// Number of leading `[`.
    pub fn dimensions(&self) -> usize {
        self.0.bytes().take_while(|&b| b == b'[').count()
    }

    /// The element type of one array dimension, e.g. `[[I` -> `[I`.
    pub fn component(&self) -> Option<TypeDesc> {
        if !self.is_array() {
            return None;
        }
        self.0.get(1..).map(TypeDesc::new)
    }

    /// The array type whose component is `self`.
    pub fn array_of(&self) -> TypeDesc {
        TypeDesc(format!("[{}", self.0))
    }

    /// Number of registers a value of this type occupies.
    pub fn slots(&self) -> usize {
        match self.kind() {
            Some(DescKind::Void) => 0,
            Some(k) if k.is_wide() => 2,
            _ => 1,
        }
    }
}

fn valid_class_name(rest: &[u8]) -> bool {
    let Some((&b';', name)) = rest.split_last() else {
        return false;
    };
    if name.is_empty() {
        return false;
    }
    name.split(|&b| b == b'/').all(|segment| {
        !segment.is_empty()
            && segment
                .iter()
                .all(|&b| !matches!(b, b';' | b'[' | b'.' | b'/' | b' '))
    })
}

impl Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeDesc {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A method prototype: parameter types and return type.
#[derive(Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proto {
    /// Parameter types, excluding the receiver.
    pub params: Vec<TypeDesc>,
    /// Return type.
    pub ret: TypeDesc,
}

impl Proto {
    /// Creates a prototype.
    pub fn new<I, T>(params: I, ret: impl Into<TypeDesc>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeDesc>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            ret: ret.into(),
        }
    }

    /// Number of registers the parameters occupy, excluding the receiver.
    pub fn arg_slots(&self) -> usize {
        self.params
            .iter()
            .map(TypeDesc::slots)
            .fold(0usize, usize::saturating_add)
    }
}

impl Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for p in &self.params {
            write!(f, "{p}")?;
        }
        write!(f, "){}", self.ret)
    }
}

/// A symbolic reference to a field.
#[derive(Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// The class named at the access site.
    pub owner: TypeDesc,
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: TypeDesc,
}

impl FieldRef {
    /// Creates a field reference.
    pub fn new(owner: impl Into<TypeDesc>, name: &str, ty: impl Into<TypeDesc>) -> Self {
        Self {
            owner: owner.into(),
            name: name.to_string(),
            ty: ty.into(),
        }
    }
}

impl Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.owner, self.name, self.ty)
    }
}

/// A symbolic reference to a method.
#[derive(Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// The class named at the call site.
    pub owner: TypeDesc,
    /// Method name.
    pub name: String,
    /// Prototype.
    pub proto: Proto,
}

impl MethodRef {
    /// Creates a method reference.
    pub fn new(owner: impl Into<TypeDesc>, name: &str, proto: Proto) -> Self {
        Self {
            owner: owner.into(),
            name: name.to_string(),
            proto,
        }
    }

    /// True for `<init>`.
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// True for `<clinit>`.
    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.owner, self.name, self.proto)
    }
}

use core::{
    fmt::{self, Display},
    ops::BitOr,
};

use serde::{Deserialize, Serialize};

/// Access flags of a class, field or method.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AccessFlags(pub u32);

impl AccessFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// `public`
    pub const PUBLIC: Self = Self(0x1);
    /// `private`
    pub const PRIVATE: Self = Self(0x2);
    /// `protected`
    pub const PROTECTED: Self = Self(0x4);
    /// `static`
    pub const STATIC: Self = Self(0x8);
    /// `final`
    pub const FINAL: Self = Self(0x10);
    /// `synchronized`
    pub const SYNCHRONIZED: Self = Self(0x20);
    /// `native`
    pub const NATIVE: Self = Self(0x100);
    /// `interface`
    pub const INTERFACE: Self = Self(0x200);
    /// `abstract`
    pub const ABSTRACT: Self = Self(0x400);
    /// Marks an instance or static initializer.
    pub const CONSTRUCTOR: Self = Self(0x10000);

    /// Returns true if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `static`
    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// `private`
    pub const fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    /// `final`
    pub const fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    /// `interface`
    pub const fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    /// `abstract`
    pub const fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }
}

impl BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(AccessFlags, &str); 10] = [
            (AccessFlags::PUBLIC, "public"),
            (AccessFlags::PRIVATE, "private"),
            (AccessFlags::PROTECTED, "protected"),
            (AccessFlags::STATIC, "static"),
            (AccessFlags::FINAL, "final"),
            (AccessFlags::SYNCHRONIZED, "synchronized"),
            (AccessFlags::NATIVE, "native"),
            (AccessFlags::INTERFACE, "interface"),
            (AccessFlags::ABSTRACT, "abstract"),
            (AccessFlags::CONSTRUCTOR, "constructor"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

//! Method and class modifiers.

bitflags::bitflags! {
    /// Access and property flags as stored in a method's metadata.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        /// `public`
        const PUBLIC = 0x0001;
        /// `private`
        const PRIVATE = 0x0002;
        /// `protected`
        const PROTECTED = 0x0004;
        /// `static`
        const STATIC = 0x0008;
        /// `final`
        const FINAL = 0x0010;
        /// `synchronized`
        const SYNCHRONIZED = 0x0020;
        /// variable arity
        const VARARGS = 0x0080;
        /// `native`
        const NATIVE = 0x0100;
        /// `abstract`
        const ABSTRACT = 0x0400;
    }
}

impl AccessFlags {
    /// `static`?
    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    /// `synchronized`?
    pub fn is_synchronized(self) -> bool {
        self.contains(AccessFlags::SYNCHRONIZED)
    }

    /// `native`?
    pub fn is_native(self) -> bool {
        self.contains(AccessFlags::NATIVE)
    }

    /// `abstract`?
    pub fn is_abstract(self) -> bool {
        self.contains(AccessFlags::ABSTRACT)
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::PUBLIC | AccessFlags::STATIC
    }
}

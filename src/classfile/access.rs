//! Access and property flags for classes, fields and methods (JVMS §4.1, §4.5, §4.6).
//!
//! All flag sets are parsed with `from_bits_retain`, so bits this crate has no name for
//! survive a parse/serialize cycle untouched.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Class access and property modifiers
    pub struct ClassAccessFlags: u16 {
        /// Declared public; may be accessed from outside its package
        const PUBLIC = 0x0001;
        /// Declared final; no subclasses allowed
        const FINAL = 0x0010;
        /// Treat superclass methods specially when invoked by `invokespecial`
        const SUPER = 0x0020;
        /// Is an interface, not a class
        const INTERFACE = 0x0200;
        /// Declared abstract; must not be instantiated
        const ABSTRACT = 0x0400;
        /// Declared synthetic; not present in the source code
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface
        const ANNOTATION = 0x2000;
        /// Declared as an enum class
        const ENUM = 0x4000;
        /// Is a module, not a class or interface
        const MODULE = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Field access and property modifiers
    pub struct FieldAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final; never directly assigned after construction
        const FINAL = 0x0010;
        /// Declared volatile; cannot be cached
        const VOLATILE = 0x0040;
        /// Declared transient; not written or read by a persistent object manager
        const TRANSIENT = 0x0080;
        /// Declared synthetic
        const SYNTHETIC = 0x1000;
        /// Declared as an element of an enum class
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method access and property modifiers
    pub struct MethodAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final; must not be overridden
        const FINAL = 0x0010;
        /// Declared synchronized; invocation is wrapped by a monitor use
        const SYNCHRONIZED = 0x0020;
        /// A bridge method, generated by the compiler
        const BRIDGE = 0x0040;
        /// Declared with variable number of arguments
        const VARARGS = 0x0080;
        /// Declared native; implemented in a language other than Java
        const NATIVE = 0x0100;
        /// Declared abstract; no implementation is provided
        const ABSTRACT = 0x0400;
        /// In a class file whose major version is 46-60, declared strictfp
        const STRICT = 0x0800;
        /// Declared synthetic
        const SYNTHETIC = 0x1000;
    }
}

impl MethodAccessFlags {
    /// The three mutually exclusive visibility bits
    pub const VISIBILITY: Self = Self::PUBLIC.union(Self::PRIVATE).union(Self::PROTECTED);

    /// Returns a copy with the visibility replaced by `PUBLIC`.
    #[must_use]
    pub fn made_public(self) -> Self {
        self.difference(Self::VISIBILITY).union(Self::PUBLIC)
    }

    /// Java source-order modifier keywords, as used in disassembly listings.
    #[must_use]
    pub fn keywords(self) -> Vec<&'static str> {
        let mut words = Vec::new();
        for (flag, word) in [
            (Self::PUBLIC, "public"),
            (Self::PRIVATE, "private"),
            (Self::PROTECTED, "protected"),
            (Self::STATIC, "static"),
            (Self::FINAL, "final"),
            (Self::SYNCHRONIZED, "synchronized"),
            (Self::NATIVE, "native"),
            (Self::ABSTRACT, "abstract"),
            (Self::STRICT, "strictfp"),
        ] {
            if self.contains(flag) {
                words.push(word);
            }
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_made_public_clears_other_visibility() {
        let flags = MethodAccessFlags::PRIVATE | MethodAccessFlags::FINAL;
        let public = flags.made_public();

        assert!(public.contains(MethodAccessFlags::PUBLIC));
        assert!(!public.contains(MethodAccessFlags::PRIVATE));
        assert!(public.contains(MethodAccessFlags::FINAL));
    }

    #[test]
    fn test_unknown_bits_are_retained() {
        let flags = ClassAccessFlags::from_bits_retain(0x0021 | 0x0100);
        assert_eq!(flags.bits(), 0x0121);
        assert!(flags.contains(ClassAccessFlags::SUPER));
    }

    #[test]
    fn test_keywords_order() {
        let flags = MethodAccessFlags::STATIC | MethodAccessFlags::PUBLIC;
        assert_eq!(flags.keywords(), vec!["public", "static"]);
    }
}

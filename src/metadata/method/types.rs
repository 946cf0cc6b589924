//! Method attribute flags and supporting types.
//!
//! # Key Types
//! - [`MethodAccessFlags`], [`MethodModifiers`]: Attribute flags, split the same way the
//!   `MethodAttributes` column is laid out (access in the low three bits, modifiers above)
//! - [`ParamAttributes`], [`Param`]: Parameter rows
//! - [`GenericParam`]: Generic parameter of a method or type

use bitflags::bitflags;

/// Bitmask for `ACCESS` state extraction
pub const METHOD_ACCESS_MASK: u32 = 0x0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method access flags
    pub struct MethodAccessFlags: u32 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this Assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
    }
}

impl MethodAccessFlags {
    /// Extract access flags from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        Self::from_bits_truncate(flags & METHOD_ACCESS_MASK)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method modifiers and properties
    pub struct MethodModifiers: u32 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method may not be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, depending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
    }
}

impl MethodModifiers {
    /// Extract modifiers from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        Self::from_bits_truncate(flags & !METHOD_ACCESS_MASK)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Parameter attributes
    pub struct ParamAttributes: u16 {
        /// Parameter is \[In\]
        const IN = 0x0001;
        /// Parameter is \[Out\]
        const OUT = 0x0002;
        /// Parameter is optional
        const OPTIONAL = 0x0010;
        /// Parameter has a default value
        const HAS_DEFAULT = 0x1000;
    }
}

/// A named method parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// 1-based position in the signature
    pub sequence: u16,
    /// Parameter attributes
    pub flags: ParamAttributes,
}

/// A generic parameter of a type or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParam {
    /// 0-based position
    pub number: u16,
    /// Parameter name, e.g. `T`
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_extraction() {
        let raw = 0x0006 | 0x0010 | 0x0080;
        assert_eq!(MethodAccessFlags::from_method_flags(raw), MethodAccessFlags::PUBLIC);
        let modifiers = MethodModifiers::from_method_flags(raw);
        assert!(modifiers.contains(MethodModifiers::STATIC));
        assert!(modifiers.contains(MethodModifiers::HIDE_BY_SIG));
        assert!(!modifiers.contains(MethodModifiers::VIRTUAL));
    }

    #[test]
    fn test_private_access() {
        assert_eq!(
            MethodAccessFlags::from_method_flags(0x0001 | 0x0040),
            MethodAccessFlags::PRIVATE
        );
    }
}

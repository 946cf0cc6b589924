//! Values and runtime identities used by the emulator.
//!
//! Emulated code runs across several modules at once: the woven module and the reference
//! modules of the runtime library. A [`Member`] names a type, method or field by its
//! defining module and token. A [`RuntimeType`] is what `ldtoken` produces for a type
//! signature, which is either a built-in type or a type definition.

mod emvalue;

use std::{
    fmt,
    hash::{Hash, Hasher},
};

pub use emvalue::{EmValue, HeapRef};

use crate::metadata::{module::Module, signatures::TypeSignature, token::Token};

/// A type, method or field definition together with its defining module.
///
/// Two members are equal when they come from equally named modules and carry the same
/// token. Module names are unique within one resolver.
#[derive(Clone, Copy)]
pub struct Member<'m> {
    /// Defining module
    pub module: &'m Module,
    /// `TypeDef`, `MethodDef` or `Field` token inside `module`
    pub token: Token,
}

impl<'m> Member<'m> {
    /// Creates a member
    #[must_use]
    pub fn new(module: &'m Module, token: Token) -> Self {
        Member { module, token }
    }
}

impl PartialEq for Member<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token && self.module.name() == other.module.name()
    }
}

impl Eq for Member<'_> {}

impl Hash for Member<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module.name().hash(state);
        self.token.hash(state);
    }
}

impl fmt::Debug for Member<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Member({}, {})", self.module.name(), self.token)
    }
}

impl fmt::Display for Member<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(ty) = self.module.type_name(self.token) {
            return f.write_str(ty);
        }
        f.write_str(&self.module.member_display_name(self.token))
    }
}

/// A type as seen by emulated reflection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeType<'m> {
    /// A built-in type: primitives, `string`, `object`, arrays and generic parameters
    Builtin(TypeSignature),
    /// A type definition
    Defined(Member<'m>),
}

impl RuntimeType<'_> {
    /// Runtime full name of the type
    #[must_use]
    pub fn full_name(&self) -> String {
        match self {
            RuntimeType::Builtin(signature) => signature
                .builtin_name()
                .map_or_else(|| signature.to_string(), str::to_string),
            RuntimeType::Defined(member) => member
                .module
                .type_name(member.token)
                .map_or_else(|_| member.to_string(), str::to_string),
        }
    }
}

impl fmt::Display for RuntimeType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_member_identity_follows_module_name() {
        let first = Module::new("Lib");
        let second = Module::new("Lib");
        let other = Module::new("Other");
        let token = Token::new(0x0600_0001);

        assert_eq!(Member::new(&first, token), Member::new(&second, token));
        assert_ne!(Member::new(&first, token), Member::new(&other, token));

        let set: HashSet<Member<'_>> =
            [Member::new(&first, token), Member::new(&second, token)].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(RuntimeType::Builtin(TypeSignature::I4).full_name(), "System.Int32");
        assert_eq!(RuntimeType::Builtin(TypeSignature::String).to_string(), "System.String");
    }
}

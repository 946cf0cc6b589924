//! Linearized base-type chains.
//!
//! Discovery asks "does this attribute type derive from an aspect base type" for every
//! attribute in the module, and hook lookup walks the same chains again. The chains are
//! computed once per type and cached as arrays of ancestors, nearest first, starting with
//! the type itself. Interfaces are not part of a chain.

use std::collections::{HashMap, HashSet};

use crate::{
    metadata::{
        module::Module,
        typesystem::{AssemblyResolver, Scope, TypeKey, TypeLocation},
    },
    Error, Result,
};

/// Chains longer than this are treated as corrupt
const MAX_DEPTH: usize = 256;

/// Cache of linearized base-type chains for one weave pass.
pub struct TypeHierarchy<'r> {
    resolver: &'r dyn AssemblyResolver,
    chains: HashMap<TypeKey, Vec<TypeLocation<'r>>>,
}

impl<'r> TypeHierarchy<'r> {
    /// Creates an empty cache
    pub fn new(resolver: &'r dyn AssemblyResolver) -> Self {
        TypeHierarchy {
            resolver,
            chains: HashMap::new(),
        }
    }

    /// Linearizes every type defined in `target` up front
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecursionLimit`] if a chain is cyclic or deeper than the limit.
    pub fn build(target: &Module, resolver: &'r dyn AssemblyResolver) -> Result<Self> {
        let mut hierarchy = Self::new(resolver);
        for def in target.types() {
            hierarchy.ancestors(
                target,
                TypeLocation {
                    scope: Scope::Target,
                    token: def.token,
                },
            )?;
        }
        Ok(hierarchy)
    }

    /// Number of cached chains
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// True if nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// The type followed by its base types, nearest first.
    ///
    /// The chain ends at the root type or at the first base type that cannot be
    /// resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecursionLimit`] if the chain is cyclic or deeper than the limit.
    pub fn ancestors(&mut self, target: &Module, ty: TypeLocation<'r>) -> Result<&[TypeLocation<'r>]> {
        let key = ty.key(target);
        if !self.chains.contains_key(&key) {
            let chain = self.linearize(target, ty)?;
            self.chains.insert(key.clone(), chain);
        }
        Ok(self.chains.get(&key).map(Vec::as_slice).unwrap_or_default())
    }

    /// True if `ty` is `base` or transitively derives from it
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecursionLimit`] if the chain is cyclic or deeper than the limit.
    pub fn derives_from(&mut self, target: &Module, ty: TypeLocation<'r>, base: &TypeKey) -> Result<bool> {
        Ok(self
            .ancestors(target, ty)?
            .iter()
            .any(|ancestor| ancestor.key(target) == *base))
    }

    fn linearize(&self, target: &Module, ty: TypeLocation<'r>) -> Result<Vec<TypeLocation<'r>>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(ty);

        while let Some(location) = current {
            if !seen.insert(location.key(target)) || chain.len() >= MAX_DEPTH {
                return Err(Error::RecursionLimit(chain.len()));
            }
            chain.push(location);
            current = location.base(target, self.resolver);
        }
        Ok(chain)
    }
}

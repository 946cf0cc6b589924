//! Resolution of type references across modules.
//!
//! A [`TypeRef`](super::TypeRef) names a type by assembly and full name. Resolving it means
//! locating the module that defines the type and the `TypeDef` row inside that module.
//! The module being woven is never owned by the resolver: it is mutated during the pass,
//! so locations inside it are expressed as [`Scope::Target`] and carry no borrow.

use std::collections::HashMap;

use crate::metadata::{module::Module, token::Token};

/// Lookup of referenced modules by assembly name.
///
/// Implementations must be shareable across threads, the weaver's verification pass and
/// concurrent emulation both hold a resolver while running in parallel.
pub trait AssemblyResolver: Sync {
    /// Returns the module of the named assembly, if it is available
    fn resolve(&self, assembly: &str) -> Option<&Module>;
}

/// An [`AssemblyResolver`] over an in-memory set of modules.
///
/// # Examples
///
/// ```rust
/// use dotweave::metadata::{module::Module, typesystem::{AssemblyResolver, DefaultAssemblyResolver}};
///
/// let mut resolver = DefaultAssemblyResolver::new();
/// resolver.add(Module::new("Library"));
/// assert!(resolver.resolve("Library").is_some());
/// assert!(resolver.resolve("Missing").is_none());
/// ```
#[derive(Debug, Default)]
pub struct DefaultAssemblyResolver {
    modules: HashMap<String, Module>,
}

impl DefaultAssemblyResolver {
    /// Creates an empty resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under its own name, replacing any previous module of that name
    pub fn add(&mut self, module: Module) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Builder-style variant of [`DefaultAssemblyResolver::add`]
    #[must_use]
    pub fn with(mut self, module: Module) -> Self {
        self.add(module);
        self
    }

    /// Iterates over the registered modules in no particular order
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Number of registered modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// True if no module is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl AssemblyResolver for DefaultAssemblyResolver {
    fn resolve(&self, assembly: &str) -> Option<&Module> {
        self.modules.get(assembly)
    }
}

/// The module a resolved entity lives in.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'r> {
    /// The module being woven
    Target,
    /// A module owned by the resolver
    Reference(&'r Module),
}

impl<'r> Scope<'r> {
    /// The module behind this scope
    #[must_use]
    pub fn module<'s>(&self, target: &'s Module) -> &'s Module
    where
        'r: 's,
    {
        match self {
            Scope::Target => target,
            Scope::Reference(module) => module,
        }
    }

    /// True if the scope is the module being woven
    #[must_use]
    pub fn is_target(&self) -> bool {
        matches!(self, Scope::Target)
    }
}

/// A type definition together with the module that owns it.
#[derive(Debug, Clone, Copy)]
pub struct TypeLocation<'r> {
    /// Owning module
    pub scope: Scope<'r>,
    /// `TypeDef` token inside the owning module
    pub token: Token,
}

impl<'r> TypeLocation<'r> {
    /// Identity of the located type, stable across scopes
    #[must_use]
    pub fn key(&self, target: &Module) -> TypeKey {
        TypeKey {
            assembly: self.scope.module(target).name().to_string(),
            token: self.token,
        }
    }

    /// Runtime full name of the located type
    #[must_use]
    pub fn full_name<'s>(&self, target: &'s Module) -> Option<&'s str>
    where
        'r: 's,
    {
        self.scope
            .module(target)
            .type_def(self.token)
            .ok()
            .map(|def| def.full_name())
    }

    /// Location of the base type, `None` at the root of the hierarchy or if the base
    /// type cannot be resolved
    #[must_use]
    pub fn base(
        &self,
        target: &Module,
        resolver: &'r dyn AssemblyResolver,
    ) -> Option<TypeLocation<'r>> {
        let module = self.scope.module(target);
        let base = module.type_def(self.token).ok()?.extends.as_ref()?.type_token()?;
        resolve_type(target, self.scope, resolver, base)
    }
}

/// Identity of a type definition: the defining assembly and its `TypeDef` token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    /// Name of the defining assembly
    pub assembly: String,
    /// `TypeDef` token in the defining assembly
    pub token: Token,
}

/// Resolves a `TypeDef` or `TypeRef` token of the module in `scope` to its definition.
///
/// References whose assembly is the target module's own name resolve back into
/// [`Scope::Target`]. Returns `None` if the assembly is unknown to the resolver or does not
/// define the named type.
#[must_use]
pub fn resolve_type<'r>(
    target: &Module,
    scope: Scope<'r>,
    resolver: &'r dyn AssemblyResolver,
    token: Token,
) -> Option<TypeLocation<'r>> {
    use crate::metadata::token::table;

    let module = scope.module(target);
    if token.is_table(table::TYPE_DEF) {
        module.type_def(token).ok()?;
        return Some(TypeLocation { scope, token });
    }
    if !token.is_table(table::TYPE_REF) {
        return None;
    }

    let reference = module.type_ref_row(token).ok()?;
    if reference.assembly == target.name() {
        let found = target.find_type(reference.full_name())?;
        return Some(TypeLocation {
            scope: Scope::Target,
            token: found,
        });
    }

    let defining = resolver.resolve(&reference.assembly)?;
    let found = defining.find_type(reference.full_name())?;
    Some(TypeLocation {
        scope: Scope::Reference(defining),
        token: found,
    })
}

//! Attribute-driven aspect discovery.
//!
//! An attribute is an aspect declaration if its type transitively derives from one of the
//! three aspect base types. Only the base-type chain counts, implemented interfaces do
//! not. A member sees the attributes attached to itself first, then those attached to its
//! declaring type, and the result is ordered by the aspect's `AspectPriority` property.

use crate::{
    config::AspectKinds,
    metadata::{
        customattributes::{CustomAttribute, CustomAttributeNamedArgument},
        module::Module,
        token::Token,
        typesystem::{resolve_type, AssemblyResolver, Scope, TypeKey, TypeLocation},
    },
    weaver::{chain::AspectChain, hierarchy::TypeHierarchy, resolver::WellKnownReferences},
    Result,
};

/// Name of the ordering property every aspect exposes
pub const PRIORITY_PROPERTY: &str = "AspectPriority";

/// The aspect category an attribute belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AspectKind {
    /// Replaces the method body with a single `OnInvoke` hook
    MethodInterception,
    /// Wraps the method body with entry, success, exception and exit hooks
    MethodBoundary,
    /// Intercepts property getters and setters
    LocationInterception,
}

impl AspectKind {
    /// The configuration flag enabling this kind
    #[must_use]
    pub fn flag(self) -> AspectKinds {
        match self {
            AspectKind::MethodInterception => AspectKinds::METHOD_INTERCEPTION,
            AspectKind::MethodBoundary => AspectKinds::METHOD_BOUNDARY,
            AspectKind::LocationInterception => AspectKinds::LOCATION_INTERCEPTION,
        }
    }

    /// True for the kinds that apply to methods
    #[must_use]
    pub fn targets_methods(self) -> bool {
        !matches!(self, AspectKind::LocationInterception)
    }
}

impl std::fmt::Display for AspectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AspectKind::MethodInterception => "interception",
            AspectKind::MethodBoundary => "boundary",
            AspectKind::LocationInterception => "location",
        };
        f.write_str(name)
    }
}

/// Where an aspect declaration was attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationSource {
    /// On the method or property itself
    Member,
    /// On the declaring type, applying to all its members
    DeclaringType,
}

/// One aspect attribute found on a member or its declaring type.
#[derive(Debug, Clone)]
pub struct AspectDeclaration<'r> {
    /// Aspect category
    pub kind: AspectKind,
    /// The concrete aspect type
    pub aspect_type: TypeLocation<'r>,
    /// Configured property values, in attribute order
    pub properties: Vec<CustomAttributeNamedArgument>,
    /// Ordering key, lower values are applied first
    pub priority: i32,
    /// Where the attribute was attached
    pub source: DeclarationSource,
}

impl<'r> AspectDeclaration<'r> {
    /// Full name of the aspect type
    #[must_use]
    pub fn aspect_name<'s>(&self, target: &'s Module) -> &'s str
    where
        'r: 's,
    {
        self.aspect_type.full_name(target).unwrap_or("<unresolved aspect>")
    }
}

/// Classifies attributes against the aspect base types.
///
/// Holds the linearized hierarchy for the whole pass, every chain is computed once.
pub struct AspectDiscovery<'r> {
    resolver: &'r dyn AssemblyResolver,
    hierarchy: TypeHierarchy<'r>,
    bases: Vec<(AspectKind, TypeKey)>,
}

impl<'r> AspectDiscovery<'r> {
    /// Prepares discovery for the base types found in `references`
    ///
    /// Kinds that are not `enabled` are never reported.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RecursionLimit`] if a type of `target` has a cyclic
    /// base-type chain.
    pub fn new(
        target: &Module,
        resolver: &'r dyn AssemblyResolver,
        references: &WellKnownReferences<'r>,
        enabled: AspectKinds,
    ) -> Result<Self> {
        let candidates = [
            (AspectKind::MethodInterception, references.method_interception),
            (AspectKind::MethodBoundary, references.method_boundary),
            (AspectKind::LocationInterception, references.location_interception),
        ];
        let bases = candidates
            .into_iter()
            .filter(|(kind, _)| enabled.contains(kind.flag()))
            .filter_map(|(kind, base)| base.map(|base| (kind, base.key(target))))
            .collect();

        Ok(AspectDiscovery {
            resolver,
            hierarchy: TypeHierarchy::build(target, resolver)?,
            bases,
        })
    }

    /// The hierarchy cache, shared with hook lookup
    pub fn hierarchy(&mut self) -> &mut TypeHierarchy<'r> {
        &mut self.hierarchy
    }

    /// Method-level aspects of a method: its own attributes, then those of its type
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MemberNotFound`] for an unknown method and
    /// [`crate::Error::RecursionLimit`] for a cyclic aspect hierarchy.
    pub fn discover_method(&mut self, target: &Module, method: Token) -> Result<AspectChain<'r>> {
        let def = target.method(method)?;
        let owner = target.type_def(def.declaring_type)?;
        self.collect(
            target,
            &def.custom_attributes,
            &owner.custom_attributes,
            AspectKind::targets_methods,
        )
    }

    /// Location aspects of a property: its own attributes, then those of its type
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MemberNotFound`] for an unknown property and
    /// [`crate::Error::RecursionLimit`] for a cyclic aspect hierarchy.
    pub fn discover_property(
        &mut self,
        target: &Module,
        property: Token,
    ) -> Result<AspectChain<'r>> {
        let def = target.property(property)?;
        let owner = target.type_def(def.declaring_type)?;
        self.collect(
            target,
            &def.custom_attributes,
            &owner.custom_attributes,
            |kind| kind == AspectKind::LocationInterception,
        )
    }

    fn collect<F>(
        &mut self,
        target: &Module,
        member: &[CustomAttribute],
        owner: &[CustomAttribute],
        accept: F,
    ) -> Result<AspectChain<'r>>
    where
        F: Fn(AspectKind) -> bool,
    {
        let sources = member
            .iter()
            .map(|attr| (attr, DeclarationSource::Member))
            .chain(owner.iter().map(|attr| (attr, DeclarationSource::DeclaringType)));

        let mut declarations = Vec::new();
        for (attribute, source) in sources {
            let Some((kind, aspect_type)) = self.classify(target, attribute)? else {
                continue;
            };
            if !accept(kind) {
                continue;
            }
            let priority = attribute
                .value
                .property(PRIORITY_PROPERTY)
                .and_then(|value| value.as_i32())
                .unwrap_or(0);

            declarations.push(AspectDeclaration {
                kind,
                aspect_type,
                properties: attribute.value.properties().cloned().collect(),
                priority,
                source,
            });
        }
        Ok(AspectChain::new(declarations))
    }

    /// The aspect kind and type of an attribute, `None` for ordinary attributes
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RecursionLimit`] for a cyclic attribute type hierarchy.
    pub fn classify(
        &mut self,
        target: &Module,
        attribute: &CustomAttribute,
    ) -> Result<Option<(AspectKind, TypeLocation<'r>)>> {
        let Some(token) = target.attribute_type(attribute) else {
            return Ok(None);
        };
        let Some(location) = resolve_type(target, Scope::Target, self.resolver, token) else {
            return Ok(None);
        };

        for (kind, base) in &self.bases {
            if self.hierarchy.derives_from(target, location, base)? {
                return Ok(Some((*kind, location)));
            }
        }
        Ok(None)
    }
}

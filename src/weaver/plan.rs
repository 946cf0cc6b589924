//! Resolution of everything an aspect instance needs before code is generated.
//!
//! An [`AspectPlan`] is computed against the unmodified module: the parameterless
//! constructor of the aspect, the setter of every configured property and the hook
//! methods the generated code calls. Hooks and setters are searched along the aspect's
//! ancestor chain, nearest first, so inherited members are found as well.

use crate::{
    metadata::{
        customattributes::CustomAttributeArgument, module::Module, signatures::TypeSignature,
        typesystem::TypeLocation,
    },
    weaver::{
        discovery::{AspectDeclaration, AspectKind},
        emit::literal_type,
        hierarchy::TypeHierarchy,
        resolver::{MemberLocation, WellKnownReferences},
    },
    Error, Result,
};

/// One configured aspect property.
#[derive(Debug, Clone)]
pub struct PropertyAssignment<'r> {
    /// Property name
    pub name: String,
    /// Literal value from the attribute
    pub value: CustomAttributeArgument,
    /// Nearest `set_` accessor, `None` if the aspect has no such property
    pub setter: Option<MemberLocation<'r>>,
    /// The literal is a value type and the setter takes a reference type
    pub box_as: Option<TypeSignature>,
}

/// Hook methods the generated code calls.
#[derive(Debug, Clone, Copy)]
pub enum Hooks<'r> {
    /// Full interception
    Interception {
        /// `OnInvoke(MethodInterceptionArgs)`
        on_invoke: MemberLocation<'r>,
    },
    /// Boundary wrapping. A hook is `None` when only the base type's no-op implements it.
    Boundary {
        /// `OnEntry(MethodExecutionArgs)`
        on_entry: Option<MemberLocation<'r>>,
        /// `OnSuccess(MethodExecutionArgs)`
        on_success: Option<MemberLocation<'r>>,
        /// `OnException(MethodExecutionArgs)`
        on_exception: Option<MemberLocation<'r>>,
        /// `OnExit(MethodExecutionArgs)`
        on_exit: Option<MemberLocation<'r>>,
    },
    /// Location interception
    Location {
        /// `OnGetValue(LocationInterceptionArgs)`
        on_get_value: MemberLocation<'r>,
        /// `OnSetValue(LocationInterceptionArgs)`
        on_set_value: MemberLocation<'r>,
    },
}

/// A fully resolved aspect instance.
#[derive(Debug, Clone)]
pub struct AspectPlan<'r> {
    /// The concrete aspect type
    pub aspect_type: TypeLocation<'r>,
    /// Parameterless constructor, `None` if the aspect cannot be instantiated
    pub ctor: Option<MemberLocation<'r>>,
    /// Property values in attribute order
    pub assignments: Vec<PropertyAssignment<'r>>,
    /// Hooks to call
    pub hooks: Hooks<'r>,
}

impl<'r> AspectPlan<'r> {
    /// Resolves the plan for `declaration`
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedAttributeValue`] for a property value without a literal
    /// form, [`Error::TypeError`] if a required hook is missing, and
    /// [`Error::RecursionLimit`] for a cyclic aspect hierarchy.
    pub fn build(
        target: &Module,
        hierarchy: &mut TypeHierarchy<'r>,
        references: &WellKnownReferences<'r>,
        declaration: &AspectDeclaration<'r>,
    ) -> Result<Self> {
        let ancestors = hierarchy.ancestors(target, declaration.aspect_type)?.to_vec();
        let aspect_name = declaration.aspect_name(target).to_string();

        let ctor = {
            let module = declaration.aspect_type.scope.module(target);
            let is_abstract = module
                .type_def(declaration.aspect_type.token)
                .is_ok_and(|def| def.is_abstract());
            module
                .methods_of(declaration.aspect_type.token)
                .find(|m| m.name == ".ctor" && m.signature.params.is_empty() && !m.is_static())
                .filter(|_| !is_abstract)
                .map(|m| MemberLocation {
                    scope: declaration.aspect_type.scope,
                    token: m.token,
                })
        };

        let mut assignments = Vec::with_capacity(declaration.properties.len());
        for property in &declaration.properties {
            let setter_name = format!("set_{}", property.name);
            let setter = find_method(target, &ancestors, &setter_name, |m| !m.is_static());
            let box_as = match setter {
                Some(location) => {
                    let literal = literal_type(&property.value).ok_or_else(|| {
                        Error::UnsupportedAttributeValue {
                            property: property.name.clone(),
                            kind: property.value.kind_name(),
                        }
                    })?;
                    let parameter = location
                        .method(target)?
                        .signature
                        .params
                        .first()
                        .cloned()
                        .unwrap_or(TypeSignature::Object);
                    (literal.is_value_type() && !parameter.requires_boxing()).then_some(literal)
                }
                None => None,
            };
            assignments.push(PropertyAssignment {
                name: property.name.clone(),
                value: property.value.clone(),
                setter,
                box_as,
            });
        }

        let hook = |name: &str| find_method(target, &ancestors, name, |m| !m.is_abstract());
        let required = |name: &str| {
            hook(name).ok_or_else(|| Error::TypeError(format!("{aspect_name} has no {name} hook")))
        };
        let overridden = |name: &str, base: Option<TypeLocation<'r>>| {
            let found = hook(name)?;
            let base_key = base.map(|base| base.key(target));
            let declaring = found.method(target).ok()?.declaring_type;
            let owner = TypeLocation {
                scope: found.scope,
                token: declaring,
            };
            (Some(owner.key(target)) != base_key).then_some(found)
        };

        let hooks = match declaration.kind {
            AspectKind::MethodInterception => Hooks::Interception {
                on_invoke: required("OnInvoke")?,
            },
            AspectKind::MethodBoundary => {
                let base = references.method_boundary;
                Hooks::Boundary {
                    on_entry: overridden("OnEntry", base),
                    on_success: overridden("OnSuccess", base),
                    on_exception: overridden("OnException", base),
                    on_exit: overridden("OnExit", base),
                }
            }
            AspectKind::LocationInterception => Hooks::Location {
                on_get_value: required("OnGetValue")?,
                on_set_value: required("OnSetValue")?,
            },
        };

        Ok(AspectPlan {
            aspect_type: declaration.aspect_type,
            ctor,
            assignments,
            hooks,
        })
    }
}

/// First one-parameter method called `name` along `ancestors` accepted by `accept`
fn find_method<'r, F>(
    target: &Module,
    ancestors: &[TypeLocation<'r>],
    name: &str,
    accept: F,
) -> Option<MemberLocation<'r>>
where
    F: Fn(&crate::metadata::method::MethodDef) -> bool,
{
    ancestors.iter().find_map(|ancestor| {
        ancestor
            .scope
            .module(target)
            .methods_of(ancestor.token)
            .find(|m| m.name == name && m.signature.params.len() == 1 && accept(m))
            .map(|m| MemberLocation {
                scope: ancestor.scope,
                token: m.token,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AspectKinds, WeaverConfig},
        emulation::runtime::reference_resolver,
        metadata::{
            builders::{MethodDefBuilder, PropertyBuilder, TypeDefBuilder},
            customattributes::CustomAttribute,
            method::MethodModifiers,
            token::Token,
        },
        weaver::{discovery::AspectDiscovery, resolver::METHOD_BOUNDARY_ASPECT},
    };

    fn aspect_module() -> (Module, Token, Token) {
        let mut module = Module::new("App");
        let (namespace, name) = METHOD_BOUNDARY_ASPECT.rsplit_once('.').unwrap();
        let base = module.type_ref("DotNetAspects", namespace, name);
        let args = module.type_ref("DotNetAspects", "DotNetAspects.Args", "MethodExecutionArgs");

        let aspect = TypeDefBuilder::new("App", "Trace")
            .public_class()
            .extends(TypeSignature::Class(base))
            .build(&mut module)
            .unwrap();
        let ctor = MethodDefBuilder::constructor()
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(&mut module, aspect)
            .unwrap();
        MethodDefBuilder::new("OnEntry")
            .public()
            .modifiers(MethodModifiers::VIRTUAL)
            .param("args", TypeSignature::Class(args))
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(&mut module, aspect)
            .unwrap();
        PropertyBuilder::new("Category", TypeSignature::Object)
            .auto()
            .build(&mut module, aspect)
            .unwrap();

        let service = TypeDefBuilder::new("App", "Service").build(&mut module).unwrap();
        let run = MethodDefBuilder::new("Run")
            .attribute(
                CustomAttribute::new(ctor)
                    .with_property("Category", CustomAttributeArgument::I4(7))
                    .with_property("Missing", CustomAttributeArgument::Bool(true)),
            )
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(&mut module, service)
            .unwrap();
        (module, run, ctor)
    }

    #[test]
    fn test_boundary_plan_skips_base_hooks() {
        let (module, run, ctor) = aspect_module();
        let resolver = reference_resolver().unwrap();
        let references = WellKnownReferences::resolve(&module, &resolver, &WeaverConfig::default())
            .unwrap()
            .unwrap();
        let mut discovery =
            AspectDiscovery::new(&module, &resolver, &references, AspectKinds::all()).unwrap();
        let chain = discovery.discover_method(&module, run).unwrap();
        let declaration = chain.head().unwrap();

        let plan =
            AspectPlan::build(&module, discovery.hierarchy(), &references, declaration).unwrap();
        assert_eq!(plan.ctor.map(|c| c.token), Some(ctor));

        let Hooks::Boundary {
            on_entry,
            on_success,
            on_exception,
            on_exit,
        } = plan.hooks
        else {
            panic!("expected boundary hooks");
        };
        assert!(on_entry.is_some_and(|hook| hook.scope.is_target()));
        assert!(on_success.is_none());
        assert!(on_exception.is_none());
        assert!(on_exit.is_none());

        assert_eq!(plan.assignments.len(), 2);
        assert!(plan.assignments[0].setter.is_some());
        assert_eq!(plan.assignments[0].box_as, Some(TypeSignature::I4));
        assert!(plan.assignments[1].setter.is_none());
    }

    #[test]
    fn test_unsupported_value_fails_plan() {
        let (mut module, run, _) = aspect_module();
        let attribute = &mut module.method_mut(run).unwrap().custom_attributes[0];
        attribute.value.named_args[0].value = CustomAttributeArgument::Type("System.String".into());

        let resolver = reference_resolver().unwrap();
        let references = WellKnownReferences::resolve(&module, &resolver, &WeaverConfig::default())
            .unwrap()
            .unwrap();
        let mut discovery =
            AspectDiscovery::new(&module, &resolver, &references, AspectKinds::all()).unwrap();
        let chain = discovery.discover_method(&module, run).unwrap();
        let result = AspectPlan::build(
            &module,
            discovery.hierarchy(),
            &references,
            chain.head().unwrap(),
        );
        assert!(matches!(
            result,
            Err(Error::UnsupportedAttributeValue { kind: "type", .. })
        ));
    }
}

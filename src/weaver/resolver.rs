//! Resolution of the well-known types and members the generated code calls.
//!
//! Before any member is touched the weaver locates the aspect base types, the context
//! and argument container types of the aspect library, and the reflection primitives of
//! the core library. Everything is looked up by full name in the module itself and in the
//! assemblies the configuration allows, in scan-list order. An assembly is searched only
//! if the module references it, directly or through another referenced assembly.
//!
//! Resolution is pure lookup. Nothing is imported into the module here, references are
//! only created once a member is actually woven, so a pass that ends early leaves the
//! module exactly as it found it.

use std::collections::HashSet;

use crate::{
    config::WeaverConfig,
    metadata::{
        method::MethodDef,
        module::Module,
        token::Token,
        typesystem::{AssemblyResolver, Scope, TypeLocation},
    },
    Error, Result,
};

/// Full name of the full-interception aspect base type
pub const METHOD_INTERCEPTION_ASPECT: &str = "DotNetAspects.Interception.MethodInterceptionAspect";
/// Full name of the boundary aspect base type
pub const METHOD_BOUNDARY_ASPECT: &str = "DotNetAspects.Interception.OnMethodBoundaryAspect";
/// Full name of the location-interception aspect base type
pub const LOCATION_INTERCEPTION_ASPECT: &str =
    "DotNetAspects.Interception.LocationInterceptionAspect";

const ARGUMENTS: &str = "DotNetAspects.Args.Arguments";
const METHOD_INTERCEPTION_ARGS: &str = "DotNetAspects.Args.MethodInterceptionArgs";
const METHOD_EXECUTION_ARGS: &str = "DotNetAspects.Args.MethodExecutionArgs";
const LOCATION_INTERCEPTION_ARGS: &str = "DotNetAspects.Args.LocationInterceptionArgs";
const LOCATION_INFO: &str = "DotNetAspects.Args.LocationInfo";

const SYSTEM_TYPE: &str = "System.Type";
const SYSTEM_EXCEPTION: &str = "System.Exception";
const METHOD_BASE: &str = "System.Reflection.MethodBase";
const METHOD_INFO: &str = "System.Reflection.MethodInfo";
const FUNC_1: &str = "System.Func`1";
const ACTION_1: &str = "System.Action`1";

/// Base-type chains are cut off at this depth
const MAX_BASE_DEPTH: usize = 64;

/// A method or field together with the module that defines it.
#[derive(Debug, Clone, Copy)]
pub struct MemberLocation<'r> {
    /// Defining module
    pub scope: Scope<'r>,
    /// `MethodDef` or `Field` token in the defining module
    pub token: Token,
}

impl<'r> MemberLocation<'r> {
    /// Method token usable in `module`
    ///
    /// # Errors
    ///
    /// Returns any import error of [`Module::import_method_from`].
    pub fn import_method(&self, module: &mut Module) -> Result<Token> {
        module.import_method_from(self.scope, self.token)
    }

    /// Field token usable in `module`
    ///
    /// # Errors
    ///
    /// Returns any import error of [`Module::import_field_from`].
    pub fn import_field(&self, module: &mut Module) -> Result<Token> {
        module.import_field_from(self.scope, self.token)
    }

    /// The method definition behind this location
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if the location names no method.
    pub fn method<'s>(&self, target: &'s Module) -> Result<&'s MethodDef>
    where
        'r: 's,
    {
        self.scope.module(target).method(self.token)
    }
}

/// Members of `MethodInterceptionArgs` the interception weaver calls.
#[derive(Debug, Clone, Copy)]
pub struct InterceptionReferences<'r> {
    /// `MethodInterceptionArgs`
    pub args_type: TypeLocation<'r>,
    /// `MethodInterceptionArgs(object, MethodBase, Arguments, MethodInfo)`
    pub args_ctor: MemberLocation<'r>,
    /// `MethodInterceptionArgs.get_ReturnValue()`
    pub get_return_value: MemberLocation<'r>,
}

/// Members of `MethodExecutionArgs` the boundary weaver calls.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryReferences<'r> {
    /// `MethodExecutionArgs`
    pub args_type: TypeLocation<'r>,
    /// Parameterless constructor
    pub args_ctor: MemberLocation<'r>,
    /// `set_Instance(object)`
    pub set_instance: MemberLocation<'r>,
    /// `set_Method(MethodBase)`
    pub set_method: MemberLocation<'r>,
    /// `set_Arguments(Arguments)`
    pub set_arguments: MemberLocation<'r>,
    /// `set_ReturnValue(object)`
    pub set_return_value: MemberLocation<'r>,
    /// `set_Exception(Exception)`
    pub set_exception: MemberLocation<'r>,
}

/// Members of `LocationInterceptionArgs`, `LocationInfo` and the delegate types the
/// location weaver uses.
#[derive(Debug, Clone, Copy)]
pub struct LocationReferences<'r> {
    /// `LocationInterceptionArgs`
    pub args_type: TypeLocation<'r>,
    /// Parameterless constructor
    pub args_ctor: MemberLocation<'r>,
    /// `set_Instance(object)`
    pub set_instance: MemberLocation<'r>,
    /// `set_LocationName(string)`
    pub set_location_name: MemberLocation<'r>,
    /// `set_LocationType(Type)`
    pub set_location_type: MemberLocation<'r>,
    /// `set_Location(LocationInfo)`
    pub set_location: MemberLocation<'r>,
    /// `set_Value(object)`
    pub set_value: MemberLocation<'r>,
    /// `get_Value()`
    pub get_value: MemberLocation<'r>,
    /// `_getter` delegate field
    pub getter_field: MemberLocation<'r>,
    /// `_setter` delegate field
    pub setter_field: MemberLocation<'r>,
    /// Parameterless `LocationInfo` constructor
    pub info_ctor: MemberLocation<'r>,
    /// `LocationInfo.set_Name(string)`
    pub info_set_name: MemberLocation<'r>,
    /// `LocationInfo.set_LocationType(Type)`
    pub info_set_location_type: MemberLocation<'r>,
    /// `LocationInfo.set_DeclaringType(Type)`
    pub info_set_declaring_type: MemberLocation<'r>,
    /// `LocationInfo.set_PropertyInfo(PropertyInfo)`
    pub info_set_property_info: MemberLocation<'r>,
    /// ``System.Func`1``
    pub func_type: TypeLocation<'r>,
    /// ``Func`1(object, native int)``
    pub func_ctor: MemberLocation<'r>,
    /// ``System.Action`1``
    pub action_type: TypeLocation<'r>,
    /// ``Action`1(object, native int)``
    pub action_ctor: MemberLocation<'r>,
}

/// Every well-known type and member a weave pass needs.
///
/// The aspect base types and the per-kind sections are optional: a missing base type
/// means no aspect of that kind can exist in the module, a missing section means aspects
/// of that kind are reported and skipped. The shared members are required.
#[derive(Debug, Clone, Copy)]
pub struct WellKnownReferences<'r> {
    /// `MethodInterceptionAspect`
    pub method_interception: Option<TypeLocation<'r>>,
    /// `OnMethodBoundaryAspect`
    pub method_boundary: Option<TypeLocation<'r>>,
    /// `LocationInterceptionAspect`
    pub location_interception: Option<TypeLocation<'r>>,
    /// `Arguments(object[])`
    pub arguments_ctor: MemberLocation<'r>,
    /// `Type.GetTypeFromHandle(RuntimeTypeHandle)`
    pub get_type_from_handle: MemberLocation<'r>,
    /// `MethodBase.GetMethodFromHandle(RuntimeMethodHandle, RuntimeTypeHandle)`
    pub get_method_from_handle: MemberLocation<'r>,
    /// `System.Reflection.MethodInfo`
    pub method_info: TypeLocation<'r>,
    /// `Type.GetMethod(string, BindingFlags)`
    pub get_method: MemberLocation<'r>,
    /// `Type.GetProperty(string)`
    pub get_property: MemberLocation<'r>,
    /// `System.Exception`
    pub exception: TypeLocation<'r>,
    /// Members for full interception
    pub interception: Option<InterceptionReferences<'r>>,
    /// Members for boundary wrapping
    pub boundary: Option<BoundaryReferences<'r>>,
    /// Members for location interception
    pub location: Option<LocationReferences<'r>>,
}

impl<'r> WellKnownReferences<'r> {
    /// Resolves the references for `target`.
    ///
    /// Returns `Ok(None)` if none of the aspect base types is reachable from the module,
    /// which means there is nothing to weave.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if an aspect base type is reachable but a required shared
    /// member is not.
    pub fn resolve(
        target: &Module,
        resolver: &'r dyn AssemblyResolver,
        config: &WeaverConfig,
    ) -> Result<Option<Self>> {
        let lookup = Lookup {
            target,
            resolver,
            config,
            reachable: reachable_assemblies(target, resolver),
        };

        let method_interception = lookup.find_type(METHOD_INTERCEPTION_ASPECT);
        let method_boundary = lookup.find_type(METHOD_BOUNDARY_ASPECT);
        let location_interception = lookup.find_type(LOCATION_INTERCEPTION_ASPECT);
        if method_interception.is_none()
            && method_boundary.is_none()
            && location_interception.is_none()
        {
            return Ok(None);
        }

        let arguments = lookup.require_type(ARGUMENTS)?;
        let arguments_ctor = lookup.require(
            lookup.find_method(arguments, ".ctor", |module, method| {
                method.signature.params.len() == 1
                    && module.signature_name(&method.signature.params[0]) == "System.Object[]"
            }),
            "Arguments(object[]) constructor",
        )?;

        let system_type = lookup.require_type(SYSTEM_TYPE)?;
        let get_type_from_handle = lookup.require(
            lookup.find_method(system_type, "GetTypeFromHandle", |_, m| {
                m.is_static() && m.signature.params.len() == 1
            }),
            "Type.GetTypeFromHandle",
        )?;
        let get_method = lookup.require(
            lookup.find_method(system_type, "GetMethod", |module, m| {
                m.signature.params.len() == 2
                    && module.signature_name(&m.signature.params[0]) == "System.String"
            }),
            "Type.GetMethod(string, BindingFlags)",
        )?;
        let get_property = lookup.require(
            lookup.find_method(system_type, "GetProperty", |_, m| {
                m.signature.params.len() == 1
            }),
            "Type.GetProperty(string)",
        )?;

        let method_base = lookup.require_type(METHOD_BASE)?;
        let get_method_from_handle = lookup.require(
            lookup.find_method(method_base, "GetMethodFromHandle", |_, m| {
                m.is_static() && m.signature.params.len() == 2
            }),
            "MethodBase.GetMethodFromHandle(RuntimeMethodHandle, RuntimeTypeHandle)",
        )?;
        let method_info = lookup.require_type(METHOD_INFO)?;
        let exception = lookup.require_type(SYSTEM_EXCEPTION)?;

        Ok(Some(WellKnownReferences {
            method_interception,
            method_boundary,
            location_interception,
            arguments_ctor,
            get_type_from_handle,
            get_method_from_handle,
            method_info,
            get_method,
            get_property,
            exception,
            interception: lookup.interception(),
            boundary: lookup.boundary(),
            location: lookup.location(),
        }))
    }
}

struct Lookup<'a, 'r> {
    target: &'a Module,
    resolver: &'r dyn AssemblyResolver,
    config: &'a WeaverConfig,
    reachable: HashSet<String>,
}

/// Assemblies referenced by `target`, directly or through a referenced module
fn reachable_assemblies(target: &Module, resolver: &dyn AssemblyResolver) -> HashSet<String> {
    let mut reachable = HashSet::new();
    let mut pending: Vec<String> = target.assembly_refs().to_vec();
    while let Some(name) = pending.pop() {
        if name == target.name() || !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(module) = resolver.resolve(&name) {
            pending.extend(module.assembly_refs().iter().cloned());
        }
    }
    reachable
}

impl<'a, 'r> Lookup<'a, 'r> {
    /// Finds a type in the module itself, then in the scanned assemblies it reaches
    fn find_type(&self, full_name: &str) -> Option<TypeLocation<'r>> {
        if let Some(token) = self.target.find_type(full_name) {
            return Some(TypeLocation {
                scope: Scope::Target,
                token,
            });
        }

        self.config
            .scan_assemblies
            .iter()
            .filter(|name| self.reachable.contains(name.as_str()))
            .filter_map(|name| self.resolver.resolve(name))
            .find_map(|module| {
                module.find_type(full_name).map(|token| TypeLocation {
                    scope: Scope::Reference(module),
                    token,
                })
            })
    }

    fn require_type(&self, full_name: &str) -> Result<TypeLocation<'r>> {
        self.find_type(full_name)
            .ok_or_else(|| Error::Setup(format!("{full_name} not found")))
    }

    fn require<T>(&self, found: Option<T>, what: &str) -> Result<T> {
        found.ok_or_else(|| Error::Setup(format!("{what} not found")))
    }

    /// Finds a method declared on `ty` or one of its base types, nearest first
    fn find_method<F>(&self, ty: TypeLocation<'r>, name: &str, predicate: F) -> Option<MemberLocation<'r>>
    where
        F: Fn(&Module, &MethodDef) -> bool,
    {
        let mut current = Some(ty);
        for _ in 0..MAX_BASE_DEPTH {
            let location = current?;
            let module = location.scope.module(self.target);
            let found = module
                .methods_of(location.token)
                .find(|method| method.name == name && predicate(module, method));
            if let Some(method) = found {
                return Some(MemberLocation {
                    scope: location.scope,
                    token: method.token,
                });
            }
            current = location.base(self.target, self.resolver);
        }
        None
    }

    fn find_field(&self, ty: TypeLocation<'r>, name: &str) -> Option<MemberLocation<'r>> {
        let mut current = Some(ty);
        for _ in 0..MAX_BASE_DEPTH {
            let location = current?;
            let module = location.scope.module(self.target);
            if let Some(field) = module.fields_of(location.token).find(|f| f.name == name) {
                return Some(MemberLocation {
                    scope: location.scope,
                    token: field.token,
                });
            }
            current = location.base(self.target, self.resolver);
        }
        None
    }

    fn accessor(&self, ty: TypeLocation<'r>, name: &str, params: usize) -> Option<MemberLocation<'r>> {
        self.find_method(ty, name, |_, m| m.signature.params.len() == params && !m.is_static())
    }

    fn default_ctor(&self, ty: TypeLocation<'r>) -> Option<MemberLocation<'r>> {
        let module = ty.scope.module(self.target);
        module
            .methods_of(ty.token)
            .find(|m| m.name == ".ctor" && m.signature.params.is_empty())
            .map(|m| MemberLocation {
                scope: ty.scope,
                token: m.token,
            })
    }

    fn interception(&self) -> Option<InterceptionReferences<'r>> {
        let args_type = self.find_type(METHOD_INTERCEPTION_ARGS)?;
        let module = args_type.scope.module(self.target);
        let args_ctor = module
            .methods_of(args_type.token)
            .find(|m| {
                m.name == ".ctor"
                    && m.signature.params.len() == 4
                    && module.signature_name(&m.signature.params[3]) == METHOD_INFO
            })
            .map(|m| MemberLocation {
                scope: args_type.scope,
                token: m.token,
            })?;

        Some(InterceptionReferences {
            args_type,
            args_ctor,
            get_return_value: self.accessor(args_type, "get_ReturnValue", 0)?,
        })
    }

    fn boundary(&self) -> Option<BoundaryReferences<'r>> {
        let args_type = self.find_type(METHOD_EXECUTION_ARGS)?;
        Some(BoundaryReferences {
            args_type,
            args_ctor: self.default_ctor(args_type)?,
            set_instance: self.accessor(args_type, "set_Instance", 1)?,
            set_method: self.accessor(args_type, "set_Method", 1)?,
            set_arguments: self.accessor(args_type, "set_Arguments", 1)?,
            set_return_value: self.accessor(args_type, "set_ReturnValue", 1)?,
            set_exception: self.accessor(args_type, "set_Exception", 1)?,
        })
    }

    fn location(&self) -> Option<LocationReferences<'r>> {
        let args_type = self.find_type(LOCATION_INTERCEPTION_ARGS)?;
        let info_type = self.find_type(LOCATION_INFO)?;
        let func_type = self.find_type(FUNC_1)?;
        let action_type = self.find_type(ACTION_1)?;
        let delegate_ctor = |ty: TypeLocation<'r>| {
            self.find_method(ty, ".ctor", |_, m| m.signature.params.len() == 2)
        };

        Some(LocationReferences {
            args_type,
            args_ctor: self.default_ctor(args_type)?,
            set_instance: self.accessor(args_type, "set_Instance", 1)?,
            set_location_name: self.accessor(args_type, "set_LocationName", 1)?,
            set_location_type: self.accessor(args_type, "set_LocationType", 1)?,
            set_location: self.accessor(args_type, "set_Location", 1)?,
            set_value: self.accessor(args_type, "set_Value", 1)?,
            get_value: self.accessor(args_type, "get_Value", 0)?,
            getter_field: self.find_field(args_type, "_getter")?,
            setter_field: self.find_field(args_type, "_setter")?,
            info_ctor: self.default_ctor(info_type)?,
            info_set_name: self.accessor(info_type, "set_Name", 1)?,
            info_set_location_type: self.accessor(info_type, "set_LocationType", 1)?,
            info_set_declaring_type: self.accessor(info_type, "set_DeclaringType", 1)?,
            info_set_property_info: self.accessor(info_type, "set_PropertyInfo", 1)?,
            func_type,
            func_ctor: delegate_ctor(func_type)?,
            action_type,
            action_ctor: delegate_ctor(action_type)?,
        })
    }
}

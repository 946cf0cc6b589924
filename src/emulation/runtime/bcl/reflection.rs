//! `System.Type` and `System.Reflection` natives.
//!
//! Reflection objects live on the emulator heap: one `Type` object per runtime type,
//! one `MethodInfo` object per method. Woven code uses them to find the original body
//! of an intercepted method and to call it through `MethodBase.Invoke`.
//!
//! # Emulated .NET Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | `Type.GetTypeFromHandle(RuntimeTypeHandle)` | Type object of an `ldtoken` handle |
//! | `Type.GetMethod(string, BindingFlags)` | Method declared on the type |
//! | `Type.GetProperty(string)` | Property of the type or a base |
//! | `Type.FullName` | Namespace qualified name |
//! | `MethodBase.GetMethodFromHandle(RuntimeMethodHandle, RuntimeTypeHandle)` | Method object of an `ldtoken` handle |
//! | `MethodBase.Invoke(object, object[])` | Late bound call |
//! | `MemberInfo.Name` | Simple name of a type, method or property |
//! | `PropertyInfo.PropertyType` | Type object of the property type |
//! | `Object.GetType()` | Type object of the receiver's runtime type |

use crate::emulation::{
    engine::{EmResult, NULL_REFERENCE_MESSAGE},
    memory::HeapObject,
    runtime::{
        bcl::{native, string_arg},
        hook::{HookContext, HookManager},
    },
    EmValue, EmulationError, Emulator, HeapRef, Member, RuntimeType,
};
use crate::metadata::method::{MethodAccessFlags, MethodDef};

/// `BindingFlags.Instance`
const BINDING_INSTANCE: i32 = 4;
/// `BindingFlags.Static`
const BINDING_STATIC: i32 = 8;
/// `BindingFlags.Public`
const BINDING_PUBLIC: i32 = 16;
/// `BindingFlags.NonPublic`
const BINDING_NON_PUBLIC: i32 = 32;

pub fn register(manager: &mut HookManager) {
    manager.register(native("System", "Type", "GetTypeFromHandle", type_get_type_from_handle));
    manager.register(native("System", "Type", "GetMethod", type_get_method));
    manager.register(native("System", "Type", "GetProperty", type_get_property));
    manager.register(native("System", "Type", "get_FullName", type_get_full_name));
    manager.register(native(
        "System.Reflection",
        "MethodBase",
        "GetMethodFromHandle",
        method_base_get_method_from_handle,
    ));
    manager.register(native("System.Reflection", "MethodBase", "Invoke", method_base_invoke));
    manager.register(native("System.Reflection", "MemberInfo", "get_Name", member_info_get_name));
    manager.register(native(
        "System.Reflection",
        "PropertyInfo",
        "get_PropertyType",
        property_info_get_property_type,
    ));
    manager.register(native("System", "Object", "GetType", object_get_type));
}

/// The receiver of a reflection call, `NullReferenceException` if missing
fn receiver<'m>(ctx: &HookContext<'m>, emulator: &mut Emulator<'m>) -> EmResult<HeapRef> {
    ctx.this_object()
        .ok_or_else(|| emulator.throw("System.NullReferenceException", NULL_REFERENCE_MESSAGE))
}

/// The runtime type behind a `Type` object
fn type_receiver<'m>(ctx: &HookContext<'m>, emulator: &mut Emulator<'m>) -> EmResult<RuntimeType<'m>> {
    let this = receiver(ctx, emulator)?;
    match emulator.heap().get(this)? {
        HeapObject::Type(ty) => Ok(ty.clone()),
        other => Err(EmulationError::TypeMismatch {
            expected: "type",
            found: other.kind(),
        }),
    }
}

/// Hook for `System.Type.GetTypeFromHandle`.
///
/// Returns the single `Type` object of the handle's type.
fn type_get_type_from_handle<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    match ctx.arg(0)? {
        EmValue::TypeHandle(ty) => {
            let ty = ty.clone();
            Ok(Some(EmValue::ObjectRef(emulator.type_object(ty)?)))
        }
        other => Err(EmulationError::TypeMismatch {
            expected: "RuntimeTypeHandle",
            found: other.kind(),
        }),
    }
}

/// Hook for `System.Reflection.MethodBase.GetMethodFromHandle`.
///
/// # Handled Overloads
///
/// - `MethodBase.GetMethodFromHandle(RuntimeMethodHandle, RuntimeTypeHandle) -> MethodBase`
fn method_base_get_method_from_handle<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    match ctx.arg(0)? {
        EmValue::MethodHandle(method) => {
            let method = *method;
            Ok(Some(EmValue::ObjectRef(emulator.method_object(method)?)))
        }
        other => Err(EmulationError::TypeMismatch {
            expected: "RuntimeMethodHandle",
            found: other.kind(),
        }),
    }
}

/// True if `def` passes the binding constraints in `flags`
fn binds(def: &MethodDef, flags: i32) -> bool {
    let scope = if def.is_static() {
        BINDING_STATIC
    } else {
        BINDING_INSTANCE
    };
    let visibility = if def.access == MethodAccessFlags::PUBLIC {
        BINDING_PUBLIC
    } else {
        BINDING_NON_PUBLIC
    };
    flags & scope != 0 && flags & visibility != 0
}

/// Hook for `System.Type.GetMethod`.
///
/// Only methods declared on the type itself are searched, constructors excluded.
///
/// # Handled Overloads
///
/// - `Type.GetMethod(String, BindingFlags) -> MethodInfo`
///
/// # Returns
///
/// The `MethodInfo`, `null` if nothing matches. Several matches raise
/// `AmbiguousMatchException`.
fn type_get_method<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let ty = type_receiver(ctx, emulator)?;
    let name = string_arg(emulator, ctx.arg(0)?)?;
    let flags = ctx.arg(1)?.as_i32().unwrap_or_default();
    let (RuntimeType::Defined(ty), Some(name)) = (ty, name) else {
        return Ok(Some(EmValue::Null));
    };

    let mut found = ty
        .module
        .methods_of(ty.token)
        .filter(|def| def.name == name && !def.is_constructor() && binds(def, flags))
        .map(|def| Member::new(ty.module, def.token));
    match (found.next(), found.next()) {
        (None, _) => Ok(Some(EmValue::Null)),
        (Some(method), None) => Ok(Some(EmValue::ObjectRef(emulator.method_object(method)?))),
        (Some(_), Some(_)) => Err(emulator.throw(
            "System.Reflection.AmbiguousMatchException",
            "Ambiguous match found.",
        )),
    }
}

/// Hook for `System.Type.GetProperty`.
///
/// Searches the type and then its bases.
fn type_get_property<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let ty = type_receiver(ctx, emulator)?;
    let name = string_arg(emulator, ctx.arg(0)?)?;
    let (RuntimeType::Defined(ty), Some(name)) = (ty, name) else {
        return Ok(Some(EmValue::Null));
    };

    let declaring = emulator.ancestry(ty).into_iter().find(|owner| {
        owner
            .module
            .properties_of(owner.token)
            .any(|property| property.name == name)
    });
    let Some(declaring) = declaring else {
        return Ok(Some(EmValue::Null));
    };
    let property = emulator.heap_mut().alloc(HeapObject::Property {
        declaring: RuntimeType::Defined(declaring),
        name,
    })?;
    Ok(Some(EmValue::ObjectRef(property)))
}

/// Hook for the `System.Type.FullName` getter
fn type_get_full_name<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let ty = type_receiver(ctx, emulator)?;
    let name = emulator.heap_mut().alloc_string(ty.full_name())?;
    Ok(Some(EmValue::ObjectRef(name)))
}

/// Hook for the `System.Reflection.MemberInfo.Name` getter.
///
/// Serves types, methods and properties alike.
fn member_info_get_name<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let this = receiver(ctx, emulator)?;
    let name = match emulator.heap().get(this)? {
        HeapObject::Type(RuntimeType::Defined(ty)) => emulator.type_def(*ty)?.name.clone(),
        HeapObject::Type(builtin) => {
            let full_name = builtin.full_name();
            full_name
                .rsplit_once('.')
                .map_or(full_name.clone(), |(_, name)| name.to_string())
        }
        HeapObject::Method(method) => emulator.method_def(*method)?.name.clone(),
        HeapObject::Property { name, .. } => name.clone(),
        other => {
            return Err(EmulationError::TypeMismatch {
                expected: "member info",
                found: other.kind(),
            })
        }
    };
    Ok(Some(EmValue::ObjectRef(emulator.heap_mut().alloc_string(name)?)))
}

/// Hook for the `System.Reflection.PropertyInfo.PropertyType` getter
fn property_info_get_property_type<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let this = receiver(ctx, emulator)?;
    let HeapObject::Property {
        declaring: RuntimeType::Defined(declaring),
        name,
    } = emulator.heap().get(this)?
    else {
        return Err(EmulationError::TypeMismatch {
            expected: "property info",
            found: "other object",
        });
    };
    let declaring = *declaring;
    let property = declaring
        .module
        .properties_of(declaring.token)
        .find(|property| property.name == *name)
        .ok_or_else(|| EmulationError::MethodNotFound(format!("{declaring}::{name}")))?;
    let ty = emulator.runtime_type(declaring.module, &property.property_type)?;
    Ok(Some(EmValue::ObjectRef(emulator.type_object(ty)?)))
}

/// Hook for `System.Object.GetType`
fn object_get_type<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let this = receiver(ctx, emulator)?;
    let ty = emulator.type_of(this)?;
    Ok(Some(EmValue::ObjectRef(emulator.type_object(ty)?)))
}

/// Hook for `System.Reflection.MethodBase.Invoke`.
///
/// Invokes the method represented by the receiver. Boxed arguments are unboxed for
/// value type parameters, virtual methods dispatch on `obj`, and a value type result is
/// boxed.
///
/// # Handled Overloads
///
/// - `MethodBase.Invoke(Object, Object[]) -> Object`
///
/// # Returns
///
/// The boxed result, `null` for `void` methods. An exception thrown by the invoked
/// method propagates to the caller of `Invoke` as is.
fn method_base_invoke<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let this = receiver(ctx, emulator)?;
    let method = match emulator.heap().get(this)? {
        HeapObject::Method(method) => *method,
        other => {
            return Err(EmulationError::TypeMismatch {
                expected: "method info",
                found: other.kind(),
            })
        }
    };
    let def = emulator.method_def(method)?;

    let supplied = match ctx.arg(1)? {
        EmValue::Null => Vec::new(),
        value => match value.as_object().map(|array| emulator.heap().get(array)) {
            Some(Ok(HeapObject::Array { items, .. })) => items.clone(),
            _ => {
                return Err(EmulationError::TypeMismatch {
                    expected: "object[]",
                    found: value.kind(),
                })
            }
        },
    };
    if supplied.len() != def.signature.params.len() {
        return Err(emulator.throw("System.ArgumentException", "Parameter count mismatch."));
    }
    let args = supplied
        .into_iter()
        .zip(&def.signature.params)
        .map(|(value, param)| {
            if param.requires_boxing() {
                emulator.unbox(&value).unwrap_or(value)
            } else {
                value
            }
        })
        .collect();

    let (target, this) = if def.is_static() {
        (method, None)
    } else {
        let obj = ctx.arg(0)?.clone();
        let Some(receiver) = obj.as_object() else {
            return Err(emulator.throw(
                "System.Reflection.TargetException",
                "Non-static method requires a target.",
            ));
        };
        (emulator.dispatch_virtual(method, receiver)?, Some(obj))
    };

    let result = emulator.invoke_method(target, this, args)?;
    if !def.returns_value() {
        return Ok(Some(EmValue::Null));
    }
    let returned = emulator.method_def(target)?;
    Ok(Some(emulator.box_as(
        target.module,
        &returned.signature.return_type,
        result,
    )?))
}

//! `System.String` and `System.Object` natives.
//!
//! # Emulated .NET Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | `String.Length` | Length in UTF-16 code units |
//! | `String.ToUpper()` / `String.ToLower()` | Case mapping |
//! | `String.Concat(string, string)` | Concatenation, `null` as empty |
//! | `String.op_Equality(string, string)` | Ordinal equality |
//! | `String.IsNullOrEmpty(string)` | |
//! | `Object.ToString()` | Text of strings and boxed values, type name otherwise |
//! | `Object.Equals(object)` | Reference equality, value equality for strings and boxes |

use crate::emulation::{
    engine::{EmResult, NULL_REFERENCE_MESSAGE},
    memory::HeapObject,
    runtime::{
        bcl::{native, string_arg},
        hook::{HookContext, HookManager},
    },
    EmValue, Emulator, RuntimeType,
};
use crate::metadata::signatures::TypeSignature;

pub fn register(manager: &mut HookManager) {
    manager.register(native("System", "String", "get_Length", string_get_length));
    manager.register(native("System", "String", "ToUpper", string_to_upper));
    manager.register(native("System", "String", "ToLower", string_to_lower));
    manager.register(native("System", "String", "Concat", string_concat));
    manager.register(native("System", "String", "op_Equality", string_op_equality));
    manager.register(native("System", "String", "IsNullOrEmpty", string_is_null_or_empty));
    manager.register(native("System", "Object", "ToString", object_to_string));
    manager.register(native("System", "Object", "Equals", object_equals));
}

/// The receiving string, `NullReferenceException` for `null`
fn this_string<'m>(ctx: &HookContext<'m>, emulator: &mut Emulator<'m>) -> EmResult<String> {
    let this = ctx.this.clone().unwrap_or(EmValue::Null);
    match string_arg(emulator, &this)? {
        Some(text) => Ok(text),
        None => Err(emulator.throw("System.NullReferenceException", NULL_REFERENCE_MESSAGE)),
    }
}

fn new_string<'m>(emulator: &mut Emulator<'m>, text: String) -> EmResult<Option<EmValue<'m>>> {
    Ok(Some(EmValue::ObjectRef(emulator.heap_mut().alloc_string(text)?)))
}

fn boolean<'m>(value: bool) -> EmResult<Option<EmValue<'m>>> {
    Ok(Some(EmValue::I32(i32::from(value))))
}

fn string_get_length<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let text = this_string(ctx, emulator)?;
    let length = i32::try_from(text.encode_utf16().count()).unwrap_or(i32::MAX);
    Ok(Some(EmValue::I32(length)))
}

fn string_to_upper<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let text = this_string(ctx, emulator)?;
    new_string(emulator, text.to_uppercase())
}

fn string_to_lower<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let text = this_string(ctx, emulator)?;
    new_string(emulator, text.to_lowercase())
}

/// Hook for `System.String.Concat`.
///
/// # Handled Overloads
///
/// - `String.Concat(String, String) -> String`
fn string_concat<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let mut joined = String::new();
    for arg in &ctx.args {
        joined.push_str(&string_arg(emulator, arg)?.unwrap_or_default());
    }
    new_string(emulator, joined)
}

fn string_op_equality<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let left = string_arg(emulator, ctx.arg(0)?)?;
    let right = string_arg(emulator, ctx.arg(1)?)?;
    boolean(left == right)
}

fn string_is_null_or_empty<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let text = string_arg(emulator, ctx.arg(0)?)?;
    boolean(text.is_none_or(|text| text.is_empty()))
}

/// Text of a boxed primitive, formatted the way the runtime prints it
fn format_boxed(value: &EmValue<'_>, ty: &RuntimeType<'_>) -> String {
    match (ty, value) {
        (RuntimeType::Builtin(TypeSignature::Boolean), value) => {
            if value.is_true() { "True" } else { "False" }.to_string()
        }
        (RuntimeType::Builtin(TypeSignature::Char), EmValue::I32(code)) => u32::try_from(*code)
            .ok()
            .and_then(char::from_u32)
            .map_or_else(String::new, String::from),
        (_, EmValue::I32(v)) => v.to_string(),
        (_, EmValue::I64(v) | EmValue::NativeInt(v)) => v.to_string(),
        (_, EmValue::F32(v)) => v.to_string(),
        (_, EmValue::F64(v)) => v.to_string(),
        (ty, _) => ty.full_name(),
    }
}

/// Hook for `System.Object.ToString`.
///
/// Runs only when the receiver's type does not override `ToString`.
fn object_to_string<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let Some(this) = ctx.this_object() else {
        return Err(emulator.throw("System.NullReferenceException", NULL_REFERENCE_MESSAGE));
    };
    let text = match emulator.heap().get(this)? {
        HeapObject::String(_) => return Ok(Some(EmValue::ObjectRef(this))),
        HeapObject::Boxed { value, ty } => format_boxed(value, ty),
        HeapObject::Type(_) => "System.RuntimeType".to_string(),
        _ => emulator.type_of(this)?.full_name(),
    };
    new_string(emulator, text)
}

/// Hook for `System.Object.Equals`.
///
/// Reference equality, except that strings compare by content and boxed values by
/// type and value.
fn object_equals<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let Some(this) = ctx.this_object() else {
        return Err(emulator.throw("System.NullReferenceException", NULL_REFERENCE_MESSAGE));
    };
    let Some(other) = ctx.arg(0)?.as_object() else {
        return boolean(false);
    };
    if this == other {
        return boolean(true);
    }
    let equal = match (emulator.heap().get(this)?, emulator.heap().get(other)?) {
        (HeapObject::String(left), HeapObject::String(right)) => left == right,
        (
            HeapObject::Boxed { value: left, ty: left_ty },
            HeapObject::Boxed { value: right, ty: right_ty },
        ) => left_ty == right_ty && left == right,
        _ => false,
    };
    boolean(equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::runtime::{reference_resolver, SYSTEM_RUNTIME},
        metadata::{
            builders::{MethodDefBuilder, TypeDefBuilder},
            module::Module,
            signatures::SignatureMethod,
            typesystem::MemberRefSignature,
        },
    };

    /// `Demo.Text` with static wrappers around string members
    fn fixture() -> Module {
        let mut module = Module::new("App");
        let object = module.type_ref(SYSTEM_RUNTIME, "System", "Object");
        let string = module.type_ref(SYSTEM_RUNTIME, "System", "String");
        let string_sig = TypeSignature::Class(string);
        let concat = module.member_ref(
            string_sig.clone(),
            "Concat",
            MemberRefSignature::Method(SignatureMethod::static_method(
                TypeSignature::String,
                vec![TypeSignature::String, TypeSignature::String],
            )),
        );
        let length = module.member_ref(
            string_sig.clone(),
            "get_Length",
            MemberRefSignature::Method(SignatureMethod::instance(TypeSignature::I4, Vec::new())),
        );
        let to_string = module.member_ref(
            TypeSignature::Class(object),
            "ToString",
            MemberRefSignature::Method(SignatureMethod::instance(TypeSignature::String, Vec::new())),
        );

        let text = TypeDefBuilder::new("Demo", "Text")
            .public_class()
            .extends(TypeSignature::Class(object))
            .build(&mut module)
            .unwrap();
        MethodDefBuilder::new("Join")
            .public()
            .static_method()
            .returns(TypeSignature::String)
            .param("a", TypeSignature::String)
            .param("b", TypeSignature::String)
            .body(move |asm| {
                asm.ldarg(0).ldarg(1).call(concat).ret();
                Ok(())
            })
            .build(&mut module, text)
            .unwrap();
        MethodDefBuilder::new("Length")
            .public()
            .static_method()
            .returns(TypeSignature::I4)
            .param("a", TypeSignature::String)
            .body(move |asm| {
                asm.ldarg(0).callvirt(length).ret();
                Ok(())
            })
            .build(&mut module, text)
            .unwrap();
        MethodDefBuilder::new("Show")
            .public()
            .static_method()
            .returns(TypeSignature::String)
            .param("value", TypeSignature::Object)
            .body(move |asm| {
                asm.ldarg(0).callvirt(to_string).ret();
                Ok(())
            })
            .build(&mut module, text)
            .unwrap();
        module
    }

    #[test]
    fn test_concat_treats_null_as_empty() {
        let module = fixture();
        let resolver = reference_resolver().unwrap();
        let mut emulator = Emulator::new(&module, &resolver);

        let left = emulator.string("dot").unwrap();
        let right = emulator.string("weave").unwrap();
        let joined = emulator.invoke("Demo.Text", "Join", vec![left.clone(), right]).unwrap();
        assert_eq!(emulator.read_string(&joined).as_deref(), Some("dotweave"));

        let joined = emulator.invoke("Demo.Text", "Join", vec![left, EmValue::Null]).unwrap();
        assert_eq!(emulator.read_string(&joined).as_deref(), Some("dot"));
    }

    #[test]
    fn test_length_and_null_receiver() {
        let module = fixture();
        let resolver = reference_resolver().unwrap();
        let mut emulator = Emulator::new(&module, &resolver);

        let text = emulator.string("héllo").unwrap();
        assert_eq!(
            emulator.invoke("Demo.Text", "Length", vec![text]).unwrap(),
            EmValue::I32(5)
        );
        let error = emulator
            .invoke("Demo.Text", "Length", vec![EmValue::Null])
            .unwrap_err();
        assert!(error.to_string().contains("System.NullReferenceException"));
    }

    #[test]
    fn test_to_string_of_boxed_values() {
        let module = fixture();
        let resolver = reference_resolver().unwrap();
        let mut emulator = Emulator::new(&module, &resolver);

        let boxed = emulator.box_value(EmValue::I32(-12)).unwrap();
        let shown = emulator.invoke("Demo.Text", "Show", vec![boxed]).unwrap();
        assert_eq!(emulator.read_string(&shown).as_deref(), Some("-12"));

        assert_eq!(
            format_boxed(&EmValue::I32(1), &RuntimeType::Builtin(TypeSignature::Boolean)),
            "True"
        );
        assert_eq!(
            format_boxed(&EmValue::I32(65), &RuntimeType::Builtin(TypeSignature::Char)),
            "A"
        );
    }
}

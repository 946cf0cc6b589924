//! Full method interception.
//!
//! The original body moves to a private `$Original` clone. The method itself is rebuilt
//! to hand control to the aspect's `OnInvoke` hook:
//!
//! ```text
//! aspect   = new TAspect { configured properties }
//! original = <MethodInfo of the clone>
//! args     = new Arguments(new object[] { boxed parameters })
//! context  = new MethodInterceptionArgs(this | null, <this method>, args, original)
//! aspect.OnInvoke(context)
//! return (T)context.ReturnValue
//! ```
//!
//! The hook decides whether and how often the original runs, through
//! `MethodInterceptionArgs.Proceed()`.

use crate::{
    assembly::InstructionAssembler,
    config::OriginalMethodLookup,
    metadata::{signatures::TypeSignature, token::Token},
    weaver::{
        context::WeaveContext,
        emit::{self, ImportedAspect},
        plan::{AspectPlan, Hooks},
    },
    Error, Result,
};

/// `BindingFlags.NonPublic | BindingFlags.Instance`
const NON_PUBLIC_INSTANCE: i32 = 0x24;
/// `BindingFlags.NonPublic | BindingFlags.Static`
const NON_PUBLIC_STATIC: i32 = 0x28;

/// Moves the body of `method` into a clone and routes every call through the aspect.
///
/// Returns the token of the clone.
///
/// # Errors
///
/// Returns [`Error::Setup`] if the interception types are unavailable, and any clone,
/// import or validation error. The context's transaction holds whatever was changed.
pub fn weave_method<'r>(
    ctx: &mut WeaveContext<'_, 'r>,
    method: Token,
    plan: &AspectPlan<'r>,
) -> Result<Token> {
    let Hooks::Interception { on_invoke } = plan.hooks else {
        return Err(Error::TypeError("aspect is not an interception aspect".to_string()));
    };
    let Some(refs) = ctx.references.interception else {
        return Err(Error::Setup("MethodInterceptionArgs not found".to_string()));
    };
    let shared = *ctx.references;
    let config = ctx.config;

    let (signature, is_static, declaring_type) = {
        let def = ctx.module.method(method)?;
        (def.signature.clone(), def.is_static(), def.declaring_type)
    };
    let clone = ctx.clone_method(method, &config.suffixes.original)?;
    let clone_name = ctx.module.method(clone)?.name.clone();

    let module = &mut *ctx.module;
    let aspect = ImportedAspect::import(module, plan)?;
    let on_invoke = on_invoke.import_method(module)?;
    let args_type = module.import_type_from(refs.args_type.scope, refs.args_type.token)?;
    let args_ctor = refs.args_ctor.import_method(module)?;
    let get_return_value = refs.get_return_value.import_method(module)?;
    let arguments_type = emit::import_declaring_type(module, shared.arguments_ctor)?;
    let arguments_ctor = shared.arguments_ctor.import_method(module)?;
    let method_info = module.import_type_from(shared.method_info.scope, shared.method_info.token)?;
    let get_method_from_handle = shared.get_method_from_handle.import_method(module)?;
    let get_type_from_handle = shared.get_type_from_handle.import_method(module)?;
    let get_method = shared.get_method.import_method(module)?;
    let declaring = emit::type_signature(module, declaring_type);

    let mut body = emit::fresh_body();
    let mut asm = InstructionAssembler::new(&mut body);
    let aspect_local = asm.local(aspect.aspect_type.clone())?;
    let context_local = asm.local(TypeSignature::Class(args_type))?;
    let arguments_local = asm.local(arguments_type)?;
    let original_local = asm.local(TypeSignature::Class(method_info))?;

    aspect.emit_instance(&mut asm, aspect_local)?;

    match config.original_lookup {
        OriginalMethodLookup::Token => {
            emit::emit_method_handle(&mut asm, clone, declaring.clone(), get_method_from_handle);
            asm.castclass(TypeSignature::Class(method_info));
        }
        OriginalMethodLookup::ByName => {
            emit::emit_type_of(&mut asm, declaring.clone(), get_type_from_handle);
            asm.ldstr(&clone_name)
                .ldc_i4(if is_static { NON_PUBLIC_STATIC } else { NON_PUBLIC_INSTANCE })
                .callvirt(get_method);
        }
    }
    asm.stloc(original_local);

    emit::emit_arguments(&mut asm, &signature, arguments_ctor)?;
    asm.stloc(arguments_local);

    emit::emit_instance_or_null(&mut asm, is_static);
    emit::emit_method_handle(&mut asm, method, declaring, get_method_from_handle);
    asm.ldloc(arguments_local)
        .ldloc(original_local)
        .newobj(args_ctor)
        .stloc(context_local);

    asm.ldloc(aspect_local).ldloc(context_local).callvirt(on_invoke);

    if signature.has_return() {
        asm.ldloc(context_local).callvirt(get_return_value);
        emit::emit_from_object(&mut asm, &signature.return_type);
    }
    asm.ret();
    asm.finish()?;

    ctx.replace_body(method, body)?;
    Ok(clone)
}

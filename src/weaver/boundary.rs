//! Boundary wrapping.
//!
//! The original body moves to a private `$Boundary` clone and the method is rebuilt as:
//!
//! ```text
//! aspect  = new TAspect { configured properties }
//! context = new MethodExecutionArgs { Instance, Method, Arguments }
//! aspect.OnEntry(context)
//! try {
//!     try {
//!         result = clone(this, args...)
//!         context.ReturnValue = result
//!         aspect.OnSuccess(context)
//!         leave exit
//!     } catch (Exception e) {
//!         context.Exception = e
//!         aspect.OnException(context)
//!         rethrow
//!     }
//! } finally {
//!     aspect.OnExit(context)
//! }
//! exit: return result
//! ```
//!
//! Hooks the aspect does not override are left out. The catch handler always rethrows.

use crate::{
    assembly::InstructionAssembler,
    metadata::{
        method::{ExceptionRegion, RegionEnd},
        module::Module,
        signatures::TypeSignature,
        token::Token,
    },
    weaver::{
        context::WeaveContext,
        emit::{self, ImportedAspect},
        plan::{AspectPlan, Hooks},
        resolver::MemberLocation,
    },
    Error, Result,
};

fn import_hook(
    module: &mut Module,
    hook: Option<MemberLocation<'_>>,
) -> Result<Option<Token>> {
    hook.map(|hook| hook.import_method(module)).transpose()
}

fn call_hook(asm: &mut InstructionAssembler<'_>, (aspect, context): (u16, u16), hook: Option<Token>) {
    if let Some(hook) = hook {
        asm.ldloc(aspect).ldloc(context).callvirt(hook);
    }
}

/// Moves the body of `method` into a clone and wraps calls to it with the aspect's hooks.
///
/// Returns the token of the clone.
///
/// # Errors
///
/// Returns [`Error::Setup`] if the boundary types are unavailable, and any clone,
/// import or validation error.
pub fn weave_method<'r>(
    ctx: &mut WeaveContext<'_, 'r>,
    method: Token,
    plan: &AspectPlan<'r>,
) -> Result<Token> {
    let Hooks::Boundary {
        on_entry,
        on_success,
        on_exception,
        on_exit,
    } = plan.hooks
    else {
        return Err(Error::TypeError("aspect is not a boundary aspect".to_string()));
    };
    let Some(refs) = ctx.references.boundary else {
        return Err(Error::Setup("MethodExecutionArgs not found".to_string()));
    };
    let shared = *ctx.references;
    let config = ctx.config;

    let (signature, is_static, declaring_type) = {
        let def = ctx.module.method(method)?;
        (def.signature.clone(), def.is_static(), def.declaring_type)
    };
    let clone = ctx.clone_method(method, &config.suffixes.boundary)?;

    let module = &mut *ctx.module;
    let aspect = ImportedAspect::import(module, plan)?;
    let on_entry = import_hook(module, on_entry)?;
    let on_success = import_hook(module, on_success)?;
    let on_exception = import_hook(module, on_exception)?;
    let on_exit = import_hook(module, on_exit)?;
    let args_type = module.import_type_from(refs.args_type.scope, refs.args_type.token)?;
    let args_ctor = refs.args_ctor.import_method(module)?;
    let set_instance = refs.set_instance.import_method(module)?;
    let set_method = refs.set_method.import_method(module)?;
    let set_arguments = refs.set_arguments.import_method(module)?;
    let set_return_value = refs.set_return_value.import_method(module)?;
    let set_exception = refs.set_exception.import_method(module)?;
    let arguments_ctor = shared.arguments_ctor.import_method(module)?;
    let get_method_from_handle = shared.get_method_from_handle.import_method(module)?;
    let exception = module.import_type_from(shared.exception.scope, shared.exception.token)?;
    let declaring = emit::type_signature(module, declaring_type);

    let mut body = emit::fresh_body();
    let mut asm = InstructionAssembler::new(&mut body);
    let aspect_local = asm.local(aspect.aspect_type.clone())?;
    let context_local = asm.local(TypeSignature::Class(args_type))?;
    let result_local = if signature.has_return() {
        Some(asm.local(signature.return_type.clone())?)
    } else {
        None
    };
    let exception_local = asm.local(TypeSignature::Class(exception))?;

    let locals = (aspect_local, context_local);
    aspect.emit_instance(&mut asm, aspect_local)?;

    asm.newobj(args_ctor).dup();
    emit::emit_instance_or_null(&mut asm, is_static);
    asm.callvirt(set_instance).dup();
    emit::emit_method_handle(&mut asm, method, declaring, get_method_from_handle);
    asm.callvirt(set_method).dup();
    emit::emit_arguments(&mut asm, &signature, arguments_ctor)?;
    asm.callvirt(set_arguments).stloc(context_local);

    call_hook(&mut asm, locals, on_entry);

    let try_start = asm.label();
    let catch_start = asm.label();
    let finally_start = asm.label();
    let exit = asm.label();

    asm.mark(try_start).nop();
    emit::emit_forward_arguments(&mut asm, &signature);
    asm.call(clone);
    if let Some(result) = result_local {
        asm.stloc(result).ldloc(context_local).ldloc(result);
        if signature.return_type.requires_boxing() {
            asm.box_value(signature.return_type.clone());
        }
        asm.callvirt(set_return_value);
    }
    call_hook(&mut asm, locals, on_success);
    asm.leave(exit);

    asm.mark(catch_start)
        .stloc(exception_local)
        .ldloc(context_local)
        .ldloc(exception_local)
        .callvirt(set_exception);
    call_hook(&mut asm, locals, on_exception);
    asm.rethrow();

    asm.mark(finally_start).nop();
    call_hook(&mut asm, locals, on_exit);
    asm.endfinally();

    asm.mark(exit).nop();
    if let Some(result) = result_local {
        asm.ldloc(result);
    }
    asm.ret();

    let (try_start, catch_start, finally_start, exit) = (
        asm.id(try_start),
        asm.id(catch_start),
        asm.id(finally_start),
        asm.id(exit),
    );
    asm.add_region(ExceptionRegion::catch(
        TypeSignature::Class(exception),
        try_start,
        catch_start,
        catch_start,
        RegionEnd::At(finally_start),
    ))?;
    asm.add_region(ExceptionRegion::finally(
        try_start,
        finally_start,
        finally_start,
        RegionEnd::At(exit),
    ))?;
    asm.finish()?;

    ctx.replace_body(method, body)?;
    Ok(clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        config::WeaverConfig,
        emulation::runtime::reference_resolver,
        metadata::{
            builders::{MethodDefBuilder, TypeDefBuilder},
            customattributes::CustomAttribute,
            method::HandlerKind,
        },
        weaver::{discovery::AspectDiscovery, resolver::WellKnownReferences},
    };

    fn fixture(hooks: &[&str]) -> (Module, Token) {
        let mut module = Module::new("App");
        let base = module.type_ref(
            "DotNetAspects",
            "DotNetAspects.Interception",
            "OnMethodBoundaryAspect",
        );
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
        for hook in hooks {
            MethodDefBuilder::new(*hook)
                .public()
                .override_method()
                .param("args", TypeSignature::Class(args))
                .body(|asm| {
                    asm.ret();
                    Ok(())
                })
                .build(&mut module, aspect)
                .unwrap();
        }

        let calc = TypeDefBuilder::new("App", "Calc").build(&mut module).unwrap();
        let twice = MethodDefBuilder::new("Twice")
            .public()
            .returns(TypeSignature::I4)
            .param("value", TypeSignature::I4)
            .attribute(CustomAttribute::new(ctor))
            .body(|asm| {
                asm.ldarg(1).ldarg(1).op(OpCode::Add).ret();
                Ok(())
            })
            .build(&mut module, calc)
            .unwrap();
        (module, twice)
    }

    fn weave(module: &mut Module, method: Token) -> Token {
        let config = WeaverConfig::default();
        let resolver = reference_resolver().unwrap();
        let references = WellKnownReferences::resolve(module, &resolver, &config)
            .unwrap()
            .unwrap();
        let mut discovery =
            AspectDiscovery::new(module, &resolver, &references, config.enabled).unwrap();
        let chain = discovery.discover_method(module, method).unwrap();
        let plan =
            AspectPlan::build(module, discovery.hierarchy(), &references, chain.head().unwrap())
                .unwrap();
        let mut ctx = WeaveContext::new(module, &config, &references);
        weave_method(&mut ctx, method, &plan).unwrap()
    }

    #[test]
    fn test_region_layout() {
        let (mut module, twice) = fixture(&["OnEntry", "OnSuccess", "OnException", "OnExit"]);
        let clone = weave(&mut module, twice);
        assert_eq!(module.method(clone).unwrap().name, "Twice$Boundary");

        let body = module.method(twice).unwrap().body.as_ref().unwrap();
        let regions = body.regions();
        assert_eq!(regions.len(), 2);
        assert!(matches!(regions[0].kind, HandlerKind::Catch(_)));
        assert_eq!(regions[1].kind, HandlerKind::Finally);
        assert_eq!(regions[0].try_start, regions[1].try_start);
        assert_eq!(regions[0].try_end, RegionEnd::At(regions[0].handler_start));
        assert_eq!(regions[0].handler_end, RegionEnd::At(regions[1].handler_start));
        assert_eq!(regions[1].try_end, RegionEnd::At(regions[1].handler_start));

        let opcodes: Vec<OpCode> = body.instructions().iter().map(|i| i.opcode).collect();
        assert_eq!(opcodes.iter().filter(|op| **op == OpCode::Rethrow).count(), 1);
        assert_eq!(opcodes.iter().filter(|op| **op == OpCode::Endfinally).count(), 1);
        assert!(opcodes.ends_with(&[OpCode::Nop, OpCode::Ldloc2, OpCode::Ret]));
        assert_eq!(body.locals.len(), 4);
    }

    #[test]
    fn test_base_hooks_are_omitted() {
        let (mut module, twice) = fixture(&["OnExit"]);
        weave(&mut module, twice);

        let body = module.method(twice).unwrap().body.as_ref().unwrap();
        let hook_calls = body
            .instructions()
            .iter()
            .filter(|i| {
                i.opcode == OpCode::Callvirt
                    && matches!(i.operand, crate::assembly::Operand::Method(t) if module.method_name(t) == Some("OnExit"))
            })
            .count();
        assert_eq!(hook_calls, 1);
        assert!(!body.instructions().iter().any(|i| matches!(
            i.operand,
            crate::assembly::Operand::Method(t) if module.method_name(t) == Some("OnEntry")
        )));
    }
}

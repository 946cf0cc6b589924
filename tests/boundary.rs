//! End-to-end tests of boundary aspects.
//!
//! The aspect hooks are empty IL methods. A recording hook on the emulator logs every
//! call into them, which gives the order in which the woven method notifies the aspect.

use std::sync::{Arc, Mutex};

use dotweave::{emulation::runtime::reference_resolver, prelude::*};

const ASPECTS: &str = "DotNetAspects";
const HOOKS: [&str; 4] = ["OnEntry", "OnSuccess", "OnException", "OnExit"];

/// Defines `App.<name>` deriving from `OnMethodBoundaryAspect` with empty overrides of
/// all four hooks, returning its constructor
fn boundary_aspect(module: &mut Module, name: &str) -> Result<Token> {
    let base = module.type_ref(ASPECTS, "DotNetAspects.Interception", "OnMethodBoundaryAspect");
    let args = module.type_ref(ASPECTS, "DotNetAspects.Args", "MethodExecutionArgs");
    let ty = TypeDefBuilder::new("App", name)
        .public_class()
        .extends(TypeSignature::Class(base))
        .build(module)?;
    let ctor = MethodDefBuilder::constructor()
        .body(|asm| {
            asm.ret();
            Ok(())
        })
        .build(module, ty)?;
    for hook in HOOKS {
        MethodDefBuilder::new(hook)
            .public()
            .override_method()
            .param("args", TypeSignature::Class(args))
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(module, ty)?;
    }
    Ok(ctor)
}

/// Defines `App.<name>` whose `OnException` stores `args.Exception` in its static
/// `Seen` field, returning its constructor
fn fault_recording_aspect(module: &mut Module, name: &str) -> Result<Token> {
    let base = module.type_ref(ASPECTS, "DotNetAspects.Interception", "OnMethodBoundaryAspect");
    let args = module.type_ref(ASPECTS, "DotNetAspects.Args", "MethodExecutionArgs");
    let exception = module.type_ref("System.Runtime", "System", "Exception");
    let get_exception = module.member_ref(
        TypeSignature::Class(args),
        "get_Exception",
        MemberRefSignature::Method(SignatureMethod::instance(
            TypeSignature::Class(exception),
            Vec::new(),
        )),
    );

    let ty = TypeDefBuilder::new("App", name)
        .public_class()
        .extends(TypeSignature::Class(base))
        .build(module)?;
    let seen = FieldBuilder::new("Seen", TypeSignature::Object)
        .public()
        .static_field()
        .build(module, ty)?;
    let ctor = MethodDefBuilder::constructor()
        .body(|asm| {
            asm.ret();
            Ok(())
        })
        .build(module, ty)?;
    MethodDefBuilder::new("OnException")
        .public()
        .override_method()
        .param("args", TypeSignature::Class(args))
        .body(move |asm| {
            asm.ldarg(1).callvirt(get_exception).stsfld(seen).ret();
            Ok(())
        })
        .build(module, ty)?;
    Ok(ctor)
}

/// `Demo.Service` with a static `Twice(int)` and a static `Fail()` that throws
fn service(module: &mut Module, attributes: &[CustomAttribute]) -> Result<(Token, Token)> {
    let exception = module.type_ref("System.Runtime", "System", "InvalidOperationException");
    let exception_ctor = module.member_ref(
        TypeSignature::Class(exception),
        ".ctor",
        MemberRefSignature::Method(SignatureMethod::instance(
            TypeSignature::Void,
            vec![TypeSignature::String],
        )),
    );

    let ty = TypeDefBuilder::new("Demo", "Service")
        .public_class()
        .build(module)?;
    let mut twice = MethodDefBuilder::new("Twice")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .param("value", TypeSignature::I4);
    let mut fail = MethodDefBuilder::new("Fail").public().static_method();
    for attribute in attributes {
        twice = twice.attribute(attribute.clone());
        fail = fail.attribute(attribute.clone());
    }
    let twice = twice
        .body(|asm| {
            asm.ldarg(0).ldarg(0).op(OpCode::Add).ret();
            Ok(())
        })
        .build(module, ty)?;
    let fail = fail
        .body(move |asm| {
            asm.ldstr("boom").newobj(exception_ctor).throw();
            Ok(())
        })
        .build(module, ty)?;
    Ok((twice, fail))
}

/// Hooks recording `Type.Method` for every aspect hook that runs
fn recording_hooks() -> (Arc<HookManager>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut hooks = HookManager::with_runtime();
    let sink = Arc::clone(&log);
    hooks.register(
        Hook::new("record-aspect-hooks")
            .match_runtime("aspect hook in App", |ctx| {
                ctx.namespace == "App" && HOOKS.iter().any(|hook| *hook == ctx.method_name)
            })
            .pre(move |ctx, _| {
                if let Ok(mut log) = sink.lock() {
                    log.push(format!("{}.{}", ctx.type_name, ctx.method_name));
                }
                PreHookResult::Continue
            }),
    );
    (Arc::new(hooks), log)
}

fn entries(log: &Mutex<Vec<String>>) -> Vec<String> {
    log.lock().map(|log| log.clone()).unwrap_or_default()
}

#[test]
fn test_hooks_run_around_successful_call() -> Result<()> {
    let mut module = Module::new("App");
    let trace = boundary_aspect(&mut module, "Trace")?;
    let (twice, _) = service(&mut module, &[CustomAttribute::new(trace)])?;

    let resolver = reference_resolver()?;
    let report = Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;
    assert_eq!(report.methods_bounded, 2);
    assert_eq!(report.clones_added, 2);
    assert_eq!(report.verification_failures, 0);
    assert!(module.methods().iter().any(|m| m.name == "Twice$Boundary"));

    let (hooks, log) = recording_hooks();
    let mut emulator = Emulator::new(&module, &resolver).with_hooks(hooks);
    let result = emulator.call(twice, vec![EmValue::I32(21)])?;

    assert_eq!(result, EmValue::I32(42));
    assert_eq!(
        entries(&log),
        vec!["Trace.OnEntry", "Trace.OnSuccess", "Trace.OnExit"]
    );
    Ok(())
}

#[test]
fn test_exception_is_reported_and_rethrown() -> Result<()> {
    let mut module = Module::new("App");
    let trace = boundary_aspect(&mut module, "Trace")?;
    let (_, fail) = service(&mut module, &[CustomAttribute::new(trace)])?;

    let resolver = reference_resolver()?;
    Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;

    let (hooks, log) = recording_hooks();
    let mut emulator = Emulator::new(&module, &resolver).with_hooks(hooks);
    match emulator.call(fail, Vec::new()) {
        Err(Error::Emulation(EmulationError::ManagedException {
            type_name, message, ..
        })) => {
            assert_eq!(type_name, "System.InvalidOperationException");
            assert_eq!(message, "boom");
        }
        other => panic!("expected the original exception, got {other:?}"),
    }
    assert_eq!(
        entries(&log),
        vec!["Trace.OnEntry", "Trace.OnException", "Trace.OnExit"]
    );
    Ok(())
}

#[test]
fn test_lowest_priority_aspect_is_applied() -> Result<()> {
    let mut module = Module::new("App");
    let inner = boundary_aspect(&mut module, "Inner")?;
    let outer = boundary_aspect(&mut module, "Outer")?;
    let attributes = [
        CustomAttribute::new(inner).with_property("AspectPriority", CustomAttributeArgument::I4(5)),
        CustomAttribute::new(outer).with_property("AspectPriority", CustomAttributeArgument::I4(1)),
    ];
    let (twice, _) = service(&mut module, &attributes)?;

    let resolver = reference_resolver()?;
    let weaver = Weaver::new(WeaverConfig::default(), &resolver);
    let report = weaver.weave(&mut module)?;
    assert_eq!(report.methods_bounded, 2);
    // One ignored declaration per woven method
    assert_eq!(weaver.diagnostics().warning_count(), 2);

    let (hooks, log) = recording_hooks();
    let mut emulator = Emulator::new(&module, &resolver).with_hooks(hooks);
    emulator.call(twice, vec![EmValue::I32(1)])?;
    assert_eq!(
        entries(&log),
        vec!["Outer.OnEntry", "Outer.OnSuccess", "Outer.OnExit"]
    );
    Ok(())
}

#[test]
fn test_type_level_aspect_wraps_every_method() -> Result<()> {
    let mut module = Module::new("App");
    let trace = boundary_aspect(&mut module, "Trace")?;
    let (twice, fail) = service(&mut module, &[])?;
    let service_type = module.method(twice)?.declaring_type;
    module
        .type_def_mut(service_type)?
        .custom_attributes
        .push(CustomAttribute::new(trace));

    let resolver = reference_resolver()?;
    let report = Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;
    assert_eq!(report.methods_bounded, 2);

    let (hooks, log) = recording_hooks();
    let mut emulator = Emulator::new(&module, &resolver).with_hooks(hooks);
    emulator.call(twice, vec![EmValue::I32(4)])?;
    assert!(emulator.call(fail, Vec::new()).is_err());
    assert_eq!(entries(&log).len(), 6);
    Ok(())
}

#[test]
fn test_hook_counts_balance_over_mixed_calls() -> Result<()> {
    let mut module = Module::new("App");
    let trace = boundary_aspect(&mut module, "Trace")?;
    let (twice, fail) = service(&mut module, &[CustomAttribute::new(trace)])?;

    let resolver = reference_resolver()?;
    Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;

    let (hooks, log) = recording_hooks();
    let mut emulator = Emulator::new(&module, &resolver).with_hooks(hooks);
    for value in [1, 2, 3] {
        assert_eq!(emulator.call(twice, vec![EmValue::I32(value)])?, EmValue::I32(value * 2));
        if value < 3 {
            assert!(emulator.call(fail, Vec::new()).is_err());
        }
    }

    let log = entries(&log);
    let count = |hook: &str| log.iter().filter(|entry| entry.ends_with(hook)).count();
    assert_eq!(count(".OnEntry"), 5);
    assert_eq!(count(".OnSuccess"), 3);
    assert_eq!(count(".OnException"), 2);
    assert_eq!(count(".OnExit"), count(".OnEntry"));
    assert_eq!(count(".OnSuccess") + count(".OnException"), count(".OnEntry"));
    Ok(())
}

#[test]
fn test_exception_hook_sees_original_fault() -> Result<()> {
    let mut module = Module::new("App");
    let catch = fault_recording_aspect(&mut module, "Catch")?;
    let (_, fail) = service(&mut module, &[CustomAttribute::new(catch)])?;

    let resolver = reference_resolver()?;
    let report = Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;
    assert_eq!(report.verification_failures, 0);

    let mut emulator = Emulator::new(&module, &resolver);
    let thrown = match emulator.call(fail, Vec::new()) {
        Err(Error::Emulation(EmulationError::ManagedException { exception, message, .. })) => {
            assert_eq!(message, "boom");
            exception
        }
        other => panic!("expected the original exception, got {other:?}"),
    };
    assert_eq!(emulator.get_static("App.Catch", "Seen")?, EmValue::ObjectRef(thrown));
    Ok(())
}

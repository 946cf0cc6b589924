//! End-to-end tests of method interception.
//!
//! Each test builds a small application module, weaves it against the reference
//! libraries and runs the result in the emulator: the aspect's `OnInvoke` decides
//! whether the original `Add` runs, and the caller sees whatever it leaves in
//! `ReturnValue`.

use dotweave::{emulation::runtime::reference_resolver, prelude::*};

const ASPECTS: &str = "DotNetAspects";

/// `Demo.Calculator` with an intercepted `Add` that counts its executions in the
/// static field `Calls`, and the aspect type `App.Intercept`
struct Calculator {
    module: Module,
    add: Token,
    aspect: Token,
}

/// Member reference on `DotNetAspects.Args.MethodInterceptionArgs`
fn args_method(
    module: &mut Module,
    name: &str,
    return_type: TypeSignature,
    params: Vec<TypeSignature>,
) -> Token {
    let args = module.type_ref(ASPECTS, "DotNetAspects.Args", "MethodInterceptionArgs");
    module.member_ref(
        TypeSignature::Class(args),
        name,
        MemberRefSignature::Method(SignatureMethod::instance(return_type, params)),
    )
}

/// Defines `App.<name>` deriving from `MethodInterceptionAspect`, returning the type
/// and its constructor. The aspect inherits the `OnInvoke` that just proceeds.
fn aspect(module: &mut Module, name: &str) -> Result<(Token, Token)> {
    let base = module.type_ref(ASPECTS, "DotNetAspects.Interception", "MethodInterceptionAspect");
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
    Ok((ty, ctor))
}

/// Overrides `OnInvoke` on the aspect type
fn on_invoke<F>(module: &mut Module, aspect: Token, body: F) -> Result<Token>
where
    F: FnOnce(&mut InstructionAssembler) -> Result<()> + 'static,
{
    let args = module.type_ref(ASPECTS, "DotNetAspects.Args", "MethodInterceptionArgs");
    MethodDefBuilder::new("OnInvoke")
        .public()
        .override_method()
        .param("args", TypeSignature::Class(args))
        .body(body)
        .build(module, aspect)
}

fn calculator() -> Result<Calculator> {
    let mut module = Module::new("App");
    let (aspect, ctor) = aspect(&mut module, "Intercept")?;

    let ty = TypeDefBuilder::new("Demo", "Calculator")
        .public_class()
        .build(&mut module)?;
    MethodDefBuilder::constructor()
        .body(|asm| {
            asm.ret();
            Ok(())
        })
        .build(&mut module, ty)?;
    let calls = FieldBuilder::new("Calls", TypeSignature::I4)
        .public()
        .static_field()
        .build(&mut module, ty)?;
    let add = MethodDefBuilder::new("Add")
        .public()
        .returns(TypeSignature::I4)
        .param("a", TypeSignature::I4)
        .param("b", TypeSignature::I4)
        .attribute(CustomAttribute::new(ctor))
        .body(move |asm| {
            asm.ldsfld(calls).ldc_i4(1).op(OpCode::Add).stsfld(calls);
            asm.ldarg(1).ldarg(2).op(OpCode::Add).ret();
            Ok(())
        })
        .build(&mut module, ty)?;

    Ok(Calculator { module, add, aspect })
}

/// Runs `Add(2, 3)` on a fresh calculator, returning the result and the number of
/// times the original body ran
fn add_two_and_three(module: &Module, resolver: &DefaultAssemblyResolver) -> Result<(i32, i32)> {
    let mut emulator = Emulator::new(module, resolver);
    let calculator = emulator.new_object("Demo.Calculator", Vec::new())?;
    let sum = emulator.invoke(
        "Demo.Calculator",
        "Add",
        vec![calculator, EmValue::I32(2), EmValue::I32(3)],
    )?;
    let calls = emulator.get_static("Demo.Calculator", "Calls")?;
    Ok((
        sum.as_i32().expect("Add returns an int"),
        calls.as_i32().expect("Calls is an int"),
    ))
}

#[test]
fn test_proceeding_aspect_returns_original_result() -> Result<()> {
    let mut app = calculator()?;
    let resolver = reference_resolver()?;
    let report = Weaver::new(WeaverConfig::default(), &resolver).weave(&mut app.module)?;

    assert_eq!(report.methods_intercepted, 1);
    assert_eq!(report.clones_added, 1);
    assert_eq!(report.verification_failures, 0);
    assert!(app.module.methods().iter().any(|m| m.name == "Add$Original"));

    assert_eq!(add_two_and_three(&app.module, &resolver)?, (5, 1));
    Ok(())
}

#[test]
fn test_aspect_doubles_the_result() -> Result<()> {
    let mut app = calculator()?;
    let proceed = args_method(&mut app.module, "Proceed", TypeSignature::Void, Vec::new());
    let get_return = args_method(&mut app.module, "get_ReturnValue", TypeSignature::Object, Vec::new());
    let set_return = args_method(
        &mut app.module,
        "set_ReturnValue",
        TypeSignature::Void,
        vec![TypeSignature::Object],
    );
    on_invoke(&mut app.module, app.aspect, move |asm| {
        asm.ldarg(1).callvirt(proceed);
        asm.ldarg(1)
            .ldarg(1)
            .callvirt(get_return)
            .unbox_any(TypeSignature::I4)
            .ldc_i4(2)
            .op(OpCode::Mul)
            .box_value(TypeSignature::I4)
            .callvirt(set_return)
            .ret();
        Ok(())
    })?;

    let resolver = reference_resolver()?;
    Weaver::new(WeaverConfig::default(), &resolver).weave(&mut app.module)?;

    assert_eq!(add_two_and_three(&app.module, &resolver)?, (10, 1));
    Ok(())
}

#[test]
fn test_aspect_that_never_proceeds() -> Result<()> {
    let mut app = calculator()?;
    let set_return = args_method(
        &mut app.module,
        "set_ReturnValue",
        TypeSignature::Void,
        vec![TypeSignature::Object],
    );
    on_invoke(&mut app.module, app.aspect, move |asm| {
        asm.ldarg(1)
            .ldc_i4(42)
            .box_value(TypeSignature::I4)
            .callvirt(set_return)
            .ret();
        Ok(())
    })?;

    let resolver = reference_resolver()?;
    Weaver::new(WeaverConfig::default(), &resolver).weave(&mut app.module)?;

    assert_eq!(add_two_and_three(&app.module, &resolver)?, (42, 0));
    Ok(())
}

#[test]
fn test_aspect_that_proceeds_twice() -> Result<()> {
    let mut app = calculator()?;
    let proceed = args_method(&mut app.module, "Proceed", TypeSignature::Void, Vec::new());
    on_invoke(&mut app.module, app.aspect, move |asm| {
        asm.ldarg(1).callvirt(proceed);
        asm.ldarg(1).callvirt(proceed).ret();
        Ok(())
    })?;

    let resolver = reference_resolver()?;
    Weaver::new(WeaverConfig::default(), &resolver).weave(&mut app.module)?;

    assert_eq!(add_two_and_three(&app.module, &resolver)?, (5, 2));
    Ok(())
}

#[test]
fn test_unknown_aspect_property_is_discarded() -> Result<()> {
    let mut app = calculator()?;
    PropertyBuilder::new("Factor", TypeSignature::I4)
        .auto()
        .build(&mut app.module, app.aspect)?;
    let ctor = app
        .module
        .methods_of(app.aspect)
        .find(|m| m.name == ".ctor")
        .map(|m| m.token)
        .expect("aspect constructor");
    app.module.method_mut(app.add)?.custom_attributes = vec![CustomAttribute::new(ctor)
        .with_property("Factor", CustomAttributeArgument::I4(3))
        .with_property("Missing", CustomAttributeArgument::I4(9))];

    let resolver = reference_resolver()?;
    let weaver = Weaver::new(WeaverConfig::default(), &resolver);
    let report = weaver.weave(&mut app.module)?;
    assert_eq!(report.methods_intercepted, 1);
    assert_eq!(weaver.diagnostics().error_count(), 0);

    assert_eq!(add_two_and_three(&app.module, &resolver)?, (5, 1));
    Ok(())
}

/// Two intercepted overloads of a static `Add`, both cloned as `Add$Original`
fn overloaded(config: WeaverConfig) -> Result<(Module, Token, Token)> {
    let mut module = Module::new("App");
    let (_, ctor) = aspect(&mut module, "Intercept")?;
    let ty = TypeDefBuilder::new("Demo", "Overloads")
        .public_class()
        .build(&mut module)?;
    let narrow = MethodDefBuilder::new("Add")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .param("a", TypeSignature::I4)
        .param("b", TypeSignature::I4)
        .attribute(CustomAttribute::new(ctor))
        .body(|asm| {
            asm.ldarg(0).ldarg(1).op(OpCode::Add).ret();
            Ok(())
        })
        .build(&mut module, ty)?;
    let wide = MethodDefBuilder::new("Add")
        .public()
        .static_method()
        .returns(TypeSignature::I8)
        .param("a", TypeSignature::I8)
        .param("b", TypeSignature::I8)
        .attribute(CustomAttribute::new(ctor))
        .body(|asm| {
            asm.ldarg(0).ldarg(1).op(OpCode::Add).ret();
            Ok(())
        })
        .build(&mut module, ty)?;

    let resolver = reference_resolver()?;
    let report = Weaver::new(config, &resolver).weave(&mut module)?;
    assert_eq!(report.methods_intercepted, 2);
    let clones = module
        .methods_of(ty)
        .filter(|m| m.name == "Add$Original")
        .count();
    assert_eq!(clones, 2);
    Ok((module, narrow, wide))
}

#[test]
fn test_lookup_by_name_is_ambiguous_for_overloads() -> Result<()> {
    let (module, narrow, _) = overloaded(WeaverConfig::compatibility())?;
    let resolver = reference_resolver()?;
    let mut emulator = Emulator::new(&module, &resolver);

    match emulator.call(narrow, vec![EmValue::I32(2), EmValue::I32(3)]) {
        Err(Error::Emulation(EmulationError::ManagedException { type_name, .. })) => {
            assert_eq!(type_name, "System.Reflection.AmbiguousMatchException");
        }
        other => panic!("expected an ambiguous match, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_lookup_by_token_resolves_each_overload() -> Result<()> {
    let (module, narrow, wide) = overloaded(WeaverConfig::default())?;
    let resolver = reference_resolver()?;
    let mut emulator = Emulator::new(&module, &resolver);

    let sum = emulator.call(narrow, vec![EmValue::I32(2), EmValue::I32(3)])?;
    assert_eq!(sum, EmValue::I32(5));
    let sum = emulator.call(wide, vec![EmValue::I64(1 << 40), EmValue::I64(1)])?;
    assert_eq!(sum, EmValue::I64((1 << 40) + 1));
    Ok(())
}

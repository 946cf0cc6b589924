//! End-to-end tests of property interception.

use dotweave::{emulation::runtime::reference_resolver, prelude::*};

const ASPECTS: &str = "DotNetAspects";

/// Member reference on `DotNetAspects.Args.LocationInterceptionArgs`
fn location_args_method(
    module: &mut Module,
    name: &str,
    return_type: TypeSignature,
    params: Vec<TypeSignature>,
) -> Token {
    let args = module.type_ref(ASPECTS, "DotNetAspects.Args", "LocationInterceptionArgs");
    module.member_ref(
        TypeSignature::Class(args),
        name,
        MemberRefSignature::Method(SignatureMethod::instance(return_type, params)),
    )
}

/// Defines `App.<name>` deriving from `LocationInterceptionAspect`, returning the type
/// and its constructor
fn location_aspect(module: &mut Module, name: &str) -> Result<(Token, Token)> {
    let base = module.type_ref(ASPECTS, "DotNetAspects.Interception", "LocationInterceptionAspect");
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

/// `Demo.<name>` with a parameterless constructor and one auto property carrying `aspect`
fn holder(
    module: &mut Module,
    name: &str,
    property: &str,
    property_type: TypeSignature,
    aspect: Token,
) -> Result<Token> {
    let ty = TypeDefBuilder::new("Demo", name)
        .public_class()
        .build(module)?;
    MethodDefBuilder::constructor()
        .body(|asm| {
            asm.ret();
            Ok(())
        })
        .build(module, ty)?;
    PropertyBuilder::new(property, property_type)
        .auto()
        .attribute(CustomAttribute::new(aspect))
        .build(module, ty)
}

#[test]
fn test_value_property_round_trips() -> Result<()> {
    let mut module = Module::new("App");
    let (_, ctor) = location_aspect(&mut module, "Observe")?;
    holder(&mut module, "Counter", "Value", TypeSignature::I4, ctor)?;

    let resolver = reference_resolver()?;
    let report = Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;
    assert_eq!(report.properties_intercepted, 1);
    assert_eq!(report.verification_failures, 0);
    let names: Vec<&str> = module.methods().iter().map(|m| m.name.as_str()).collect();
    assert!(names.contains(&"get_Value$OriginalGet"));
    assert!(names.contains(&"set_Value$OriginalSet"));

    let mut emulator = Emulator::new(&module, &resolver);
    let counter = emulator.new_object("Demo.Counter", Vec::new())?;
    let initial = emulator.invoke("Demo.Counter", "get_Value", vec![counter.clone()])?;
    assert_eq!(initial, EmValue::I32(0));

    emulator.invoke(
        "Demo.Counter",
        "set_Value",
        vec![counter.clone(), EmValue::I32(7)],
    )?;
    let value = emulator.invoke("Demo.Counter", "get_Value", vec![counter])?;
    assert_eq!(value, EmValue::I32(7));
    Ok(())
}

#[test]
fn test_set_hook_rewrites_incoming_value() -> Result<()> {
    let mut module = Module::new("App");
    let (aspect, ctor) = location_aspect(&mut module, "Upper")?;

    let string = module.type_ref("System.Runtime", "System", "String");
    let to_upper = module.member_ref(
        TypeSignature::Class(string),
        "ToUpper",
        MemberRefSignature::Method(SignatureMethod::instance(TypeSignature::String, Vec::new())),
    );
    let get_value = location_args_method(&mut module, "get_Value", TypeSignature::Object, Vec::new());
    let set_value = location_args_method(
        &mut module,
        "set_Value",
        TypeSignature::Void,
        vec![TypeSignature::Object],
    );
    let proceed_set = location_args_method(&mut module, "ProceedSetValue", TypeSignature::Void, Vec::new());
    let args = module.type_ref(ASPECTS, "DotNetAspects.Args", "LocationInterceptionArgs");
    MethodDefBuilder::new("OnSetValue")
        .public()
        .override_method()
        .param("args", TypeSignature::Class(args))
        .body(move |asm| {
            asm.ldarg(1)
                .ldarg(1)
                .callvirt(get_value)
                .castclass(TypeSignature::String)
                .callvirt(to_upper)
                .callvirt(set_value);
            asm.ldarg(1).callvirt(proceed_set).ret();
            Ok(())
        })
        .build(&mut module, aspect)?;
    holder(&mut module, "Person", "Name", TypeSignature::String, ctor)?;

    let resolver = reference_resolver()?;
    let report = Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;
    assert_eq!(report.properties_intercepted, 1);

    let mut emulator = Emulator::new(&module, &resolver);
    let person = emulator.new_object("Demo.Person", Vec::new())?;
    let name = emulator.string("abc")?;
    emulator.invoke("Demo.Person", "set_Name", vec![person.clone(), name])?;
    let name = emulator.invoke("Demo.Person", "get_Name", vec![person])?;
    assert_eq!(emulator.read_string(&name).as_deref(), Some("ABC"));
    Ok(())
}

#[test]
fn test_disabled_kind_leaves_property_alone() -> Result<()> {
    let mut module = Module::new("App");
    let (_, ctor) = location_aspect(&mut module, "Observe")?;
    holder(&mut module, "Counter", "Value", TypeSignature::I4, ctor)?;
    let methods_before = module.methods().len();

    let config = WeaverConfig::from_xml(
        r#"<Weavers><DotNetAspects Kinds="MethodInterception, MethodBoundary" /></Weavers>"#,
    )?;
    let resolver = reference_resolver()?;
    let report = Weaver::new(config, &resolver).weave(&mut module)?;

    assert_eq!(report.properties_intercepted, 0);
    assert_eq!(module.methods().len(), methods_before);
    Ok(())
}

#[test]
fn test_alternating_get_set_matches_unwoven_accessors() -> Result<()> {
    let mut module = Module::new("App");
    let (_, ctor) = location_aspect(&mut module, "Observe")?;
    holder(&mut module, "Counter", "Value", TypeSignature::I4, ctor)?;
    holder(&mut module, "Ledger", "Total", TypeSignature::I8, ctor)?;
    holder(&mut module, "Person", "Name", TypeSignature::String, ctor)?;

    let resolver = reference_resolver()?;
    let report = Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;
    assert_eq!(report.properties_intercepted, 3);

    let mut emulator = Emulator::new(&module, &resolver);
    let counter = emulator.new_object("Demo.Counter", Vec::new())?;
    for value in [3, -8, 0, i32::MAX] {
        emulator.invoke("Demo.Counter", "set_Value", vec![counter.clone(), EmValue::I32(value)])?;
        let read = emulator.invoke("Demo.Counter", "get_Value", vec![counter.clone()])?;
        assert_eq!(read, EmValue::I32(value));
    }

    let ledger = emulator.new_object("Demo.Ledger", Vec::new())?;
    for value in [1, -5, 1 << 40] {
        emulator.invoke("Demo.Ledger", "set_Total", vec![ledger.clone(), EmValue::I64(value)])?;
        let read = emulator.invoke("Demo.Ledger", "get_Total", vec![ledger.clone()])?;
        assert_eq!(read, EmValue::I64(value));
    }

    let person = emulator.new_object("Demo.Person", Vec::new())?;
    for value in ["a", "bb", "ccc"] {
        let name = emulator.string(value)?;
        emulator.invoke("Demo.Person", "set_Name", vec![person.clone(), name])?;
        let read = emulator.invoke("Demo.Person", "get_Name", vec![person.clone()])?;
        assert_eq!(emulator.read_string(&read).as_deref(), Some(value));
    }
    Ok(())
}

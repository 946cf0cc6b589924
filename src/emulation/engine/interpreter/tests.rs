//! Tests for the CIL interpreter.
//!
//! Every test builds a small module with the metadata builders and runs it against the
//! emulated runtime library.

use std::sync::Arc;

use super::*;
use crate::{
    assembly::InstructionAssembler,
    emulation::{
        runtime::{reference_resolver, SYSTEM_RUNTIME},
        EmulationLimits, Hook, HookManager, PreHookResult,
    },
    metadata::{
        builders::{FieldBuilder, MethodDefBuilder, TypeDefBuilder},
        method::{ExceptionRegion, RegionEnd},
        signatures::SignatureMethod,
        typesystem::MemberRefSignature,
    },
    Error,
};

fn object_class(module: &mut Module) -> Token {
    TypeDefBuilder::new("Demo", "Program")
        .public_class()
        .build(module)
        .unwrap()
}

fn runtime_ctor(module: &mut Module, name: &str, params: Vec<TypeSignature>) -> Token {
    let ty = module.type_ref(SYSTEM_RUNTIME, "System", name);
    module.member_ref(
        TypeSignature::Class(ty),
        ".ctor",
        MemberRefSignature::Method(SignatureMethod::instance(TypeSignature::Void, params)),
    )
}

/// trace = trace * 10 + digit
fn append(asm: &mut InstructionAssembler<'_>, trace: Token, digit: i32) {
    asm.ldsfld(trace)
        .ldc_i4(10)
        .op(OpCode::Mul)
        .ldc_i4(digit)
        .op(OpCode::Add)
        .stsfld(trace);
}

fn unhandled(error: Error) -> (String, String) {
    match error {
        Error::Emulation(EmulationError::ManagedException { type_name, message, .. }) => {
            (type_name, message)
        }
        other => panic!("expected a managed exception, got {other:?}"),
    }
}

#[test]
fn test_arithmetic_and_branches() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    MethodDefBuilder::new("Add")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .param("a", TypeSignature::I4)
        .param("b", TypeSignature::I4)
        .body(|asm| {
            asm.ldarg(0).ldarg(1).op(OpCode::Add).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();
    // Sum of 1..=n with a backward branch
    MethodDefBuilder::new("Sum")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .param("n", TypeSignature::I4)
        .local(TypeSignature::I4)
        .local(TypeSignature::I4)
        .body(|asm| {
            let check = asm.label();
            let top = asm.label();
            asm.ldc_i4(1).stloc(1).br(check);
            asm.mark(top)
                .ldloc(0)
                .ldloc(1)
                .op(OpCode::Add)
                .stloc(0)
                .ldloc(1)
                .ldc_i4(1)
                .op(OpCode::Add)
                .stloc(1);
            asm.mark(check).ldloc(1).ldarg(0).op(OpCode::Cgt).brfalse(top);
            asm.ldloc(0).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver);
    let sum = emulator
        .invoke("Demo.Program", "Add", vec![EmValue::I32(2), EmValue::I32(3)])
        .unwrap();
    assert_eq!(sum, EmValue::I32(5));
    let total = emulator
        .invoke("Demo.Program", "Sum", vec![EmValue::I32(10)])
        .unwrap();
    assert_eq!(total, EmValue::I32(55));
    assert!(emulator.instructions_executed() > 10);
}

#[test]
fn test_divide_by_zero_is_caught() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    let divide_by_zero = module.type_ref(SYSTEM_RUNTIME, "System", "DivideByZeroException");
    MethodDefBuilder::new("SafeDivide")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .param("a", TypeSignature::I4)
        .param("b", TypeSignature::I4)
        .local(TypeSignature::I4)
        .body(move |asm| {
            let try_start = asm.label();
            let handler = asm.label();
            let end = asm.label();
            asm.mark(try_start)
                .ldarg(0)
                .ldarg(1)
                .op(OpCode::Div)
                .stloc(0)
                .leave(end);
            asm.mark(handler).pop().ldc_i4(-1).stloc(0).leave(end);
            asm.mark(end).ldloc(0).ret();
            let (try_start, handler, end) = (asm.id(try_start), asm.id(handler), asm.id(end));
            asm.add_region(ExceptionRegion::catch(
                TypeSignature::Class(divide_by_zero),
                try_start,
                handler,
                handler,
                RegionEnd::At(end),
            ))?;
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver);
    let ok = emulator
        .invoke("Demo.Program", "SafeDivide", vec![EmValue::I32(9), EmValue::I32(3)])
        .unwrap();
    assert_eq!(ok, EmValue::I32(3));
    let caught = emulator
        .invoke("Demo.Program", "SafeDivide", vec![EmValue::I32(9), EmValue::I32(0)])
        .unwrap();
    assert_eq!(caught, EmValue::I32(-1));
}

#[test]
fn test_finally_runs_on_leave_and_on_exception() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    let trace = FieldBuilder::new("trace", TypeSignature::I4)
        .public()
        .static_field()
        .build(&mut module, program)
        .unwrap();
    let exception_ctor = runtime_ctor(
        &mut module,
        "InvalidOperationException",
        vec![TypeSignature::String],
    );

    MethodDefBuilder::new("Run")
        .public()
        .static_method()
        .param("fail", TypeSignature::Boolean)
        .body(move |asm| {
            let try_start = asm.label();
            let skip = asm.label();
            let handler = asm.label();
            let end = asm.label();
            asm.mark(try_start).nop();
            append(asm, trace, 1);
            asm.ldarg(0).brfalse(skip);
            asm.ldstr("boom").newobj(exception_ctor).throw();
            asm.mark(skip).leave(end);
            asm.mark(handler).nop();
            append(asm, trace, 2);
            asm.endfinally();
            asm.mark(end).nop();
            append(asm, trace, 3);
            asm.ret();
            let (try_start, handler, end) = (asm.id(try_start), asm.id(handler), asm.id(end));
            asm.add_region(ExceptionRegion::finally(
                try_start,
                handler,
                handler,
                RegionEnd::At(end),
            ))?;
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver);
    emulator
        .invoke("Demo.Program", "Run", vec![EmValue::I32(0)])
        .unwrap();
    assert_eq!(
        emulator.get_static("Demo.Program", "trace").unwrap(),
        EmValue::I32(123)
    );

    let error = emulator
        .invoke("Demo.Program", "Run", vec![EmValue::I32(1)])
        .unwrap_err();
    let (type_name, message) = unhandled(error);
    assert_eq!(type_name, "System.InvalidOperationException");
    assert_eq!(message, "boom");
    assert_eq!(
        emulator.get_static("Demo.Program", "trace").unwrap(),
        EmValue::I32(12312)
    );
}

#[test]
fn test_rethrow_keeps_exception_object() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    let exception = module.type_ref(SYSTEM_RUNTIME, "System", "Exception");
    let exception_ctor = runtime_ctor(&mut module, "ArgumentException", vec![TypeSignature::String]);
    MethodDefBuilder::new("Run")
        .public()
        .static_method()
        .body(move |asm| {
            let try_start = asm.label();
            let handler = asm.label();
            let end = asm.label();
            asm.mark(try_start)
                .ldstr("bad argument")
                .newobj(exception_ctor)
                .throw();
            asm.mark(handler).pop().rethrow();
            asm.mark(end).ret();
            let (try_start, handler, end) = (asm.id(try_start), asm.id(handler), asm.id(end));
            asm.add_region(ExceptionRegion::catch(
                TypeSignature::Class(exception),
                try_start,
                handler,
                handler,
                RegionEnd::At(end),
            ))?;
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver);
    let (type_name, message) = unhandled(emulator.invoke("Demo.Program", "Run", vec![]).unwrap_err());
    assert_eq!(type_name, "System.ArgumentException");
    assert_eq!(message, "bad argument");
}

#[test]
fn test_virtual_dispatch_and_casts() {
    let mut module = Module::new("App");
    let object = module.type_ref(SYSTEM_RUNTIME, "System", "Object");
    let base = TypeDefBuilder::new("Demo", "Shape")
        .public_class()
        .extends(TypeSignature::Class(object))
        .build(&mut module)
        .unwrap();
    let describe = MethodDefBuilder::new("Sides")
        .public()
        .virtual_method()
        .returns(TypeSignature::I4)
        .body(|asm| {
            asm.ldc_i4(0).ret();
            Ok(())
        })
        .build(&mut module, base)
        .unwrap();
    MethodDefBuilder::constructor()
        .body(|asm| {
            asm.ret();
            Ok(())
        })
        .build(&mut module, base)
        .unwrap();
    let square = TypeDefBuilder::new("Demo", "Square")
        .public_class()
        .extends(TypeSignature::Class(base))
        .build(&mut module)
        .unwrap();
    MethodDefBuilder::new("Sides")
        .public()
        .override_method()
        .returns(TypeSignature::I4)
        .body(|asm| {
            asm.ldc_i4(4).ret();
            Ok(())
        })
        .build(&mut module, square)
        .unwrap();
    MethodDefBuilder::constructor()
        .body(|asm| {
            asm.ret();
            Ok(())
        })
        .build(&mut module, square)
        .unwrap();

    let program = object_class(&mut module);
    MethodDefBuilder::new("Count")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .param("shape", TypeSignature::Class(base))
        .body(move |asm| {
            asm.ldarg(0).callvirt(describe).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();
    MethodDefBuilder::new("AsSquare")
        .public()
        .static_method()
        .returns(TypeSignature::Object)
        .param("shape", TypeSignature::Object)
        .body(move |asm| {
            asm.ldarg(0).castclass(TypeSignature::Class(square)).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver);
    let shape = emulator.new_object("Demo.Shape", vec![]).unwrap();
    let square_object = emulator.new_object("Demo.Square", vec![]).unwrap();

    assert_eq!(
        emulator.invoke("Demo.Program", "Count", vec![shape.clone()]).unwrap(),
        EmValue::I32(0)
    );
    assert_eq!(
        emulator.invoke("Demo.Program", "Count", vec![square_object.clone()]).unwrap(),
        EmValue::I32(4)
    );
    assert_eq!(
        emulator.invoke("Demo.Program", "AsSquare", vec![square_object.clone()]).unwrap(),
        square_object
    );

    let (type_name, message) =
        unhandled(emulator.invoke("Demo.Program", "AsSquare", vec![shape]).unwrap_err());
    assert_eq!(type_name, "System.InvalidCastException");
    assert_eq!(
        message,
        "Unable to cast object of type 'Demo.Shape' to type 'Demo.Square'."
    );

    let (type_name, _) =
        unhandled(emulator.invoke("Demo.Program", "Count", vec![EmValue::Null]).unwrap_err());
    assert_eq!(type_name, "System.NullReferenceException");
}

#[test]
fn test_box_and_unbox() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    MethodDefBuilder::new("Box")
        .public()
        .static_method()
        .returns(TypeSignature::Object)
        .param("value", TypeSignature::I4)
        .body(|asm| {
            asm.ldarg(0).box_value(TypeSignature::I4).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();
    MethodDefBuilder::new("Unbox")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .param("value", TypeSignature::Object)
        .body(|asm| {
            asm.ldarg(0).unbox_any(TypeSignature::I4).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver);
    let boxed = emulator
        .invoke("Demo.Program", "Box", vec![EmValue::I32(7)])
        .unwrap();
    assert!(matches!(boxed, EmValue::ObjectRef(_)));
    assert_eq!(
        emulator.invoke("Demo.Program", "Unbox", vec![boxed]).unwrap(),
        EmValue::I32(7)
    );

    let long = emulator.box_value(EmValue::I64(7)).unwrap();
    let (type_name, _) = unhandled(emulator.invoke("Demo.Program", "Unbox", vec![long]).unwrap_err());
    assert_eq!(type_name, "System.InvalidCastException");

    let (type_name, _) =
        unhandled(emulator.invoke("Demo.Program", "Unbox", vec![EmValue::Null]).unwrap_err());
    assert_eq!(type_name, "System.NullReferenceException");
}

#[test]
fn test_object_arrays() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    MethodDefBuilder::new("Pair")
        .public()
        .static_method()
        .returns(TypeSignature::object_array())
        .param("first", TypeSignature::Object)
        .param("second", TypeSignature::Object)
        .body(|asm| {
            asm.ldc_i4(2)
                .newarr(TypeSignature::Object)
                .dup()
                .ldc_i4(0)
                .ldarg(0)
                .stelem_ref()
                .dup()
                .ldc_i4(1)
                .ldarg(1)
                .stelem_ref()
                .ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();
    MethodDefBuilder::new("At")
        .public()
        .static_method()
        .returns(TypeSignature::Object)
        .param("items", TypeSignature::object_array())
        .param("index", TypeSignature::I4)
        .body(|asm| {
            asm.ldarg(0).ldarg(1).op(OpCode::LdelemRef).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver);
    let first = emulator.string("a").unwrap();
    let pair = emulator
        .invoke("Demo.Program", "Pair", vec![first.clone(), EmValue::Null])
        .unwrap();
    assert_eq!(
        emulator
            .invoke("Demo.Program", "At", vec![pair.clone(), EmValue::I32(0)])
            .unwrap(),
        first
    );
    let (type_name, _) = unhandled(
        emulator
            .invoke("Demo.Program", "At", vec![pair, EmValue::I32(2)])
            .unwrap_err(),
    );
    assert_eq!(type_name, "System.IndexOutOfRangeException");
}

#[test]
fn test_string_natives() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    let string = module.type_ref(SYSTEM_RUNTIME, "System", "String");
    let to_upper = module.member_ref(
        TypeSignature::Class(string),
        "ToUpper",
        MemberRefSignature::Method(SignatureMethod::instance(TypeSignature::String, vec![])),
    );
    MethodDefBuilder::new("Shout")
        .public()
        .static_method()
        .returns(TypeSignature::String)
        .param("text", TypeSignature::String)
        .body(move |asm| {
            asm.ldarg(0).callvirt(to_upper).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver);
    let text = emulator.string("abc").unwrap();
    let shouted = emulator.invoke("Demo.Program", "Shout", vec![text]).unwrap();
    assert_eq!(emulator.read_string(&shouted).as_deref(), Some("ABC"));
}

#[test]
fn test_user_hook_replaces_method() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    MethodDefBuilder::new("Answer")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .body(|asm| {
            asm.ldc_i4(0).ret();
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let mut hooks = HookManager::with_runtime();
    hooks.register(
        Hook::new("answer")
            .match_name("Demo", "Program", "Answer")
            .pre(|_, _| PreHookResult::Bypass(Some(EmValue::I32(42)))),
    );

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver).with_hooks(Arc::new(hooks));
    assert_eq!(
        emulator.invoke("Demo.Program", "Answer", vec![]).unwrap(),
        EmValue::I32(42)
    );
}

#[test]
fn test_limits() {
    let mut module = Module::new("App");
    let program = object_class(&mut module);
    let recurse = MethodDefBuilder::new("Recurse")
        .public()
        .static_method()
        .build(&mut module, program)
        .unwrap();
    module.method_mut(recurse).unwrap().body = {
        let mut body = MethodBody::new();
        body.emit(OpCode::Call, Operand::Method(recurse));
        body.emit(OpCode::Ret, Operand::None);
        Some(body)
    };
    MethodDefBuilder::new("Spin")
        .public()
        .static_method()
        .body(|asm| {
            let top = asm.label();
            asm.mark(top).br(top);
            Ok(())
        })
        .build(&mut module, program)
        .unwrap();

    let resolver = reference_resolver().unwrap();
    let mut emulator = Emulator::new(&module, &resolver)
        .with_limits(EmulationLimits::new().with_max_call_depth(32).with_max_instructions(10_000));
    assert!(matches!(
        emulator.invoke("Demo.Program", "Recurse", vec![]),
        Err(Error::Emulation(EmulationError::CallDepthExceeded(32)))
    ));

    let mut emulator = Emulator::new(&module, &resolver)
        .with_limits(EmulationLimits::new().with_max_instructions(10_000));
    assert!(matches!(
        emulator.invoke("Demo.Program", "Spin", vec![]),
        Err(Error::Emulation(EmulationError::InstructionLimitExceeded(10_000)))
    ));
}

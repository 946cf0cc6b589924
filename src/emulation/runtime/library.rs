//! Reference modules the emulator runs woven code against.
//!
//! [`system_runtime`] is a slice of the core library: the root types, the exception
//! hierarchy, delegates, strings and the reflection surface the generated code calls.
//! [`aspect_library`] is the aspect library: the aspect base classes and the argument
//! containers handed to aspect methods, written in IL against the core library the same
//! way the real assembly is compiled.
//!
//! Methods without a body are implemented by the natives in `bcl`.

use crate::{
    assembly::{InstructionAssembler, OpCode, Operand},
    metadata::{
        builders::{FieldBuilder, MethodDefBuilder, PropertyBuilder, TypeDefBuilder},
        method::MethodModifiers,
        module::Module,
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
        typesystem::MemberRefSignature,
    },
    Result,
};

/// Assembly name of the core library
pub const SYSTEM_RUNTIME: &str = "System.Runtime";

/// Assembly name of the aspect library
pub const ASPECTS_ASSEMBLY: &str = "DotNetAspects";

/// Field of `System.Exception` holding the message
pub(crate) const EXCEPTION_MESSAGE_FIELD: &str = "_message";

const ARGS_NAMESPACE: &str = "DotNetAspects.Args";
const INTERCEPTION_NAMESPACE: &str = "DotNetAspects.Interception";

fn class(module: &mut Module, namespace: &str, name: &str, base: Token) -> Result<Token> {
    TypeDefBuilder::new(namespace, name)
        .public_class()
        .extends(TypeSignature::Class(base))
        .build(module)
}

fn abstract_class(module: &mut Module, namespace: &str, name: &str, base: Token) -> Result<Token> {
    TypeDefBuilder::new(namespace, name)
        .abstract_class()
        .extends(TypeSignature::Class(base))
        .build(module)
}

/// Public method implemented by a native
fn native(name: &str) -> MethodDefBuilder {
    MethodDefBuilder::new(name).public()
}

/// Public property getter implemented by a native
fn native_getter(name: &str, property_type: TypeSignature) -> MethodDefBuilder {
    native(&format!("get_{name}"))
        .modifiers(MethodModifiers::SPECIAL_NAME)
        .returns(property_type)
}

/// Parameterless constructor, chaining to `base` if given
fn constructor(module: &mut Module, ty: Token, base: Option<Token>) -> Result<Token> {
    MethodDefBuilder::constructor()
        .body(move |asm| {
            if let Some(base) = base {
                asm.ldarg(0).call(base);
            }
            asm.ret();
            Ok(())
        })
        .build(module, ty)
}

/// Auto-implemented property, returns its getter and setter
fn auto_property(
    module: &mut Module,
    ty: Token,
    name: &str,
    property_type: TypeSignature,
) -> Result<(Token, Token)> {
    let property = PropertyBuilder::new(name, property_type)
        .auto()
        .build(module, ty)?;
    let def = module.property(property)?;
    match (def.getter, def.setter) {
        (Some(getter), Some(setter)) => Ok((getter, setter)),
        _ => Err(malformed_error!("Auto property {} lacks an accessor", name)),
    }
}

/// Static fields of an enum, assigned in its type initializer
fn enum_values(module: &mut Module, ty: Token, values: &[(&str, i32)]) -> Result<()> {
    FieldBuilder::new("value__", TypeSignature::I4)
        .public()
        .build(module, ty)?;
    let mut assignments = Vec::with_capacity(values.len());
    for (name, value) in values {
        let field = FieldBuilder::new(*name, TypeSignature::ValueType(ty))
            .public()
            .static_field()
            .build(module, ty)?;
        assignments.push((field, *value));
    }
    MethodDefBuilder::new(".cctor")
        .static_method()
        .modifiers(MethodModifiers::SPECIAL_NAME | MethodModifiers::RTSPECIAL_NAME)
        .body(move |asm| {
            for (field, value) in assignments {
                asm.ldc_i4(value).stsfld(field);
            }
            asm.ret();
            Ok(())
        })
        .build(module, ty)?;
    Ok(())
}

/// Constructors of an exception type: `()` and `(string)`
struct ExceptionCtors {
    default: Token,
    message: Token,
}

fn exception_type(
    module: &mut Module,
    namespace: &str,
    name: &str,
    base: Token,
    base_ctors: &ExceptionCtors,
) -> Result<(Token, ExceptionCtors)> {
    let ty = class(module, namespace, name, base)?;
    let default = constructor(module, ty, Some(base_ctors.default))?;
    let base_message = base_ctors.message;
    let message = MethodDefBuilder::constructor()
        .param("message", TypeSignature::String)
        .body(move |asm| {
            asm.ldarg(0).ldarg(1).call(base_message).ret();
            Ok(())
        })
        .build(module, ty)?;
    Ok((ty, ExceptionCtors { default, message }))
}

/// Builds the core library module.
///
/// # Errors
///
/// Returns an error if a definition is rejected by the metadata builders.
#[allow(clippy::too_many_lines)]
pub fn system_runtime() -> Result<Module> {
    let mut module = Module::new(SYSTEM_RUNTIME);
    let m = &mut module;

    let object = TypeDefBuilder::new("System", "Object")
        .public_class()
        .build(m)?;
    let value_type = abstract_class(m, "System", "ValueType", object)?;
    let enum_type = abstract_class(m, "System", "Enum", value_type)?;
    let string = class(m, "System", "String", object)?;
    abstract_class(m, "System", "Array", object)?;
    let attribute = abstract_class(m, "System", "Attribute", object)?;
    let delegate = abstract_class(m, "System", "Delegate", object)?;
    let multicast = abstract_class(m, "System", "MulticastDelegate", delegate)?;
    let exception = class(m, "System", "Exception", object)?;
    let type_handle = class(m, "System", "RuntimeTypeHandle", value_type)?;
    let method_handle = class(m, "System", "RuntimeMethodHandle", value_type)?;
    let member_info = abstract_class(m, "System.Reflection", "MemberInfo", object)?;
    let system_type = abstract_class(m, "System", "Type", member_info)?;
    let method_base = abstract_class(m, "System.Reflection", "MethodBase", member_info)?;
    let method_info = abstract_class(m, "System.Reflection", "MethodInfo", method_base)?;
    let property_info = abstract_class(m, "System.Reflection", "PropertyInfo", member_info)?;
    abstract_class(m, "System.Reflection", "FieldInfo", member_info)?;
    let binding_flags = class(m, "System.Reflection", "BindingFlags", enum_type)?;

    let object_ctor = constructor(m, object, None)?;
    native("ToString")
        .virtual_method()
        .returns(TypeSignature::String)
        .build(m, object)?;
    native("Equals")
        .virtual_method()
        .returns(TypeSignature::Boolean)
        .param("obj", TypeSignature::Object)
        .build(m, object)?;
    native("GetType")
        .returns(TypeSignature::Class(system_type))
        .build(m, object)?;

    constructor(m, value_type, Some(object_ctor))?;
    constructor(m, attribute, Some(object_ctor))?;

    native_getter("Length", TypeSignature::I4).build(m, string)?;
    native("ToUpper")
        .returns(TypeSignature::String)
        .build(m, string)?;
    native("ToLower")
        .returns(TypeSignature::String)
        .build(m, string)?;
    native("Concat")
        .static_method()
        .returns(TypeSignature::String)
        .param("str0", TypeSignature::String)
        .param("str1", TypeSignature::String)
        .build(m, string)?;
    native("op_Equality")
        .static_method()
        .modifiers(MethodModifiers::SPECIAL_NAME)
        .returns(TypeSignature::Boolean)
        .param("a", TypeSignature::String)
        .param("b", TypeSignature::String)
        .build(m, string)?;
    native("IsNullOrEmpty")
        .static_method()
        .returns(TypeSignature::Boolean)
        .param("value", TypeSignature::String)
        .build(m, string)?;

    // Delegates are constructed by the runtime, the constructor and Invoke have no IL
    for (name, returns, params) in [
        ("Func`1", TypeSignature::GenericParamType(0), Vec::new()),
        ("Action`1", TypeSignature::Void, vec![TypeSignature::GenericParamType(0)]),
    ] {
        let ty = TypeDefBuilder::new("System", name)
            .public_class()
            .extends(TypeSignature::Class(multicast))
            .generic_param("T")
            .build(m)?;
        MethodDefBuilder::constructor()
            .param("object", TypeSignature::Object)
            .param("method", TypeSignature::I)
            .build(m, ty)?;
        let mut invoke = native("Invoke").virtual_method().returns(returns);
        for (index, param) in params.into_iter().enumerate() {
            invoke = invoke.param(format!("arg{index}"), param);
        }
        invoke.build(m, ty)?;
    }

    let message = FieldBuilder::new(EXCEPTION_MESSAGE_FIELD, TypeSignature::String).build(m, exception)?;
    let inner = FieldBuilder::new("_innerException", TypeSignature::Class(exception)).build(m, exception)?;
    let exception_ctors = ExceptionCtors {
        default: constructor(m, exception, Some(object_ctor))?,
        message: MethodDefBuilder::constructor()
            .param("message", TypeSignature::String)
            .body(move |asm| {
                asm.ldarg(0).call(object_ctor);
                asm.ldarg(0).ldarg(1).stfld(message).ret();
                Ok(())
            })
            .build(m, exception)?,
    };
    MethodDefBuilder::constructor()
        .param("message", TypeSignature::String)
        .param("innerException", TypeSignature::Class(exception))
        .body(move |asm| {
            asm.ldarg(0).call(object_ctor);
            asm.ldarg(0).ldarg(1).stfld(message);
            asm.ldarg(0).ldarg(2).stfld(inner).ret();
            Ok(())
        })
        .build(m, exception)?;
    PropertyBuilder::new("Message", TypeSignature::String)
        .get(move |asm| {
            asm.ldarg(0).ldfld(message).ret();
            Ok(())
        })
        .build(m, exception)?;
    PropertyBuilder::new("InnerException", TypeSignature::Class(exception))
        .get(move |asm| {
            asm.ldarg(0).ldfld(inner).ret();
            Ok(())
        })
        .build(m, exception)?;

    let (system_exception, system_ctors) =
        exception_type(m, "System", "SystemException", exception, &exception_ctors)?;
    let (arithmetic, arithmetic_ctors) =
        exception_type(m, "System", "ArithmeticException", system_exception, &system_ctors)?;
    let (argument, argument_ctors) =
        exception_type(m, "System", "ArgumentException", system_exception, &system_ctors)?;
    exception_type(m, "System", "ArgumentNullException", argument, &argument_ctors)?;
    for name in [
        "InvalidOperationException",
        "NullReferenceException",
        "InvalidCastException",
        "IndexOutOfRangeException",
        "NotSupportedException",
    ] {
        exception_type(m, "System", name, system_exception, &system_ctors)?;
    }
    for name in ["DivideByZeroException", "OverflowException"] {
        exception_type(m, "System", name, arithmetic, &arithmetic_ctors)?;
    }
    for name in ["AmbiguousMatchException", "TargetException"] {
        exception_type(m, "System.Reflection", name, system_exception, &system_ctors)?;
    }

    native_getter("Name", TypeSignature::String)
        .virtual_method()
        .build(m, member_info)?;
    native_getter("FullName", TypeSignature::String).build(m, system_type)?;
    native("GetTypeFromHandle")
        .static_method()
        .returns(TypeSignature::Class(system_type))
        .param("handle", TypeSignature::ValueType(type_handle))
        .build(m, system_type)?;
    native("GetMethod")
        .returns(TypeSignature::Class(method_info))
        .param("name", TypeSignature::String)
        .param("bindingAttr", TypeSignature::ValueType(binding_flags))
        .build(m, system_type)?;
    native("GetProperty")
        .returns(TypeSignature::Class(property_info))
        .param("name", TypeSignature::String)
        .build(m, system_type)?;
    native("GetMethodFromHandle")
        .static_method()
        .returns(TypeSignature::Class(method_base))
        .param("handle", TypeSignature::ValueType(method_handle))
        .param("declaringType", TypeSignature::ValueType(type_handle))
        .build(m, method_base)?;
    native("Invoke")
        .virtual_method()
        .returns(TypeSignature::Object)
        .param("obj", TypeSignature::Object)
        .param("parameters", TypeSignature::object_array())
        .build(m, method_base)?;
    native_getter("PropertyType", TypeSignature::Class(system_type)).build(m, property_info)?;

    enum_values(
        m,
        binding_flags,
        &[
            ("Default", 0),
            ("Instance", 4),
            ("Static", 8),
            ("Public", 16),
            ("NonPublic", 32),
        ],
    )?;

    Ok(module)
}

/// References into the core library the aspect library compiles against
struct CoreReferences {
    object: Token,
    object_ctor: Token,
    attribute_ctor: Token,
    exception: Token,
    system_type: Token,
    method_base: Token,
    method_info: Token,
    property_info: Token,
    field_info: Token,
    func: TypeSignature,
    action: TypeSignature,
    func_invoke: Token,
    action_invoke: Token,
    method_invoke: Token,
    invalid_operation_ctor: Token,
}

impl CoreReferences {
    fn import(module: &mut Module) -> Self {
        let system = |module: &mut Module, name: &str| module.type_ref(SYSTEM_RUNTIME, "System", name);
        let reflection =
            |module: &mut Module, name: &str| module.type_ref(SYSTEM_RUNTIME, "System.Reflection", name);
        let method = |params: Vec<TypeSignature>, returns: TypeSignature| {
            MemberRefSignature::Method(SignatureMethod::instance(returns, params))
        };

        let object = system(module, "Object");
        let attribute = system(module, "Attribute");
        let exception = system(module, "Exception");
        let system_type = system(module, "Type");
        let invalid_operation = system(module, "InvalidOperationException");
        let func = TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(system(module, "Func`1"))),
            vec![TypeSignature::Object],
        );
        let action = TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(system(module, "Action`1"))),
            vec![TypeSignature::Object],
        );
        let method_base = reflection(module, "MethodBase");
        let method_info = reflection(module, "MethodInfo");
        let property_info = reflection(module, "PropertyInfo");
        let field_info = reflection(module, "FieldInfo");

        CoreReferences {
            object,
            object_ctor: module.member_ref(
                TypeSignature::Class(object),
                ".ctor",
                method(Vec::new(), TypeSignature::Void),
            ),
            attribute_ctor: module.member_ref(
                TypeSignature::Class(attribute),
                ".ctor",
                method(Vec::new(), TypeSignature::Void),
            ),
            exception,
            system_type,
            method_base,
            method_info,
            property_info,
            field_info,
            func_invoke: module.member_ref(
                func.clone(),
                "Invoke",
                method(Vec::new(), TypeSignature::GenericParamType(0)),
            ),
            action_invoke: module.member_ref(
                action.clone(),
                "Invoke",
                method(vec![TypeSignature::GenericParamType(0)], TypeSignature::Void),
            ),
            method_invoke: module.member_ref(
                TypeSignature::Class(method_base),
                "Invoke",
                method(
                    vec![TypeSignature::Object, TypeSignature::object_array()],
                    TypeSignature::Object,
                ),
            ),
            invalid_operation_ctor: module.member_ref(
                TypeSignature::Class(invalid_operation),
                ".ctor",
                method(vec![TypeSignature::String], TypeSignature::Void),
            ),
            func,
            action,
        }
    }
}

/// Emits `throw new InvalidOperationException(message)` unless the delegate in `field`
/// is set
fn require_delegate(asm: &mut InstructionAssembler<'_>, field: Token, message: &str, ctor: Token) {
    let present = asm.label();
    asm.ldarg(0).ldfld(field).brtrue(present);
    asm.ldstr(message).newobj(ctor).throw();
    asm.mark(present).nop();
}

/// Builds the aspect library module.
///
/// # Errors
///
/// Returns an error if a definition is rejected by the metadata builders.
#[allow(clippy::too_many_lines)]
pub fn aspect_library() -> Result<Module> {
    let mut module = Module::new(ASPECTS_ASSEMBLY);
    let m = &mut module;
    let core = CoreReferences::import(m);
    let object_ctor = core.object_ctor;
    let system_type = TypeSignature::Class(core.system_type);

    // Arguments
    let arguments = class(m, ARGS_NAMESPACE, "Arguments", core.object)?;
    let values = FieldBuilder::new("_values", TypeSignature::object_array()).build(m, arguments)?;
    MethodDefBuilder::constructor()
        .param("values", TypeSignature::object_array())
        .body(move |asm| {
            asm.ldarg(0).call(object_ctor);
            asm.ldarg(0).ldarg(1).stfld(values).ret();
            Ok(())
        })
        .build(m, arguments)?;
    PropertyBuilder::new("Count", TypeSignature::I4)
        .get(move |asm| {
            asm.ldarg(0).ldfld(values).op(OpCode::Ldlen).op(OpCode::ConvI4).ret();
            Ok(())
        })
        .build(m, arguments)?;
    MethodDefBuilder::new("GetArgument")
        .public()
        .returns(TypeSignature::Object)
        .param("index", TypeSignature::I4)
        .body(move |asm| {
            asm.ldarg(0).ldfld(values).ldarg(1).op(OpCode::LdelemRef).ret();
            Ok(())
        })
        .build(m, arguments)?;
    MethodDefBuilder::new("SetArgument")
        .public()
        .param("index", TypeSignature::I4)
        .param("value", TypeSignature::Object)
        .body(move |asm| {
            asm.ldarg(0).ldfld(values).ldarg(1).ldarg(2).stelem_ref().ret();
            Ok(())
        })
        .build(m, arguments)?;
    let to_array = MethodDefBuilder::new("ToArray")
        .public()
        .returns(TypeSignature::object_array())
        .local(TypeSignature::object_array())
        .local(TypeSignature::I4)
        .body(move |asm| {
            let check = asm.label();
            let copy = asm.label();
            asm.ldarg(0)
                .ldfld(values)
                .op(OpCode::Ldlen)
                .op(OpCode::ConvI4)
                .newarr(TypeSignature::Object)
                .stloc(0);
            asm.ldc_i4(0).stloc(1).br(check);
            asm.mark(copy)
                .ldloc(0)
                .ldloc(1)
                .ldarg(0)
                .ldfld(values)
                .ldloc(1)
                .op(OpCode::LdelemRef)
                .stelem_ref();
            asm.ldloc(1).ldc_i4(1).op(OpCode::Add).stloc(1);
            let copy = asm.id(copy);
            asm.mark(check)
                .ldloc(1)
                .ldarg(0)
                .ldfld(values)
                .op(OpCode::Ldlen)
                .op(OpCode::ConvI4)
                .emit(OpCode::Blt, Operand::Target(copy));
            asm.ldloc(0).ret();
            Ok(())
        })
        .build(m, arguments)?;
    let arguments = TypeSignature::Class(arguments);

    // MethodInterceptionArgs
    let interception_args = class(m, ARGS_NAMESPACE, "MethodInterceptionArgs", core.object)?;
    let original = FieldBuilder::new("_original", TypeSignature::Class(core.method_info))
        .build(m, interception_args)?;
    let (get_instance, set_instance) =
        auto_property(m, interception_args, "Instance", TypeSignature::Object)?;
    let (_, set_method) =
        auto_property(m, interception_args, "Method", TypeSignature::Class(core.method_base))?;
    let (get_arguments, set_arguments) =
        auto_property(m, interception_args, "Arguments", arguments.clone())?;
    let (_, set_return_value) =
        auto_property(m, interception_args, "ReturnValue", TypeSignature::Object)?;
    MethodDefBuilder::constructor()
        .param("instance", TypeSignature::Object)
        .param("method", TypeSignature::Class(core.method_base))
        .param("arguments", arguments.clone())
        .param("original", TypeSignature::Class(core.method_info))
        .body(move |asm| {
            asm.ldarg(0).call(object_ctor);
            asm.ldarg(0).ldarg(1).call(set_instance);
            asm.ldarg(0).ldarg(2).call(set_method);
            asm.ldarg(0).ldarg(3).call(set_arguments);
            asm.ldarg(0).ldarg(4).stfld(original).ret();
            Ok(())
        })
        .build(m, interception_args)?;
    let method_invoke = core.method_invoke;
    let proceed = MethodDefBuilder::new("Proceed")
        .public()
        .body(move |asm| {
            asm.ldarg(0);
            asm.ldarg(0).ldfld(original);
            asm.ldarg(0).call(get_instance);
            asm.ldarg(0).call(get_arguments).call(to_array);
            asm.callvirt(method_invoke).call(set_return_value).ret();
            Ok(())
        })
        .build(m, interception_args)?;
    MethodDefBuilder::new("Invoke")
        .public()
        .returns(TypeSignature::Object)
        .param("arguments", arguments.clone())
        .body(move |asm| {
            asm.ldarg(0).ldfld(original);
            asm.ldarg(0).call(get_instance);
            asm.ldarg(1).call(to_array);
            asm.callvirt(method_invoke).ret();
            Ok(())
        })
        .build(m, interception_args)?;

    // FlowBehavior and MethodExecutionArgs
    let enum_type = m.type_ref(SYSTEM_RUNTIME, "System", "Enum");
    let flow_behavior = class(m, ARGS_NAMESPACE, "FlowBehavior", enum_type)?;
    enum_values(
        m,
        flow_behavior,
        &[
            ("Default", 0),
            ("Continue", 1),
            ("RethrowException", 2),
            ("Return", 3),
            ("ThrowException", 4),
        ],
    )?;
    let execution_args = class(m, ARGS_NAMESPACE, "MethodExecutionArgs", core.object)?;
    constructor(m, execution_args, Some(object_ctor))?;
    for (name, property_type) in [
        ("Instance", TypeSignature::Object),
        ("Method", TypeSignature::Class(core.method_base)),
        ("Arguments", arguments.clone()),
        ("ReturnValue", TypeSignature::Object),
        ("Exception", TypeSignature::Class(core.exception)),
        ("FlowBehavior", TypeSignature::ValueType(flow_behavior)),
        ("Tag", TypeSignature::Object),
        ("YieldValue", TypeSignature::Object),
    ] {
        auto_property(m, execution_args, name, property_type)?;
    }

    // LocationInfo and LocationInterceptionArgs
    let location_info = class(m, ARGS_NAMESPACE, "LocationInfo", core.object)?;
    constructor(m, location_info, Some(object_ctor))?;
    for (name, property_type) in [
        ("Name", TypeSignature::String),
        ("LocationType", system_type.clone()),
        ("DeclaringType", system_type.clone()),
        ("PropertyInfo", TypeSignature::Class(core.property_info)),
        ("FieldInfo", TypeSignature::Class(core.field_info)),
    ] {
        auto_property(m, location_info, name, property_type)?;
    }

    let location_args = class(m, ARGS_NAMESPACE, "LocationInterceptionArgs", core.object)?;
    let getter = FieldBuilder::new("_getter", core.func.clone())
        .public()
        .build(m, location_args)?;
    let setter = FieldBuilder::new("_setter", core.action.clone())
        .public()
        .build(m, location_args)?;
    constructor(m, location_args, Some(object_ctor))?;
    auto_property(m, location_args, "Instance", TypeSignature::Object)?;
    auto_property(m, location_args, "Location", TypeSignature::Class(location_info))?;
    let (get_value, set_value) = auto_property(m, location_args, "Value", TypeSignature::Object)?;
    auto_property(m, location_args, "Index", arguments.clone())?;
    auto_property(m, location_args, "LocationName", TypeSignature::String)?;
    auto_property(m, location_args, "LocationType", system_type)?;

    let (invalid_operation, func_invoke, action_invoke) =
        (core.invalid_operation_ctor, core.func_invoke, core.action_invoke);
    let get_current = MethodDefBuilder::new("GetCurrentValue")
        .public()
        .returns(TypeSignature::Object)
        .body(move |asm| {
            require_delegate(asm, getter, "The location has no getter.", invalid_operation);
            asm.ldarg(0).ldfld(getter).callvirt(func_invoke).ret();
            Ok(())
        })
        .build(m, location_args)?;
    let set_new = MethodDefBuilder::new("SetNewValue")
        .public()
        .param("value", TypeSignature::Object)
        .body(move |asm| {
            require_delegate(asm, setter, "The location has no setter.", invalid_operation);
            asm.ldarg(0).ldfld(setter).ldarg(1).callvirt(action_invoke).ret();
            Ok(())
        })
        .build(m, location_args)?;
    let proceed_get = MethodDefBuilder::new("ProceedGetValue")
        .public()
        .body(move |asm| {
            asm.ldarg(0).ldarg(0).call(get_current).call(set_value).ret();
            Ok(())
        })
        .build(m, location_args)?;
    let proceed_set = MethodDefBuilder::new("ProceedSetValue")
        .public()
        .body(move |asm| {
            asm.ldarg(0).ldarg(0).call(get_value).call(set_new).ret();
            Ok(())
        })
        .build(m, location_args)?;

    // Aspect base classes
    let attribute_ctor = core.attribute_ctor;
    let attribute = m.type_ref(SYSTEM_RUNTIME, "System", "Attribute");
    let aspect = abstract_class(m, INTERCEPTION_NAMESPACE, "Aspect", attribute)?;
    let aspect_ctor = constructor(m, aspect, Some(attribute_ctor))?;
    auto_property(m, aspect, "AspectPriority", TypeSignature::I4)?;

    let hook = |name: &str, args: Token| {
        MethodDefBuilder::new(name)
            .public()
            .virtual_method()
            .param("args", TypeSignature::Class(args))
    };

    let method_interception =
        abstract_class(m, INTERCEPTION_NAMESPACE, "MethodInterceptionAspect", aspect)?;
    constructor(m, method_interception, Some(aspect_ctor))?;
    hook("OnInvoke", interception_args)
        .body(move |asm| {
            asm.ldarg(1).callvirt(proceed).ret();
            Ok(())
        })
        .build(m, method_interception)?;

    let method_boundary =
        abstract_class(m, INTERCEPTION_NAMESPACE, "OnMethodBoundaryAspect", aspect)?;
    constructor(m, method_boundary, Some(aspect_ctor))?;
    for name in ["OnEntry", "OnSuccess", "OnException", "OnExit"] {
        hook(name, execution_args)
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(m, method_boundary)?;
    }

    let location_interception =
        abstract_class(m, INTERCEPTION_NAMESPACE, "LocationInterceptionAspect", aspect)?;
    constructor(m, location_interception, Some(aspect_ctor))?;
    hook("OnGetValue", location_args)
        .body(move |asm| {
            asm.ldarg(1).callvirt(proceed_get).ret();
            Ok(())
        })
        .build(m, location_interception)?;
    hook("OnSetValue", location_args)
        .body(move |asm| {
            asm.ldarg(1).callvirt(proceed_set).ret();
            Ok(())
        })
        .build(m, location_interception)?;

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_library_shape() {
        let module = system_runtime().unwrap();
        for name in [
            "System.Object",
            "System.String",
            "System.Func`1",
            "System.Action`1",
            "System.DivideByZeroException",
            "System.Reflection.MethodInfo",
            "System.Reflection.AmbiguousMatchException",
        ] {
            assert!(module.find_type(name).is_some(), "{name} missing");
        }
        let exception = module.find_type("System.Exception").unwrap();
        assert!(module
            .fields_of(exception)
            .any(|field| field.name == EXCEPTION_MESSAGE_FIELD));
    }

    #[test]
    fn test_aspect_library_references_core() {
        let module = aspect_library().unwrap();
        assert_eq!(module.assembly_refs(), [SYSTEM_RUNTIME.to_string()]);

        let args = module.find_type("DotNetAspects.Args.MethodInterceptionArgs").unwrap();
        let ctor = module
            .methods_of(args)
            .find(|m| m.name == ".ctor")
            .unwrap();
        assert_eq!(
            module.signature_name(&ctor.signature.params[3]),
            "System.Reflection.MethodInfo"
        );

        let boundary = module
            .find_type("DotNetAspects.Interception.OnMethodBoundaryAspect")
            .unwrap();
        let hooks: Vec<&str> = module
            .methods_of(boundary)
            .filter(|m| m.is_virtual())
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(hooks, ["OnEntry", "OnSuccess", "OnException", "OnExit"]);
    }
}

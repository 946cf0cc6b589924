//! Instruction sequences shared by the three weavers.
//!
//! Code generation runs in two steps. First every member the new body refers to is
//! imported into the woven module. Then the body is assembled into a detached
//! [`MethodBody`], which only needs the resulting tokens. The body is installed after it
//! validated and its stack depth is known, so a failing member never leaves a half-written
//! body behind.

use crate::{
    assembly::InstructionAssembler,
    metadata::{
        customattributes::CustomAttributeArgument,
        method::MethodBody,
        module::Module,
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
    },
    weaver::{plan::AspectPlan, resolver::MemberLocation},
    Error, Result,
};

/// Type of the value a literal load leaves on the stack, `None` for kinds without a
/// literal form
#[must_use]
pub fn literal_type(value: &CustomAttributeArgument) -> Option<TypeSignature> {
    Some(match value {
        CustomAttributeArgument::Null => TypeSignature::Object,
        CustomAttributeArgument::Bool(_) => TypeSignature::Boolean,
        CustomAttributeArgument::I1(_) => TypeSignature::I1,
        CustomAttributeArgument::U1(_) => TypeSignature::U1,
        CustomAttributeArgument::I2(_) => TypeSignature::I2,
        CustomAttributeArgument::U2(_) => TypeSignature::U2,
        CustomAttributeArgument::I4(_) => TypeSignature::I4,
        CustomAttributeArgument::U4(_) => TypeSignature::U4,
        CustomAttributeArgument::I8(_) => TypeSignature::I8,
        CustomAttributeArgument::U8(_) => TypeSignature::U8,
        CustomAttributeArgument::R4(_) => TypeSignature::R4,
        CustomAttributeArgument::R8(_) => TypeSignature::R8,
        CustomAttributeArgument::String(_) => TypeSignature::String,
        CustomAttributeArgument::Char(_)
        | CustomAttributeArgument::Type(_)
        | CustomAttributeArgument::Array(_)
        | CustomAttributeArgument::Enum(_, _) => return None,
    })
}

/// Pushes an attribute value as a literal.
///
/// Unsigned 32 and 64-bit values are loaded with their bit pattern reinterpreted, which
/// is how the runtime stores them.
///
/// # Errors
///
/// Returns [`Error::UnsupportedAttributeValue`] for char, type, enum and array values.
#[allow(clippy::cast_possible_wrap)]
pub fn emit_literal(
    asm: &mut InstructionAssembler,
    property: &str,
    value: &CustomAttributeArgument,
) -> Result<()> {
    match value {
        CustomAttributeArgument::Null => asm.ldnull(),
        CustomAttributeArgument::String(s) => asm.ldstr(s),
        CustomAttributeArgument::Bool(b) => asm.ldc_i4(i32::from(*b)),
        CustomAttributeArgument::I1(v) => asm.ldc_i4(i32::from(*v)),
        CustomAttributeArgument::U1(v) => asm.ldc_i4(i32::from(*v)),
        CustomAttributeArgument::I2(v) => asm.ldc_i4(i32::from(*v)),
        CustomAttributeArgument::U2(v) => asm.ldc_i4(i32::from(*v)),
        CustomAttributeArgument::I4(v) => asm.ldc_i4(*v),
        CustomAttributeArgument::U4(v) => asm.ldc_i4(*v as i32),
        CustomAttributeArgument::I8(v) => asm.ldc_i8(*v),
        CustomAttributeArgument::U8(v) => asm.ldc_i8(*v as i64),
        CustomAttributeArgument::R4(v) => asm.ldc_r4(*v),
        CustomAttributeArgument::R8(v) => asm.ldc_r8(*v),
        other => {
            return Err(Error::UnsupportedAttributeValue {
                property: property.to_string(),
                kind: other.kind_name(),
            })
        }
    };
    Ok(())
}

/// A property assignment with its setter imported
#[derive(Debug, Clone)]
pub struct ImportedAssignment {
    /// Property name
    pub name: String,
    /// Literal value
    pub value: CustomAttributeArgument,
    /// Setter token in the woven module, `None` if the aspect lacks the property
    pub setter: Option<Token>,
    /// Box the literal as this type before the call
    pub box_as: Option<TypeSignature>,
}

/// Aspect instantiation with every token imported into the woven module.
#[derive(Debug, Clone)]
pub struct ImportedAspect {
    /// Type of the aspect local
    pub aspect_type: TypeSignature,
    /// Parameterless constructor
    pub ctor: Option<Token>,
    /// Property values to assign after construction
    pub assignments: Vec<ImportedAssignment>,
}

impl ImportedAspect {
    /// Imports the constructor, type and setters of `plan`
    ///
    /// # Errors
    ///
    /// Returns any import error.
    pub fn import(module: &mut Module, plan: &AspectPlan<'_>) -> Result<Self> {
        let token = module.import_type_from(plan.aspect_type.scope, plan.aspect_type.token)?;
        let ctor = match plan.ctor {
            Some(ctor) => Some(ctor.import_method(module)?),
            None => None,
        };
        let assignments = plan
            .assignments
            .iter()
            .map(|assignment| {
                let setter = match assignment.setter {
                    Some(setter) => Some(setter.import_method(module)?),
                    None => None,
                };
                Ok(ImportedAssignment {
                    name: assignment.name.clone(),
                    value: assignment.value.clone(),
                    setter,
                    box_as: assignment.box_as.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ImportedAspect {
            aspect_type: TypeSignature::Class(token),
            ctor,
            assignments,
        })
    }

    /// Creates the aspect, assigns its configured properties and stores it in `local`.
    ///
    /// A value for a property the aspect does not have is loaded and discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeError`] without a constructor and
    /// [`Error::UnsupportedAttributeValue`] for values without a literal form.
    pub fn emit_instance(&self, asm: &mut InstructionAssembler, local: u16) -> Result<()> {
        let Some(ctor) = self.ctor else {
            return Err(Error::TypeError(
                "aspect has no parameterless constructor".to_string(),
            ));
        };
        asm.newobj(ctor);
        for assignment in &self.assignments {
            asm.dup();
            emit_literal(asm, &assignment.name, &assignment.value)?;
            match assignment.setter {
                Some(setter) => {
                    if let Some(boxed) = &assignment.box_as {
                        asm.box_value(boxed.clone());
                    }
                    asm.callvirt(setter);
                }
                None => {
                    asm.pop().pop();
                }
            }
        }
        asm.stloc(local);
        Ok(())
    }
}

/// Imports the type declaring a referenced method or field
///
/// # Errors
///
/// Returns [`Error::MemberNotFound`] if the location names no method, and any import
/// error.
pub fn import_declaring_type(module: &mut Module, location: MemberLocation<'_>) -> Result<TypeSignature> {
    let owner = location.method(module)?.declaring_type;
    let token = module.import_type_from(location.scope, owner)?;
    Ok(TypeSignature::Class(token))
}

/// Pushes `this`, or `null` for static methods
pub fn emit_instance_or_null(asm: &mut InstructionAssembler, is_static: bool) {
    if is_static {
        asm.ldnull();
    } else {
        asm.ldarg(0);
    }
}

/// Pushes every IL argument, `this` included, in order
pub fn emit_forward_arguments(asm: &mut InstructionAssembler, signature: &SignatureMethod) {
    let count = u16::try_from(signature.arg_count()).unwrap_or(u16::MAX);
    for index in 0..count {
        asm.ldarg(index);
    }
}

/// Packs the declared parameters into a new `Arguments` container, boxing value-typed
/// and generic arguments
///
/// # Errors
///
/// Returns [`Error::NotSupported`] for methods with more parameters than an array index
/// literal can address.
pub fn emit_arguments(
    asm: &mut InstructionAssembler,
    signature: &SignatureMethod,
    arguments_ctor: Token,
) -> Result<()> {
    let count = i32::try_from(signature.params.len())
        .map_err(|_| Error::NotSupported("too many parameters".to_string()))?;
    let first = u16::from(signature.has_this);

    asm.ldc_i4(count).newarr(TypeSignature::Object);
    for (index, param) in (0u16..).zip(&signature.params) {
        asm.dup().ldc_i4(i32::from(index)).ldarg(index + first);
        if param.requires_boxing() {
            asm.box_value(param.clone());
        }
        asm.stelem_ref();
    }
    asm.newobj(arguments_ctor);
    Ok(())
}

/// Pushes the `MethodBase` of `method` through `GetMethodFromHandle`
pub fn emit_method_handle(
    asm: &mut InstructionAssembler,
    method: Token,
    declaring_type: TypeSignature,
    get_method_from_handle: Token,
) {
    asm.ldtoken_method(method)
        .ldtoken_type(declaring_type)
        .call(get_method_from_handle);
}

/// Pushes the `System.Type` of `ty` through `GetTypeFromHandle`
pub fn emit_type_of(asm: &mut InstructionAssembler, ty: TypeSignature, get_type_from_handle: Token) {
    asm.ldtoken_type(ty).call(get_type_from_handle);
}

/// Converts the `object` on the stack to `ty`
pub fn emit_from_object(asm: &mut InstructionAssembler, ty: &TypeSignature) {
    if ty.requires_boxing() {
        asm.unbox_any(ty.clone());
    } else if *ty != TypeSignature::Object {
        asm.castclass(ty.clone());
    }
}

/// Minimal body returning `default(T)`: a zero-initialized local of the return type
///
/// # Errors
///
/// Returns an error if the local cannot be added.
pub fn emit_default_return(asm: &mut InstructionAssembler, return_type: &TypeSignature) -> Result<()> {
    if return_type.is_void() {
        asm.ret();
    } else {
        let local = asm.local(return_type.clone())?;
        asm.ldloc(local).ret();
    }
    Ok(())
}

/// Signature of a type defined in `module`, as a class or value type
#[must_use]
pub fn type_signature(module: &Module, token: Token) -> TypeSignature {
    let is_value_type = module
        .type_def(token)
        .ok()
        .and_then(|def| def.extends.as_ref())
        .is_some_and(|base| {
            let name = module.signature_name(base);
            name == "System.ValueType" || name == "System.Enum"
        });
    if is_value_type {
        TypeSignature::ValueType(token)
    } else {
        TypeSignature::Class(token)
    }
}

/// Starts a fresh body for a rewritten method
#[must_use]
pub fn fresh_body() -> MethodBody {
    let mut body = MethodBody::new();
    body.init_locals = true;
    body
}

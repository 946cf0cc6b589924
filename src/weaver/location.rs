//! Property accessor interception.
//!
//! Each accessor with a body is cloned (`get_X$OriginalGet`, `set_X$OriginalSet`) and
//! rebuilt to describe the property in a `LocationInterceptionArgs` and pass it to the
//! aspect. The context captures a delegate to the clone, so the hook can reach the stored
//! value through `ProceedGetValue` and `ProceedSetValue`.
//!
//! The delegates are `Func<object>` and `Action<object>`. For value-typed and generic
//! properties a small adapter (`...Boxed`) sits between the delegate and the clone and
//! converts between the property type and `object`.

use crate::{
    assembly::InstructionAssembler,
    metadata::{
        method::{MethodAccessFlags, MethodDef, MethodModifiers, Param, ParamAttributes},
        module::Module,
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
        typesystem::{Scope, TypeLocation},
    },
    weaver::{
        context::WeaveContext,
        emit::{self, ImportedAspect},
        plan::{AspectPlan, Hooks},
        resolver::{LocationReferences, MemberLocation},
    },
    Error, Result,
};

/// Accessors rebuilt for one property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WovenAccessors {
    /// Clone of the getter, if it was woven
    pub getter: Option<Token>,
    /// Clone of the setter, if it was woven
    pub setter: Option<Token>,
}

/// Which accessor is being rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accessor {
    Get,
    Set,
}

/// Tokens shared by the getter and setter bodies
struct Imported {
    aspect: ImportedAspect,
    hook: Token,
    args_type: Token,
    args_ctor: Token,
    set_instance: Token,
    set_location_name: Token,
    set_location_type: Token,
    set_location: Token,
    set_value: Token,
    get_value: Token,
    delegate_field: Token,
    delegate_ctor: Token,
    info_ctor: Token,
    info_set_name: Token,
    info_set_location_type: Token,
    info_set_declaring_type: Token,
    info_set_property_info: Token,
    get_type_from_handle: Token,
    get_property: Token,
}

/// Rebuilds the accessors of `property` that have a body.
///
/// # Errors
///
/// Returns [`Error::Setup`] if the location types are unavailable, and any clone,
/// import or validation error.
pub fn weave_property<'r>(
    ctx: &mut WeaveContext<'_, 'r>,
    property: Token,
    plan: &AspectPlan<'r>,
) -> Result<WovenAccessors> {
    let Hooks::Location {
        on_get_value,
        on_set_value,
    } = plan.hooks
    else {
        return Err(Error::TypeError("aspect is not a location aspect".to_string()));
    };
    let Some(refs) = ctx.references.location else {
        return Err(Error::Setup("LocationInterceptionArgs not found".to_string()));
    };

    let (getter, setter) = {
        let def = ctx.module.property(property)?;
        (def.getter, def.setter)
    };
    let has_body = |module: &Module, accessor: Option<Token>| {
        accessor.filter(|token| module.method(*token).is_ok_and(MethodDef::has_body))
    };

    let mut woven = WovenAccessors::default();
    if let Some(getter) = has_body(&*ctx.module, getter) {
        woven.getter =
            Some(weave_accessor(ctx, property, getter, plan, refs, on_get_value, Accessor::Get)?);
    }
    if let Some(setter) = has_body(&*ctx.module, setter) {
        woven.setter =
            Some(weave_accessor(ctx, property, setter, plan, refs, on_set_value, Accessor::Set)?);
    }
    Ok(woven)
}

fn weave_accessor<'r>(
    ctx: &mut WeaveContext<'_, 'r>,
    property: Token,
    accessor: Token,
    plan: &AspectPlan<'r>,
    refs: LocationReferences<'r>,
    hook: MemberLocation<'r>,
    kind: Accessor,
) -> Result<Token> {
    let config = ctx.config;
    let shared = *ctx.references;

    let (name, property_type, declaring_type) = {
        let def = ctx.module.property(property)?;
        (def.name.clone(), def.property_type.clone(), def.declaring_type)
    };
    let (is_static, signature) = {
        let def = ctx.module.method(accessor)?;
        (def.is_static(), def.signature.clone())
    };

    let suffix = match kind {
        Accessor::Get => &config.suffixes.original_get,
        Accessor::Set => &config.suffixes.original_set,
    };
    let clone = ctx.clone_method(accessor, suffix)?;
    let delegate_target = if property_type.requires_boxing() {
        let adapter = boxing_adapter(&*ctx.module, clone, &property_type, kind)?;
        ctx.add_method(adapter)?
    } else {
        clone
    };

    let (delegate_type, delegate_ctor, delegate_field) = match kind {
        Accessor::Get => (refs.func_type, refs.func_ctor, refs.getter_field),
        Accessor::Set => (refs.action_type, refs.action_ctor, refs.setter_field),
    };

    let module = &mut *ctx.module;
    let imported = Imported {
        aspect: ImportedAspect::import(module, plan)?,
        hook: hook.import_method(module)?,
        args_type: module.import_type_from(refs.args_type.scope, refs.args_type.token)?,
        args_ctor: refs.args_ctor.import_method(module)?,
        set_instance: refs.set_instance.import_method(module)?,
        set_location_name: refs.set_location_name.import_method(module)?,
        set_location_type: refs.set_location_type.import_method(module)?,
        set_location: refs.set_location.import_method(module)?,
        set_value: refs.set_value.import_method(module)?,
        get_value: refs.get_value.import_method(module)?,
        delegate_field: delegate_field.import_field(module)?,
        delegate_ctor: import_delegate_ctor(module, delegate_type, delegate_ctor)?,
        info_ctor: refs.info_ctor.import_method(module)?,
        info_set_name: refs.info_set_name.import_method(module)?,
        info_set_location_type: refs.info_set_location_type.import_method(module)?,
        info_set_declaring_type: refs.info_set_declaring_type.import_method(module)?,
        info_set_property_info: refs.info_set_property_info.import_method(module)?,
        get_type_from_handle: shared.get_type_from_handle.import_method(module)?,
        get_property: shared.get_property.import_method(module)?,
    };
    let declaring = emit::type_signature(module, declaring_type);

    let mut body = emit::fresh_body();
    let mut asm = InstructionAssembler::new(&mut body);
    let aspect_local = asm.local(imported.aspect.aspect_type.clone())?;
    let context_local = asm.local(TypeSignature::Class(imported.args_type))?;
    imported.aspect.emit_instance(&mut asm, aspect_local)?;

    let type_of = |asm: &mut InstructionAssembler<'_>, ty: &TypeSignature| {
        emit::emit_type_of(asm, ty.clone(), imported.get_type_from_handle);
    };

    asm.newobj(imported.args_ctor).dup();
    emit::emit_instance_or_null(&mut asm, is_static);
    asm.callvirt(imported.set_instance)
        .dup()
        .ldstr(&name)
        .callvirt(imported.set_location_name)
        .dup();
    type_of(&mut asm, &property_type);
    asm.callvirt(imported.set_location_type);

    if kind == Accessor::Set {
        let value = u16::from(!is_static);
        asm.dup().ldarg(value);
        if property_type.requires_boxing() {
            asm.box_value(property_type.clone());
        }
        asm.callvirt(imported.set_value);
    }

    asm.dup()
        .newobj(imported.info_ctor)
        .dup()
        .ldstr(&name)
        .callvirt(imported.info_set_name)
        .dup();
    type_of(&mut asm, &property_type);
    asm.callvirt(imported.info_set_location_type).dup();
    type_of(&mut asm, &declaring);
    asm.callvirt(imported.info_set_declaring_type).dup();
    type_of(&mut asm, &declaring);
    asm.ldstr(&name)
        .callvirt(imported.get_property)
        .callvirt(imported.info_set_property_info)
        .callvirt(imported.set_location);

    asm.dup();
    emit::emit_instance_or_null(&mut asm, is_static);
    asm.ldftn(delegate_target)
        .newobj(imported.delegate_ctor)
        .stfld(imported.delegate_field)
        .stloc(context_local);

    asm.ldloc(aspect_local)
        .ldloc(context_local)
        .callvirt(imported.hook);

    if kind == Accessor::Get {
        asm.ldloc(context_local).callvirt(imported.get_value);
        emit::emit_from_object(&mut asm, &signature.return_type);
    }
    asm.ret();
    asm.finish()?;

    ctx.replace_body(accessor, body)?;
    Ok(clone)
}

/// References the delegate constructor on the `object` instantiation of its type
fn import_delegate_ctor(
    module: &mut Module,
    delegate_type: TypeLocation<'_>,
    ctor: MemberLocation<'_>,
) -> Result<Token> {
    match ctor.scope {
        Scope::Target => Ok(ctor.token),
        Scope::Reference(source) => {
            let generic = module.import_type_from(delegate_type.scope, delegate_type.token)?;
            let parent = TypeSignature::GenericInst(
                Box::new(TypeSignature::Class(generic)),
                vec![TypeSignature::Object],
            );
            module.import_method_with_parent(source, ctor.token, parent)
        }
    }
}

/// A private method converting between `object` and the property type around `clone`
///
/// The getter adapter returns the boxed result of the clone. The setter adapter takes
/// an `object`, unboxes it and passes it on.
fn boxing_adapter(
    module: &Module,
    clone: Token,
    property_type: &TypeSignature,
    kind: Accessor,
) -> Result<MethodDef> {
    let source = module.method(clone)?;
    let is_static = source.is_static();
    let first = u16::from(!is_static);

    let mut body = emit::fresh_body();
    let mut asm = InstructionAssembler::new(&mut body);
    if !is_static {
        asm.ldarg(0);
    }
    let (return_type, params) = match kind {
        Accessor::Get => {
            asm.call(clone).box_value(property_type.clone());
            (TypeSignature::Object, Vec::new())
        }
        Accessor::Set => {
            asm.ldarg(first).unbox_any(property_type.clone()).call(clone);
            (TypeSignature::Void, vec![TypeSignature::Object])
        }
    };
    asm.ret();
    asm.finish()?;

    let mut modifiers = MethodModifiers::HIDE_BY_SIG;
    if is_static {
        modifiers |= MethodModifiers::STATIC;
    }
    let signature = SignatureMethod {
        has_this: !is_static,
        param_count_generic: 0,
        return_type,
        params,
    };
    let params = signature
        .params
        .iter()
        .zip(1u16..)
        .map(|(_, sequence)| Param {
            name: "value".to_string(),
            sequence,
            flags: ParamAttributes::empty(),
        })
        .collect();

    Ok(MethodDef {
        token: Token::new(0),
        name: format!("{}{}", source.name, crate::config::CloneSuffixes::BOXED),
        declaring_type: source.declaring_type,
        access: MethodAccessFlags::PRIVATE,
        modifiers,
        signature,
        params,
        generic_params: Vec::new(),
        body: Some(body),
        custom_attributes: Vec::new(),
    })
}

//! Fluent builders for types, methods, fields and properties.
//!
//! The builders are the way hosts and tests construct modules: a type is declared, then
//! its members are added one at a time. Method bodies are written through an
//! [`InstructionAssembler`] closure. `max_stack` is computed from the finished body, so
//! callers never state it.
//!
//! # Examples
//!
//! ```rust
//! use dotweave::metadata::{
//!     builders::{MethodDefBuilder, TypeDefBuilder},
//!     module::Module,
//!     signatures::TypeSignature,
//! };
//! use dotweave::assembly::OpCode;
//!
//! let mut module = Module::new("App");
//! let calc = TypeDefBuilder::new("Demo", "Calculator").public_class().build(&mut module)?;
//!
//! let add = MethodDefBuilder::new("Add")
//!     .public()
//!     .returns(TypeSignature::I4)
//!     .param("a", TypeSignature::I4)
//!     .param("b", TypeSignature::I4)
//!     .body(|asm| {
//!         asm.ldarg(1).ldarg(2).op(OpCode::Add).ret();
//!         Ok(())
//!     })
//!     .build(&mut module, calc)?;
//!
//! assert_eq!(module.method(add)?.body.as_ref().map(|b| b.max_stack), Some(2));
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    assembly::InstructionAssembler,
    metadata::{
        customattributes::CustomAttribute,
        method::{
            GenericParam, MethodAccessFlags, MethodBody, MethodDef, MethodModifiers, Param,
            ParamAttributes,
        },
        module::Module,
        signatures::{SignatureField, SignatureMethod, TypeSignature},
        token::Token,
        typesystem::{FieldAttributes, FieldDef, PropertyDef, TypeAttributes},
    },
    Result,
};

/// Closure writing the instructions of a method body
type BodyFn = Box<dyn FnOnce(&mut InstructionAssembler) -> Result<()>>;

fn body_fn<F>(body: F) -> BodyFn
where
    F: FnOnce(&mut InstructionAssembler) -> Result<()> + 'static,
{
    Box::new(body)
}

fn generic_params(names: Vec<String>) -> Vec<GenericParam> {
    names
        .into_iter()
        .zip(0u16..)
        .map(|(name, number)| GenericParam { number, name })
        .collect()
}

/// Builder for type definitions.
pub struct TypeDefBuilder {
    namespace: String,
    name: String,
    flags: u32,
    extends: Option<TypeSignature>,
    enclosing: Option<Token>,
    interfaces: Vec<TypeSignature>,
    generic_params: Vec<String>,
    attributes: Vec<CustomAttribute>,
}

impl TypeDefBuilder {
    /// Starts a type named `namespace.name`, a non-public class by default
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeDefBuilder {
            namespace: namespace.into(),
            name: name.into(),
            flags: TypeAttributes::NOT_PUBLIC | TypeAttributes::CLASS,
            extends: None,
            enclosing: None,
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Sets the raw `TypeAttributes` flags
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Public class
    #[must_use]
    pub fn public_class(mut self) -> Self {
        self.flags = TypeAttributes::PUBLIC | TypeAttributes::CLASS | TypeAttributes::BEFORE_FIELD_INIT;
        self
    }

    /// Public abstract class
    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.flags = TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT;
        self
    }

    /// Public interface
    #[must_use]
    pub fn public_interface(mut self) -> Self {
        self.flags = TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT;
        self
    }

    /// Sets the base type
    #[must_use]
    pub fn extends(mut self, base: TypeSignature) -> Self {
        self.extends = Some(base);
        self
    }

    /// Nests the type in `enclosing` with public nested visibility
    #[must_use]
    pub fn nested_in(mut self, enclosing: Token) -> Self {
        self.enclosing = Some(enclosing);
        self.flags = (self.flags & !TypeAttributes::VISIBILITY_MASK) | TypeAttributes::NESTED_PUBLIC;
        self
    }

    /// Adds an implemented interface
    #[must_use]
    pub fn implements(mut self, interface: TypeSignature) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Adds a generic parameter
    #[must_use]
    pub fn generic_param(mut self, name: impl Into<String>) -> Self {
        self.generic_params.push(name.into());
        self
    }

    /// Attaches a custom attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds the type to `module`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TypeNotFound`] if the enclosing type is not defined in
    /// `module`.
    pub fn build(self, module: &mut Module) -> Result<Token> {
        let token = module.add_type(
            &self.namespace,
            &self.name,
            self.flags,
            self.extends,
            self.enclosing,
        )?;
        let def = module.type_def_mut(token)?;
        def.interfaces = self.interfaces;
        def.generic_params = generic_params(self.generic_params);
        def.custom_attributes = self.attributes;
        Ok(token)
    }
}

/// Builder for method definitions.
pub struct MethodDefBuilder {
    name: String,
    access: MethodAccessFlags,
    modifiers: MethodModifiers,
    return_type: TypeSignature,
    params: Vec<(String, TypeSignature)>,
    generic_params: Vec<String>,
    locals: Vec<TypeSignature>,
    init_locals: bool,
    body: Option<BodyFn>,
    attributes: Vec<CustomAttribute>,
}

impl MethodDefBuilder {
    /// Starts a private instance method returning `void`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        MethodDefBuilder {
            name: name.into(),
            access: MethodAccessFlags::PRIVATE,
            modifiers: MethodModifiers::HIDE_BY_SIG,
            return_type: TypeSignature::Void,
            params: Vec::new(),
            generic_params: Vec::new(),
            locals: Vec::new(),
            init_locals: true,
            body: None,
            attributes: Vec::new(),
        }
    }

    /// Starts a public instance constructor
    #[must_use]
    pub fn constructor() -> Self {
        Self::new(".ctor").public().modifiers(
            MethodModifiers::SPECIAL_NAME | MethodModifiers::RTSPECIAL_NAME,
        )
    }

    /// Public visibility
    #[must_use]
    pub fn public(mut self) -> Self {
        self.access = MethodAccessFlags::PUBLIC;
        self
    }

    /// Private visibility
    #[must_use]
    pub fn private(mut self) -> Self {
        self.access = MethodAccessFlags::PRIVATE;
        self
    }

    /// Adds modifier flags
    #[must_use]
    pub fn modifiers(mut self, modifiers: MethodModifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// Static method
    #[must_use]
    pub fn static_method(self) -> Self {
        self.modifiers(MethodModifiers::STATIC)
    }

    /// Virtual method in a new slot
    #[must_use]
    pub fn virtual_method(self) -> Self {
        self.modifiers(MethodModifiers::VIRTUAL | MethodModifiers::NEW_SLOT)
    }

    /// Virtual method overriding a base slot
    #[must_use]
    pub fn override_method(self) -> Self {
        self.modifiers(MethodModifiers::VIRTUAL)
    }

    /// Abstract virtual method, built without a body
    #[must_use]
    pub fn abstract_method(self) -> Self {
        self.modifiers(MethodModifiers::VIRTUAL | MethodModifiers::NEW_SLOT | MethodModifiers::ABSTRACT)
    }

    /// Sets the return type
    #[must_use]
    pub fn returns(mut self, return_type: TypeSignature) -> Self {
        self.return_type = return_type;
        self
    }

    /// Appends a named parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, signature: TypeSignature) -> Self {
        self.params.push((name.into(), signature));
        self
    }

    /// Adds a generic method parameter
    #[must_use]
    pub fn generic_param(mut self, name: impl Into<String>) -> Self {
        self.generic_params.push(name.into());
        self
    }

    /// Declares a local variable slot, slots are numbered in declaration order
    #[must_use]
    pub fn local(mut self, signature: TypeSignature) -> Self {
        self.locals.push(signature);
        self
    }

    /// Clears the `init_locals` flag of the body
    #[must_use]
    pub fn no_init_locals(mut self) -> Self {
        self.init_locals = false;
        self
    }

    /// Attaches a custom attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Sets the closure writing the method body
    #[must_use]
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: FnOnce(&mut InstructionAssembler) -> Result<()> + 'static,
    {
        self.body = Some(body_fn(body));
        self
    }

    /// Adds the method to `declaring_type` in `module`
    ///
    /// Methods without a body closure are bodiless, which is what abstract and runtime
    /// provided methods look like.
    ///
    /// # Errors
    ///
    /// Returns the error of the body closure, [`crate::Error::Malformed`] or
    /// [`crate::Error::StackImbalance`] if the body is not well-formed, and
    /// [`crate::Error::TypeNotFound`] if the declaring type is not defined in `module`.
    pub fn build(self, module: &mut Module, declaring_type: Token) -> Result<Token> {
        let is_static = self.modifiers.contains(MethodModifiers::STATIC);
        let signature = SignatureMethod {
            has_this: !is_static,
            param_count_generic: u32::try_from(self.generic_params.len()).unwrap_or(u32::MAX),
            return_type: self.return_type,
            params: self.params.iter().map(|(_, sig)| sig.clone()).collect(),
        };
        let arg_count = signature.arg_count();
        let returns_value = signature.has_return();

        let body = match self.body {
            Some(write) => {
                let mut body = MethodBody::new();
                body.init_locals = self.init_locals;
                for local in self.locals {
                    body.add_local(local)?;
                }
                let mut asm = InstructionAssembler::new(&mut body);
                write(&mut asm)?;
                asm.finish()?;
                body.validate(arg_count)?;
                Some(body)
            }
            None => None,
        };

        let params = self
            .params
            .into_iter()
            .zip(1u16..)
            .map(|((name, _), sequence)| Param {
                name,
                sequence,
                flags: ParamAttributes::empty(),
            })
            .collect();

        let token = module.add_method(MethodDef {
            token: Token::new(0),
            name: self.name,
            declaring_type,
            access: self.access,
            modifiers: self.modifiers,
            signature,
            params,
            generic_params: generic_params(self.generic_params),
            body,
            custom_attributes: self.attributes,
        })?;

        // Stack effects of calls may involve the method itself, so it is computed once
        // the method is part of the module
        let max_stack = match module.method(token)?.body.as_ref() {
            Some(body) => Some(body.compute_max_stack(module, returns_value)),
            None => None,
        };
        match max_stack {
            Some(Ok(depth)) => {
                if let Some(body) = module.method_mut(token)?.body.as_mut() {
                    body.max_stack = depth;
                }
            }
            Some(Err(error)) => {
                module.pop_method(token)?;
                return Err(error);
            }
            None => {}
        }
        Ok(token)
    }
}

/// Builder for field definitions.
pub struct FieldBuilder {
    name: String,
    signature: TypeSignature,
    flags: u32,
    attributes: Vec<CustomAttribute>,
}

impl FieldBuilder {
    /// Starts a private instance field
    #[must_use]
    pub fn new(name: impl Into<String>, signature: TypeSignature) -> Self {
        FieldBuilder {
            name: name.into(),
            signature,
            flags: FieldAttributes::PRIVATE,
            attributes: Vec::new(),
        }
    }

    /// Public visibility
    #[must_use]
    pub fn public(mut self) -> Self {
        self.flags = (self.flags & !FieldAttributes::FIELD_ACCESS_MASK) | FieldAttributes::PUBLIC;
        self
    }

    /// Static field
    #[must_use]
    pub fn static_field(mut self) -> Self {
        self.flags |= FieldAttributes::STATIC;
        self
    }

    /// Attaches a custom attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds the field to `declaring_type` in `module`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TypeNotFound`] if the declaring type is not defined in
    /// `module`.
    pub fn build(self, module: &mut Module, declaring_type: Token) -> Result<Token> {
        module.add_field(FieldDef {
            token: Token::new(0),
            name: self.name,
            declaring_type,
            flags: self.flags,
            signature: SignatureField {
                base: self.signature,
            },
            custom_attributes: self.attributes,
        })
    }
}

/// How a property accessor is implemented
enum Accessor {
    None,
    Auto,
    Body(BodyFn),
}

/// Builder for properties and their accessors.
///
/// Accessors are either written explicitly or generated as auto-property accessors over
/// a private backing field named `<Name>k__BackingField`.
pub struct PropertyBuilder {
    name: String,
    property_type: TypeSignature,
    is_static: bool,
    getter: Accessor,
    setter: Accessor,
    attributes: Vec<CustomAttribute>,
}

impl PropertyBuilder {
    /// Starts an instance property without accessors
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: TypeSignature) -> Self {
        PropertyBuilder {
            name: name.into(),
            property_type,
            is_static: false,
            getter: Accessor::None,
            setter: Accessor::None,
            attributes: Vec::new(),
        }
    }

    /// Static property
    #[must_use]
    pub fn static_property(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Generates both accessors over a backing field
    #[must_use]
    pub fn auto(mut self) -> Self {
        self.getter = Accessor::Auto;
        self.setter = Accessor::Auto;
        self
    }

    /// Generates only a getter over a backing field
    #[must_use]
    pub fn auto_get(mut self) -> Self {
        self.getter = Accessor::Auto;
        self
    }

    /// Writes the getter explicitly
    #[must_use]
    pub fn get<F>(mut self, body: F) -> Self
    where
        F: FnOnce(&mut InstructionAssembler) -> Result<()> + 'static,
    {
        self.getter = Accessor::Body(body_fn(body));
        self
    }

    /// Writes the setter explicitly
    #[must_use]
    pub fn set<F>(mut self, body: F) -> Self
    where
        F: FnOnce(&mut InstructionAssembler) -> Result<()> + 'static,
    {
        self.setter = Accessor::Body(body_fn(body));
        self
    }

    /// Attaches a custom attribute to the property
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds the property, its accessors and, for auto accessors, the backing field
    ///
    /// # Errors
    ///
    /// Returns any error of [`MethodDefBuilder::build`] or [`FieldBuilder::build`].
    pub fn build(self, module: &mut Module, declaring_type: Token) -> Result<Token> {
        let needs_field =
            matches!(self.getter, Accessor::Auto) || matches!(self.setter, Accessor::Auto);
        let backing = if needs_field {
            let mut field = FieldBuilder::new(
                format!("<{}>k__BackingField", self.name),
                self.property_type.clone(),
            );
            if self.is_static {
                field = field.static_field();
            }
            Some(field.build(module, declaring_type)?)
        } else {
            None
        };

        let is_static = self.is_static;
        let accessor = |name: String| {
            let builder = MethodDefBuilder::new(name)
                .public()
                .modifiers(MethodModifiers::SPECIAL_NAME);
            if is_static {
                builder.static_method()
            } else {
                builder
            }
        };

        let getter_body: Option<BodyFn> = match (self.getter, backing) {
            (Accessor::Body(body), _) => Some(body),
            (Accessor::Auto, Some(field)) => Some(body_fn(move |asm| {
                if is_static {
                    asm.ldsfld(field).ret();
                } else {
                    asm.ldarg(0).ldfld(field).ret();
                }
                Ok(())
            })),
            _ => None,
        };
        let getter = match getter_body {
            Some(body) => Some(
                accessor(format!("get_{}", self.name))
                    .returns(self.property_type.clone())
                    .body(body)
                    .build(module, declaring_type)?,
            ),
            None => None,
        };

        let setter_body: Option<BodyFn> = match (self.setter, backing) {
            (Accessor::Body(body), _) => Some(body),
            (Accessor::Auto, Some(field)) => Some(body_fn(move |asm| {
                if is_static {
                    asm.ldarg(0).stsfld(field).ret();
                } else {
                    asm.ldarg(0).ldarg(1).stfld(field).ret();
                }
                Ok(())
            })),
            _ => None,
        };
        let setter = match setter_body {
            Some(body) => Some(
                accessor(format!("set_{}", self.name))
                    .param("value", self.property_type.clone())
                    .body(body)
                    .build(module, declaring_type)?,
            ),
            None => None,
        };

        module.add_property(PropertyDef {
            token: Token::new(0),
            name: self.name,
            declaring_type,
            property_type: self.property_type,
            getter,
            setter,
            custom_attributes: self.attributes,
        })
    }
}

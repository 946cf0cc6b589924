//! Method definitions and their bodies.
//!
//! # Key Types
//!
//! - [`MethodDef`] - A method defined in the module
//! - [`MethodBody`] - Locals, instructions and exception regions
//! - [`ExceptionRegion`] - A protected block and its handler

mod body;
mod exceptions;
mod types;

pub use body::{MethodBody, StackEffects};
pub use exceptions::{
    ExceptionHandlerFlags, ExceptionRegion, HandlerKind, RegionEnd, RegionSpan,
};
pub use types::*;

use crate::metadata::{
    customattributes::CustomAttribute, signatures::SignatureMethod, token::Token,
};

/// A method defined in the module.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// `MethodDef` token
    pub token: Token,
    /// Method name
    pub name: String,
    /// `TypeDef` token of the declaring type
    pub declaring_type: Token,
    /// Visibility
    pub access: MethodAccessFlags,
    /// Modifiers
    pub modifiers: MethodModifiers,
    /// Calling convention, parameter and return types
    pub signature: SignatureMethod,
    /// Named parameters, in signature order
    pub params: Vec<Param>,
    /// Generic parameters of the method
    pub generic_params: Vec<GenericParam>,
    /// IL body, `None` for abstract, runtime or P/Invoke methods
    pub body: Option<MethodBody>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl MethodDef {
    /// True for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MethodModifiers::STATIC)
    }

    /// True for abstract methods
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.modifiers.contains(MethodModifiers::ABSTRACT)
    }

    /// True for virtual methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.modifiers.contains(MethodModifiers::VIRTUAL)
    }

    /// True for instance and type constructors
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }

    /// True if the method has an IL body with at least one instruction
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.as_ref().is_some_and(|body| !body.is_empty())
    }

    /// Number of IL arguments, including `this`
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.signature.arg_count()
    }

    /// True if the method returns a value
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.signature.has_return()
    }
}

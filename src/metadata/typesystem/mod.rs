//! Types, fields, properties and references of a module.
//!
//! Types defined in the module are [`TypeDef`] rows, types of other assemblies are
//! [`TypeRef`] rows naming the assembly they live in. Members of referenced types are
//! reached through [`MemberRef`] rows. Full names follow the runtime convention:
//! `Namespace.Name` for top-level types and `Namespace.Outer/Inner` for nested types.
//!
//! # Key Types
//!
//! - [`TypeDef`] / [`TypeRef`] - Defined and referenced types
//! - [`FieldDef`] / [`PropertyDef`] - Fields and properties of defined types
//! - [`MemberRef`] - A method or field of a referenced type
//! - [`AssemblyResolver`] / [`DefaultAssemblyResolver`] - Lookup of referenced modules
//! - [`TypeLocation`] / [`Scope`] - A type definition together with the module that owns it

mod resolver;

pub use resolver::{
    resolve_type, AssemblyResolver, DefaultAssemblyResolver, Scope, TypeKey, TypeLocation,
};

use crate::metadata::{
    customattributes::CustomAttribute,
    method::GenericParam,
    signatures::{SignatureField, SignatureMethod, TypeSignature},
    token::Token,
};

#[allow(non_snake_case)]
/// All possible flags for `TypeAttributes`
pub mod TypeAttributes {
    /// Mask for extracting type visibility information.
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Type has no public scope (internal to assembly).
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Type has public scope (visible outside assembly).
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested type with public visibility.
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Nested type with private visibility.
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Type is a class.
    pub const CLASS: u32 = 0x0000_0000;
    /// Type is an interface.
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Type cannot be instantiated.
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Type cannot be derived from.
    pub const SEALED: u32 = 0x0000_0100;
    /// Type name has special meaning to the runtime.
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Type initializer may run lazily.
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

#[allow(non_snake_case)]
/// All possible flags for `FieldAttributes`
pub mod FieldAttributes {
    /// These 3 bits contain one of the following values:
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Accessible only by the parent type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessibly by anyone in the Assembly
    pub const ASSEMBLY: u32 = 0x0003;
    /// Accessible only by type and sub-types
    pub const FAMILY: u32 = 0x0004;
    /// Accessibly by anyone who has visibility to this scope field contract attributes
    pub const PUBLIC: u32 = 0x0006;
    /// Defined on type, else per instance
    pub const STATIC: u32 = 0x0010;
    /// Field can only be initialized, not written to after init
    pub const INIT_ONLY: u32 = 0x0020;
    /// Value is compile time constant
    pub const LITERAL: u32 = 0x0040;
}

/// A type defined in the module
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// `TypeDef` token
    pub token: Token,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// `TypeAttributes` flags
    pub flags: u32,
    /// Base type, `None` for `System.Object` and interfaces
    pub extends: Option<TypeSignature>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeSignature>,
    /// Enclosing type of a nested type
    pub enclosing: Option<Token>,
    /// Nested types, in declaration order
    pub nested_types: Vec<Token>,
    /// Fields, in declaration order
    pub fields: Vec<Token>,
    /// Methods, in declaration order
    pub methods: Vec<Token>,
    /// Properties, in declaration order
    pub properties: Vec<Token>,
    /// Generic parameters of the type
    pub generic_params: Vec<GenericParam>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    pub(crate) full_name: String,
}

impl TypeDef {
    /// Runtime full name, e.g. `Demo.Outer/Inner`
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// True for abstract types and interfaces
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags & (TypeAttributes::ABSTRACT | TypeAttributes::INTERFACE) != 0
    }

    /// True for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::INTERFACE != 0
    }
}

/// A type defined in another assembly
#[derive(Debug, Clone)]
pub struct TypeRef {
    /// `TypeRef` token
    pub token: Token,
    /// Name of the assembly defining the type
    pub assembly: String,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Enclosing type reference of a nested type
    pub enclosing: Option<Token>,
    pub(crate) full_name: String,
}

impl TypeRef {
    /// Runtime full name, e.g. `System.Reflection.MethodInfo`
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }
}

/// A field defined in the module
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// `Field` token
    pub token: Token,
    /// Field name
    pub name: String,
    /// `TypeDef` token of the declaring type
    pub declaring_type: Token,
    /// `FieldAttributes` flags
    pub flags: u32,
    /// Field type
    pub signature: SignatureField,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// True for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }
}

/// A property defined in the module
#[derive(Debug, Clone)]
pub struct PropertyDef {
    /// `Property` token
    pub token: Token,
    /// Property name
    pub name: String,
    /// `TypeDef` token of the declaring type
    pub declaring_type: Token,
    /// Property type
    pub property_type: TypeSignature,
    /// `get_` accessor
    pub getter: Option<Token>,
    /// `set_` accessor
    pub setter: Option<Token>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

/// Signature carried by a member reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRefSignature {
    /// Method reference
    Method(SignatureMethod),
    /// Field reference
    Field(SignatureField),
}

/// A method or field of a referenced type
#[derive(Debug, Clone)]
pub struct MemberRef {
    /// `MemberRef` token
    pub token: Token,
    /// Declaring type, a class, value type or generic instance
    pub parent: TypeSignature,
    /// Member name
    pub name: String,
    /// Member signature
    pub signature: MemberRefSignature,
}

impl MemberRef {
    /// The method signature, if this references a method
    #[must_use]
    pub fn method_signature(&self) -> Option<&SignatureMethod> {
        match &self.signature {
            MemberRefSignature::Method(sig) => Some(sig),
            MemberRefSignature::Field(_) => None,
        }
    }
}

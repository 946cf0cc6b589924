//! The in-memory module a weave pass borrows and mutates.
//!
//! A [`Module`] owns one arena per metadata table. Tokens are row numbers into those
//! arenas, so a token stays valid for the lifetime of the module with one exception:
//! [`Module::pop_method`] removes the most recently added method, which the weaver uses to
//! roll back a member whose weave step failed halfway.
//!
//! References to other assemblies are [`TypeRef`] and [`MemberRef`] rows. Creating them
//! goes through [`Module::type_ref`] and [`Module::member_ref`], which return the existing
//! row when an identical reference is already present.

use sha1::{Digest, Sha1};
use uguid::Guid;

use crate::{
    assembly::{OpCode, StackBehavior},
    metadata::{
        customattributes::CustomAttribute,
        method::{MethodDef, StackEffects},
        signatures::{SignatureMethod, TypeSignature},
        token::{table, Token},
        typesystem::{
            FieldDef, MemberRef, MemberRefSignature, PropertyDef, TypeDef, TypeRef,
        },
    },
    Error, Result,
};

/// A managed module: types, members, references and method bodies.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    mvid: Guid,
    assembly_refs: Vec<String>,
    types: Vec<TypeDef>,
    type_refs: Vec<TypeRef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    properties: Vec<PropertyDef>,
    member_refs: Vec<MemberRef>,
}

/// Joins a namespace and a simple name into a runtime full name
fn join_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

impl Module {
    /// Creates an empty module. The MVID is derived from the name, so equally named
    /// modules built the same way are indistinguishable.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let digest = Sha1::digest(name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);

        Module {
            name,
            mvid: Guid::from_bytes(bytes),
            assembly_refs: Vec::new(),
            types: Vec::new(),
            type_refs: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            member_refs: Vec::new(),
        }
    }

    /// Assembly name of the module
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module version id
    #[must_use]
    pub fn mvid(&self) -> Guid {
        self.mvid
    }

    /// Names of the referenced assemblies, in reference order
    #[must_use]
    pub fn assembly_refs(&self) -> &[String] {
        &self.assembly_refs
    }

    /// Adds an assembly reference, returning the existing row if already referenced
    pub fn add_assembly_ref(&mut self, assembly: &str) -> Token {
        if let Some(index) = self.assembly_refs.iter().position(|name| name == assembly) {
            return row_token(table::ASSEMBLY_REF, index);
        }
        self.assembly_refs.push(assembly.to_string());
        row_token(table::ASSEMBLY_REF, self.assembly_refs.len() - 1)
    }

    /// All type definitions, in token order
    #[must_use]
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// Type definitions that are not nested in another type
    pub fn top_level_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter().filter(|def| def.enclosing.is_none())
    }

    /// All type references, in token order
    #[must_use]
    pub fn type_refs(&self) -> &[TypeRef] {
        &self.type_refs
    }

    /// All method definitions, in token order
    #[must_use]
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    /// All member references, in token order
    #[must_use]
    pub fn member_refs(&self) -> &[MemberRef] {
        &self.member_refs
    }

    /// Defines a new type
    ///
    /// # Arguments
    ///
    /// * `namespace` - Namespace, ignored for nested types
    /// * `name` - Simple name
    /// * `flags` - [`TypeAttributes`](crate::metadata::typesystem::TypeAttributes) flags
    /// * `extends` - Base type, `None` for roots and interfaces
    /// * `enclosing` - Enclosing type for nested types
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `enclosing` does not name a type of this module.
    pub fn add_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: u32,
        extends: Option<TypeSignature>,
        enclosing: Option<Token>,
    ) -> Result<Token> {
        let token = row_token(table::TYPE_DEF, self.types.len());

        let (namespace, full_name) = match enclosing {
            Some(outer) => {
                let outer_def = self.type_def_mut(outer)?;
                outer_def.nested_types.push(token);
                (String::new(), format!("{}/{}", outer_def.full_name(), name))
            }
            None => (namespace.to_string(), join_name(namespace, name)),
        };

        self.types.push(TypeDef {
            token,
            namespace,
            name: name.to_string(),
            flags,
            extends,
            interfaces: Vec::new(),
            enclosing,
            nested_types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            generic_params: Vec::new(),
            custom_attributes: Vec::new(),
            full_name,
        });
        Ok(token)
    }

    /// Appends a method to its declaring type, assigning its token
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the declaring type is not defined in this module.
    pub fn add_method(&mut self, mut method: MethodDef) -> Result<Token> {
        let token = row_token(table::METHOD_DEF, self.methods.len());
        self.type_def_mut(method.declaring_type)?.methods.push(token);
        method.token = token;
        self.methods.push(method);
        Ok(token)
    }

    /// Removes the most recently added method from the module
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if `token` is not the last method row.
    pub fn pop_method(&mut self, token: Token) -> Result<MethodDef> {
        let is_last = self.methods.last().is_some_and(|method| method.token == token);
        if !is_last {
            return Err(Error::MemberNotFound(token));
        }
        let Some(method) = self.methods.pop() else {
            return Err(Error::MemberNotFound(token));
        };
        if let Ok(owner) = self.type_def_mut(method.declaring_type) {
            owner.methods.retain(|candidate| *candidate != token);
        }
        Ok(method)
    }

    /// Appends a field to its declaring type, assigning its token
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the declaring type is not defined in this module.
    pub fn add_field(&mut self, mut field: FieldDef) -> Result<Token> {
        let token = row_token(table::FIELD, self.fields.len());
        self.type_def_mut(field.declaring_type)?.fields.push(token);
        field.token = token;
        self.fields.push(field);
        Ok(token)
    }

    /// Appends a property to its declaring type, assigning its token
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the declaring type is not defined in this module.
    pub fn add_property(&mut self, mut property: PropertyDef) -> Result<Token> {
        let token = row_token(table::PROPERTY, self.properties.len());
        self.type_def_mut(property.declaring_type)?
            .properties
            .push(token);
        property.token = token;
        self.properties.push(property);
        Ok(token)
    }

    /// Returns a reference to a top-level type of another assembly, creating it if needed
    pub fn type_ref(&mut self, assembly: &str, namespace: &str, name: &str) -> Token {
        let full_name = join_name(namespace, name);
        if let Some(existing) = self
            .type_refs
            .iter()
            .find(|r| r.assembly == assembly && r.full_name == full_name)
        {
            return existing.token;
        }

        self.add_assembly_ref(assembly);
        let token = row_token(table::TYPE_REF, self.type_refs.len());
        self.type_refs.push(TypeRef {
            token,
            assembly: assembly.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            enclosing: None,
            full_name,
        });
        token
    }

    /// Returns a reference to a nested type of a referenced type, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `enclosing` is not a type reference of this module.
    pub fn nested_type_ref(&mut self, enclosing: Token, name: &str) -> Result<Token> {
        let outer = self.type_ref_row(enclosing)?;
        let full_name = format!("{}/{}", outer.full_name, name);
        let assembly = outer.assembly.clone();

        if let Some(existing) = self
            .type_refs
            .iter()
            .find(|r| r.assembly == assembly && r.full_name == full_name)
        {
            return Ok(existing.token);
        }

        let token = row_token(table::TYPE_REF, self.type_refs.len());
        self.type_refs.push(TypeRef {
            token,
            assembly,
            namespace: String::new(),
            name: name.to_string(),
            enclosing: Some(enclosing),
            full_name,
        });
        Ok(token)
    }

    /// Returns a reference to a member of a referenced type, creating it if needed
    pub fn member_ref(
        &mut self,
        parent: TypeSignature,
        name: &str,
        signature: MemberRefSignature,
    ) -> Token {
        if let Some(existing) = self
            .member_refs
            .iter()
            .find(|r| r.parent == parent && r.name == name && r.signature == signature)
        {
            return existing.token;
        }

        let token = row_token(table::MEMBER_REF, self.member_refs.len());
        self.member_refs.push(MemberRef {
            token,
            parent,
            name: name.to_string(),
            signature,
        });
        token
    }

    /// Type definition behind a `TypeDef` token
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] for other tables or missing rows.
    pub fn type_def(&self, token: Token) -> Result<&TypeDef> {
        row(&self.types, table::TYPE_DEF, token).ok_or(Error::TypeNotFound(token))
    }

    /// Mutable type definition behind a `TypeDef` token
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] for other tables or missing rows.
    pub fn type_def_mut(&mut self, token: Token) -> Result<&mut TypeDef> {
        row_mut(&mut self.types, table::TYPE_DEF, token).ok_or(Error::TypeNotFound(token))
    }

    /// Type reference behind a `TypeRef` token
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] for other tables or missing rows.
    pub fn type_ref_row(&self, token: Token) -> Result<&TypeRef> {
        row(&self.type_refs, table::TYPE_REF, token).ok_or(Error::TypeNotFound(token))
    }

    /// Method definition behind a `MethodDef` token
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for other tables or missing rows.
    pub fn method(&self, token: Token) -> Result<&MethodDef> {
        row(&self.methods, table::METHOD_DEF, token).ok_or(Error::MemberNotFound(token))
    }

    /// Mutable method definition behind a `MethodDef` token
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for other tables or missing rows.
    pub fn method_mut(&mut self, token: Token) -> Result<&mut MethodDef> {
        row_mut(&mut self.methods, table::METHOD_DEF, token).ok_or(Error::MemberNotFound(token))
    }

    /// Field definition behind a `Field` token
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for other tables or missing rows.
    pub fn field(&self, token: Token) -> Result<&FieldDef> {
        row(&self.fields, table::FIELD, token).ok_or(Error::MemberNotFound(token))
    }

    /// Property definition behind a `Property` token
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for other tables or missing rows.
    pub fn property(&self, token: Token) -> Result<&PropertyDef> {
        row(&self.properties, table::PROPERTY, token).ok_or(Error::MemberNotFound(token))
    }

    /// Member reference behind a `MemberRef` token
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for other tables or missing rows.
    pub fn member_ref_row(&self, token: Token) -> Result<&MemberRef> {
        row(&self.member_refs, table::MEMBER_REF, token).ok_or(Error::MemberNotFound(token))
    }

    /// Finds a type definition by runtime full name, e.g. `Demo.Outer/Inner`
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<Token> {
        self.types
            .iter()
            .find(|def| def.full_name == full_name)
            .map(|def| def.token)
    }

    /// Methods of a type definition, in declaration order
    pub fn methods_of(&self, type_token: Token) -> impl Iterator<Item = &MethodDef> {
        self.type_def(type_token)
            .map(|def| def.methods.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|token| self.method(*token).ok())
    }

    /// Properties of a type definition, in declaration order
    pub fn properties_of(&self, type_token: Token) -> impl Iterator<Item = &PropertyDef> {
        self.type_def(type_token)
            .map(|def| def.properties.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|token| self.property(*token).ok())
    }

    /// Fields of a type definition, in declaration order
    pub fn fields_of(&self, type_token: Token) -> impl Iterator<Item = &FieldDef> {
        self.type_def(type_token)
            .map(|def| def.fields.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|token| self.field(*token).ok())
    }

    /// Runtime full name of a type definition or type reference
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the token names neither.
    pub fn type_name(&self, token: Token) -> Result<&str> {
        if token.is_table(table::TYPE_REF) {
            return self.type_ref_row(token).map(TypeRef::full_name);
        }
        self.type_def(token).map(TypeDef::full_name)
    }

    /// Canonical name of a type signature, independent of the module's token numbering.
    ///
    /// Two signatures from different modules denote the same type exactly when their
    /// canonical names are equal.
    #[must_use]
    pub fn signature_name(&self, signature: &TypeSignature) -> String {
        if let Some(builtin) = signature.builtin_name() {
            return builtin.to_string();
        }
        match signature {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => self
                .type_name(*token)
                .map_or_else(|_| format!("<unresolved {token}>"), str::to_string),
            TypeSignature::ByRef(inner) => format!("{}&", self.signature_name(inner)),
            TypeSignature::SzArray(array) => format!("{}[]", self.signature_name(&array.base)),
            TypeSignature::GenericInst(base, args) => {
                let args: Vec<String> = args.iter().map(|arg| self.signature_name(arg)).collect();
                format!("{}<{}>", self.signature_name(base), args.join(","))
            }
            TypeSignature::GenericParamType(index) => format!("!{index}"),
            TypeSignature::GenericParamMethod(index) => format!("!!{index}"),
            _ => "?".to_string(),
        }
    }

    /// Name of a method definition or method reference
    #[must_use]
    pub fn method_name(&self, token: Token) -> Option<&str> {
        if token.is_table(table::MEMBER_REF) {
            return self.member_ref_row(token).ok().map(|r| r.name.as_str());
        }
        self.method(token).ok().map(|m| m.name.as_str())
    }

    /// Signature of a method definition or method reference
    #[must_use]
    pub fn method_signature(&self, token: Token) -> Option<&SignatureMethod> {
        if token.is_table(table::MEMBER_REF) {
            return self.member_ref_row(token).ok()?.method_signature();
        }
        self.method(token).ok().map(|m| &m.signature)
    }

    /// Declaring type of a method or field, as a signature
    #[must_use]
    pub fn member_parent(&self, token: Token) -> Option<TypeSignature> {
        if token.is_table(table::MEMBER_REF) {
            return self.member_ref_row(token).ok().map(|r| r.parent.clone());
        }
        if token.is_table(table::FIELD) {
            return self.field(token).ok().map(|f| TypeSignature::Class(f.declaring_type));
        }
        self.method(token)
            .ok()
            .map(|m| TypeSignature::Class(m.declaring_type))
    }

    /// Name of a field definition or field reference
    #[must_use]
    pub fn field_name(&self, token: Token) -> Option<&str> {
        if token.is_table(table::MEMBER_REF) {
            return self.member_ref_row(token).ok().map(|r| r.name.as_str());
        }
        self.field(token).ok().map(|f| f.name.as_str())
    }

    /// Type token of a custom attribute, taken from its constructor's declaring type
    #[must_use]
    pub fn attribute_type(&self, attribute: &CustomAttribute) -> Option<Token> {
        self.member_parent(attribute.constructor)?.type_token()
    }

    /// Human readable `Namespace.Type::Member` name for diagnostics
    #[must_use]
    pub fn member_display_name(&self, token: Token) -> String {
        let parent = self
            .member_parent(token)
            .map(|parent| self.signature_name(&parent));
        let name = if token.is_table(table::PROPERTY) {
            self.property(token).ok().map(|p| p.name.as_str())
        } else if token.is_table(table::FIELD) {
            self.field_name(token)
        } else {
            self.method_name(token)
        };

        if token.is_table(table::PROPERTY) {
            let owner = self
                .property(token)
                .ok()
                .and_then(|p| self.type_name(p.declaring_type).ok());
            return format!("{}::{}", owner.unwrap_or("?"), name.unwrap_or("?"));
        }

        format!(
            "{}::{}",
            parent.as_deref().unwrap_or("?"),
            name.unwrap_or("?")
        )
    }
}

impl StackEffects for Module {
    fn call_behavior(&self, opcode: OpCode, method: Token) -> Option<StackBehavior> {
        let signature = self.method_signature(method)?;
        let (pops, pushes) = match opcode {
            OpCode::Newobj => (signature.params.len(), 1),
            _ => (signature.arg_count(), usize::from(signature.has_return())),
        };
        Some(StackBehavior {
            pops: u8::try_from(pops).ok()?,
            pushes: u8::try_from(pushes).ok()?,
        })
    }
}

// Arena sizes stay far below the 24-bit row limit
#[allow(clippy::cast_possible_truncation)]
fn row_token(table: u8, index: usize) -> Token {
    Token::from_parts(table, index as u32 + 1)
}

fn row<T>(rows: &[T], table: u8, token: Token) -> Option<&T> {
    if !token.is_table(table) {
        return None;
    }
    rows.get(token.index()?)
}

fn row_mut<T>(rows: &mut [T], table: u8, token: Token) -> Option<&mut T> {
    if !token.is_table(table) {
        return None;
    }
    rows.get_mut(token.index()?)
}

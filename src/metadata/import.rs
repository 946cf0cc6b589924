//! Import of types and members of other modules as references.
//!
//! A token is only meaningful inside the module that issued it. Before woven code can
//! call a method of the aspect library, the method must be re-expressed in the woven
//! module: the declaring type becomes a [`TypeRef`](crate::metadata::typesystem::TypeRef)
//! naming the defining assembly, the method becomes a
//! [`MemberRef`](crate::metadata::typesystem::MemberRef) on that parent, and every type
//! token inside its signature is translated the same way. Imports are deduplicated,
//! importing the same member twice yields the same token.

use crate::{
    metadata::{
        module::Module,
        signatures::{SignatureField, SignatureMethod, SignatureSzArray, TypeSignature},
        token::{table, Token},
        typesystem::{MemberRefSignature, Scope},
    },
    Error, Result,
};

impl Module {
    /// Imports a `TypeDef` or `TypeRef` of `source`, returning a token valid in `self`
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the token does not name a type of `source`, or
    /// if it refers back into `self` and `self` does not define it.
    pub fn import_type(&mut self, source: &Module, token: Token) -> Result<Token> {
        if token.is_table(table::TYPE_DEF) {
            let def = source.type_def(token)?;
            if source.name() == self.name() {
                return self.find_type(def.full_name()).ok_or(Error::TypeNotFound(token));
            }
            return match def.enclosing {
                Some(outer) => {
                    let outer = self.import_type(source, outer)?;
                    self.nested_type_ref(outer, &def.name)
                }
                None => Ok(self.type_ref(source.name(), &def.namespace, &def.name)),
            };
        }

        let reference = source.type_ref_row(token)?;
        if reference.assembly == self.name() {
            return self
                .find_type(reference.full_name())
                .ok_or(Error::TypeNotFound(token));
        }
        match reference.enclosing {
            Some(outer) => {
                let outer = self.import_type(source, outer)?;
                self.nested_type_ref(outer, &reference.name)
            }
            None => Ok(self.type_ref(
                &reference.assembly,
                &reference.namespace,
                &reference.name,
            )),
        }
    }

    /// Translates every type token inside `signature` from `source` into `self`
    ///
    /// # Errors
    ///
    /// Returns the first error of [`Module::import_type`].
    pub fn import_signature(
        &mut self,
        source: &Module,
        signature: &TypeSignature,
    ) -> Result<TypeSignature> {
        Ok(match signature {
            TypeSignature::Class(token) => TypeSignature::Class(self.import_type(source, *token)?),
            TypeSignature::ValueType(token) => {
                TypeSignature::ValueType(self.import_type(source, *token)?)
            }
            TypeSignature::ByRef(inner) => {
                TypeSignature::ByRef(Box::new(self.import_signature(source, inner)?))
            }
            TypeSignature::SzArray(array) => TypeSignature::SzArray(SignatureSzArray {
                base: Box::new(self.import_signature(source, &array.base)?),
            }),
            TypeSignature::GenericInst(base, args) => {
                let base = self.import_signature(source, base)?;
                let args = args
                    .iter()
                    .map(|arg| self.import_signature(source, arg))
                    .collect::<Result<Vec<_>>>()?;
                TypeSignature::GenericInst(Box::new(base), args)
            }
            other => other.clone(),
        })
    }

    /// Translates the return and parameter types of a method signature
    ///
    /// # Errors
    ///
    /// Returns the first error of [`Module::import_type`].
    pub fn import_method_signature(
        &mut self,
        source: &Module,
        signature: &SignatureMethod,
    ) -> Result<SignatureMethod> {
        let return_type = self.import_signature(source, &signature.return_type)?;
        let params = signature
            .params
            .iter()
            .map(|param| self.import_signature(source, param))
            .collect::<Result<Vec<_>>>()?;
        Ok(SignatureMethod {
            has_this: signature.has_this,
            param_count_generic: signature.param_count_generic,
            return_type,
            params,
        })
    }

    /// Imports a `MethodDef` or method `MemberRef` of `source` as a member reference
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if the token does not name a method of `source`,
    /// or any error of [`Module::import_type`].
    pub fn import_method(&mut self, source: &Module, method: Token) -> Result<Token> {
        if method.is_table(table::MEMBER_REF) {
            let reference = source.member_ref_row(method)?;
            let Some(signature) = reference.method_signature() else {
                return Err(Error::MemberNotFound(method));
            };
            let parent = self.import_signature(source, &reference.parent)?;
            let signature = self.import_method_signature(source, signature)?;
            return Ok(self.member_ref(parent, &reference.name, MemberRefSignature::Method(signature)));
        }

        let def = source.method(method)?;
        let parent = self.import_declaring_type(source, def.declaring_type)?;
        self.import_method_with_parent(source, method, parent)
    }

    /// Imports a `MethodDef` of `source` on an explicit parent, used for members of
    /// generic instantiations such as `Func<object>::.ctor`
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if the token does not name a method of `source`,
    /// or any error of [`Module::import_type`].
    pub fn import_method_with_parent(
        &mut self,
        source: &Module,
        method: Token,
        parent: TypeSignature,
    ) -> Result<Token> {
        let def = source.method(method)?;
        let signature = self.import_method_signature(source, &def.signature)?;
        Ok(self.member_ref(parent, &def.name, MemberRefSignature::Method(signature)))
    }

    /// Imports a `Field` or field `MemberRef` of `source` as a member reference
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if the token does not name a field of `source`,
    /// or any error of [`Module::import_type`].
    pub fn import_field(&mut self, source: &Module, field: Token) -> Result<Token> {
        if field.is_table(table::MEMBER_REF) {
            let reference = source.member_ref_row(field)?;
            let MemberRefSignature::Field(signature) = &reference.signature else {
                return Err(Error::MemberNotFound(field));
            };
            let parent = self.import_signature(source, &reference.parent)?;
            let base = self.import_signature(source, &signature.base)?;
            return Ok(self.member_ref(
                parent,
                &reference.name,
                MemberRefSignature::Field(SignatureField { base }),
            ));
        }

        let def = source.field(field)?;
        let parent = self.import_declaring_type(source, def.declaring_type)?;
        let base = self.import_signature(source, &def.signature.base)?;
        Ok(self.member_ref(parent, &def.name, MemberRefSignature::Field(SignatureField { base })))
    }

    /// Type token usable in `self` for a type located in `scope`
    ///
    /// # Errors
    ///
    /// Returns any error of [`Module::import_type`].
    pub fn import_type_from(&mut self, scope: Scope<'_>, token: Token) -> Result<Token> {
        match scope {
            Scope::Target => Ok(token),
            Scope::Reference(source) => self.import_type(source, token),
        }
    }

    /// Method token usable in `self` for a method located in `scope`
    ///
    /// # Errors
    ///
    /// Returns any error of [`Module::import_method`].
    pub fn import_method_from(&mut self, scope: Scope<'_>, method: Token) -> Result<Token> {
        match scope {
            Scope::Target => Ok(method),
            Scope::Reference(source) => self.import_method(source, method),
        }
    }

    /// Field token usable in `self` for a field located in `scope`
    ///
    /// # Errors
    ///
    /// Returns any error of [`Module::import_field`].
    pub fn import_field_from(&mut self, scope: Scope<'_>, field: Token) -> Result<Token> {
        match scope {
            Scope::Target => Ok(field),
            Scope::Reference(source) => self.import_field(source, field),
        }
    }

    /// Signature usable in `self` for a signature written in `scope`
    ///
    /// # Errors
    ///
    /// Returns any error of [`Module::import_signature`].
    pub fn import_signature_from(
        &mut self,
        scope: Scope<'_>,
        signature: &TypeSignature,
    ) -> Result<TypeSignature> {
        match scope {
            Scope::Target => Ok(signature.clone()),
            Scope::Reference(source) => self.import_signature(source, signature),
        }
    }

    fn import_declaring_type(&mut self, source: &Module, declaring: Token) -> Result<TypeSignature> {
        let is_value_type = source
            .type_def(declaring)?
            .extends
            .as_ref()
            .is_some_and(|base| source.signature_name(base) == "System.ValueType");
        let token = self.import_type(source, declaring)?;
        Ok(if is_value_type {
            TypeSignature::ValueType(token)
        } else {
            TypeSignature::Class(token)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        method::{MethodAccessFlags, MethodDef, MethodModifiers},
        typesystem::TypeAttributes,
    };

    fn library() -> (Module, Token, Token) {
        let mut lib = Module::new("Library");
        let outer = lib
            .add_type("Lib", "Outer", TypeAttributes::PUBLIC, None, None)
            .unwrap();
        let inner = lib
            .add_type("", "Inner", TypeAttributes::NESTED_PUBLIC, None, Some(outer))
            .unwrap();
        let method = lib
            .add_method(MethodDef {
                token: Token::new(0),
                name: "Take".to_string(),
                declaring_type: outer,
                access: MethodAccessFlags::PUBLIC,
                modifiers: MethodModifiers::HIDE_BY_SIG,
                signature: SignatureMethod::instance(
                    TypeSignature::Void,
                    vec![TypeSignature::Class(inner)],
                ),
                params: Vec::new(),
                generic_params: Vec::new(),
                body: None,
                custom_attributes: Vec::new(),
            })
            .unwrap();
        (lib, inner, method)
    }

    #[test]
    fn test_import_nested_type() {
        let (lib, inner, _) = library();
        let mut app = Module::new("App");
        let imported = app.import_type(&lib, inner).unwrap();

        assert_eq!(app.type_name(imported).unwrap(), "Lib.Outer/Inner");
        assert_eq!(app.type_refs().len(), 2);
        assert_eq!(app.assembly_refs(), ["Library".to_string()]);
    }

    #[test]
    fn test_import_method_translates_signature() {
        let (lib, _, method) = library();
        let mut app = Module::new("App");
        let first = app.import_method(&lib, method).unwrap();
        let second = app.import_method(&lib, method).unwrap();
        assert_eq!(first, second);

        let reference = app.member_ref_row(first).unwrap();
        assert_eq!(reference.name, "Take");
        let signature = reference.method_signature().unwrap();
        assert_eq!(app.signature_name(&signature.params[0]), "Lib.Outer/Inner");
    }

    #[test]
    fn test_import_from_target_scope_is_identity() {
        let mut app = Module::new("App");
        let token = Token::from_parts(table::TYPE_DEF, 7);
        assert_eq!(app.import_type_from(Scope::Target, token).unwrap(), token);
    }
}

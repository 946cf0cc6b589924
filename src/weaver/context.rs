//! Mutable state of one member's weave step.
//!
//! A [`WeaveContext`] is the only path through which weavers change the module. It clones
//! methods, adds generated methods and installs new bodies, recording every change in a
//! [`Transaction`]. When a weaver fails halfway the driver rolls the transaction back and
//! the member is left exactly as it was. Imported type and member references are not
//! undone: they are deduplicated and unused references are harmless.

use crate::{
    config::WeaverConfig,
    metadata::{
        method::{MethodBody, MethodDef},
        module::Module,
        token::Token,
    },
    weaver::{cloner, resolver::WellKnownReferences},
    Result,
};

/// Changes made to the module by one member's weave step.
#[derive(Debug, Default)]
pub struct Transaction {
    added: Vec<Token>,
    replaced: Vec<(Token, Option<MethodBody>)>,
}

impl Transaction {
    /// Methods appended to the module, in order
    #[must_use]
    pub fn added(&self) -> &[Token] {
        &self.added
    }

    /// Every method whose body was created or replaced
    pub fn touched(&self) -> impl Iterator<Item = Token> + '_ {
        self.added
            .iter()
            .copied()
            .chain(self.replaced.iter().map(|(token, _)| *token))
    }

    /// True if nothing was changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.replaced.is_empty()
    }

    /// Restores replaced bodies and removes added methods, newest first
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MemberNotFound`] if the module was changed behind the
    /// transaction's back.
    pub fn rollback(self, module: &mut Module) -> Result<()> {
        for (token, previous) in self.replaced.into_iter().rev() {
            module.method_mut(token)?.body = previous;
        }
        for token in self.added.into_iter().rev() {
            module.pop_method(token)?;
        }
        Ok(())
    }
}

/// Access to the module for the weavers of one member.
pub struct WeaveContext<'a, 'r> {
    /// The module being woven
    pub module: &'a mut Module,
    /// Pass configuration
    pub config: &'a WeaverConfig,
    /// Well-known references resolved for this pass
    pub references: &'a WellKnownReferences<'r>,
    transaction: Transaction,
}

impl<'a, 'r> WeaveContext<'a, 'r> {
    /// Starts a new transaction on `module`
    pub fn new(
        module: &'a mut Module,
        config: &'a WeaverConfig,
        references: &'a WellKnownReferences<'r>,
    ) -> Self {
        WeaveContext {
            module,
            config,
            references,
            transaction: Transaction::default(),
        }
    }

    /// Appends a private copy of `source` named after it with `suffix` appended
    ///
    /// # Errors
    ///
    /// Returns the errors of [`cloner::clone_method`] and [`Module::add_method`].
    pub fn clone_method(&mut self, source: Token, suffix: &str) -> Result<Token> {
        let name = format!("{}{}", self.module.method(source)?.name, suffix);
        let clone = cloner::clone_method(self.module, source, &name)?;
        self.add_method(clone)
    }

    /// Appends a generated method
    ///
    /// The body, if any, must already be final. Its stack depth is computed once the
    /// method is part of the module.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TypeNotFound`] if the declaring type is unknown, and the
    /// validation errors of the body.
    pub fn add_method(&mut self, method: MethodDef) -> Result<Token> {
        let token = self.module.add_method(method)?;
        self.transaction.added.push(token);

        let method = self.module.method(token)?;
        let max_stack = match &method.body {
            Some(body) => {
                body.validate(method.arg_count())?;
                Some(body.compute_max_stack(&*self.module, method.returns_value())?)
            }
            None => None,
        };
        if let (Some(depth), Some(body)) = (max_stack, self.module.method_mut(token)?.body.as_mut()) {
            body.max_stack = depth;
        }
        Ok(token)
    }

    /// Installs `body` as the new body of `method` after validating it
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`], [`crate::Error::InvalidRegion`] or
    /// [`crate::Error::StackImbalance`] if the body is not well-formed. The method keeps its
    /// previous body in that case.
    pub fn replace_body(&mut self, method: Token, mut body: MethodBody) -> Result<()> {
        let def = self.module.method(method)?;
        body.validate(def.arg_count())?;
        body.max_stack = body.compute_max_stack(&*self.module, def.returns_value())?;

        let previous = self.module.method_mut(method)?.body.replace(body);
        self.transaction.replaced.push((method, previous));
        Ok(())
    }

    /// Ends the step, handing out the recorded changes
    #[must_use]
    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{InstructionAssembler, OpCode},
        emulation::runtime::reference_resolver,
        metadata::{
            builders::{MethodDefBuilder, TypeDefBuilder},
            signatures::TypeSignature,
        },
    };

    fn module_with_method() -> (Module, Token) {
        let mut module = Module::new("App");
        module.add_assembly_ref("DotNetAspects");
        module.type_ref("DotNetAspects", "DotNetAspects.Interception", "OnMethodBoundaryAspect");
        let ty = TypeDefBuilder::new("App", "Calc").build(&mut module).unwrap();
        let method = MethodDefBuilder::new("Answer")
            .returns(TypeSignature::I4)
            .body(|asm| {
                asm.ldc_i4(42).ret();
                Ok(())
            })
            .build(&mut module, ty)
            .unwrap();
        (module, method)
    }

    #[test]
    fn test_rollback_restores_module() {
        let (mut module, method) = module_with_method();
        let resolver = reference_resolver().unwrap();
        let config = WeaverConfig::default();
        let references = WellKnownReferences::resolve(&module, &resolver, &config)
            .unwrap()
            .unwrap();
        let methods_before = module.methods().len();

        let mut ctx = WeaveContext::new(&mut module, &config, &references);
        let clone = ctx.clone_method(method, "$Original").unwrap();
        let mut body = MethodBody::new();
        let mut asm = InstructionAssembler::new(&mut body);
        asm.ldarg(0).call(clone).ret();
        asm.finish().unwrap();
        ctx.replace_body(method, body).unwrap();

        let transaction = ctx.into_transaction();
        assert_eq!(transaction.added(), &[clone]);
        assert_eq!(transaction.touched().count(), 2);
        assert_eq!(module.method(method).unwrap().body.as_ref().map(MethodBody::len), Some(3));

        transaction.rollback(&mut module).unwrap();
        assert_eq!(module.methods().len(), methods_before);
        let restored = module.method(method).unwrap().body.as_ref().unwrap();
        assert_eq!(restored.instructions()[0].opcode, OpCode::LdcI4S);
    }

    #[test]
    fn test_invalid_body_is_not_installed() {
        let (mut module, method) = module_with_method();
        let resolver = reference_resolver().unwrap();
        let config = WeaverConfig::default();
        let references = WellKnownReferences::resolve(&module, &resolver, &config)
            .unwrap()
            .unwrap();

        let mut ctx = WeaveContext::new(&mut module, &config, &references);
        let mut body = MethodBody::new();
        body.emit(OpCode::Ret, crate::assembly::Operand::None);
        assert!(ctx.replace_body(method, body).is_err());
        assert!(ctx.into_transaction().is_empty());
        assert_eq!(module.method(method).unwrap().body.as_ref().map(MethodBody::len), Some(2));
    }
}

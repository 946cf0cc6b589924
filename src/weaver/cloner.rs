//! Copies method bodies and definitions.
//!
//! Every woven member keeps its original implementation in a private clone. The clone
//! receives a fresh instruction id for every source instruction. Branch and switch
//! operands and the markers of every exception region are translated through the same
//! id map, so the copy is structurally identical to the source and independent of it.

use std::collections::HashMap;

use crate::{
    assembly::{InstrId, Operand},
    metadata::{
        method::{MethodAccessFlags, MethodBody, MethodDef, MethodModifiers},
        module::Module,
        token::Token,
    },
    Error, Result,
};

/// Copies `source` instruction by instruction under new ids.
///
/// # Errors
///
/// Returns [`Error::UnmappedInstruction`] if a branch target or region marker names an
/// instruction that is not part of `source`.
pub fn clone_body(source: &MethodBody) -> Result<MethodBody> {
    let mut body = MethodBody::new();
    body.init_locals = source.init_locals;
    body.max_stack = source.max_stack;
    body.locals = source.locals.clone();

    let ids: HashMap<InstrId, InstrId> = source
        .instructions()
        .iter()
        .map(|instr| (instr.id, body.allocate_id()))
        .collect();
    let map = |id: InstrId| ids.get(&id).copied().ok_or(Error::UnmappedInstruction(id));

    for instr in source.instructions() {
        let mut copy = instr.copy_as(map(instr.id)?);
        match &instr.operand {
            Operand::Target(target) => copy.operand = Operand::Target(map(*target)?),
            Operand::Switch(targets) => {
                copy.operand =
                    Operand::Switch(targets.iter().map(|t| map(*t)).collect::<Result<_>>()?);
            }
            _ => {}
        }
        body.push(copy);
    }

    let regions = source
        .regions()
        .iter()
        .map(|region| region.map_markers(map))
        .collect::<Result<Vec<_>>>()?;
    body.set_regions(regions);
    Ok(body)
}

/// A private copy of `source` named `name`, ready to be added to the same type.
///
/// The copy keeps the signature, parameters, generic parameters and body. Virtual and
/// special-name flags are dropped so the clone is an ordinary private method.
///
/// # Errors
///
/// Returns [`Error::MemberNotFound`] if `source` is not a method of `module`, and the
/// errors of [`clone_body`].
pub fn clone_method(module: &Module, source: Token, name: &str) -> Result<MethodDef> {
    let method = module.method(source)?;
    let body = match &method.body {
        Some(body) => Some(clone_body(body)?),
        None => None,
    };

    let mut modifiers = MethodModifiers::HIDE_BY_SIG;
    if method.is_static() {
        modifiers |= MethodModifiers::STATIC;
    }

    Ok(MethodDef {
        token: Token::new(0),
        name: name.to_string(),
        declaring_type: method.declaring_type,
        access: MethodAccessFlags::PRIVATE,
        modifiers,
        signature: method.signature.clone(),
        params: method.params.clone(),
        generic_params: method.generic_params.clone(),
        body,
        custom_attributes: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        metadata::{
            builders::{MethodDefBuilder, TypeDefBuilder},
            method::{ExceptionRegion, HandlerKind, RegionEnd},
            signatures::TypeSignature,
        },
    };

    #[test]
    fn test_clone_remaps_branches_and_regions() {
        let mut source = MethodBody::new();
        let start = source.emit(OpCode::Nop, Operand::None);
        source.emit(OpCode::Ldarg0, Operand::None);
        source.emit(OpCode::Switch, Operand::Switch(Vec::new()));
        source.emit(OpCode::Br, Operand::Target(start));
        let other = source.emit(OpCode::Nop, Operand::None);
        let done = source.emit(OpCode::Leave, Operand::Target(start));
        let handler = source.emit(OpCode::Endfinally, Operand::None);
        let after = source.emit(OpCode::Ret, Operand::None);
        source.instructions_mut()[2].operand = Operand::Switch(vec![other, done]);
        source.instructions_mut()[3].operand = Operand::Target(done);
        source.instructions_mut()[5].operand = Operand::Target(after);
        source.set_regions(vec![ExceptionRegion::finally(
            start,
            handler,
            handler,
            RegionEnd::At(after),
        )]);

        let copy = clone_body(&source).unwrap();
        assert_eq!(copy.len(), source.len());
        let copied: Vec<InstrId> = copy.instructions().iter().map(|i| i.id).collect();
        for (a, b) in source.instructions().iter().zip(copy.instructions()) {
            assert_eq!(a.opcode, b.opcode);
        }
        assert_eq!(
            copy.instructions()[2].operand,
            Operand::Switch(vec![copied[4], copied[5]])
        );
        assert_eq!(copy.instructions()[3].operand, Operand::Target(copied[5]));
        assert_eq!(copy.instructions()[5].operand, Operand::Target(copied[7]));

        let region = &copy.regions()[0];
        assert_eq!(region.kind, HandlerKind::Finally);
        assert_eq!(region.try_start, copied[0]);
        assert_eq!(region.handler_start, copied[6]);
        assert_eq!(region.handler_end, RegionEnd::At(copied[7]));
    }

    #[test]
    fn test_unmapped_target_fails() {
        let mut source = MethodBody::new();
        source.emit(OpCode::Br, Operand::Target(InstrId(99)));
        source.emit(OpCode::Ret, Operand::None);
        assert!(matches!(
            clone_body(&source),
            Err(Error::UnmappedInstruction(InstrId(99)))
        ));
    }

    #[test]
    fn test_clone_method_is_private() {
        let mut module = Module::new("App");
        let ty = TypeDefBuilder::new("App", "Calc").build(&mut module).unwrap();
        let add = MethodDefBuilder::new("Add")
            .public()
            .virtual_method()
            .returns(TypeSignature::I4)
            .param("a", TypeSignature::I4)
            .param("b", TypeSignature::I4)
            .local(TypeSignature::I4)
            .body(|asm| {
                asm.ldarg(1).ldarg(2).op(OpCode::Add).ret();
                Ok(())
            })
            .build(&mut module, ty)
            .unwrap();

        let clone = clone_method(&module, add, "Add$Original").unwrap();
        assert_eq!(clone.name, "Add$Original");
        assert_eq!(clone.access, MethodAccessFlags::PRIVATE);
        assert!(!clone.is_virtual());
        assert_eq!(clone.signature, module.method(add).unwrap().signature);
        assert_eq!(clone.params.len(), 2);
        assert_eq!(clone.body.as_ref().map(|b| b.locals.len()), Some(1));
        assert_eq!(clone.body.as_ref().map(MethodBody::len), Some(4));
    }
}

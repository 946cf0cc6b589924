//! Fluent construction of method bodies.
//!
//! [`InstructionAssembler`] appends instructions to a [`MethodBody`] and hands out
//! forward-referencable [`Label`]s. A label owns a pre-allocated instruction id; marking it
//! binds that id to the next instruction emitted, so branches can target code that does not
//! exist yet without any later fix-up pass.
//!
//! Slot and constant loads pick the shortest encoding automatically (`ldarg.1` over
//! `ldarg.s 1`, `ldc.i4.m1` over `ldc.i4 -1`).
//!
//! # Examples
//!
//! ```rust
//! use dotweave::{assembly::InstructionAssembler, metadata::method::MethodBody};
//!
//! let mut body = MethodBody::new();
//! let mut asm = InstructionAssembler::new(&mut body);
//! let positive = asm.label();
//! asm.ldarg(0).brtrue(positive).ldc_i4(0).ret();
//! asm.mark(positive).ldc_i4(1).ret();
//! asm.finish()?;
//!
//! assert_eq!(body.len(), 6);
//! body.validate(1)?;
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    assembly::{InstrId, Instruction, OpCode, Operand},
    metadata::{
        method::{ExceptionRegion, MethodBody},
        signatures::TypeSignature,
        token::Token,
    },
    Result,
};

/// A position in the instruction stream that may be referenced before it is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Appends instructions to a method body.
pub struct InstructionAssembler<'a> {
    body: &'a mut MethodBody,
    labels: Vec<(InstrId, bool)>,
    pending: Option<InstrId>,
}

impl<'a> InstructionAssembler<'a> {
    /// Creates an assembler appending to `body`
    pub fn new(body: &'a mut MethodBody) -> Self {
        InstructionAssembler {
            body,
            labels: Vec::new(),
            pending: None,
        }
    }

    /// Creates an unbound label
    pub fn label(&mut self) -> Label {
        let id = self.body.allocate_id();
        self.labels.push((id, false));
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next emitted instruction.
    ///
    /// Two labels marked back to back are separated by a `nop`, each label keeps its own
    /// instruction.
    pub fn mark(&mut self, label: Label) -> &mut Self {
        if self.pending.is_some() {
            self.op(OpCode::Nop);
        }
        if let Some(entry) = self.labels.get_mut(label.0) {
            entry.1 = true;
            self.pending = Some(entry.0);
        }
        self
    }

    /// Instruction id a label is bound to
    #[must_use]
    pub fn id(&self, label: Label) -> InstrId {
        self.labels[label.0].0
    }

    /// Appends an instruction and returns its id
    pub fn emit_id(&mut self, opcode: OpCode, operand: Operand) -> InstrId {
        match self.pending.take() {
            Some(id) => {
                self.body.push(Instruction {
                    id,
                    opcode,
                    operand,
                });
                id
            }
            None => self.body.emit(opcode, operand),
        }
    }

    /// Appends an instruction
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> &mut Self {
        self.emit_id(opcode, operand);
        self
    }

    /// Appends an instruction without operand
    pub fn op(&mut self, opcode: OpCode) -> &mut Self {
        self.emit(opcode, Operand::None)
    }

    /// `nop`
    pub fn nop(&mut self) -> &mut Self {
        self.op(OpCode::Nop)
    }

    /// Loads argument `index`, slot 0 is `this` for instance methods
    pub fn ldarg(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.op(OpCode::Ldarg0),
            1 => self.op(OpCode::Ldarg1),
            2 => self.op(OpCode::Ldarg2),
            3 => self.op(OpCode::Ldarg3),
            4..=255 => self.emit(OpCode::LdargS, Operand::Argument(index)),
            _ => self.emit(OpCode::Ldarg, Operand::Argument(index)),
        }
    }

    /// Stores into argument `index`
    pub fn starg(&mut self, index: u16) -> &mut Self {
        if index <= 255 {
            self.emit(OpCode::StargS, Operand::Argument(index))
        } else {
            self.emit(OpCode::Starg, Operand::Argument(index))
        }
    }

    /// Loads local `index`
    pub fn ldloc(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.op(OpCode::Ldloc0),
            1 => self.op(OpCode::Ldloc1),
            2 => self.op(OpCode::Ldloc2),
            3 => self.op(OpCode::Ldloc3),
            4..=255 => self.emit(OpCode::LdlocS, Operand::Local(index)),
            _ => self.emit(OpCode::Ldloc, Operand::Local(index)),
        }
    }

    /// Stores into local `index`
    pub fn stloc(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.op(OpCode::Stloc0),
            1 => self.op(OpCode::Stloc1),
            2 => self.op(OpCode::Stloc2),
            3 => self.op(OpCode::Stloc3),
            4..=255 => self.emit(OpCode::StlocS, Operand::Local(index)),
            _ => self.emit(OpCode::Stloc, Operand::Local(index)),
        }
    }

    /// Loads a 32-bit integer constant using the shortest form
    pub fn ldc_i4(&mut self, value: i32) -> &mut Self {
        match value {
            -1 => self.op(OpCode::LdcI4M1),
            0 => self.op(OpCode::LdcI40),
            1 => self.op(OpCode::LdcI41),
            2 => self.op(OpCode::LdcI42),
            3 => self.op(OpCode::LdcI43),
            4 => self.op(OpCode::LdcI44),
            5 => self.op(OpCode::LdcI45),
            6 => self.op(OpCode::LdcI46),
            7 => self.op(OpCode::LdcI47),
            8 => self.op(OpCode::LdcI48),
            _ => match i8::try_from(value) {
                Ok(short) => self.emit(OpCode::LdcI4S, Operand::Int8(short)),
                Err(_) => self.emit(OpCode::LdcI4, Operand::Int32(value)),
            },
        }
    }

    /// Loads a 64-bit integer constant
    pub fn ldc_i8(&mut self, value: i64) -> &mut Self {
        self.emit(OpCode::LdcI8, Operand::Int64(value))
    }

    /// Loads a 32-bit float constant
    pub fn ldc_r4(&mut self, value: f32) -> &mut Self {
        self.emit(OpCode::LdcR4, Operand::Float32(value))
    }

    /// Loads a 64-bit float constant
    pub fn ldc_r8(&mut self, value: f64) -> &mut Self {
        self.emit(OpCode::LdcR8, Operand::Float64(value))
    }

    /// `ldnull`
    pub fn ldnull(&mut self) -> &mut Self {
        self.op(OpCode::Ldnull)
    }

    /// Loads a string literal
    pub fn ldstr(&mut self, value: &str) -> &mut Self {
        self.emit(OpCode::Ldstr, Operand::String(value.to_string()))
    }

    /// `dup`
    pub fn dup(&mut self) -> &mut Self {
        self.op(OpCode::Dup)
    }

    /// `pop`
    pub fn pop(&mut self) -> &mut Self {
        self.op(OpCode::Pop)
    }

    /// Direct call
    pub fn call(&mut self, method: Token) -> &mut Self {
        self.emit(OpCode::Call, Operand::Method(method))
    }

    /// Virtual call
    pub fn callvirt(&mut self, method: Token) -> &mut Self {
        self.emit(OpCode::Callvirt, Operand::Method(method))
    }

    /// Allocates an object and runs `ctor`
    pub fn newobj(&mut self, ctor: Token) -> &mut Self {
        self.emit(OpCode::Newobj, Operand::Method(ctor))
    }

    /// `ret`
    pub fn ret(&mut self) -> &mut Self {
        self.op(OpCode::Ret)
    }

    /// Unconditional branch
    pub fn br(&mut self, target: Label) -> &mut Self {
        let id = self.id(target);
        self.emit(OpCode::Br, Operand::Target(id))
    }

    /// Branch if the value is non-zero or non-null
    pub fn brtrue(&mut self, target: Label) -> &mut Self {
        let id = self.id(target);
        self.emit(OpCode::Brtrue, Operand::Target(id))
    }

    /// Branch if the value is zero or null
    pub fn brfalse(&mut self, target: Label) -> &mut Self {
        let id = self.id(target);
        self.emit(OpCode::Brfalse, Operand::Target(id))
    }

    /// Exits a protected region to `target`
    pub fn leave(&mut self, target: Label) -> &mut Self {
        let id = self.id(target);
        self.emit(OpCode::Leave, Operand::Target(id))
    }

    /// `endfinally`
    pub fn endfinally(&mut self) -> &mut Self {
        self.op(OpCode::Endfinally)
    }

    /// `throw`
    pub fn throw(&mut self) -> &mut Self {
        self.op(OpCode::Throw)
    }

    /// `rethrow`
    pub fn rethrow(&mut self) -> &mut Self {
        self.op(OpCode::Rethrow)
    }

    /// Boxes a value of type `ty`
    pub fn box_value(&mut self, ty: TypeSignature) -> &mut Self {
        self.emit(OpCode::Box, Operand::Type(ty))
    }

    /// Unboxes to a value of type `ty`
    pub fn unbox_any(&mut self, ty: TypeSignature) -> &mut Self {
        self.emit(OpCode::UnboxAny, Operand::Type(ty))
    }

    /// Casts a reference to `ty`
    pub fn castclass(&mut self, ty: TypeSignature) -> &mut Self {
        self.emit(OpCode::Castclass, Operand::Type(ty))
    }

    /// Allocates a single-dimensional array of `element`
    pub fn newarr(&mut self, element: TypeSignature) -> &mut Self {
        self.emit(OpCode::Newarr, Operand::Type(element))
    }

    /// `stelem.ref`
    pub fn stelem_ref(&mut self) -> &mut Self {
        self.op(OpCode::StelemRef)
    }

    /// Loads the runtime handle of a type
    pub fn ldtoken_type(&mut self, ty: TypeSignature) -> &mut Self {
        self.emit(OpCode::Ldtoken, Operand::Type(ty))
    }

    /// Loads the runtime handle of a method
    pub fn ldtoken_method(&mut self, method: Token) -> &mut Self {
        self.emit(OpCode::Ldtoken, Operand::Method(method))
    }

    /// Loads a function pointer to `method`
    pub fn ldftn(&mut self, method: Token) -> &mut Self {
        self.emit(OpCode::Ldftn, Operand::Method(method))
    }

    /// Loads an instance field
    pub fn ldfld(&mut self, field: Token) -> &mut Self {
        self.emit(OpCode::Ldfld, Operand::Field(field))
    }

    /// Stores an instance field
    pub fn stfld(&mut self, field: Token) -> &mut Self {
        self.emit(OpCode::Stfld, Operand::Field(field))
    }

    /// Loads a static field
    pub fn ldsfld(&mut self, field: Token) -> &mut Self {
        self.emit(OpCode::Ldsfld, Operand::Field(field))
    }

    /// Stores a static field
    pub fn stsfld(&mut self, field: Token) -> &mut Self {
        self.emit(OpCode::Stsfld, Operand::Field(field))
    }

    /// Adds a local variable slot to the body
    ///
    /// # Errors
    ///
    /// Returns an error if the body has no room for another local.
    pub fn local(&mut self, ty: TypeSignature) -> Result<u16> {
        self.body.add_local(ty)
    }

    /// Adds an exception region whose markers have been emitted already
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRegion`] if a marker is missing or the blocks are
    /// malformed.
    pub fn add_region(&mut self, region: ExceptionRegion) -> Result<()> {
        self.body.add_region(region)
    }

    /// Checks that every label was bound to an emitted instruction
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a label was never marked or was marked after
    /// the last instruction.
    pub fn finish(self) -> Result<()> {
        if let Some(id) = self.pending {
            return Err(malformed_error!("Label {} marked past the last instruction", id));
        }
        if let Some((id, _)) = self.labels.iter().find(|(_, marked)| !marked) {
            return Err(malformed_error!("Label {} was never marked", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_short_forms() {
        let mut body = MethodBody::new();
        let mut asm = InstructionAssembler::new(&mut body);
        asm.ldarg(1)
            .ldarg(7)
            .ldc_i4(-1)
            .ldc_i4(100)
            .ldc_i4(1000)
            .stloc(2)
            .ldloc(300);
        asm.finish().unwrap();

        let opcodes: Vec<OpCode> = body.instructions().iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                OpCode::Ldarg1,
                OpCode::LdargS,
                OpCode::LdcI4M1,
                OpCode::LdcI4S,
                OpCode::LdcI4,
                OpCode::Stloc2,
                OpCode::Ldloc,
            ]
        );
    }

    #[test]
    fn test_forward_label() {
        let mut body = MethodBody::new();
        let mut asm = InstructionAssembler::new(&mut body);
        let end = asm.label();
        asm.br(end).nop();
        asm.mark(end).ret();
        let end_id = asm.id(end);
        asm.finish().unwrap();

        assert_eq!(body.instructions()[0].operand, Operand::Target(end_id));
        assert_eq!(body.instructions()[2].id, end_id);
    }

    #[test]
    fn test_adjacent_marks_get_separate_instructions() {
        let mut body = MethodBody::new();
        let mut asm = InstructionAssembler::new(&mut body);
        let first = asm.label();
        let second = asm.label();
        asm.mark(first).mark(second).ret();
        let (a, b) = (asm.id(first), asm.id(second));
        asm.finish().unwrap();

        assert_eq!(body.len(), 2);
        assert_eq!(body.instructions()[0].id, a);
        assert_eq!(body.instructions()[0].opcode, OpCode::Nop);
        assert_eq!(body.instructions()[1].id, b);
    }

    #[test]
    fn test_unmarked_label_is_reported() {
        let mut body = MethodBody::new();
        let mut asm = InstructionAssembler::new(&mut body);
        let dangling = asm.label();
        asm.br(dangling);
        assert!(matches!(asm.finish(), Err(Error::Malformed { .. })));
    }
}

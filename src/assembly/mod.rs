//! CIL instruction model and body assembly.
//!
//! # Key Types
//!
//! - [`OpCode`] / [`Operand`] / [`Instruction`] - Instructions with typed operands
//! - [`InstrId`] - Stable identity of an instruction within its body
//! - [`FlowType`] / [`StackBehavior`] - Control flow and stack metadata of opcodes
//! - [`InstructionAssembler`] / [`Label`] - Fluent body construction with forward labels

mod assembler;
mod instruction;

pub use assembler::{InstructionAssembler, Label};
pub use instruction::{
    FlowType, InstrId, Instruction, OpCode, Operand, OperandType, StackBehavior,
};

//! CIL instruction representation used by the method body model and the code generators.
//!
//! Unlike a decoded instruction stream, instructions here are addressed by a stable
//! [`InstrId`] instead of a byte offset. Branch operands and exception region markers
//! refer to ids, so instructions can be inserted, removed or copied into another body
//! without recomputing offsets. Byte offsets only exist once a body is encoded.
//!
//! # Key Components
//!
//! - [`OpCode`] - The supported CIL operation codes with their encodings
//! - [`Operand`] - Type-safe operand, one variant per operand kind
//! - [`Instruction`] - An opcode, an operand and the instruction's id
//! - [`FlowType`] - Control flow classification
//! - [`StackBehavior`] - Fixed stack effect of an opcode

use std::fmt;

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::metadata::{signatures::TypeSignature, token::Token};

/// Stable identity of an instruction within a method body.
///
/// Ids are allocated by the owning body and never reused, so a branch operand keeps
/// pointing at the same instruction while the sequence around it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrId(pub u32);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}", self.0)
    }
}

/// Kind of operand an opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer (`ldc.i4.s`)
    Int8,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// User string literal
    String,
    /// Type token
    Type,
    /// Method token
    Method,
    /// Field token
    Field,
    /// Type, method or field token (`ldtoken`)
    Token,
    /// Local variable index
    Local,
    /// Argument index
    Argument,
    /// Single branch target
    Target,
    /// Switch table
    Switch,
}

/// Control flow behavior of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

impl FlowType {
    /// True if control never falls through to the next instruction
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }
}

/// Fixed stack effect of an instruction.
///
/// Calls, `newobj` and `ret` depend on the referenced signature and have no fixed effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
}

impl StackBehavior {
    const fn new(pops: u8, pushes: u8) -> Self {
        StackBehavior { pops, pushes }
    }

    /// Net effect on stack depth (pushes - pops)
    #[must_use]
    pub fn net_effect(&self) -> i32 {
        i32::from(self.pushes) - i32::from(self.pops)
    }
}

/// Supported CIL operation codes.
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr,
)]
pub enum OpCode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    #[strum(serialize = "ldloc.0")]
    Ldloc0,
    #[strum(serialize = "ldloc.1")]
    Ldloc1,
    #[strum(serialize = "ldloc.2")]
    Ldloc2,
    #[strum(serialize = "ldloc.3")]
    Ldloc3,
    #[strum(serialize = "stloc.0")]
    Stloc0,
    #[strum(serialize = "stloc.1")]
    Stloc1,
    #[strum(serialize = "stloc.2")]
    Stloc2,
    #[strum(serialize = "stloc.3")]
    Stloc3,
    #[strum(serialize = "ldarg.s")]
    LdargS,
    #[strum(serialize = "starg.s")]
    StargS,
    #[strum(serialize = "ldloc.s")]
    LdlocS,
    #[strum(serialize = "stloc.s")]
    StlocS,
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4.m1")]
    LdcI4M1,
    #[strum(serialize = "ldc.i4.0")]
    LdcI40,
    #[strum(serialize = "ldc.i4.1")]
    LdcI41,
    #[strum(serialize = "ldc.i4.2")]
    LdcI42,
    #[strum(serialize = "ldc.i4.3")]
    LdcI43,
    #[strum(serialize = "ldc.i4.4")]
    LdcI44,
    #[strum(serialize = "ldc.i4.5")]
    LdcI45,
    #[strum(serialize = "ldc.i4.6")]
    LdcI46,
    #[strum(serialize = "ldc.i4.7")]
    LdcI47,
    #[strum(serialize = "ldc.i4.8")]
    LdcI48,
    #[strum(serialize = "ldc.i4.s")]
    LdcI4S,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "ret")]
    Ret,
    #[strum(serialize = "br.s")]
    BrS,
    #[strum(serialize = "brfalse.s")]
    BrfalseS,
    #[strum(serialize = "brtrue.s")]
    BrtrueS,
    #[strum(serialize = "beq.s")]
    BeqS,
    #[strum(serialize = "bge.s")]
    BgeS,
    #[strum(serialize = "bgt.s")]
    BgtS,
    #[strum(serialize = "ble.s")]
    BleS,
    #[strum(serialize = "blt.s")]
    BltS,
    #[strum(serialize = "bne.un.s")]
    BneUnS,
    #[strum(serialize = "br")]
    Br,
    #[strum(serialize = "brfalse")]
    Brfalse,
    #[strum(serialize = "brtrue")]
    Brtrue,
    #[strum(serialize = "beq")]
    Beq,
    #[strum(serialize = "bge")]
    Bge,
    #[strum(serialize = "bgt")]
    Bgt,
    #[strum(serialize = "ble")]
    Ble,
    #[strum(serialize = "blt")]
    Blt,
    #[strum(serialize = "bne.un")]
    BneUn,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "div")]
    Div,
    #[strum(serialize = "rem")]
    Rem,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "shl")]
    Shl,
    #[strum(serialize = "shr")]
    Shr,
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "conv.i1")]
    ConvI1,
    #[strum(serialize = "conv.i2")]
    ConvI2,
    #[strum(serialize = "conv.i4")]
    ConvI4,
    #[strum(serialize = "conv.i8")]
    ConvI8,
    #[strum(serialize = "conv.r4")]
    ConvR4,
    #[strum(serialize = "conv.r8")]
    ConvR8,
    #[strum(serialize = "conv.u4")]
    ConvU4,
    #[strum(serialize = "conv.u8")]
    ConvU8,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "ldstr")]
    Ldstr,
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "castclass")]
    Castclass,
    #[strum(serialize = "isinst")]
    Isinst,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "stsfld")]
    Stsfld,
    #[strum(serialize = "box")]
    Box,
    #[strum(serialize = "newarr")]
    Newarr,
    #[strum(serialize = "ldlen")]
    Ldlen,
    #[strum(serialize = "ldelem.ref")]
    LdelemRef,
    #[strum(serialize = "stelem.ref")]
    StelemRef,
    #[strum(serialize = "unbox.any")]
    UnboxAny,
    #[strum(serialize = "ldtoken")]
    Ldtoken,
    #[strum(serialize = "conv.u2")]
    ConvU2,
    #[strum(serialize = "conv.u1")]
    ConvU1,
    #[strum(serialize = "endfinally")]
    Endfinally,
    #[strum(serialize = "leave")]
    Leave,
    #[strum(serialize = "leave.s")]
    LeaveS,
    #[strum(serialize = "ceq")]
    Ceq,
    #[strum(serialize = "cgt")]
    Cgt,
    #[strum(serialize = "clt")]
    Clt,
    #[strum(serialize = "ldftn")]
    Ldftn,
    #[strum(serialize = "ldarg")]
    Ldarg,
    #[strum(serialize = "starg")]
    Starg,
    #[strum(serialize = "ldloc")]
    Ldloc,
    #[strum(serialize = "stloc")]
    Stloc,
    #[strum(serialize = "endfilter")]
    Endfilter,
    #[strum(serialize = "rethrow")]
    Rethrow,
}

impl OpCode {
    /// The instruction mnemonic, e.g. `ldarg.0`
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.into()
    }

    /// ECMA-335 encoding, two-byte opcodes carry the `0xFE` prefix in the high byte
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            OpCode::Nop => 0x00,
            OpCode::Ldarg0 => 0x02,
            OpCode::Ldarg1 => 0x03,
            OpCode::Ldarg2 => 0x04,
            OpCode::Ldarg3 => 0x05,
            OpCode::Ldloc0 => 0x06,
            OpCode::Ldloc1 => 0x07,
            OpCode::Ldloc2 => 0x08,
            OpCode::Ldloc3 => 0x09,
            OpCode::Stloc0 => 0x0A,
            OpCode::Stloc1 => 0x0B,
            OpCode::Stloc2 => 0x0C,
            OpCode::Stloc3 => 0x0D,
            OpCode::LdargS => 0x0E,
            OpCode::StargS => 0x10,
            OpCode::LdlocS => 0x11,
            OpCode::StlocS => 0x13,
            OpCode::Ldnull => 0x14,
            OpCode::LdcI4M1 => 0x15,
            OpCode::LdcI40 => 0x16,
            OpCode::LdcI41 => 0x17,
            OpCode::LdcI42 => 0x18,
            OpCode::LdcI43 => 0x19,
            OpCode::LdcI44 => 0x1A,
            OpCode::LdcI45 => 0x1B,
            OpCode::LdcI46 => 0x1C,
            OpCode::LdcI47 => 0x1D,
            OpCode::LdcI48 => 0x1E,
            OpCode::LdcI4S => 0x1F,
            OpCode::LdcI4 => 0x20,
            OpCode::LdcI8 => 0x21,
            OpCode::LdcR4 => 0x22,
            OpCode::LdcR8 => 0x23,
            OpCode::Dup => 0x25,
            OpCode::Pop => 0x26,
            OpCode::Call => 0x28,
            OpCode::Ret => 0x2A,
            OpCode::BrS => 0x2B,
            OpCode::BrfalseS => 0x2C,
            OpCode::BrtrueS => 0x2D,
            OpCode::BeqS => 0x2E,
            OpCode::BgeS => 0x2F,
            OpCode::BgtS => 0x30,
            OpCode::BleS => 0x31,
            OpCode::BltS => 0x32,
            OpCode::BneUnS => 0x33,
            OpCode::Br => 0x38,
            OpCode::Brfalse => 0x39,
            OpCode::Brtrue => 0x3A,
            OpCode::Beq => 0x3B,
            OpCode::Bge => 0x3C,
            OpCode::Bgt => 0x3D,
            OpCode::Ble => 0x3E,
            OpCode::Blt => 0x3F,
            OpCode::BneUn => 0x40,
            OpCode::Switch => 0x45,
            OpCode::Add => 0x58,
            OpCode::Sub => 0x59,
            OpCode::Mul => 0x5A,
            OpCode::Div => 0x5B,
            OpCode::Rem => 0x5D,
            OpCode::And => 0x5F,
            OpCode::Or => 0x60,
            OpCode::Xor => 0x61,
            OpCode::Shl => 0x62,
            OpCode::Shr => 0x63,
            OpCode::Neg => 0x65,
            OpCode::Not => 0x66,
            OpCode::ConvI1 => 0x67,
            OpCode::ConvI2 => 0x68,
            OpCode::ConvI4 => 0x69,
            OpCode::ConvI8 => 0x6A,
            OpCode::ConvR4 => 0x6B,
            OpCode::ConvR8 => 0x6C,
            OpCode::ConvU4 => 0x6D,
            OpCode::ConvU8 => 0x6E,
            OpCode::Callvirt => 0x6F,
            OpCode::Ldstr => 0x72,
            OpCode::Newobj => 0x73,
            OpCode::Castclass => 0x74,
            OpCode::Isinst => 0x75,
            OpCode::Throw => 0x7A,
            OpCode::Ldfld => 0x7B,
            OpCode::Stfld => 0x7D,
            OpCode::Ldsfld => 0x7E,
            OpCode::Stsfld => 0x80,
            OpCode::Box => 0x8C,
            OpCode::Newarr => 0x8D,
            OpCode::Ldlen => 0x8E,
            OpCode::LdelemRef => 0x9A,
            OpCode::StelemRef => 0xA2,
            OpCode::UnboxAny => 0xA5,
            OpCode::Ldtoken => 0xD0,
            OpCode::ConvU2 => 0xD1,
            OpCode::ConvU1 => 0xD2,
            OpCode::Endfinally => 0xDC,
            OpCode::Leave => 0xDD,
            OpCode::LeaveS => 0xDE,
            OpCode::Ceq => 0xFE01,
            OpCode::Cgt => 0xFE02,
            OpCode::Clt => 0xFE04,
            OpCode::Ldftn => 0xFE06,
            OpCode::Ldarg => 0xFE09,
            OpCode::Starg => 0xFE0B,
            OpCode::Ldloc => 0xFE0C,
            OpCode::Stloc => 0xFE0E,
            OpCode::Endfilter => 0xFE11,
            OpCode::Rethrow => 0xFE1A,
        }
    }

    /// Kind of operand the opcode takes
    #[must_use]
    pub fn operand_type(&self) -> OperandType {
        match self {
            OpCode::LdcI4S => OperandType::Int8,
            OpCode::LdcI4 => OperandType::Int32,
            OpCode::LdcI8 => OperandType::Int64,
            OpCode::LdcR4 => OperandType::Float32,
            OpCode::LdcR8 => OperandType::Float64,
            OpCode::Ldstr => OperandType::String,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj | OpCode::Ldftn => {
                OperandType::Method
            }
            OpCode::Ldfld | OpCode::Stfld | OpCode::Ldsfld | OpCode::Stsfld => {
                OperandType::Field
            }
            OpCode::Castclass
            | OpCode::Isinst
            | OpCode::Box
            | OpCode::Newarr
            | OpCode::UnboxAny => OperandType::Type,
            OpCode::Ldtoken => OperandType::Token,
            OpCode::LdlocS | OpCode::StlocS | OpCode::Ldloc | OpCode::Stloc => OperandType::Local,
            OpCode::LdargS | OpCode::StargS | OpCode::Ldarg | OpCode::Starg => {
                OperandType::Argument
            }
            OpCode::Switch => OperandType::Switch,
            op if op.is_branch() => OperandType::Target,
            _ => OperandType::None,
        }
    }

    /// True for opcodes with a single branch target operand, including `leave`
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
        )
    }

    /// Control flow classification
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        match self {
            OpCode::BrS | OpCode::Br => FlowType::UnconditionalBranch,
            OpCode::BrfalseS
            | OpCode::BrtrueS
            | OpCode::BeqS
            | OpCode::BgeS
            | OpCode::BgtS
            | OpCode::BleS
            | OpCode::BltS
            | OpCode::BneUnS
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn => FlowType::ConditionalBranch,
            OpCode::Switch => FlowType::Switch,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => FlowType::Call,
            OpCode::Ret => FlowType::Return,
            OpCode::Throw | OpCode::Rethrow => FlowType::Throw,
            OpCode::Endfinally | OpCode::Endfilter => FlowType::EndFinally,
            OpCode::Leave | OpCode::LeaveS => FlowType::Leave,
            _ => FlowType::Sequential,
        }
    }

    /// Fixed stack effect, `None` for signature-dependent opcodes
    #[must_use]
    pub fn stack_behavior(&self) -> Option<StackBehavior> {
        let behavior = match self {
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj | OpCode::Ret => return None,
            OpCode::Nop
            | OpCode::BrS
            | OpCode::Br
            | OpCode::Leave
            | OpCode::LeaveS
            | OpCode::Endfinally
            | OpCode::Rethrow => StackBehavior::new(0, 0),
            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::LdargS
            | OpCode::Ldarg
            | OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdlocS
            | OpCode::Ldloc
            | OpCode::Ldnull
            | OpCode::LdcI4M1
            | OpCode::LdcI40
            | OpCode::LdcI41
            | OpCode::LdcI42
            | OpCode::LdcI43
            | OpCode::LdcI44
            | OpCode::LdcI45
            | OpCode::LdcI46
            | OpCode::LdcI47
            | OpCode::LdcI48
            | OpCode::LdcI4S
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::Ldstr
            | OpCode::Ldsfld
            | OpCode::Ldtoken
            | OpCode::Ldftn => StackBehavior::new(0, 1),
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StlocS
            | OpCode::Stloc
            | OpCode::StargS
            | OpCode::Starg
            | OpCode::Pop
            | OpCode::BrfalseS
            | OpCode::BrtrueS
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Switch
            | OpCode::Throw
            | OpCode::Stsfld
            | OpCode::Endfilter => StackBehavior::new(1, 0),
            OpCode::Dup => StackBehavior::new(1, 2),
            OpCode::BeqS
            | OpCode::BgeS
            | OpCode::BgtS
            | OpCode::BleS
            | OpCode::BltS
            | OpCode::BneUnS
            | OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn
            | OpCode::Stfld => StackBehavior::new(2, 0),
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::Clt
            | OpCode::LdelemRef => StackBehavior::new(2, 1),
            OpCode::Neg
            | OpCode::Not
            | OpCode::ConvI1
            | OpCode::ConvI2
            | OpCode::ConvI4
            | OpCode::ConvI8
            | OpCode::ConvR4
            | OpCode::ConvR8
            | OpCode::ConvU1
            | OpCode::ConvU2
            | OpCode::ConvU4
            | OpCode::ConvU8
            | OpCode::Castclass
            | OpCode::Isinst
            | OpCode::Ldfld
            | OpCode::Box
            | OpCode::Newarr
            | OpCode::Ldlen
            | OpCode::UnboxAny => StackBehavior::new(1, 1),
            OpCode::StelemRef => StackBehavior::new(3, 0),
        };
        Some(behavior)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8(i8),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// String literal
    String(String),
    /// Type reference
    Type(TypeSignature),
    /// Method definition or member reference
    Method(Token),
    /// Field definition or member reference
    Field(Token),
    /// Local variable slot
    Local(u16),
    /// Argument slot, slot 0 is `this` for instance methods
    Argument(u16),
    /// Branch target
    Target(InstrId),
    /// Switch targets
    Switch(Vec<InstrId>),
}

impl Operand {
    /// Instructions this operand transfers control to
    #[must_use]
    pub fn targets(&self) -> &[InstrId] {
        match self {
            Operand::Target(target) => std::slice::from_ref(target),
            Operand::Switch(targets) => targets,
            _ => &[],
        }
    }

    /// True if the operand fits the expected operand kind
    #[must_use]
    pub fn matches(&self, expected: OperandType) -> bool {
        matches!(
            (self, expected),
            (Operand::None, OperandType::None)
                | (Operand::Int8(_), OperandType::Int8)
                | (Operand::Int32(_), OperandType::Int32)
                | (Operand::Int64(_), OperandType::Int64)
                | (Operand::Float32(_), OperandType::Float32)
                | (Operand::Float64(_), OperandType::Float64)
                | (Operand::String(_), OperandType::String)
                | (Operand::Type(_), OperandType::Type | OperandType::Token)
                | (Operand::Method(_), OperandType::Method | OperandType::Token)
                | (Operand::Field(_), OperandType::Field | OperandType::Token)
                | (Operand::Local(_), OperandType::Local)
                | (Operand::Argument(_), OperandType::Argument)
                | (Operand::Target(_), OperandType::Target)
                | (Operand::Switch(_), OperandType::Switch)
        )
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int8(value) => write!(f, "{value}"),
            Operand::Int32(value) => write!(f, "{value}"),
            Operand::Int64(value) => write!(f, "{value}"),
            Operand::Float32(value) => write!(f, "{value}"),
            Operand::Float64(value) => write!(f, "{value}"),
            Operand::String(value) => write!(f, "{value:?}"),
            Operand::Type(signature) => write!(f, "{signature}"),
            Operand::Method(token) | Operand::Field(token) => write!(f, "{token}"),
            Operand::Local(index) => write!(f, "V_{index}"),
            Operand::Argument(index) => write!(f, "A_{index}"),
            Operand::Target(target) => write!(f, "{target}"),
            Operand::Switch(targets) => {
                f.write_str("(")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{target}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A single instruction of a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Identity within the owning body
    pub id: InstrId,
    /// Operation code
    pub opcode: OpCode,
    /// Operand, its kind matches [`OpCode::operand_type`]
    pub operand: Operand,
}

impl Instruction {
    /// Control flow classification of the opcode
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Copies the instruction under a new identity, keeping opcode and operand.
    ///
    /// Branch operands still name instructions of the source body and must be remapped
    /// by the caller.
    #[must_use]
    pub fn copy_as(&self, id: InstrId) -> Instruction {
        Instruction {
            id,
            opcode: self.opcode,
            operand: self.operand.clone(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.opcode)?;
        if !matches!(self.operand, Operand::None) {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

//! Emulation error type.

use thiserror::Error;

use crate::{assembly::InstrId, emulation::HeapRef};

/// Failure while executing code in the emulator.
///
/// [`EmulationError::ManagedException`] is special: it is a managed exception in flight.
/// The interpreter routes it through the exception handlers of every frame it unwinds
/// and only reports it to the caller when no handler catches it. Runtime hooks raise
/// managed exceptions the same way.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmulationError {
    /// A managed exception that no handler caught
    #[error("Unhandled {type_name}: {message}")]
    ManagedException {
        /// Runtime full name of the exception type
        type_name: String,
        /// Value of the exception's message
        message: String,
        /// The exception object
        exception: HeapRef,
    },

    /// A method token or name could not be resolved to a definition
    #[error("Method not found - {0}")]
    MethodNotFound(String),

    /// A bodiless method has no runtime implementation registered
    #[error("No runtime implementation for {0}")]
    MissingNative(String),

    /// A field token could not be resolved to a definition
    #[error("Field not found - {0}")]
    FieldNotFound(String),

    /// A type token or name could not be resolved to a definition
    #[error("Type not found - {0}")]
    TypeNotFound(String),

    /// An instruction popped from an empty evaluation stack
    #[error("Evaluation stack underflow in {0}")]
    StackUnderflow(String),

    /// An operand had the wrong kind for the instruction
    #[error("Type mismatch - expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected kind
        expected: &'static str,
        /// Actual kind
        found: &'static str,
    },

    /// A method was called with the wrong number of arguments
    #[error("{method} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        /// The called method
        method: String,
        /// Declared argument count, `this` included
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// A heap handle does not name a live object
    #[error("Invalid heap reference {0}")]
    InvalidHeapRef(HeapRef),

    /// The heap holds as many objects as allowed
    #[error("Heap limit of {0} objects exceeded")]
    HeapLimitExceeded(usize),

    /// Calls nested deeper than allowed
    #[error("Call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    /// More instructions executed than allowed
    #[error("Instruction limit of {0} exceeded")]
    InstructionLimitExceeded(u64),

    /// A branch or region marker names an instruction outside the body
    #[error("Invalid branch target {0}")]
    InvalidBranchTarget(InstrId),

    /// A method body cannot be executed as written
    #[error("Malformed method body - {0}")]
    InvalidBody(String),

    /// The construct is outside what the emulator implements
    #[error("{0} is not supported by the emulator")]
    Unsupported(String),
}

impl EmulationError {
    /// True for a managed exception in flight
    #[must_use]
    pub fn is_managed(&self) -> bool {
        matches!(self, EmulationError::ManagedException { .. })
    }

    /// The exception object of a managed exception
    #[must_use]
    pub fn exception(&self) -> Option<HeapRef> {
        match self {
            EmulationError::ManagedException { exception, .. } => Some(*exception),
            _ => None,
        }
    }
}

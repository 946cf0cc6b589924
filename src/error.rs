use thiserror::Error;

use crate::{assembly::InstrId, emulation::EmulationError, metadata::token::Token};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Weaving distinguishes two classes of failure. A [`Error::Setup`] failure means the pass
/// could not start and the module is left untouched. Every other variant, when raised while
/// a member is processed, is caught by the driver, reported on the diagnostics channel and
/// confined to that member.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::Malformed`] - A method body or region table violates an IL invariant
/// - [`Error::UnmappedInstruction`] - A cloned operand or region points outside the body
/// - [`Error::InvalidRegion`] - An exception region is not well-formed
/// - [`Error::StackImbalance`] - Evaluation stack underflow or inconsistent merge depth
///
/// ## Metadata Errors
/// - [`Error::TypeNotFound`] - Token does not name a type of the module
/// - [`Error::MemberNotFound`] - Token does not name a method, field or property
/// - [`Error::TypeError`] - General type system failure
/// - [`Error::RecursionLimit`] - Base-type chain too deep or cyclic
///
/// ## Weaving Errors
/// - [`Error::Setup`] - A required well-known reference could not be resolved
/// - [`Error::Weave`] - Weaving a single member failed
/// - [`Error::UnsupportedAttributeValue`] - Aspect property value cannot be loaded as a literal
///
/// ## External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Config`] - Invalid weaver configuration
/// - [`Error::Emulation`] - Failure while executing woven code in the emulator
///
/// # Examples
///
/// ```rust
/// use dotweave::{prelude::*, Error};
///
/// let mut module = Module::new("Empty");
/// let resolver = DefaultAssemblyResolver::new();
/// let weaver = Weaver::new(WeaverConfig::default(), &resolver);
///
/// match weaver.weave(&mut module) {
///     Ok(report) => println!("{report}"),
///     Err(Error::Setup(message)) => eprintln!("weaving skipped: {message}"),
///     Err(e) => eprintln!("weaving failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A method body or exception region table is structurally invalid.
    ///
    /// The error includes the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This construct is not supported by the weaver.
    #[error("This construct is not supported - {0}")]
    NotSupported(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// Failed to find a type definition or reference.
    ///
    /// The associated [`Token`] identifies which type was not found.
    #[error("Failed to find type - {0}")]
    TypeNotFound(Token),

    /// Failed to find a method, field, property or member reference.
    #[error("Failed to find member - {0}")]
    MemberNotFound(Token),

    /// General type system error.
    #[error("{0}")]
    TypeError(String),

    /// Recursion limit reached.
    ///
    /// Walking a base-type chain stops after a fixed depth so a cyclic or
    /// corrupt hierarchy cannot hang the pass.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// A well-known type, constructor or method required by the generated code is missing.
    ///
    /// Raised before any member is touched, the module is unmodified.
    #[error("Weaver setup failed - {0}")]
    Setup(String),

    /// Weaving a single member failed.
    #[error("Failed to weave {member} - {message}")]
    Weave {
        /// Fully qualified name of the member
        member: String,
        /// What went wrong
        message: String,
    },

    /// An aspect property value has no literal-load encoding.
    ///
    /// Type, enum, char and array values cannot be assigned by the generated code.
    #[error("Aspect property '{property}' has an unsupported value kind ({kind})")]
    UnsupportedAttributeValue {
        /// Name of the aspect property
        property: String,
        /// Kind of the rejected value
        kind: &'static str,
    },

    /// A branch operand or region marker refers to an instruction missing from the body.
    #[error("Instruction {0} has no counterpart in the target body")]
    UnmappedInstruction(InstrId),

    /// An exception region is not well-formed.
    #[error("Invalid exception region - {0}")]
    InvalidRegion(String),

    /// The evaluation stack underflows or reaches a merge point with different depths.
    #[error("Stack imbalance at {at}: {message}")]
    StackImbalance {
        /// Instruction where the problem was detected
        at: InstrId,
        /// Description of the imbalance
        message: String,
    },

    /// Invalid weaver configuration.
    #[error("Invalid weaver configuration - {0}")]
    Config(String),

    /// Execution of woven code in the emulator failed.
    #[error("{0}")]
    Emulation(#[from] EmulationError),
}

impl Error {
    /// Wraps this error as a [`Error::Weave`] failure of the named member.
    ///
    /// Errors that already carry member context are returned unchanged.
    #[must_use]
    pub fn for_member(self, member: impl Into<String>) -> Self {
        match self {
            Error::Weave { .. } | Error::Setup(_) => self,
            other => Error::Weave {
                member: member.into(),
                message: other.to_string(),
            },
        }
    }
}

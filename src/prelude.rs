//! # dotweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! dotweave library: the module model, the builders, the weaver and its configuration.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotweave operations
pub use crate::Error;

/// The result type used throughout dotweave
pub use crate::Result;

// ================================================================================================
// Module Model
// ================================================================================================

/// The module container
pub use crate::metadata::module::Module;

/// Metadata token type for referencing definitions and references
pub use crate::metadata::token::Token;

/// Type and method signatures
pub use crate::metadata::signatures::{SignatureMethod, TypeSignature};

/// Definitions, references and assembly resolution
pub use crate::metadata::typesystem::{
    AssemblyResolver, DefaultAssemblyResolver, FieldDef, MemberRefSignature, PropertyDef,
    TypeDef, TypeRef,
};

/// Method definitions and bodies
pub use crate::metadata::method::{ExceptionRegion, MethodBody, MethodDef, RegionEnd};

/// Custom attributes
pub use crate::metadata::customattributes::{
    CustomAttribute, CustomAttributeArgument, CustomAttributeNamedArgument,
};

/// Fluent builders
pub use crate::metadata::builders::{
    FieldBuilder, MethodDefBuilder, PropertyBuilder, TypeDefBuilder,
};

// ================================================================================================
// Instructions
// ================================================================================================

/// CIL instructions and the assembler
pub use crate::assembly::{InstrId, Instruction, InstructionAssembler, Label, OpCode, Operand};

// ================================================================================================
// Weaving
// ================================================================================================

/// Weaver configuration
pub use crate::config::{CloneSuffixes, OriginalMethodLookup, WeaverConfig};

/// The weaver and its report
pub use crate::weaver::{WeaveReport, Weaver};

/// Diagnostics emitted while weaving
pub use crate::weaver::diagnostics::{
    Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics,
};

// ================================================================================================
// Emulation
// ================================================================================================

/// Execution of woven code
pub use crate::emulation::{
    EmValue, EmulationError, EmulationLimits, Emulator, Hook, HookManager, HookPriority,
    PreHookResult,
};

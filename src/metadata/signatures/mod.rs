//! Type and member signatures.
//!
//! Signatures describe the types a method takes and returns, the type of a field, and
//! the types of local variable slots. The weaver reads them to decide where values need
//! boxing, copies them verbatim when cloning a method, and translates the tokens inside
//! them when importing members from referenced assemblies.
//!
//! # Key Types
//!
//! - [`TypeSignature`] - A single type
//! - [`SignatureMethod`] - Parameters and return type of a method
//! - [`SignatureField`] - Type of a field

mod types;

pub use types::*;

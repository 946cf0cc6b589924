//! In-memory representation of a .NET module.
//!
//! This module holds everything the weaver reads and rewrites: the type and member
//! tables, signatures, custom attributes, method bodies with their exception regions and
//! the references a module holds to other assemblies.
//!
//! # Key Components
//!
//! - [`module::Module`] - Owns all tables of one assembly
//! - [`token`] - Metadata table row references used throughout .NET
//! - [`typesystem`] - Type definitions, references and cross-module resolution
//! - [`method`] - Method definitions, bodies and exception regions
//! - [`signatures`] - Type and method signatures
//! - [`customattributes`] - Attribute instances and their argument values
//! - [`builders`] - Fluent construction of types and members
//!
//! # Examples
//!
//! ```rust
//! use dotweave::metadata::{builders::TypeDefBuilder, module::Module};
//!
//! let mut module = Module::new("App");
//! let token = TypeDefBuilder::new("Demo", "Calculator").public_class().build(&mut module)?;
//! assert_eq!(module.type_name(token)?, "Demo.Calculator");
//! # Ok::<(), dotweave::Error>(())
//! ```

/// Fluent builders for types and members
pub mod builders;
/// Implementation of custom attribute representation
pub mod customattributes;
/// Import of foreign types and members as references
mod import;
/// Implementation of method definitions and bodies
pub mod method;
/// The module container
pub mod module;
/// Implementation of method and type signatures
pub mod signatures;
/// Commonly used metadata token type
pub mod token;
/// Implementation of the .NET type system
pub mod typesystem;

//! The emulated runtime library.
//!
//! Woven code calls into two libraries: the core library (`System.Runtime`) for
//! reflection, delegates and exceptions, and the aspect library (`DotNetAspects`) for
//! the aspect base classes and their argument types. Both are built here as metadata
//! modules. The aspect library is ordinary IL, the bodiless members of the core library
//! are implemented by native hooks.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | `hook` | The hook system natives and user hooks are registered with |
//! | `bcl` | Natives of the core library |
//! | `library` | The two reference modules |

pub(crate) mod bcl;
pub mod hook;
mod library;

pub(crate) use library::EXCEPTION_MESSAGE_FIELD;
pub use library::{aspect_library, system_runtime, ASPECTS_ASSEMBLY, SYSTEM_RUNTIME};

use crate::{metadata::typesystem::DefaultAssemblyResolver, Result};

/// Resolver holding the core library and the aspect library.
///
/// This is what a module that references `DotNetAspects` is woven and emulated against.
///
/// # Errors
///
/// Returns an error if one of the reference modules cannot be built.
pub fn reference_resolver() -> Result<DefaultAssemblyResolver> {
    Ok(DefaultAssemblyResolver::new()
        .with(system_runtime()?)
        .with(aspect_library()?))
}

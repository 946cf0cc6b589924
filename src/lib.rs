// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # dotweave
//!
//! A build-time aspect weaver for .NET modules, written in pure Rust.
//!
//! `dotweave` finds aspect attributes on types, methods and properties and rewrites the
//! decorated members so that the aspect runs around them: interception aspects take over
//! the call and decide when the original body runs, boundary aspects get entry, success,
//! exception and exit notifications, location aspects intercept property reads and
//! writes. The rewritten IL references only the aspect library and the core library, so
//! the woven module needs no weaver at run time.
//!
//! ## Features
//!
//! - **Three aspect kinds** - method interception, method boundary and location interception
//! - **Aspect inheritance** - aspects declared on a type or its bases apply to every member
//! - **Transactional weaving** - a member that fails to weave is rolled back, the pass continues
//! - **Verification** - every generated body is validated and its stack depth recomputed
//! - **Emulation** - woven code can be executed against the reference libraries without a runtime
//!
//! ## Quick Start
//!
//! ```rust
//! use dotweave::{emulation::runtime::reference_resolver, prelude::*};
//!
//! let resolver = reference_resolver()?;
//! let mut module = Module::new("App");
//! module.add_assembly_ref("DotNetAspects");
//!
//! let report = Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;
//! println!("{report}");
//! # Ok::<(), dotweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The in-memory module model: types, methods, fields, properties,
//!   signatures, custom attributes and builders for all of them
//! - [`assembly`] - CIL instructions and the [`assembly::InstructionAssembler`]
//! - [`weaver`] - Aspect discovery, planning and the three weavers
//! - [`config`] - [`config::WeaverConfig`] and its XML form
//! - [`emulation`] - A CIL interpreter with the reference libraries, used to run woven code
//! - [`Error`] and [`Result`] - Error handling

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust
/// use dotweave::prelude::*;
///
/// let mut module = Module::new("App");
/// let token = TypeDefBuilder::new("Demo", "Calculator")
///     .public_class()
///     .build(&mut module)?;
/// assert_eq!(module.type_name(token)?, "Demo.Calculator");
/// # Ok::<(), dotweave::Error>(())
/// ```
pub mod prelude;

/// CIL instructions and the instruction assembler.
///
/// Method bodies are sequences of [`assembly::Instruction`]s addressed by stable
/// [`assembly::InstrId`]s, so that branch targets and exception regions survive
/// insertions. The [`assembly::InstructionAssembler`] writes bodies with labels.
pub mod assembly;

/// The in-memory module model.
///
/// # Key Components
///
/// - [`metadata::module::Module`] - Owner of all definitions and references
/// - [`metadata::builders`] - Fluent builders for types, methods, fields and properties
/// - [`metadata::method`] - Method definitions, bodies and exception regions
/// - [`metadata::signatures`] - Type and method signatures
/// - [`metadata::typesystem`] - Type definitions, references and assembly resolution
/// - [`metadata::customattributes`] - Custom attributes and their arguments
pub mod metadata;

/// Weaver configuration.
pub mod config;

/// The aspect weaver.
pub mod weaver;

/// CIL emulation of woven modules.
pub mod emulation;

/// `dotweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotweave` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use dotweave::{prelude::*, Error};
///
/// let module = Module::new("App");
/// match module.type_def(Token::new(0x0200_0001)) {
///     Ok(def) => println!("found {}", def.name),
///     Err(Error::TypeNotFound(token)) => println!("no type {token}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;

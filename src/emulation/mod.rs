//! CIL emulation of woven modules.
//!
//! Weaving rewrites method bodies. The emulator runs the result, so a woven module can
//! be checked end to end without a .NET runtime: the aspect's hooks fire in order,
//! arguments reach the original body, return values and exceptions come back out.
//!
//! # Architecture
//!
//! | Module | Description |
//! |--------|-------------|
//! | `engine` | The [`Emulator`]: interpreter, call resolution, limits |
//! | `memory` | The [`ManagedHeap`] and its [`HeapObject`]s |
//! | `value` | [`EmValue`] slots and the [`Member`] / [`RuntimeType`] identities |
//! | [`runtime`] | The reference libraries, their natives and the hook system |
//!
//! # Example
//!
//! ```rust,ignore
//! use dotweave::emulation::{runtime::reference_resolver, EmValue, Emulator};
//!
//! let resolver = reference_resolver()?;
//! Weaver::new(WeaverConfig::default(), &resolver).weave(&mut module)?;
//!
//! let mut emulator = Emulator::new(&module, &resolver);
//! let calculator = emulator.new_object("Demo.Calculator", Vec::new())?;
//! let sum = emulator.invoke("Demo.Calculator", "Add", vec![calculator, EmValue::I32(2), EmValue::I32(3)])?;
//! ```
//!
//! # Hooks
//!
//! Every call passes through a [`HookManager`]. Hooks registered by the caller observe or
//! replace methods, which is how tests count aspect invocations. The natives of the core
//! library are hooks too, at [`HookPriority::RUNTIME`].

mod engine;
mod memory;
pub mod runtime;
mod value;

pub use engine::{EmulationError, EmulationLimits, Emulator};
pub use memory::{HeapObject, ManagedHeap, DEFAULT_HEAP_LIMIT};
pub use runtime::hook::{
    Hook, HookContext, HookManager, HookMatcher, HookOutcome, HookPriority, NameMatcher,
    PostHookFn, PostHookResult, PreHookFn, PreHookResult, RuntimeMatcher, SignatureMatcher,
};
pub use value::{EmValue, HeapRef, Member, RuntimeType};

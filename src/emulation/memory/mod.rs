//! Memory model of the emulator.
//!
//! The emulator keeps all reference type instances on a [`ManagedHeap`]. Value types
//! live inline in [`crate::emulation::EmValue`] slots, static fields are held by the
//! emulator itself.

mod heap;

pub use heap::{HeapObject, ManagedHeap, DEFAULT_HEAP_LIMIT};

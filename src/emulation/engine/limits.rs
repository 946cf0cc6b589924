//! Resource limits of an emulation run.

use crate::emulation::memory::DEFAULT_HEAP_LIMIT;

/// Execution limits controlling resource usage.
///
/// Emulated code is arbitrary user code, a runaway loop or unbounded recursion must end
/// in an error rather than hang the host.
///
/// ```rust
/// use dotweave::emulation::EmulationLimits;
///
/// let limits = EmulationLimits::new()
///     .with_max_instructions(1_000_000)
///     .with_max_call_depth(64);
/// assert_eq!(limits.max_call_depth, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulationLimits {
    /// Maximum number of instructions per emulator (default: 10 million)
    pub max_instructions: u64,

    /// Maximum nesting of calls (default: 256)
    pub max_call_depth: usize,

    /// Maximum number of live heap objects
    pub max_heap_objects: usize,
}

impl Default for EmulationLimits {
    fn default() -> Self {
        EmulationLimits {
            max_instructions: 10_000_000,
            max_call_depth: 256,
            max_heap_objects: DEFAULT_HEAP_LIMIT,
        }
    }
}

impl EmulationLimits {
    /// Creates the default limits
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instruction limit
    #[must_use]
    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.max_instructions = max;
        self
    }

    /// Sets the call depth limit
    #[must_use]
    pub fn with_max_call_depth(mut self, max: usize) -> Self {
        self.max_call_depth = max;
        self
    }

    /// Sets the heap object limit
    #[must_use]
    pub fn with_max_heap_objects(mut self, max: usize) -> Self {
        self.max_heap_objects = max;
        self
    }
}

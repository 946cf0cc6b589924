//! Core types for the hook system.
//!
//! - [`HookPriority`]: Controls the order in which hooks are evaluated
//! - [`HookContext`]: Information about the method call being intercepted
//! - [`PreHookResult`]: Result of pre-hook execution (continue or bypass)
//! - [`PostHookResult`]: Result of post-hook execution (keep or replace)
//! - [`PreHookFn`]: Type alias for pre-hook closures
//! - [`PostHookFn`]: Type alias for post-hook closures

use std::sync::Arc;

use crate::emulation::{EmValue, EmulationError, Emulator, HeapRef, Member};

/// Priority level for hooks, controlling evaluation order.
///
/// Higher priority hooks are evaluated first. When multiple hooks could match
/// a method call, only the highest priority matching hook is executed. Among hooks
/// of equal priority the one registered last wins.
///
/// # Predefined Priorities
///
/// | Constant | Value | Use Case |
/// |----------|-------|----------|
/// | [`HIGHEST`](Self::HIGHEST) | 1000 | Override everything |
/// | [`HIGH`](Self::HIGH) | 500 | Specific patterns |
/// | [`NORMAL`](Self::NORMAL) | 0 | Default handlers |
/// | [`LOW`](Self::LOW) | -500 | Fallback handlers |
/// | [`RUNTIME`](Self::RUNTIME) | -1000 | Built-in runtime library methods |
///
/// ```rust
/// use dotweave::emulation::HookPriority;
///
/// assert!(HookPriority::HIGHEST > HookPriority::HIGH);
/// assert!(HookPriority(750) > HookPriority::HIGH);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookPriority(pub i32);

impl HookPriority {
    /// Highest priority - checked first (value: 1000).
    pub const HIGHEST: Self = Self(1000);

    /// High priority (value: 500).
    pub const HIGH: Self = Self(500);

    /// Normal priority - default (value: 0).
    pub const NORMAL: Self = Self(0);

    /// Low priority (value: -500).
    pub const LOW: Self = Self(-500);

    /// Priority of the built-in implementations of runtime methods (value: -1000).
    ///
    /// Any user hook on the same method takes precedence.
    pub const RUNTIME: Self = Self(-1000);
}

impl Default for HookPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Context passed to hooks during execution.
///
/// The names are borrowed from the module defining the called method, the receiver and
/// arguments are the values popped from the caller's evaluation stack.
///
/// ```rust,ignore
/// fn trace<'m>(ctx: &HookContext<'m>, emulator: &mut Emulator<'m>) -> PreHookResult<'m> {
///     println!("{}.{}::{} with {} args", ctx.namespace, ctx.type_name, ctx.method_name, ctx.args.len());
///     PreHookResult::Continue
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HookContext<'m> {
    /// The called method definition
    pub method: Member<'m>,

    /// Namespace of the declaring type, empty for nested types
    pub namespace: &'m str,

    /// Simple name of the declaring type
    pub type_name: &'m str,

    /// Name of the method
    pub method_name: &'m str,

    /// Receiver for instance methods
    pub this: Option<EmValue<'m>>,

    /// Declared arguments, `this` excluded
    pub args: Vec<EmValue<'m>>,
}

impl<'m> HookContext<'m> {
    /// Argument at `index`
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::ArgumentCount`] if the call has fewer arguments.
    pub fn arg(&self, index: usize) -> Result<&EmValue<'m>, EmulationError> {
        self.args.get(index).ok_or_else(|| EmulationError::ArgumentCount {
            method: self.method.to_string(),
            expected: index + 1,
            actual: self.args.len(),
        })
    }

    /// The receiver as an object reference, `None` for static calls or a `null` receiver
    #[must_use]
    pub fn this_object(&self) -> Option<HeapRef> {
        self.this.as_ref().and_then(EmValue::as_object)
    }
}

/// Result of executing a pre-hook.
///
/// ```rust
/// use dotweave::emulation::{EmValue, PreHookResult};
///
/// // Continue to let the original method run
/// let _ = PreHookResult::Continue;
///
/// // Bypass the original and return a custom value
/// let _ = PreHookResult::Bypass(Some(EmValue::I32(42)));
///
/// // Bypass with void return
/// let _ = PreHookResult::Bypass(None);
/// ```
#[derive(Debug)]
pub enum PreHookResult<'m> {
    /// Continue with the original method execution.
    Continue,

    /// Bypass the original method and return this value directly.
    ///
    /// Post-hooks are not called. `None` stands for a void return.
    Bypass(Option<EmValue<'m>>),

    /// Fail the call.
    ///
    /// A [`EmulationError::ManagedException`] is raised in the caller and can be caught
    /// by emulated handlers.
    Error(EmulationError),
}

/// Result of executing a post-hook.
#[derive(Debug)]
pub enum PostHookResult<'m> {
    /// Keep the original return value unchanged.
    Keep,

    /// Replace the return value with a new value.
    Replace(Option<EmValue<'m>>),

    /// Fail the call after the original ran.
    Error(EmulationError),
}

/// Type alias for pre-hook functions.
///
/// Handlers are generic over the emulator lifetime, so one registered hook serves
/// every emulator the [`HookManager`](super::HookManager) is shared with.
pub type PreHookFn = Arc<
    dyn for<'m> Fn(&HookContext<'m>, &mut Emulator<'m>) -> PreHookResult<'m> + Send + Sync,
>;

/// Type alias for post-hook functions.
///
/// Post-hooks receive the original return value, `None` for void methods.
pub type PostHookFn = Arc<
    dyn for<'m> Fn(&HookContext<'m>, &mut Emulator<'m>, Option<&EmValue<'m>>) -> PostHookResult<'m>
        + Send
        + Sync,
>;

/// Outcome of hook execution via [`HookManager::execute`](super::HookManager::execute).
#[derive(Debug)]
pub enum HookOutcome<'m> {
    /// No hook matched this method call.
    NoMatch,

    /// A hook handled the method call. `None` indicates a void return.
    Handled(Option<EmValue<'m>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{module::Module, token::Token};

    #[test]
    fn test_hook_priority_ordering() {
        assert!(HookPriority::HIGHEST > HookPriority::HIGH);
        assert!(HookPriority::HIGH > HookPriority::NORMAL);
        assert!(HookPriority::NORMAL > HookPriority::LOW);
        assert!(HookPriority::LOW > HookPriority::RUNTIME);
        assert_eq!(HookPriority::default(), HookPriority::NORMAL);
    }

    #[test]
    fn test_context_arguments() {
        let module = Module::new("Lib");
        let ctx = HookContext {
            method: Member::new(&module, Token::new(0x0600_0001)),
            namespace: "System",
            type_name: "String",
            method_name: "Concat",
            this: None,
            args: vec![EmValue::I32(1)],
        };

        assert_eq!(ctx.arg(0), Ok(&EmValue::I32(1)));
        assert!(matches!(
            ctx.arg(1),
            Err(EmulationError::ArgumentCount { expected: 2, actual: 1, .. })
        ));
        assert_eq!(ctx.this_object(), None);
    }
}

//! Hook registration and dispatch.

use std::fmt;

use crate::emulation::{
    runtime::hook::{
        core::Hook,
        types::{HookContext, HookOutcome, PostHookResult, PreHookResult},
    },
    EmValue, EmulationError, Emulator,
};

/// Registry of hooks, consulted on every call the emulator makes.
///
/// A manager is immutable once shared. Put it in an `Arc` and hand it to as many
/// emulators as needed, across threads.
///
/// ```rust
/// use dotweave::emulation::{EmValue, Hook, HookManager, HookPriority, PreHookResult};
///
/// let mut manager = HookManager::new();
/// manager.register(
///     Hook::new("low-priority")
///         .with_priority(HookPriority::LOW)
///         .match_method_name("Decrypt")
///         .pre(|_, _| PreHookResult::Continue),
/// );
/// manager.register(
///     Hook::new("high-priority")
///         .with_priority(HookPriority::HIGH)
///         .match_method_name("Decrypt")
///         .pre(|_, _| PreHookResult::Bypass(Some(EmValue::I32(42)))),
/// );
/// assert_eq!(manager.len(), 2);
/// assert_eq!(manager.iter().next().map(|h| h.name()), Some("high-priority"));
/// ```
#[derive(Default)]
pub struct HookManager {
    // Ascending priority, registration order within one priority
    hooks: Vec<Hook>,
}

impl HookManager {
    /// Creates a new, empty hook manager.
    ///
    /// An emulator running with an empty manager can only execute methods that have
    /// IL bodies. [`HookManager::with_runtime`] adds the built-in runtime methods.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager holding the implementations of the emulated runtime library
    #[must_use]
    pub fn with_runtime() -> Self {
        let mut manager = Self::new();
        crate::emulation::runtime::bcl::register(&mut manager);
        manager
    }

    /// Registers a hook.
    pub fn register(&mut self, hook: Hook) {
        self.hooks.push(hook);
        self.hooks.sort_by_key(Hook::priority);
    }

    /// Finds the hook handling a call: the highest priority match, and among equal
    /// priorities the one registered last.
    #[must_use]
    pub fn find_matching(&self, context: &HookContext<'_>) -> Option<&Hook> {
        self.hooks.iter().rev().find(|h| h.matches(context))
    }

    /// Executes a method call through the hook system.
    ///
    /// 1. Find the matching hook
    /// 2. Execute the pre-hook
    /// 3. If the pre-hook continues, execute the original method via the callback
    /// 4. Execute the post-hook on the result
    ///
    /// # Errors
    ///
    /// Returns the error of a failing pre-hook, original method or post-hook.
    pub fn execute<'m, F>(
        &self,
        context: &HookContext<'m>,
        emulator: &mut Emulator<'m>,
        execute_original: F,
    ) -> Result<HookOutcome<'m>, EmulationError>
    where
        F: FnOnce(&mut Emulator<'m>) -> Result<Option<EmValue<'m>>, EmulationError>,
    {
        let Some(hook) = self.find_matching(context) else {
            return Ok(HookOutcome::NoMatch);
        };

        match hook.execute_pre(context, emulator) {
            Some(PreHookResult::Bypass(value)) => return Ok(HookOutcome::Handled(value)),
            Some(PreHookResult::Error(error)) => return Err(error),
            Some(PreHookResult::Continue) | None => {}
        }

        let original = execute_original(emulator)?;
        match hook.execute_post(context, emulator, original.as_ref()) {
            Some(PostHookResult::Replace(value)) => Ok(HookOutcome::Handled(value)),
            Some(PostHookResult::Error(error)) => Err(error),
            Some(PostHookResult::Keep) | None => Ok(HookOutcome::Handled(original)),
        }
    }

    /// Returns the number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Returns an iterator over all registered hooks, in the order they are consulted.
    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.iter().rev()
    }
}

impl fmt::Debug for HookManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookManager")
            .field("hook_count", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::{HookPriority, Member},
        metadata::{module::Module, token::Token},
    };

    fn context(module: &Module) -> HookContext<'_> {
        HookContext {
            method: Member::new(module, Token::new(0x0600_0001)),
            namespace: "Demo",
            type_name: "Calc",
            method_name: "Add",
            this: None,
            args: vec![EmValue::I32(1), EmValue::I32(2)],
        }
    }

    #[test]
    fn test_priority_then_registration_order() {
        let mut manager = HookManager::new();
        manager.register(Hook::new("runtime").with_priority(HookPriority::RUNTIME).match_method_name("Add"));
        manager.register(Hook::new("first").match_method_name("Add"));
        manager.register(Hook::new("second").match_method_name("Add"));
        manager.register(Hook::new("other").match_method_name("Sub"));

        let module = Module::new("App");
        let ctx = context(&module);
        assert_eq!(manager.find_matching(&ctx).map(Hook::name), Some("second"));
        assert_eq!(manager.len(), 4);
        assert_eq!(manager.iter().last().map(Hook::name), Some("runtime"));
    }

    #[test]
    fn test_no_match() {
        let manager = HookManager::new();
        let module = Module::new("App");
        assert!(manager.find_matching(&context(&module)).is_none());
        assert!(manager.is_empty());
    }
}

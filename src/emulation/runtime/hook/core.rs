//! Hook definition and builder.
//!
//! This module provides the [`Hook`] struct, which combines matchers and handlers
//! to intercept method calls during emulation.

use std::{fmt, sync::Arc};

use crate::emulation::{
    runtime::hook::{
        matcher::{HookMatcher, NameMatcher, RuntimeMatcher, SignatureMatcher},
        types::{HookContext, HookPriority, PostHookFn, PostHookResult, PreHookFn, PreHookResult},
    },
    EmValue, Emulator,
};

/// A configurable hook for method interception.
///
/// Hooks combine matchers (to determine which methods to intercept) with handlers
/// (to define what happens when intercepted).
///
/// ```rust
/// use dotweave::emulation::{EmValue, Hook, HookPriority, PreHookResult};
///
/// let hook = Hook::new("fixed-length")
///     .with_priority(HookPriority::HIGH)
///     .match_name("System", "String", "get_Length")
///     .pre(|_ctx, _emulator| PreHookResult::Bypass(Some(EmValue::I32(3))));
/// assert_eq!(hook.name(), "fixed-length");
/// ```
///
/// # Matcher Evaluation
///
/// All matchers on a hook must match for the hook to be applied (AND semantics).
/// A hook with no matchers never matches.
///
/// # Pre vs Post Hooks
///
/// - **Pre-hooks** run before the original method. They can let the original run,
///   bypass it with a value, or fail the call.
/// - **Post-hooks** run after the original method. They can keep or replace the
///   return value, or fail the call.
///
/// Built-in runtime methods have no IL body. Their implementation is a hook whose
/// pre-handler always bypasses.
pub struct Hook {
    name: String,
    priority: HookPriority,
    matchers: Vec<Box<dyn HookMatcher>>,
    pre_hook: Option<PreHookFn>,
    post_hook: Option<PostHookFn>,
}

impl Hook {
    /// Creates a new hook with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: HookPriority::default(),
            matchers: Vec::new(),
            pre_hook: None,
            post_hook: None,
        }
    }

    /// The hook's name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hook's priority
    #[must_use]
    pub fn priority(&self) -> HookPriority {
        self.priority
    }

    /// Sets the priority
    #[must_use]
    pub fn with_priority(mut self, priority: HookPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a custom matcher
    #[must_use]
    pub fn add_matcher<M: HookMatcher + 'static>(mut self, matcher: M) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// Matches the namespace, simple type name and method name
    #[must_use]
    pub fn match_name(
        self,
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        self.add_matcher(
            NameMatcher::new()
                .namespace(namespace)
                .type_name(type_name)
                .method_name(method_name),
        )
    }

    /// Matches the method name on any type
    #[must_use]
    pub fn match_method_name(self, method_name: impl Into<String>) -> Self {
        self.add_matcher(NameMatcher::new().method_name(method_name))
    }

    /// Matches the simple name of the declaring type
    #[must_use]
    pub fn match_type_name(self, type_name: impl Into<String>) -> Self {
        self.add_matcher(NameMatcher::new().type_name(type_name))
    }

    /// Matches the number of declared parameters
    #[must_use]
    pub fn match_param_count(self, param_count: usize) -> Self {
        self.add_matcher(SignatureMatcher { param_count })
    }

    /// Matches with a predicate over the call
    #[must_use]
    pub fn match_runtime<F>(self, description: impl Into<String>, predicate: F) -> Self
    where
        F: for<'m> Fn(&HookContext<'m>) -> bool + Send + Sync + 'static,
    {
        self.add_matcher(RuntimeMatcher::new(description, predicate))
    }

    /// Sets the pre-hook handler.
    #[must_use]
    pub fn pre<F>(mut self, handler: F) -> Self
    where
        F: for<'m> Fn(&HookContext<'m>, &mut Emulator<'m>) -> PreHookResult<'m>
            + Send
            + Sync
            + 'static,
    {
        self.pre_hook = Some(Arc::new(handler));
        self
    }

    /// Sets the post-hook handler.
    #[must_use]
    pub fn post<F>(mut self, handler: F) -> Self
    where
        F: for<'m> Fn(&HookContext<'m>, &mut Emulator<'m>, Option<&EmValue<'m>>) -> PostHookResult<'m>
            + Send
            + Sync
            + 'static,
    {
        self.post_hook = Some(Arc::new(handler));
        self
    }

    /// Checks if all matchers match the given context.
    ///
    /// Returns `false` if the hook has no matchers.
    #[must_use]
    pub fn matches(&self, context: &HookContext<'_>) -> bool {
        !self.matchers.is_empty() && self.matchers.iter().all(|m| m.matches(context))
    }

    /// Executes the pre-hook if present.
    pub fn execute_pre<'m>(
        &self,
        context: &HookContext<'m>,
        emulator: &mut Emulator<'m>,
    ) -> Option<PreHookResult<'m>> {
        self.pre_hook.as_ref().map(|hook| hook(context, emulator))
    }

    /// Executes the post-hook if present.
    pub fn execute_post<'m>(
        &self,
        context: &HookContext<'m>,
        emulator: &mut Emulator<'m>,
        result: Option<&EmValue<'m>>,
    ) -> Option<PostHookResult<'m>> {
        self.post_hook
            .as_ref()
            .map(|hook| hook(context, emulator, result))
    }

    /// Returns true if this hook has a pre-hook handler.
    #[must_use]
    pub fn has_pre_hook(&self) -> bool {
        self.pre_hook.is_some()
    }

    /// Returns true if this hook has a post-hook handler.
    #[must_use]
    pub fn has_post_hook(&self) -> bool {
        self.post_hook.is_some()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matchers: Vec<String> = self.matchers.iter().map(|m| m.description()).collect();
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("matchers", &matchers)
            .field("pre", &self.has_pre_hook())
            .field("post", &self.has_post_hook())
            .finish()
    }
}

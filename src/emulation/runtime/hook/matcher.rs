//! Hook matchers.
//!
//! A matcher decides whether a hook applies to a call. A hook applies when all of its
//! matchers agree.
//!
//! - [`NameMatcher`]: namespace, type name and method name
//! - [`SignatureMatcher`]: number of declared parameters
//! - [`RuntimeMatcher`]: arbitrary predicate over the call, including argument values

use crate::emulation::runtime::hook::types::HookContext;

/// Decides whether a hook applies to a method call.
pub trait HookMatcher: Send + Sync {
    /// True if the hook should handle this call
    fn matches(&self, context: &HookContext<'_>) -> bool;

    /// Human readable description, used in debug output
    fn description(&self) -> String;
}

/// Matches by namespace, type and method name. Unset parts match anything.
#[derive(Debug, Clone, Default)]
pub struct NameMatcher {
    /// Namespace of the declaring type
    pub namespace: Option<String>,
    /// Simple name of the declaring type
    pub type_name: Option<String>,
    /// Method name
    pub method_name: Option<String>,
}

impl NameMatcher {
    /// Creates a matcher that matches every call
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the namespace
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Requires the declaring type's simple name
    #[must_use]
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Requires the method name
    #[must_use]
    pub fn method_name(mut self, method_name: impl Into<String>) -> Self {
        self.method_name = Some(method_name.into());
        self
    }
}

impl HookMatcher for NameMatcher {
    fn matches(&self, context: &HookContext<'_>) -> bool {
        self.namespace.as_deref().is_none_or(|ns| ns == context.namespace)
            && self.type_name.as_deref().is_none_or(|ty| ty == context.type_name)
            && self
                .method_name
                .as_deref()
                .is_none_or(|name| name == context.method_name)
    }

    fn description(&self) -> String {
        format!(
            "{}.{}::{}",
            self.namespace.as_deref().unwrap_or("*"),
            self.type_name.as_deref().unwrap_or("*"),
            self.method_name.as_deref().unwrap_or("*")
        )
    }
}

/// Matches by the number of declared parameters, `this` excluded.
#[derive(Debug, Clone, Copy)]
pub struct SignatureMatcher {
    /// Required parameter count
    pub param_count: usize,
}

impl HookMatcher for SignatureMatcher {
    fn matches(&self, context: &HookContext<'_>) -> bool {
        context.args.len() == self.param_count
    }

    fn description(&self) -> String {
        format!("{} parameters", self.param_count)
    }
}

/// Matches with a caller supplied predicate.
pub struct RuntimeMatcher {
    description: String,
    predicate: Box<dyn for<'m> Fn(&HookContext<'m>) -> bool + Send + Sync>,
}

impl RuntimeMatcher {
    /// Creates a matcher from a predicate
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: for<'m> Fn(&HookContext<'m>) -> bool + Send + Sync + 'static,
    {
        RuntimeMatcher {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl HookMatcher for RuntimeMatcher {
    fn matches(&self, context: &HookContext<'_>) -> bool {
        (self.predicate)(context)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::{EmValue, Member},
        metadata::{module::Module, token::Token},
    };

    fn context(module: &Module, args: usize) -> HookContext<'_> {
        HookContext {
            method: Member::new(module, Token::new(0x0600_0001)),
            namespace: "System",
            type_name: "String",
            method_name: "Concat",
            this: None,
            args: vec![EmValue::Null; args],
        }
    }

    #[test]
    fn test_name_matcher() {
        let module = Module::new("System.Runtime");
        let ctx = context(&module, 2);

        assert!(NameMatcher::new().matches(&ctx));
        assert!(NameMatcher::new()
            .namespace("System")
            .type_name("String")
            .method_name("Concat")
            .matches(&ctx));
        assert!(!NameMatcher::new().method_name("ToUpper").matches(&ctx));
        assert_eq!(
            NameMatcher::new().method_name("Concat").description(),
            "*.*::Concat"
        );
    }

    #[test]
    fn test_signature_and_runtime_matchers() {
        let module = Module::new("System.Runtime");
        let ctx = context(&module, 2);

        assert!(SignatureMatcher { param_count: 2 }.matches(&ctx));
        assert!(!SignatureMatcher { param_count: 1 }.matches(&ctx));

        let only_nulls = RuntimeMatcher::new("null arguments", |ctx| {
            ctx.args.iter().all(EmValue::is_null)
        });
        assert!(only_nulls.matches(&ctx));
        assert_eq!(only_nulls.description(), "null arguments");
    }
}

//! Native implementations of the emulated core library.
//!
//! Methods of `System.Runtime` that carry no IL body are implemented here as hooks at
//! [`HookPriority::RUNTIME`]. A user hook registered for the same method at any higher
//! priority replaces the native.
//!
//! | Module | Methods |
//! |--------|---------|
//! | `reflection` | `Type`, `MethodBase`, `MemberInfo`, `PropertyInfo`, `Object.GetType` |
//! | `text` | `String` members, `Object.ToString`, `Object.Equals` |
//! | `delegates` | `Invoke` on `Func` and `Action` delegates |

mod delegates;
mod reflection;
mod text;

use crate::emulation::{
    engine::EmResult,
    runtime::hook::{Hook, HookContext, HookManager, HookPriority, PreHookResult},
    EmValue, EmulationError, Emulator,
};

/// Signature of a native method. `Ok(None)` is a void return.
type Native = for<'m> fn(&HookContext<'m>, &mut Emulator<'m>) -> EmResult<Option<EmValue<'m>>>;

/// Registers every native of the emulated core library.
pub fn register(manager: &mut HookManager) {
    reflection::register(manager);
    text::register(manager);
    delegates::register(manager);
}

/// Hook running `handler` in place of `namespace.type_name::method`
fn native(namespace: &str, type_name: &str, method: &str, handler: Native) -> Hook {
    Hook::new(format!("{namespace}.{type_name}::{method}"))
        .with_priority(HookPriority::RUNTIME)
        .match_name(namespace, type_name, method)
        .pre(move |ctx, emulator| finish(handler(ctx, emulator)))
}

/// Maps the result of a native to a pre-hook result
fn finish<'m>(result: EmResult<Option<EmValue<'m>>>) -> PreHookResult<'m> {
    match result {
        Ok(value) => PreHookResult::Bypass(value),
        Err(error) => PreHookResult::Error(error),
    }
}

/// The string behind a value, `None` for `null`
fn string_arg<'m>(emulator: &Emulator<'m>, value: &EmValue<'m>) -> EmResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    emulator
        .read_string(value)
        .map(Some)
        .ok_or(EmulationError::TypeMismatch {
            expected: "string",
            found: value.kind(),
        })
}

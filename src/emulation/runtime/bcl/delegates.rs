//! Delegate invocation.
//!
//! `newobj` on a delegate type binds the method pointer and receiver into a delegate
//! object without running a constructor. `Invoke` on such an object calls the bound
//! method, dispatching virtually on the receiver like the runtime's delegate thunks.

use crate::emulation::{
    engine::{EmResult, NULL_REFERENCE_MESSAGE},
    memory::HeapObject,
    runtime::{
        bcl::finish,
        hook::{Hook, HookContext, HookManager, HookPriority},
    },
    EmValue, EmulationError, Emulator,
};

pub fn register(manager: &mut HookManager) {
    manager.register(
        Hook::new("System.Delegate::Invoke")
            .with_priority(HookPriority::RUNTIME)
            .match_runtime("Invoke on a System delegate type", |ctx| {
                ctx.namespace == "System" && ctx.method_name == "Invoke" && ctx.this.is_some()
            })
            .pre(|ctx, emulator| finish(delegate_invoke(ctx, emulator))),
    );
}

/// Hook for `Invoke` on `Func` and `Action` delegates.
///
/// # Returns
///
/// The bound method's result, `None` for a void method.
fn delegate_invoke<'m>(
    ctx: &HookContext<'m>,
    emulator: &mut Emulator<'m>,
) -> EmResult<Option<EmValue<'m>>> {
    let Some(delegate) = ctx.this_object() else {
        return Err(emulator.throw("System.NullReferenceException", NULL_REFERENCE_MESSAGE));
    };
    let (target, method) = match emulator.heap().get(delegate)? {
        HeapObject::Delegate { target, method, .. } => (target.clone(), *method),
        other => {
            return Err(EmulationError::TypeMismatch {
                expected: "delegate",
                found: other.kind(),
            })
        }
    };

    let result = match target.as_object() {
        Some(receiver) => {
            let method = emulator.dispatch_virtual(method, receiver)?;
            emulator.invoke_method(method, Some(target), ctx.args.clone())?
        }
        None => emulator.invoke_method(method, None, ctx.args.clone())?,
    };
    Ok((result != EmValue::Void).then_some(result))
}

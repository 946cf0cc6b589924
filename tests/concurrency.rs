//! Woven modules shared between threads.
//!
//! The woven module, the resolver and the hook manager are shared. Every thread owns its
//! emulator. The only shared mutable state is an atomic counter in a hook, which must
//! end up seeing every call exactly once.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use dotweave::{emulation::runtime::reference_resolver, prelude::*};

const THREADS: usize = 8;
const CALLS_PER_THREAD: i32 = 50;

/// `Demo.Calculator.Add` carrying an interception aspect that only proceeds
fn woven_calculator(resolver: &DefaultAssemblyResolver) -> Result<Module> {
    let mut module = Module::new("App");
    let base = module.type_ref(
        "DotNetAspects",
        "DotNetAspects.Interception",
        "MethodInterceptionAspect",
    );
    let aspect = TypeDefBuilder::new("App", "Intercept")
        .public_class()
        .extends(TypeSignature::Class(base))
        .build(&mut module)?;
    let aspect_ctor = MethodDefBuilder::constructor()
        .body(|asm| {
            asm.ret();
            Ok(())
        })
        .build(&mut module, aspect)?;

    let ty = TypeDefBuilder::new("Demo", "Calculator")
        .public_class()
        .build(&mut module)?;
    MethodDefBuilder::new("Add")
        .public()
        .static_method()
        .returns(TypeSignature::I4)
        .param("a", TypeSignature::I4)
        .param("b", TypeSignature::I4)
        .attribute(CustomAttribute::new(aspect_ctor))
        .body(|asm| {
            asm.ldarg(0).ldarg(1).op(OpCode::Add).ret();
            Ok(())
        })
        .build(&mut module, ty)?;

    let report = Weaver::new(WeaverConfig::default(), resolver).weave(&mut module)?;
    assert_eq!(report.methods_intercepted, 1);
    Ok(module)
}

#[test]
fn test_parallel_calls_share_one_counter() -> Result<()> {
    let resolver = reference_resolver()?;
    let module = woven_calculator(&resolver)?;

    let originals = Arc::new(AtomicUsize::new(0));
    let mut hooks = HookManager::with_runtime();
    let counter = Arc::clone(&originals);
    hooks.register(
        Hook::new("count-original")
            .match_name("Demo", "Calculator", "Add$Original")
            .pre(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                PreHookResult::Continue
            }),
    );
    let hooks = Arc::new(hooks);

    let sums: Vec<Result<i64>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|worker| {
                let (module, resolver, hooks) = (&module, &resolver, Arc::clone(&hooks));
                scope.spawn(move || -> Result<i64> {
                    let mut emulator = Emulator::new(module, resolver).with_hooks(hooks);
                    let mut total = 0i64;
                    for call in 0..CALLS_PER_THREAD {
                        let base = i32::try_from(worker).unwrap_or_default();
                        let sum = emulator.invoke(
                            "Demo.Calculator",
                            "Add",
                            vec![EmValue::I32(base), EmValue::I32(call)],
                        )?;
                        assert_eq!(sum, EmValue::I32(base + call));
                        total += i64::from(base + call);
                    }
                    Ok(total)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker panicked"))
            .collect()
    });

    let expected_per_thread: i64 = (0..CALLS_PER_THREAD).map(i64::from).sum();
    let mut grand_total = 0;
    for (worker, sum) in sums.into_iter().enumerate() {
        let sum = sum?;
        let worker = i64::try_from(worker).unwrap_or_default();
        assert_eq!(sum, expected_per_thread + worker * i64::from(CALLS_PER_THREAD));
        grand_total += sum;
    }
    assert!(grand_total > 0);
    assert_eq!(
        originals.load(Ordering::SeqCst),
        THREADS * CALLS_PER_THREAD as usize
    );
    Ok(())
}

#[test]
fn test_modules_weave_in_parallel() -> Result<()> {
    let resolver = reference_resolver()?;
    let modules: Vec<Result<Module>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| scope.spawn(|| woven_calculator(&resolver)))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker panicked"))
            .collect()
    });

    for module in modules {
        let module = module?;
        assert!(module.methods().iter().any(|m| m.name == "Add$Original"));
    }
    Ok(())
}

extern crate dotweave;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use dotweave::{emulation::runtime::reference_resolver, prelude::*};
use std::hint::black_box;

const METHODS: usize = 200;

/// A module with `METHODS` small methods, every other one intercepted and the rest
/// wrapped by a boundary aspect
fn application() -> Module {
    let mut module = Module::new("App");
    let mut aspect = |name: &str, base: &str| {
        let base = module.type_ref("DotNetAspects", "DotNetAspects.Interception", base);
        let ty = TypeDefBuilder::new("App", name)
            .public_class()
            .extends(TypeSignature::Class(base))
            .build(&mut module)
            .unwrap();
        MethodDefBuilder::constructor()
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(&mut module, ty)
            .unwrap()
    };
    let intercept = aspect("Intercept", "MethodInterceptionAspect");
    let trace = aspect("Trace", "OnMethodBoundaryAspect");

    let ty = TypeDefBuilder::new("Demo", "Service")
        .public_class()
        .build(&mut module)
        .unwrap();
    for index in 0..METHODS {
        let ctor = if index % 2 == 0 { intercept } else { trace };
        MethodDefBuilder::new(format!("Op{index}"))
            .public()
            .static_method()
            .returns(TypeSignature::I4)
            .param("a", TypeSignature::I4)
            .param("b", TypeSignature::I4)
            .attribute(CustomAttribute::new(ctor))
            .body(|asm| {
                asm.ldarg(0).ldarg(1).op(OpCode::Add).ret();
                Ok(())
            })
            .build(&mut module, ty)
            .unwrap();
    }
    module
}

/// Weaving throughput over a module of many small methods
fn bench_weave(c: &mut Criterion) {
    let resolver = reference_resolver().unwrap();
    let template = application();

    let mut group = c.benchmark_group("weave");
    group.throughput(Throughput::Elements(METHODS as u64));
    group.bench_function("mixed_module", |b| {
        b.iter_batched(
            || template.clone(),
            |mut module| {
                let report = Weaver::new(WeaverConfig::default(), &resolver)
                    .weave(black_box(&mut module))
                    .unwrap();
                black_box(report)
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

/// Cost of a call through each aspect kind compared to the plain method
fn bench_woven_call(c: &mut Criterion) {
    let resolver = reference_resolver().unwrap();
    let plain = application();
    let mut woven = plain.clone();
    Weaver::new(WeaverConfig::default(), &resolver)
        .weave(&mut woven)
        .unwrap();
    let mut by_name = plain.clone();
    Weaver::new(WeaverConfig::compatibility(), &resolver)
        .weave(&mut by_name)
        .unwrap();

    let mut group = c.benchmark_group("call");
    for (label, module, method) in [
        ("plain", &plain, "Op0"),
        ("intercepted_token", &woven, "Op0"),
        ("intercepted_by_name", &by_name, "Op0"),
        ("bounded", &woven, "Op1"),
    ] {
        group.bench_function(label, |b| {
            b.iter(|| {
                // A fresh emulator per call keeps the heap bounded
                let mut emulator = Emulator::new(module, &resolver);
                let sum = emulator
                    .invoke(
                        "Demo.Service",
                        method,
                        vec![EmValue::I32(black_box(2)), EmValue::I32(black_box(3))],
                    )
                    .unwrap();
                black_box(sum)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_weave, bench_woven_call);
criterion_main!(benches);

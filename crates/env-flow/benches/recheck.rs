//! Recheck latency over a synthetic codebase: cold build, no-op edit, and a
//! single-function edit rippling into callers.

use std::path::PathBuf;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use env_flow::testing::{environment_for_testing, MemoryCodebase};
use env_flow::{recheck, Configuration, ErrorTable, Scheduler};

const MODULES: usize = 50;

fn codebase() -> Arc<MemoryCodebase> {
    let codebase = Arc::new(MemoryCodebase::new());
    for index in 0..MODULES {
        // Each module calls into the previous one.
        let source = if index == 0 {
            "def f(x: int) -> int: return x".to_string()
        } else {
            format!("def f(x: int) -> int: return mod{}.f(x)", index - 1)
        };
        codebase.set_source(format!("mod{}.py", index), source);
    }
    codebase
}

fn all_paths() -> Vec<PathBuf> {
    (0..MODULES)
        .map(|index| PathBuf::from(format!("mod{}.py", index)))
        .collect()
}

fn bench_recheck(c: &mut Criterion) {
    let configuration = Configuration::with_workers(4);
    let scheduler = Scheduler::from_configuration(&configuration);

    c.bench_function("cold_build", |b| {
        b.iter(|| {
            let environment = environment_for_testing(codebase());
            let mut errors = ErrorTable::new();
            recheck(
                &configuration,
                &scheduler,
                &environment,
                &mut errors,
                &all_paths(),
            )
            .unwrap()
        })
    });

    c.bench_function("single_edit", |b| {
        let codebase = codebase();
        let environment = environment_for_testing(codebase.clone());
        let mut errors = ErrorTable::new();
        recheck(
            &configuration,
            &scheduler,
            &environment,
            &mut errors,
            &all_paths(),
        )
        .unwrap();

        let mut flip = false;
        b.iter(|| {
            // Alternate the body of the middle module so every iteration is a
            // real change.
            flip = !flip;
            let body = if flip { "x" } else { "x " };
            codebase.set_source(
                "mod25.py",
                format!("def f(x: int) -> int: return mod24.f({})", body),
            );
            recheck(
                &configuration,
                &scheduler,
                &environment,
                &mut errors,
                &[PathBuf::from("mod25.py")],
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_recheck);
criterion_main!(benches);

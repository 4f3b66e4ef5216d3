//! Layer-level properties: memoization, invalidation minimality, chain shape,
//! lazy re-inference, persistence, and concurrent reads.

use std::path::PathBuf;
use std::sync::Arc;

use env_flow::testing::{
    build_environment, environment_for_testing, MemoryCodebase, SimpleInference,
    SimplePostprocessing,
};
use env_flow::{
    recheck, AnnotatedGlobalEnvironment, AstEnvironment, CheckResult, ClassHierarchyEnvironment,
    Configuration, DependencyDescriptor, Environment, ErrorTable, ModuleName, Name, NoopTracer,
    RecordingTracer, ResolvedGlobalEnvironment, Scheduler, TypeEnvironment,
    UnannotatedGlobalEnvironment,
};

const MODULE_M: &str = "def f(x: int) -> int: return x\ndef h() -> int: return 2";
const MODULE_N: &str = "def g() -> int: return m.f(3)";

fn stack(sources: &[(&str, &str)]) -> (Arc<MemoryCodebase>, TypeEnvironment, Arc<RecordingTracer>)
{
    let codebase = Arc::new(MemoryCodebase::new());
    for (path, text) in sources {
        codebase.set_source(*path, *text);
    }
    let tracer = Arc::new(RecordingTracer::new());
    let environment = build_environment(
        Arc::new(Configuration::default()),
        codebase.clone(),
        tracer.clone(),
    );
    (codebase, environment, tracer)
}

fn cold_check(environment: &TypeEnvironment, paths: &[&str]) -> (Vec<ModuleName>, ErrorTable) {
    let mut errors = ErrorTable::new();
    let paths: Vec<PathBuf> = paths.iter().map(|path| PathBuf::from(*path)).collect();
    let (modules, _) = recheck(
        &Configuration::default(),
        &Scheduler::serial(),
        environment,
        &mut errors,
        &paths,
    )
    .unwrap();
    (modules, errors)
}

// Two reads of the same key with no intervening update return equal values
// and compute only once.
#[test]
fn test_memoization_purity() {
    let (_codebase, environment, tracer) = stack(&[("m.py", MODULE_M)]);
    let name = Name::new("m.f");

    let first = environment.get_check_result(None, &name).unwrap();
    let produced_once = tracer
        .produced()
        .iter()
        .filter(|descriptor| matches!(descriptor, DependencyDescriptor::TypeCheckDefine(n) if *n == name))
        .count();
    let second = environment.get_check_result(None, &name).unwrap();
    let produced_twice = tracer
        .produced()
        .iter()
        .filter(|descriptor| matches!(descriptor, DependencyDescriptor::TypeCheckDefine(n) if *n == name))
        .count();

    assert_eq!(first, second);
    assert_eq!(produced_once, 1);
    assert_eq!(produced_twice, 1);
}

// The chain has exactly one triggered set per layer, bottom-first.
#[test]
fn test_chain_monotonicity() {
    let (_codebase, environment, _tracer) = stack(&[("m.py", MODULE_M)]);
    let scheduler = Scheduler::serial();

    let update = environment
        .update_this_and_all_preceding_environments(&scheduler, &[PathBuf::from("m.py")])
        .unwrap();
    let sets = update.all_triggered_dependencies();

    assert_eq!(sets.len(), 6);
    // The bottom set carries the parse marker for the new module.
    assert!(sets[0]
        .iter()
        .any(|handle| matches!(
            env_flow::dependency::describe(handle),
            DependencyDescriptor::AstParse(module) if module == ModuleName::new("m")
        )));
}

// An upstream change that matches no filter in the derived layers triggers
// nothing above the parser.
#[test]
fn test_minimal_invalidation() {
    let (codebase, environment, _tracer) = stack(&[
        ("m.py", MODULE_M),
        ("iso.py", "flag: bool = True"),
    ]);
    cold_check(&environment, &["m.py", "iso.py"]);

    codebase.set_source("iso.py", "flag: bool = False");
    let update = environment
        .update_this_and_all_preceding_environments(&Scheduler::serial(), &[PathBuf::from("iso.py")])
        .unwrap();

    let sets = update.all_triggered_dependencies();
    assert_eq!(sets.len(), 6);
    for derived in &sets[1..] {
        assert!(derived.is_empty());
    }
}

// A changed value recomputed incrementally equals the value a fresh stack
// computes from scratch.
#[test]
fn test_recomputation_equivalence() {
    let sources = [("m.py", MODULE_M), ("n.py", MODULE_N)];
    let (codebase, incremental, _tracer) = stack(&sources);
    cold_check(&incremental, &["m.py", "n.py"]);

    let edited = "def f(x: int) -> str: return 'ok'\ndef h() -> int: return 2";
    codebase.set_source("m.py", edited);
    let mut errors = ErrorTable::new();
    recheck(
        &Configuration::default(),
        &Scheduler::serial(),
        &incremental,
        &mut errors,
        &[PathBuf::from("m.py")],
    )
    .unwrap();

    let fresh_codebase = Arc::new(MemoryCodebase::new());
    fresh_codebase.set_source("m.py", edited);
    fresh_codebase.set_source("n.py", MODULE_N);
    let fresh = environment_for_testing(fresh_codebase);

    for name in [Name::new("m.f"), Name::new("n.g"), Name::new("m.h")] {
        assert_eq!(
            incremental.get_check_result(None, &name).unwrap(),
            fresh.get_check_result(None, &name).unwrap(),
        );
        assert_eq!(
            incremental
                .read_only()
                .globals()
                .get_type_of_global(None, &name)
                .unwrap(),
            fresh
                .read_only()
                .globals()
                .get_type_of_global(None, &name)
                .unwrap(),
        );
    }
}

// After a recheck, each returned module's error-table entry is exactly the
// subset of returned diagnostics belonging to it.
#[test]
fn test_error_reconciliation() {
    let (codebase, environment, _tracer) = stack(&[("m.py", MODULE_M), ("n.py", MODULE_N)]);
    let (_, mut errors) = cold_check(&environment, &["m.py", "n.py"]);

    codebase.set_source(
        "m.py",
        "def f(x: int) -> str: return 'ok'\ndef h() -> str: return 2",
    );
    let (modules, diagnostics) = recheck(
        &Configuration::default(),
        &Scheduler::serial(),
        &environment,
        &mut errors,
        &[PathBuf::from("m.py")],
    )
    .unwrap();

    assert!(!modules.is_empty());
    for module in &modules {
        let expected: Vec<_> = diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.module == *module)
            .cloned()
            .collect();
        assert_eq!(errors.get(module), &expected[..]);
    }
    for module in errors.modules() {
        assert!(modules.contains(&module));
    }
}

// The type environment invalidates lazily: the layered update drops results
// without recomputing, and the next read repopulates on demand.
#[test]
fn test_type_environment_invalidates_lazily() {
    let (codebase, environment, tracer) = stack(&[("m.py", MODULE_M)]);
    cold_check(&environment, &["m.py"]);
    tracer.take();

    codebase.set_source(
        "m.py",
        "def f(x: int) -> str: return 'ok'\ndef h() -> int: return 2",
    );
    environment
        .update_this_and_all_preceding_environments(&Scheduler::serial(), &[PathBuf::from("m.py")])
        .unwrap();

    // The update itself never runs inference.
    assert!(tracer
        .produced()
        .iter()
        .all(|descriptor| !matches!(descriptor, DependencyDescriptor::TypeCheckDefine(_))));

    // The next read does.
    let result = environment.get_check_result(None, &Name::new("m.f")).unwrap();
    assert!(matches!(result, CheckResult::Checked(_)));
    assert!(tracer
        .produced()
        .iter()
        .any(|descriptor| matches!(
            descriptor,
            DependencyDescriptor::TypeCheckDefine(name) if *name == Name::new("m.f")
        )));
}

// A base-class edit in another module re-checks the defines whose annotations
// depend on the subclass hierarchy.
#[test]
fn test_hierarchy_edit_reaches_annotation_consumers() {
    let lib = "class Base: ...\nclass Mid(Base): ...";
    let app = "class Leaf(lib.Mid): ...\ndef make() -> Leaf: return Leaf()";
    let (codebase, environment, tracer) = stack(&[("lib.py", lib), ("app.py", app)]);
    cold_check(&environment, &["lib.py", "app.py"]);
    tracer.take();

    codebase.set_source("lib.py", "class Base: ...\nclass Mid: ...");
    let mut errors = ErrorTable::new();
    recheck(
        &Configuration::default(),
        &Scheduler::serial(),
        &environment,
        &mut errors,
        &[PathBuf::from("lib.py")],
    )
    .unwrap();

    assert!(tracer
        .produced()
        .iter()
        .any(|descriptor| matches!(
            descriptor,
            DependencyDescriptor::TypeCheckDefine(name) if *name == Name::new("app.make")
        )));
}

#[test]
fn test_store_and_load_round_trip() {
    let sources = [("m.py", MODULE_M), ("n.py", MODULE_N)];
    let (codebase, environment, _tracer) = stack(&sources);
    let (_, errors) = cold_check(&environment, &["m.py", "n.py"]);
    let recorded_total = errors.total();

    let directory = std::env::temp_dir().join(format!(
        "env-flow-snapshot-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&directory);
    environment.store(&directory).unwrap();

    let ast = AstEnvironment::load(&directory, codebase.clone(), Arc::new(NoopTracer)).unwrap();
    let unannotated = UnannotatedGlobalEnvironment::load(&directory, ast).unwrap();
    let hierarchy = ClassHierarchyEnvironment::load(&directory, unannotated).unwrap();
    let resolved = ResolvedGlobalEnvironment::load(&directory, hierarchy).unwrap();
    let annotated = AnnotatedGlobalEnvironment::load(&directory, resolved).unwrap();
    let loaded = TypeEnvironment::load(
        &directory,
        annotated,
        Arc::new(SimpleInference),
        Arc::new(SimplePostprocessing),
    )
    .unwrap();

    // Tables are reconstituted lazily: the loaded stack starts cold.
    assert_eq!(loaded.heap_entry_count(), 0);
    let (cold_modules, cold_errors) = cold_check(&loaded, &["m.py", "n.py"]);
    assert_eq!(cold_modules, vec![ModuleName::new("m"), ModuleName::new("n")]);
    assert_eq!(cold_errors.total(), recorded_total);
    assert!(loaded.heap_entry_count() > 0);

    let _ = std::fs::remove_dir_all(&directory);
}

#[test]
fn test_load_from_missing_snapshot_fails() {
    let directory = std::env::temp_dir().join(format!(
        "env-flow-missing-snapshot-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&directory);
    let codebase = Arc::new(MemoryCodebase::new());
    assert!(AstEnvironment::load(&directory, codebase, Arc::new(NoopTracer)).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_reads_agree() {
    let (_codebase, environment, _tracer) = stack(&[("m.py", MODULE_M), ("n.py", MODULE_N)]);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let environment = environment.clone();
            tokio::spawn(async move {
                environment
                    .get_check_result(None, &Name::new("n.g"))
                    .unwrap()
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    for result in &results {
        assert!(matches!(result, CheckResult::Checked(_)));
        assert_eq!(result, &results[0]);
    }
}

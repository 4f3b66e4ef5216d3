//! End-to-end recheck scenarios over the reference stack.

use std::path::PathBuf;
use std::sync::Arc;

use env_flow::testing::{build_environment, MemoryCodebase};
use env_flow::{
    recheck, Configuration, DependencyDescriptor, Diagnostic, EngineError, ErrorTable, ModuleName,
    Name, RecordingTracer, Scheduler, TypeEnvironment,
};

const MODULE_M: &str = "def f(x: int) -> int: return x\ndef h() -> int: return 2";
const MODULE_N: &str = "def g() -> int: return m.f(3)";

struct Harness {
    codebase: Arc<MemoryCodebase>,
    environment: TypeEnvironment,
    tracer: Arc<RecordingTracer>,
    scheduler: Scheduler,
    configuration: Configuration,
    errors: ErrorTable,
}

impl Harness {
    /// Build a stack over the sources and run the initial cold check.
    fn new(sources: &[(&str, &str)]) -> Self {
        let codebase = Arc::new(MemoryCodebase::new());
        for (path, text) in sources {
            codebase.set_source(*path, *text);
        }
        let tracer = Arc::new(RecordingTracer::new());
        let configuration = Configuration::default();
        let environment = build_environment(
            Arc::new(configuration.clone()),
            codebase.clone(),
            tracer.clone(),
        );
        let mut harness = Harness {
            codebase,
            environment,
            tracer,
            scheduler: Scheduler::serial(),
            configuration,
            errors: ErrorTable::new(),
        };
        let paths: Vec<PathBuf> = sources
            .iter()
            .map(|(path, _)| PathBuf::from(*path))
            .collect();
        harness.recheck(&paths);
        harness.tracer.take();
        harness
    }

    fn try_recheck(
        &mut self,
        paths: &[PathBuf],
    ) -> Result<(Vec<ModuleName>, Vec<Diagnostic>), EngineError> {
        recheck(
            &self.configuration,
            &self.scheduler,
            &self.environment,
            &mut self.errors,
            paths,
        )
    }

    fn recheck(&mut self, paths: &[PathBuf]) -> (Vec<ModuleName>, Vec<Diagnostic>) {
        self.try_recheck(paths).expect("recheck failed")
    }

    /// The defines re-inferred since the tracer was last drained.
    fn rechecked_defines(&self) -> Vec<Name> {
        let mut defines: Vec<Name> = self
            .tracer
            .produced()
            .into_iter()
            .filter_map(|descriptor| match descriptor {
                DependencyDescriptor::TypeCheckDefine(name) => Some(name),
                _ => None,
            })
            .collect();
        defines.sort();
        defines
    }
}

#[test]
fn test_empty_change_recheck() {
    let mut harness = Harness::new(&[("m.py", MODULE_M), ("n.py", MODULE_N)]);

    let (modules, diagnostics) = harness.recheck(&[]);

    assert!(modules.is_empty());
    assert!(diagnostics.is_empty());
    assert!(harness.errors.is_empty());
    assert!(harness.tracer.produced().is_empty());
}

#[test]
fn test_single_function_body_edit() {
    let mut harness = Harness::new(&[("m.py", MODULE_M), ("n.py", MODULE_N)]);

    harness.codebase.set_source(
        "m.py",
        "def f(x: int) -> int: return 1\ndef h() -> int: return 2",
    );
    let (modules, diagnostics) = harness.recheck(&[PathBuf::from("m.py")]);

    assert_eq!(modules, vec![ModuleName::new("m")]);
    assert!(diagnostics.is_empty());
    // Exactly the edited define is re-inferred: not its sibling, not its caller.
    assert_eq!(harness.rechecked_defines(), vec![Name::new("m.f")]);
}

#[test]
fn test_signature_change_reaches_downstream_caller() {
    let mut harness = Harness::new(&[("m.py", MODULE_M), ("n.py", MODULE_N)]);

    harness.codebase.set_source(
        "m.py",
        "def f(x: int) -> str: return 'ok'\ndef h() -> int: return 2",
    );
    let (modules, diagnostics) = harness.recheck(&[PathBuf::from("m.py")]);

    assert_eq!(modules, vec![ModuleName::new("m"), ModuleName::new("n")]);
    assert_eq!(
        harness.rechecked_defines(),
        vec![Name::new("m.f"), Name::new("n.g")]
    );
    assert_eq!(
        diagnostics,
        vec![Diagnostic::new(
            ModuleName::new("n"),
            Name::new("n.g"),
            "incompatible return type: expected int, got str",
        )]
    );
    assert_eq!(harness.errors.get(&ModuleName::new("n")), &diagnostics[..]);
    assert!(harness.errors.get(&ModuleName::new("m")).is_empty());
}

#[test]
fn test_new_function_is_checked_without_prior_dependency() {
    let mut harness = Harness::new(&[("m.py", MODULE_M)]);

    harness.codebase.set_source(
        "m.py",
        "def f(x: int) -> int: return x\ndef h() -> int: return 2\ndef k() -> int: return undefined_thing",
    );
    let (modules, diagnostics) = harness.recheck(&[PathBuf::from("m.py")]);

    assert_eq!(modules, vec![ModuleName::new("m")]);
    assert_eq!(harness.rechecked_defines(), vec![Name::new("m.k")]);
    assert_eq!(
        diagnostics,
        vec![Diagnostic::new(
            ModuleName::new("m"),
            Name::new("m.k"),
            "undefined name `m.undefined_thing`",
        )]
    );
}

#[test]
fn test_deleted_module_drops_errors_and_reaches_callers() {
    let with_error = format!("{}\ndef bad() -> int: return 'oops'", MODULE_M);
    let mut harness = Harness::new(&[("m.py", with_error.as_str()), ("n.py", MODULE_N)]);
    assert_eq!(harness.errors.get(&ModuleName::new("m")).len(), 1);

    harness.codebase.remove_source("m.py");
    let (modules, diagnostics) = harness.recheck(&[PathBuf::from("m.py")]);

    // The deleted module is not postprocessed, but its errors are gone.
    assert_eq!(modules, vec![ModuleName::new("n")]);
    assert!(harness.errors.get(&ModuleName::new("m")).is_empty());
    assert_eq!(
        diagnostics,
        vec![Diagnostic::new(
            ModuleName::new("n"),
            Name::new("n.g"),
            "undefined name `m.f`",
        )]
    );
    assert_eq!(harness.errors.get(&ModuleName::new("n")), &diagnostics[..]);
}

#[test]
fn test_equivalent_rewrite_short_circuits() {
    let mut harness = Harness::new(&[("m.py", MODULE_M), ("n.py", MODULE_N)]);

    // Same tree, different text: a comment and extra blank lines.
    harness.codebase.set_source(
        "m.py",
        "# touched\n\ndef f(x: int) -> int: return x\n\ndef h() -> int: return 2\n",
    );
    let (modules, diagnostics) = harness.recheck(&[PathBuf::from("m.py")]);

    assert!(modules.is_empty());
    assert!(diagnostics.is_empty());
    // No downstream work at all: nothing was produced anywhere in the stack.
    assert!(harness.tracer.produced().is_empty());
}

#[test]
fn test_parse_failure_aborts_and_preserves_state() {
    let mut harness = Harness::new(&[("m.py", MODULE_M), ("n.py", MODULE_N)]);

    harness.codebase.set_source("m.py", "def broken return 1");
    let error = harness
        .try_recheck(&[PathBuf::from("m.py")])
        .expect_err("malformed define must fail the recheck");
    assert!(matches!(error, EngineError::Producer { .. }));
    assert!(harness.errors.is_empty());

    // The engine recovers once the source is fixed.
    harness.codebase.set_source("m.py", MODULE_M);
    let (modules, diagnostics) = harness.recheck(&[PathBuf::from("m.py")]);
    assert!(diagnostics.is_empty());
    assert!(modules.is_empty() || modules == vec![ModuleName::new("m")]);
}

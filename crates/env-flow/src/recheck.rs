//! The incremental recheck driver.
//!
//! Given a batch of changed artifact paths, runs the single bottom-up layered
//! update, extracts the smallest correct re-inference set, repopulates it,
//! postprocesses the affected modules, and reconciles the error table.

use std::collections::HashSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use shale::DependencyHandle;

use crate::configuration::Configuration;
use crate::dependency::{self, DependencyDescriptor};
use crate::diagnostics::{Diagnostic, ErrorTable};
use crate::error::EngineError;
use crate::layer::Environment;
use crate::names::{ModuleName, Name};
use crate::scheduler::Scheduler;
use crate::type_environment::{populate_for_definitions, TypeEnvironment};

/// Re-analyze everything invalidated by the changed artifact paths.
///
/// Returns the postprocessed modules and the full diagnostic list produced
/// for them. The error table is reconciled in place: entries for every
/// invalidated module are dropped (including deleted modules), then each new
/// diagnostic is appended under its own module key.
pub fn recheck(
    configuration: &Configuration,
    scheduler: &Scheduler,
    environment: &TypeEnvironment,
    errors: &mut ErrorTable,
    artifact_paths: &[PathBuf],
) -> Result<(Vec<ModuleName>, Vec<Diagnostic>), EngineError> {
    let tracer = environment.tracer();
    tracer.on_recheck_start(artifact_paths.len());

    // Auxiliary caches first: every layer drops its hot value cache so reads
    // after the update see the primary stores only.
    environment.invalidate_caches();

    let update = environment.update_this_and_all_preceding_environments(scheduler, artifact_paths)?;

    // Function triggers: every TypeCheckDefine dependency triggered anywhere
    // in the chain, first handle wins per define.
    let mut functions: IndexMap<Name, DependencyHandle> = IndexMap::new();
    for triggered in update.all_triggered_dependencies() {
        for handle in triggered.iter() {
            if let DependencyDescriptor::TypeCheckDefine(name) = dependency::describe(handle) {
                functions.entry(name).or_insert(handle);
            }
        }
    }

    // Defines newly introduced by the parse have no prior dependency entry;
    // register them explicitly.
    for name in update.define_additions() {
        let handle = dependency::register(DependencyDescriptor::TypeCheckDefine(name.clone()));
        functions.entry(name.clone()).or_insert(handle);
    }

    // Re-infer: drop the per-define results, then repopulate eagerly with
    // attributed reads.
    environment.invalidate_definitions(functions.keys());
    let definitions: Vec<(Name, Option<DependencyHandle>)> = functions
        .iter()
        .map(|(name, handle)| (name.clone(), Some(*handle)))
        .collect();
    populate_for_definitions(scheduler, environment, &definitions)?;

    // Modules to postprocess: the parser's invalidated modules that still
    // exist, plus the containing module of every re-inferred define.
    let source_update = update.source_update();
    let deleted: HashSet<&ModuleName> = source_update
        .module_updates
        .iter()
        .filter(|module_update| module_update.is_deletion())
        .map(|module_update| module_update.module())
        .collect();

    let mut modules: Vec<ModuleName> = Vec::new();
    let mut seen: HashSet<ModuleName> = HashSet::new();
    for module in &source_update.invalidated_modules {
        if !deleted.contains(module) && seen.insert(module.clone()) {
            modules.push(module.clone());
        }
    }
    let unannotated = environment.read_only().unannotated();
    for name in functions.keys() {
        if let Some(define) = unannotated.get_function_definition(name)? {
            let module = define.name.qualifier();
            if seen.insert(module.clone()) {
                modules.push(module.clone());
            }
        }
    }

    let diagnostics = environment.postprocessing().run(
        scheduler,
        configuration,
        &environment.read_only(),
        &modules,
    )?;

    // Reconcile: stale entries go first (deleted modules included), then the
    // fresh diagnostics land under their own module keys.
    for module in &source_update.invalidated_modules {
        errors.drop_module(module);
    }
    for module in &modules {
        errors.drop_module(module);
    }
    for diagnostic in &diagnostics {
        errors.append(diagnostic.clone());
    }

    tracer.on_recheck_end(modules.len(), diagnostics.len());
    Ok((modules, diagnostics))
}

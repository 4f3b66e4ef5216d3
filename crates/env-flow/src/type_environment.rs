//! The type environment: per-define check results at the top of the stack.
//!
//! This layer is lazy-incremental: an update drops the results of triggered
//! defines without recomputing them, and the recheck driver repopulates the
//! exact re-inference set eagerly through [`populate_for_definitions`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shale::DependencyHandle;

use crate::annotated_globals::{AnnotatedGlobalEnvironment, AnnotatedGlobalReadView};
use crate::ast_environment::{AstEnvironment, AstReadView};
use crate::configuration::Configuration;
use crate::dependency::DependencyDescriptor;
use crate::diagnostics::Diagnostic;
use crate::error::EngineError;
use crate::layer::{Environment, EnvironmentLayer, LayerSpec};
use crate::names::{ModuleName, Name};
use crate::persist;
use crate::scheduler::{Policy, Scheduler};
use crate::source::Define;
use crate::tracer::EngineTracer;
use crate::types::TypeExpr;
use crate::unannotated_globals::UnannotatedGlobalReadView;
use crate::update::UpdateResult;

/// The annotations and diagnostics inferred for one define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineCheck {
    /// The define's qualified name.
    pub define: Name,
    /// The return type the define was checked against or inferred to have.
    pub return_type: TypeExpr,
    /// Diagnostics raised while checking the body.
    pub diagnostics: Vec<Diagnostic>,
}

/// The check result stored per define name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// The name is a define and was checked.
    Checked(DefineCheck),
    /// The name is not a define.
    Absent,
}

/// The type inference pass the engine delegates to.
///
/// Implementations read the globals view with the given dependency handle so
/// every fact consulted during inference is attributed to the define being
/// checked.
pub trait Inference: Send + Sync + 'static {
    /// Check one define and produce its annotations and diagnostics.
    fn check_define(
        &self,
        globals: &AnnotatedGlobalReadView,
        define: &Define,
        dependency: Option<DependencyHandle>,
    ) -> Result<DefineCheck, EngineError>;
}

/// The module-level error pass run after re-inference.
pub trait Postprocessing: Send + Sync + 'static {
    /// Produce the full diagnostic list for the given modules.
    fn run(
        &self,
        scheduler: &Scheduler,
        configuration: &Configuration,
        environment: &TypeEnvironmentReadView,
        modules: &[ModuleName],
    ) -> Result<Vec<Diagnostic>, EngineError>;
}

/// Layer rule mapping a define name to its check result.
pub struct TypeCheckLayer {
    inference: Arc<dyn Inference>,
}

impl LayerSpec for TypeCheckLayer {
    type Previous = AnnotatedGlobalEnvironment;
    type Key = Name;
    type Value = CheckResult;
    type Trigger = Name;

    const NAME: &'static str = "type-environment";

    fn lazy_incremental(&self) -> bool {
        true
    }

    fn convert_trigger(&self, trigger: &Name) -> Name {
        trigger.clone()
    }

    fn key_to_trigger(&self, key: &Name) -> Name {
        key.clone()
    }

    fn trigger_to_dependency(&self, trigger: &Name) -> DependencyDescriptor {
        DependencyDescriptor::TypeCheckDefine(trigger.clone())
    }

    fn filter_upstream_dependency(&self, descriptor: &DependencyDescriptor) -> Option<Name> {
        match descriptor {
            DependencyDescriptor::TypeCheckDefine(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn produce_value(
        &self,
        previous: &AnnotatedGlobalReadView,
        trigger: &Name,
        dependency: Option<DependencyHandle>,
    ) -> Result<CheckResult, EngineError> {
        match previous.get_function_definition(dependency, trigger)? {
            Some(define) => Ok(CheckResult::Checked(self.inference.check_define(
                previous,
                &define,
                dependency,
            )?)),
            None => Ok(CheckResult::Absent),
        }
    }
}

/// The type environment: the top of the layer stack.
#[derive(Clone)]
pub struct TypeEnvironment {
    layer: EnvironmentLayer<TypeCheckLayer>,
    postprocessing: Arc<dyn Postprocessing>,
}

impl TypeEnvironment {
    /// Create the type environment over the annotated-globals environment,
    /// with the given inference and postprocessing seams.
    pub fn create(
        previous: AnnotatedGlobalEnvironment,
        inference: Arc<dyn Inference>,
        postprocessing: Arc<dyn Postprocessing>,
    ) -> Self {
        Self {
            layer: EnvironmentLayer::new(TypeCheckLayer { inference }, previous),
            postprocessing,
        }
    }

    /// Load the type environment from a snapshot directory.
    pub fn load(
        directory: &Path,
        previous: AnnotatedGlobalEnvironment,
        inference: Arc<dyn Inference>,
        postprocessing: Arc<dyn Postprocessing>,
    ) -> Result<Self, EngineError> {
        persist::load_manifest(directory, TypeCheckLayer::NAME)?;
        Ok(Self::create(previous, inference, postprocessing))
    }

    /// The check result of a define name.
    pub fn get_check_result(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<CheckResult, EngineError> {
        self.layer.get(dependency, name)
    }

    /// Drop the cached check results for the given defines, keeping their
    /// recorded dependents.
    pub fn invalidate_definitions<'a>(&self, names: impl IntoIterator<Item = &'a Name>) {
        for name in names {
            self.layer.evict(name);
        }
    }

    /// The postprocessing seam this environment was created with.
    pub fn postprocessing(&self) -> &Arc<dyn Postprocessing> {
        &self.postprocessing
    }
}

/// Read-only view of the type environment.
#[derive(Clone)]
pub struct TypeEnvironmentReadView {
    environment: TypeEnvironment,
}

impl TypeEnvironmentReadView {
    /// The check result of a define name, recording `dependency` as its
    /// consumer.
    pub fn get_check_result(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<CheckResult, EngineError> {
        self.environment.get_check_result(dependency, name)
    }

    /// The globals view beneath this layer.
    pub fn globals(&self) -> AnnotatedGlobalReadView {
        self.environment.layer.previous().read_only()
    }

    /// The unannotated-globals view, for definition lookups.
    pub fn unannotated(&self) -> UnannotatedGlobalReadView {
        self.globals().unannotated()
    }

    /// The parser view at the bottom of the stack.
    pub fn ast(&self) -> AstReadView {
        self.environment.ast_environment().read_only()
    }
}

impl Environment for TypeEnvironment {
    type ReadOnly = TypeEnvironmentReadView;

    fn read_only(&self) -> TypeEnvironmentReadView {
        TypeEnvironmentReadView {
            environment: self.clone(),
        }
    }

    fn configuration(&self) -> Arc<Configuration> {
        self.layer.previous().configuration()
    }

    fn ast_environment(&self) -> AstEnvironment {
        self.layer.previous().ast_environment()
    }

    fn tracer(&self) -> Arc<dyn EngineTracer> {
        self.layer.previous().tracer()
    }

    fn update_this_and_all_preceding_environments(
        &self,
        scheduler: &Scheduler,
        artifact_paths: &[PathBuf],
    ) -> Result<Arc<UpdateResult>, EngineError> {
        self.layer.update_stack(scheduler, artifact_paths)
    }

    fn invalidate_caches(&self) {
        self.layer.invalidate_caches()
    }

    fn heap_entry_count(&self) -> usize {
        self.layer.heap_entry_count()
    }

    fn store(&self, directory: &Path) -> Result<(), EngineError> {
        self.layer.store_stack(directory)
    }
}

/// Run the inference pass for the given defines, attributing each define's
/// reads to its registered dependency handle.
///
/// This is the eager repopulation pass paired with the type environment's
/// lazy invalidation: the driver calls it with the full function-trigger map
/// immediately after the layered update, so no lazily dropped entry is
/// observable by postprocessing.
pub fn populate_for_definitions(
    scheduler: &Scheduler,
    environment: &TypeEnvironment,
    definitions: &[(Name, Option<DependencyHandle>)],
) -> Result<(), EngineError> {
    let (result, _collected) = scheduler.collected_map_reduce(
        Policy::fixed_chunk_count(1, 100, 5),
        definitions,
        Ok(()),
        |collector, chunk| {
            for (name, handle) in chunk {
                if let Some(handle) = handle {
                    collector.record(*handle);
                }
                environment.get_check_result(None, name)?;
            }
            Ok(())
        },
        |left: Result<(), EngineError>, right| left.and(right),
    );
    result
}

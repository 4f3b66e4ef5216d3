//! The annotated-globals layer: the outward-facing type of each name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shale::DependencyHandle;

use crate::ast_environment::AstEnvironment;
use crate::class_hierarchy::{ClassHierarchyReadView, ClassSummary};
use crate::configuration::Configuration;
use crate::dependency::DependencyDescriptor;
use crate::error::EngineError;
use crate::layer::{Environment, EnvironmentLayer, LayerSpec};
use crate::names::Name;
use crate::persist;
use crate::resolved_globals::{ResolvedGlobal, ResolvedGlobalEnvironment, ResolvedGlobalReadView};
use crate::scheduler::Scheduler;
use crate::source::Define;
use crate::tracer::EngineTracer;
use crate::types::TypeExpr;
use crate::unannotated_globals::{UnannotatedGlobal, UnannotatedGlobalReadView};
use crate::update::UpdateResult;

/// The outward-facing type of a module-level entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeOfGlobal {
    /// The name exists and has this type.
    Defined(TypeExpr),
    /// The name does not exist.
    Absent,
}

/// Layer rule mapping a qualified name to its outward type.
pub struct AnnotatedGlobalLayer;

impl LayerSpec for AnnotatedGlobalLayer {
    type Previous = ResolvedGlobalEnvironment;
    type Key = Name;
    type Value = TypeOfGlobal;
    type Trigger = Name;

    const NAME: &'static str = "annotated-globals";

    fn convert_trigger(&self, trigger: &Name) -> Name {
        trigger.clone()
    }

    fn key_to_trigger(&self, key: &Name) -> Name {
        key.clone()
    }

    fn trigger_to_dependency(&self, trigger: &Name) -> DependencyDescriptor {
        DependencyDescriptor::TypeOfGlobal(trigger.clone())
    }

    fn filter_upstream_dependency(&self, descriptor: &DependencyDescriptor) -> Option<Name> {
        match descriptor {
            DependencyDescriptor::TypeOfGlobal(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn produce_value(
        &self,
        previous: &ResolvedGlobalReadView,
        trigger: &Name,
        dependency: Option<DependencyHandle>,
    ) -> Result<TypeOfGlobal, EngineError> {
        Ok(match previous.get_resolved_global(dependency, trigger)? {
            ResolvedGlobal::Function {
                parameters,
                return_type,
                ..
            } => TypeOfGlobal::Defined(TypeExpr::Callable {
                parameters: parameters
                    .into_iter()
                    .map(|(_, parameter_type)| parameter_type)
                    .collect(),
                returns: Box::new(return_type),
            }),
            ResolvedGlobal::Class { name, .. } => {
                TypeOfGlobal::Defined(TypeExpr::ClassObject(name))
            }
            ResolvedGlobal::Variable { annotation, .. } => TypeOfGlobal::Defined(annotation),
            ResolvedGlobal::Absent => TypeOfGlobal::Absent,
        })
    }
}

/// The annotated-globals environment.
#[derive(Clone)]
pub struct AnnotatedGlobalEnvironment {
    layer: EnvironmentLayer<AnnotatedGlobalLayer>,
}

impl AnnotatedGlobalEnvironment {
    /// Create this layer over the resolved-globals environment.
    pub fn create(previous: ResolvedGlobalEnvironment) -> Self {
        Self {
            layer: EnvironmentLayer::new(AnnotatedGlobalLayer, previous),
        }
    }

    /// Load this layer from a snapshot directory.
    pub fn load(
        directory: &Path,
        previous: ResolvedGlobalEnvironment,
    ) -> Result<Self, EngineError> {
        persist::load_manifest(directory, AnnotatedGlobalLayer::NAME)?;
        Ok(Self::create(previous))
    }

    /// The outward type of a qualified name.
    pub fn get_type_of_global(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<TypeOfGlobal, EngineError> {
        self.layer.get(dependency, name)
    }
}

/// Read-only view of the annotated-globals environment.
///
/// This is the view value producers above the globals stack are handed; it
/// carries convenience lookups that chain through the views beneath with the
/// same dependency attribution.
#[derive(Clone)]
pub struct AnnotatedGlobalReadView {
    environment: AnnotatedGlobalEnvironment,
}

impl AnnotatedGlobalReadView {
    /// The outward type of a qualified name, recording `dependency` as its
    /// consumer.
    pub fn get_type_of_global(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<TypeOfGlobal, EngineError> {
        self.environment.get_type_of_global(dependency, name)
    }

    /// The resolved-globals view beneath this layer.
    pub fn upstream(&self) -> ResolvedGlobalReadView {
        self.environment.layer.previous().read_only()
    }

    /// The class-hierarchy view, two layers beneath.
    pub fn class_summaries(&self) -> ClassHierarchyReadView {
        self.upstream().upstream()
    }

    /// The unannotated-globals view, three layers beneath.
    pub fn unannotated(&self) -> UnannotatedGlobalReadView {
        self.class_summaries().upstream()
    }

    /// The ancestor closure of a class name, attributed to `dependency`.
    pub fn get_class_summary(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<ClassSummary, EngineError> {
        self.class_summaries().get_class_summary(dependency, name)
    }

    /// The function definition behind a qualified name, attributed to
    /// `dependency`.
    pub fn get_function_definition(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<Option<Define>, EngineError> {
        Ok(
            match self.unannotated().get_unannotated_global(dependency, name)? {
                UnannotatedGlobal::Function(define) => Some(define),
                _ => None,
            },
        )
    }
}

impl Environment for AnnotatedGlobalEnvironment {
    type ReadOnly = AnnotatedGlobalReadView;

    fn read_only(&self) -> AnnotatedGlobalReadView {
        AnnotatedGlobalReadView {
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

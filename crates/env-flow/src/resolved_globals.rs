//! The resolved-globals layer: raw definitions with their annotations resolved
//! against the class hierarchy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shale::DependencyHandle;

use crate::ast_environment::AstEnvironment;
use crate::class_hierarchy::{ClassHierarchyEnvironment, ClassHierarchyReadView, ClassSummary};
use crate::configuration::Configuration;
use crate::dependency::DependencyDescriptor;
use crate::error::EngineError;
use crate::layer::{Environment, EnvironmentLayer, LayerSpec};
use crate::names::{qualify_in_module, ModuleName, Name};
use crate::persist;
use crate::scheduler::Scheduler;
use crate::tracer::EngineTracer;
use crate::types::TypeExpr;
use crate::unannotated_globals::UnannotatedGlobal;
use crate::update::UpdateResult;

/// The resolved form of a module-level entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedGlobal {
    /// A function with its signature annotations resolved.
    Function {
        /// The function's qualified name.
        name: Name,
        /// Parameter names and their resolved types, in declaration order.
        parameters: Vec<(String, TypeExpr)>,
        /// The resolved return type.
        return_type: TypeExpr,
    },
    /// A class with its ancestor closure attached.
    Class {
        /// The class's qualified name.
        name: Name,
        /// Every reachable ancestor, nearest first.
        ancestors: Vec<Name>,
    },
    /// A module-level variable with its type resolved from the annotation or
    /// inferred from the initializer literal.
    Variable {
        /// The variable's qualified name.
        name: Name,
        /// The resolved type.
        annotation: TypeExpr,
    },
    /// The name does not exist.
    Absent,
}

fn resolve_annotation(
    previous: &ClassHierarchyReadView,
    dependency: Option<DependencyHandle>,
    module: &ModuleName,
    annotation: Option<&str>,
) -> Result<TypeExpr, EngineError> {
    let Some(text) = annotation else {
        return Ok(TypeExpr::Unknown);
    };
    if let Some(builtin) = TypeExpr::builtin(text) {
        return Ok(builtin);
    }
    let candidate = qualify_in_module(module, text);
    Ok(match previous.get_class_summary(dependency, &candidate)? {
        ClassSummary::Present { .. } => TypeExpr::Instance(candidate),
        ClassSummary::Absent => TypeExpr::Unknown,
    })
}

/// Layer rule mapping a qualified name to its resolved definition.
pub struct ResolvedGlobalLayer;

impl LayerSpec for ResolvedGlobalLayer {
    type Previous = ClassHierarchyEnvironment;
    type Key = Name;
    type Value = ResolvedGlobal;
    type Trigger = Name;

    const NAME: &'static str = "resolved-globals";

    // Intermediate facts; reads are rare enough that the hot cache is not
    // worth the memory.
    fn cache_mode(&self) -> shale::CacheMode {
        shale::CacheMode::NoCache
    }

    fn convert_trigger(&self, trigger: &Name) -> Name {
        trigger.clone()
    }

    fn key_to_trigger(&self, key: &Name) -> Name {
        key.clone()
    }

    fn trigger_to_dependency(&self, trigger: &Name) -> DependencyDescriptor {
        DependencyDescriptor::ResolvedGlobal(trigger.clone())
    }

    fn filter_upstream_dependency(&self, descriptor: &DependencyDescriptor) -> Option<Name> {
        match descriptor {
            DependencyDescriptor::ResolvedGlobal(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn produce_value(
        &self,
        previous: &ClassHierarchyReadView,
        trigger: &Name,
        dependency: Option<DependencyHandle>,
    ) -> Result<ResolvedGlobal, EngineError> {
        let module = trigger.qualifier();
        let raw = previous
            .upstream()
            .get_unannotated_global(dependency, trigger)?;
        Ok(match raw {
            UnannotatedGlobal::Function(define) => {
                let mut parameters = Vec::with_capacity(define.parameters.len());
                for parameter in &define.parameters {
                    let resolved = resolve_annotation(
                        previous,
                        dependency,
                        &module,
                        parameter.annotation.as_deref(),
                    )?;
                    parameters.push((parameter.name.clone(), resolved));
                }
                let return_type = resolve_annotation(
                    previous,
                    dependency,
                    &module,
                    define.return_annotation.as_deref(),
                )?;
                ResolvedGlobal::Function {
                    name: trigger.clone(),
                    parameters,
                    return_type,
                }
            }
            UnannotatedGlobal::Class(_) => {
                match previous.get_class_summary(dependency, trigger)? {
                    ClassSummary::Present { name, ancestors } => {
                        ResolvedGlobal::Class { name, ancestors }
                    }
                    ClassSummary::Absent => {
                        return Err(EngineError::inconsistent_upstream(format!(
                            "{} is a class in the unannotated layer but absent from the hierarchy",
                            trigger
                        )))
                    }
                }
            }
            UnannotatedGlobal::Variable(variable) => {
                let annotation = match &variable.annotation {
                    Some(_) => resolve_annotation(
                        previous,
                        dependency,
                        &module,
                        variable.annotation.as_deref(),
                    )?,
                    None => TypeExpr::of_literal(&variable.value).unwrap_or(TypeExpr::Unknown),
                };
                ResolvedGlobal::Variable {
                    name: trigger.clone(),
                    annotation,
                }
            }
            UnannotatedGlobal::Missing => ResolvedGlobal::Absent,
        })
    }
}

/// The resolved-globals environment.
#[derive(Clone)]
pub struct ResolvedGlobalEnvironment {
    layer: EnvironmentLayer<ResolvedGlobalLayer>,
}

impl ResolvedGlobalEnvironment {
    /// Create this layer over the class-hierarchy environment.
    pub fn create(previous: ClassHierarchyEnvironment) -> Self {
        Self {
            layer: EnvironmentLayer::new(ResolvedGlobalLayer, previous),
        }
    }

    /// Load this layer from a snapshot directory.
    pub fn load(
        directory: &Path,
        previous: ClassHierarchyEnvironment,
    ) -> Result<Self, EngineError> {
        persist::load_manifest(directory, ResolvedGlobalLayer::NAME)?;
        Ok(Self::create(previous))
    }

    /// The resolved definition of a qualified name.
    pub fn get_resolved_global(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<ResolvedGlobal, EngineError> {
        self.layer.get(dependency, name)
    }
}

/// Read-only view of the resolved-globals environment.
#[derive(Clone)]
pub struct ResolvedGlobalReadView {
    environment: ResolvedGlobalEnvironment,
}

impl ResolvedGlobalReadView {
    /// The resolved definition of a qualified name, recording `dependency` as
    /// its consumer.
    pub fn get_resolved_global(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<ResolvedGlobal, EngineError> {
        self.environment.get_resolved_global(dependency, name)
    }

    /// The class-hierarchy view beneath this layer.
    pub fn upstream(&self) -> ClassHierarchyReadView {
        self.environment.layer.previous().read_only()
    }
}

impl Environment for ResolvedGlobalEnvironment {
    type ReadOnly = ResolvedGlobalReadView;

    fn read_only(&self) -> ResolvedGlobalReadView {
        ResolvedGlobalReadView {
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

//! The unannotated-globals layer: raw module-level definitions by qualified name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shale::DependencyHandle;

use crate::ast_environment::{AstEnvironment, AstReadView};
use crate::configuration::Configuration;
use crate::dependency::DependencyDescriptor;
use crate::error::EngineError;
use crate::layer::{Environment, EnvironmentLayer, LayerSpec};
use crate::names::Name;
use crate::persist;
use crate::scheduler::Scheduler;
use crate::source::{ClassDef, Define, GlobalVariable};
use crate::tracer::EngineTracer;
use crate::update::UpdateResult;

/// The raw, unannotated definition of a module-level entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnannotatedGlobal {
    /// A function define.
    Function(Define),
    /// A class definition.
    Class(ClassDef),
    /// A module-level variable.
    Variable(GlobalVariable),
    /// No entity of this name exists.
    Missing,
}

/// Layer rule mapping a qualified name to its raw definition.
pub struct UnannotatedGlobalLayer;

impl LayerSpec for UnannotatedGlobalLayer {
    type Previous = AstEnvironment;
    type Key = Name;
    type Value = UnannotatedGlobal;
    type Trigger = Name;

    const NAME: &'static str = "unannotated-globals";

    fn convert_trigger(&self, trigger: &Name) -> Name {
        trigger.clone()
    }

    fn key_to_trigger(&self, key: &Name) -> Name {
        key.clone()
    }

    fn trigger_to_dependency(&self, trigger: &Name) -> DependencyDescriptor {
        DependencyDescriptor::UnannotatedGlobal(trigger.clone())
    }

    fn filter_upstream_dependency(&self, descriptor: &DependencyDescriptor) -> Option<Name> {
        match descriptor {
            DependencyDescriptor::UnannotatedGlobal(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn produce_value(
        &self,
        previous: &AstReadView,
        trigger: &Name,
        dependency: Option<DependencyHandle>,
    ) -> Result<UnannotatedGlobal, EngineError> {
        let module = trigger.qualifier();
        let tree = previous.get_ast(dependency, &module)?;
        Ok(match tree {
            Some(tree) => {
                if let Some(define) = tree.define(trigger) {
                    UnannotatedGlobal::Function(define.clone())
                } else if let Some(class) = tree.class(trigger) {
                    UnannotatedGlobal::Class(class.clone())
                } else if let Some(global) = tree.global(trigger) {
                    UnannotatedGlobal::Variable(global.clone())
                } else {
                    UnannotatedGlobal::Missing
                }
            }
            None => UnannotatedGlobal::Missing,
        })
    }
}

/// The unannotated-globals environment.
#[derive(Clone)]
pub struct UnannotatedGlobalEnvironment {
    layer: EnvironmentLayer<UnannotatedGlobalLayer>,
}

impl UnannotatedGlobalEnvironment {
    /// Create this layer over the parser environment.
    pub fn create(previous: AstEnvironment) -> Self {
        Self {
            layer: EnvironmentLayer::new(UnannotatedGlobalLayer, previous),
        }
    }

    /// Load this layer from a snapshot directory, over an already loaded
    /// parser environment.
    pub fn load(directory: &Path, previous: AstEnvironment) -> Result<Self, EngineError> {
        persist::load_manifest(directory, UnannotatedGlobalLayer::NAME)?;
        Ok(Self::create(previous))
    }

    /// The raw definition of a qualified name.
    pub fn get_unannotated_global(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<UnannotatedGlobal, EngineError> {
        self.layer.get(dependency, name)
    }
}

/// Read-only view of the unannotated-globals environment.
#[derive(Clone)]
pub struct UnannotatedGlobalReadView {
    environment: UnannotatedGlobalEnvironment,
}

impl UnannotatedGlobalReadView {
    /// The raw definition of a qualified name, recording `dependency` as its
    /// consumer.
    pub fn get_unannotated_global(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<UnannotatedGlobal, EngineError> {
        self.environment.get_unannotated_global(dependency, name)
    }

    /// The function definition behind a qualified name, if it names one.
    ///
    /// Reads without dependency attribution; used by driver-level bookkeeping
    /// rather than value producers.
    pub fn get_function_definition(&self, name: &Name) -> Result<Option<Define>, EngineError> {
        Ok(match self.environment.get_unannotated_global(None, name)? {
            UnannotatedGlobal::Function(define) => Some(define),
            _ => None,
        })
    }

    /// The parser view beneath this layer.
    pub fn upstream(&self) -> AstReadView {
        self.environment.layer.previous().read_only()
    }
}

impl Environment for UnannotatedGlobalEnvironment {
    type ReadOnly = UnannotatedGlobalReadView;

    fn read_only(&self) -> UnannotatedGlobalReadView {
        UnannotatedGlobalReadView {
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

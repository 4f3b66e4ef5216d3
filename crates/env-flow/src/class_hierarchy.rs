//! The class-hierarchy layer: ancestor closures per class.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shale::DependencyHandle;

use crate::ast_environment::AstEnvironment;
use crate::configuration::Configuration;
use crate::dependency::DependencyDescriptor;
use crate::error::EngineError;
use crate::layer::{Environment, EnvironmentLayer, LayerSpec};
use crate::names::{qualify_in_module, Name};
use crate::persist;
use crate::scheduler::Scheduler;
use crate::tracer::EngineTracer;
use crate::unannotated_globals::{
    UnannotatedGlobal, UnannotatedGlobalEnvironment, UnannotatedGlobalReadView,
};
use crate::update::UpdateResult;

/// The ancestor closure of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassSummary {
    /// The name exists and is a class.
    Present {
        /// The class's qualified name.
        name: Name,
        /// Every reachable ancestor, nearest first. Names of bases that do
        /// not resolve to classes are kept so consumers can report them.
        ancestors: Vec<Name>,
    },
    /// The name does not exist or is not a class.
    Absent,
}

/// Layer rule mapping a class name to its ancestor closure.
pub struct ClassHierarchyLayer;

impl LayerSpec for ClassHierarchyLayer {
    type Previous = UnannotatedGlobalEnvironment;
    type Key = Name;
    type Value = ClassSummary;
    type Trigger = Name;

    const NAME: &'static str = "class-hierarchy";

    fn convert_trigger(&self, trigger: &Name) -> Name {
        trigger.clone()
    }

    fn key_to_trigger(&self, key: &Name) -> Name {
        key.clone()
    }

    fn trigger_to_dependency(&self, trigger: &Name) -> DependencyDescriptor {
        DependencyDescriptor::ClassSummary(trigger.clone())
    }

    fn filter_upstream_dependency(&self, descriptor: &DependencyDescriptor) -> Option<Name> {
        match descriptor {
            DependencyDescriptor::ClassSummary(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn produce_value(
        &self,
        previous: &UnannotatedGlobalReadView,
        trigger: &Name,
        dependency: Option<DependencyHandle>,
    ) -> Result<ClassSummary, EngineError> {
        let class = match previous.get_unannotated_global(dependency, trigger)? {
            UnannotatedGlobal::Class(class) => class,
            _ => return Ok(ClassSummary::Absent),
        };

        let module = trigger.qualifier();
        let mut ancestors = Vec::new();
        let mut visited: ahash::HashSet<Name> = [trigger.clone()].into_iter().collect();
        let mut queue: VecDeque<Name> = class
            .bases
            .iter()
            .map(|base| qualify_in_module(&module, base))
            .collect();

        while let Some(base) = queue.pop_front() {
            if !visited.insert(base.clone()) {
                continue;
            }
            if let UnannotatedGlobal::Class(base_class) =
                previous.get_unannotated_global(dependency, &base)?
            {
                let base_module = base.qualifier();
                queue.extend(
                    base_class
                        .bases
                        .iter()
                        .map(|deeper| qualify_in_module(&base_module, deeper)),
                );
            }
            ancestors.push(base);
        }

        Ok(ClassSummary::Present {
            name: trigger.clone(),
            ancestors,
        })
    }
}

/// The class-hierarchy environment.
#[derive(Clone)]
pub struct ClassHierarchyEnvironment {
    layer: EnvironmentLayer<ClassHierarchyLayer>,
}

impl ClassHierarchyEnvironment {
    /// Create this layer over the unannotated-globals environment.
    pub fn create(previous: UnannotatedGlobalEnvironment) -> Self {
        Self {
            layer: EnvironmentLayer::new(ClassHierarchyLayer, previous),
        }
    }

    /// Load this layer from a snapshot directory.
    pub fn load(
        directory: &Path,
        previous: UnannotatedGlobalEnvironment,
    ) -> Result<Self, EngineError> {
        persist::load_manifest(directory, ClassHierarchyLayer::NAME)?;
        Ok(Self::create(previous))
    }

    /// The ancestor closure of a class name.
    pub fn get_class_summary(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<ClassSummary, EngineError> {
        self.layer.get(dependency, name)
    }
}

/// Read-only view of the class-hierarchy environment.
#[derive(Clone)]
pub struct ClassHierarchyReadView {
    environment: ClassHierarchyEnvironment,
}

impl ClassHierarchyReadView {
    /// The ancestor closure of a class name, recording `dependency` as its
    /// consumer.
    pub fn get_class_summary(
        &self,
        dependency: Option<DependencyHandle>,
        name: &Name,
    ) -> Result<ClassSummary, EngineError> {
        self.environment.get_class_summary(dependency, name)
    }

    /// The unannotated-globals view beneath this layer.
    pub fn upstream(&self) -> UnannotatedGlobalReadView {
        self.environment.layer.previous().read_only()
    }
}

impl Environment for ClassHierarchyEnvironment {
    type ReadOnly = ClassHierarchyReadView;

    fn read_only(&self) -> ClassHierarchyReadView {
        ClassHierarchyReadView {
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

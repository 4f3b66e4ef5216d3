//! The parser layer: the bottom of the environment stack.
//!
//! Wraps the module tracker and parser seam behind a dependency-tracked table
//! of parsed trees. A batch update reparses the modules behind changed
//! artifact paths, diffs the trees structurally, and reports which downstream
//! facts the changes invalidated along with the module-level bookkeeping
//! (invalidated modules, per-module update kinds, newly introduced defines).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shale::{CacheMode, HandleSet, Table};

use crate::configuration::Configuration;
use crate::dependency::{self, DependencyDescriptor};
use crate::error::EngineError;
use crate::layer::Environment;
use crate::names::ModuleName;
use crate::persist;
use crate::scheduler::{Policy, Scheduler};
use crate::source::{Ast, ModuleUpdate, SourceCodeApi};
use crate::tracer::{EngineTracer, NoopTracer};
use crate::update::{SourceUpdate, UpdateResult};

const NAME: &str = "parser";

struct AstBody {
    configuration: Arc<Configuration>,
    source_api: Arc<dyn SourceCodeApi>,
    tracer: Arc<dyn EngineTracer>,
    /// `None` marks a module that is tracked-absent: its artifact is gone.
    table: Table<ModuleName, Option<Ast>>,
}

/// The parser environment. Cheap to clone; state is shared behind `Arc`.
#[derive(Clone)]
pub struct AstEnvironment {
    inner: Arc<AstBody>,
}

impl AstEnvironment {
    /// Create a parser environment over the given source seam.
    pub fn create(
        configuration: Arc<Configuration>,
        source_api: Arc<dyn SourceCodeApi>,
        tracer: Arc<dyn EngineTracer>,
    ) -> Self {
        Self {
            inner: Arc::new(AstBody {
                configuration,
                source_api,
                tracer,
                table: Table::new(CacheMode::WithCache),
            }),
        }
    }

    /// Create a parser environment with a default configuration and no tracer.
    pub fn create_for_testing(source_api: Arc<dyn SourceCodeApi>) -> Self {
        Self::create(
            Arc::new(Configuration::default()),
            source_api,
            Arc::new(NoopTracer),
        )
    }

    /// Load a parser environment from a snapshot directory.
    ///
    /// Only the manifest and configuration are read back; the parse table
    /// starts cold and repopulates lazily.
    pub fn load(
        directory: &Path,
        source_api: Arc<dyn SourceCodeApi>,
        tracer: Arc<dyn EngineTracer>,
    ) -> Result<Self, EngineError> {
        persist::load_manifest(directory, NAME)?;
        let configuration = persist::load_configuration(directory)?;
        Ok(Self::create(Arc::new(configuration), source_api, tracer))
    }

    /// The module tracker and parser seam this environment wraps.
    pub fn source_api(&self) -> &Arc<dyn SourceCodeApi> {
        &self.inner.source_api
    }

    /// The parsed tree of a module, or `None` if the module is not tracked.
    ///
    /// When `dependency` is given, it is recorded as a consumer of the
    /// module's tree.
    pub fn get_ast(
        &self,
        dependency: Option<shale::DependencyHandle>,
        module: &ModuleName,
    ) -> Result<Option<Ast>, EngineError> {
        if let Some(value) = self.inner.table.get(dependency, module) {
            return Ok(value);
        }
        self.inner
            .tracer
            .on_produce(&DependencyDescriptor::AstParse(module.clone()));
        let parsed = self.parse_module(module)?;
        self.inner.table.add(module.clone(), parsed.clone());
        if let Some(dependency) = dependency {
            self.inner.table.record_dependent(module, dependency);
        }
        Ok(parsed)
    }

    fn parse_module(&self, module: &ModuleName) -> Result<Option<Ast>, EngineError> {
        match self.inner.source_api.source_for_module(module) {
            Some(source) => self
                .inner
                .source_api
                .parse(module, &source)
                .map(Some)
                .map_err(|source| EngineError::producer(format!("ast({})", module), source)),
            None => Ok(None),
        }
    }

    /// Reparse the modules behind changed artifact paths and report what the
    /// batch invalidated.
    pub fn update(
        &self,
        scheduler: &Scheduler,
        artifact_paths: &[PathBuf],
    ) -> Result<Arc<UpdateResult>, EngineError> {
        let mut affected: BTreeSet<ModuleName> = BTreeSet::new();
        for path in artifact_paths {
            if let Some(module) = self.inner.source_api.module_for_artifact(path) {
                affected.insert(module);
            }
        }
        if affected.is_empty() {
            self.inner.tracer.on_update_start(NAME, 0);
            return Ok(UpdateResult::root(HandleSet::new(), SourceUpdate::empty()));
        }

        let affected: Vec<ModuleName> = affected.into_iter().collect();
        let parsed = scheduler.map_reduce(
            Policy::fixed_chunk_count(1, 100, 5),
            &affected,
            Ok(Vec::new()),
            |chunk| {
                chunk
                    .iter()
                    .map(|module| self.parse_module(module).map(|ast| (module.clone(), ast)))
                    .collect::<Result<Vec<_>, EngineError>>()
            },
            |left: Result<Vec<_>, EngineError>, right| {
                let mut left = left?;
                left.extend(right?);
                Ok(left)
            },
        )?;

        let mut staged: Vec<ModuleName> = Vec::new();
        let mut new_values: Vec<(ModuleName, Option<Ast>)> = Vec::new();
        let mut invalidated_modules: Vec<ModuleName> = Vec::new();
        let mut module_updates: Vec<ModuleUpdate> = Vec::new();
        let mut define_additions: BTreeSet<crate::names::Name> = BTreeSet::new();
        let mut parse_markers = HandleSet::new();

        for (module, new_tree) in parsed {
            let old_entry = self.inner.table.get(None, &module);
            if old_entry.is_none() && new_tree.is_none() {
                // A path that maps to a module the engine never saw and which
                // has no source now; nothing to do.
                continue;
            }
            let old_tree = old_entry.clone().flatten();
            let changed = match &old_entry {
                Some(old_value) => old_value != &new_tree,
                None => new_tree.is_some(),
            };
            if changed {
                invalidated_modules.push(module.clone());
                match (&old_tree, &new_tree) {
                    (None, Some(_)) => module_updates.push(ModuleUpdate::New(module.clone())),
                    (Some(_), Some(_)) => module_updates.push(ModuleUpdate::Changed(module.clone())),
                    (Some(_), None) => module_updates.push(ModuleUpdate::Deleted(module.clone())),
                    (None, None) => {}
                }
                if let Some(new_tree) = &new_tree {
                    for define in new_tree.define_names() {
                        let existed = old_tree
                            .as_ref()
                            .map(|old_tree| old_tree.define(define).is_some())
                            .unwrap_or(false);
                        if !existed {
                            define_additions.insert(define.clone());
                        }
                    }
                }
                parse_markers = parse_markers
                    .added(dependency::register(DependencyDescriptor::AstParse(module.clone())));
            }
            staged.push(module.clone());
            new_values.push((module, new_tree));
        }

        self.inner.tracer.on_update_start(NAME, staged.len());
        let mut transaction = self.inner.table.transaction();
        transaction.stage(staged);
        let table = &self.inner.table;
        let commit = transaction.execute(|| {
            for (module, value) in new_values {
                table.add(module, value);
            }
            Ok::<(), EngineError>(())
        })?;
        self.inner.tracer.on_update_end(NAME, &commit);

        let triggered = commit.triggered.union(&parse_markers);
        Ok(UpdateResult::root(
            triggered,
            SourceUpdate {
                invalidated_modules,
                module_updates,
                define_additions,
            },
        ))
    }
}

/// Read-only view of the parser environment.
#[derive(Clone)]
pub struct AstReadView {
    environment: AstEnvironment,
}

impl AstReadView {
    /// The parsed tree of a module, recording `dependency` as its consumer.
    pub fn get_ast(
        &self,
        dependency: Option<shale::DependencyHandle>,
        module: &ModuleName,
    ) -> Result<Option<Ast>, EngineError> {
        self.environment.get_ast(dependency, module)
    }
}

impl Environment for AstEnvironment {
    type ReadOnly = AstReadView;

    fn read_only(&self) -> AstReadView {
        AstReadView {
            environment: self.clone(),
        }
    }

    fn configuration(&self) -> Arc<Configuration> {
        self.inner.configuration.clone()
    }

    fn ast_environment(&self) -> AstEnvironment {
        self.clone()
    }

    fn tracer(&self) -> Arc<dyn EngineTracer> {
        self.inner.tracer.clone()
    }

    fn update_this_and_all_preceding_environments(
        &self,
        scheduler: &Scheduler,
        artifact_paths: &[PathBuf],
    ) -> Result<Arc<UpdateResult>, EngineError> {
        self.update(scheduler, artifact_paths)
    }

    fn invalidate_caches(&self) {
        self.inner.table.clear_cache();
    }

    fn heap_entry_count(&self) -> usize {
        self.inner.table.len()
    }

    fn store(&self, directory: &Path) -> Result<(), EngineError> {
        persist::store_configuration(directory, &self.inner.configuration)?;
        persist::store_manifest_with_modules(
            directory,
            NAME,
            self.inner.table.len(),
            self.inner.source_api.tracked_modules(),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::MemoryCodebase;

    use super::*;

    #[test]
    fn test_get_ast_parses_on_demand() {
        let codebase = Arc::new(MemoryCodebase::new());
        codebase.set_source("m.py", "def f(x: int) -> int: return x");
        let environment = AstEnvironment::create_for_testing(codebase);

        let tree = environment.get_ast(None, &ModuleName::new("m")).unwrap();
        assert_eq!(tree.unwrap().defines.len(), 1);
        assert_eq!(
            environment.get_ast(None, &ModuleName::new("absent")).unwrap(),
            None
        );
    }

    #[test]
    fn test_update_classifies_modules() {
        let codebase = Arc::new(MemoryCodebase::new());
        codebase.set_source("m.py", "def f(): return 1");
        let environment = AstEnvironment::create_for_testing(codebase.clone());
        let scheduler = Scheduler::serial();

        let result = environment
            .update(&scheduler, &[PathBuf::from("m.py")])
            .unwrap();
        assert_eq!(
            result.source_update().module_updates,
            vec![ModuleUpdate::New(ModuleName::new("m"))]
        );
        assert_eq!(
            result.define_additions().iter().cloned().collect::<Vec<_>>(),
            vec![crate::names::Name::new("m.f")]
        );

        codebase.remove_source("m.py");
        let result = environment
            .update(&scheduler, &[PathBuf::from("m.py")])
            .unwrap();
        assert_eq!(
            result.source_update().module_updates,
            vec![ModuleUpdate::Deleted(ModuleName::new("m"))]
        );
        assert_eq!(environment.get_ast(None, &ModuleName::new("m")).unwrap(), None);
    }
}

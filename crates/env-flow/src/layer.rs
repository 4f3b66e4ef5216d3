//! The generic derived layer: a memoized, dependency-tracked view over the
//! environment beneath it.

use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use shale::{CacheMode, DependencyHandle, Table, TableKey, TableValue};

use crate::ast_environment::AstEnvironment;
use crate::configuration::Configuration;
use crate::dependency::{self, DependencyDescriptor};
use crate::error::EngineError;
use crate::persist;
use crate::scheduler::{Policy, Scheduler};
use crate::tracer::EngineTracer;
use crate::update::UpdateResult;

/// An environment in the layer stack.
///
/// Environments are cheap to clone; all state lives behind `Arc`. The read
/// view handed to the layer above is an owned, cheap-clone value as well, so
/// value producers can run on worker threads without lifetime plumbing.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The read-only view this environment exposes to the layer above.
    type ReadOnly: Clone + Send + Sync + 'static;

    /// The read-only view of this environment.
    fn read_only(&self) -> Self::ReadOnly;

    /// The configuration shared by the stack.
    fn configuration(&self) -> Arc<Configuration>;

    /// The parser layer at the bottom of the stack.
    fn ast_environment(&self) -> AstEnvironment;

    /// The tracer shared by the stack.
    fn tracer(&self) -> Arc<dyn EngineTracer>;

    /// Update the layer beneath first, then this layer from its result.
    ///
    /// This is the single bottom-up pass: each layer runs exactly once per
    /// batch, and the returned chain carries one triggered set per layer.
    fn update_this_and_all_preceding_environments(
        &self,
        scheduler: &Scheduler,
        artifact_paths: &[PathBuf],
    ) -> Result<Arc<UpdateResult>, EngineError>;

    /// Drop every secondary value cache in this layer and all beneath it.
    fn invalidate_caches(&self);

    /// Approximate count of live table entries in this layer and all beneath.
    fn heap_entry_count(&self) -> usize;

    /// Persist the non-tabular state of this layer and all beneath it.
    fn store(&self, directory: &Path) -> Result<(), EngineError>;
}

/// The rule a derived layer is built from: key, value, and trigger types, the
/// bridging functions between them, and the value producer.
pub trait LayerSpec: Send + Sync + 'static {
    /// The environment beneath this layer.
    type Previous: Environment;
    /// The identifier this layer's table maps from.
    type Key: TableKey;
    /// The computed payload stored per key.
    type Value: TableValue;
    /// This layer's unit of recomputation work.
    type Trigger: Clone + PartialEq + Eq + Hash + Send + Sync + 'static;

    /// The layer's name, used for tracing and snapshot manifests.
    const NAME: &'static str;

    /// Whether invalidation drops values pessimistically instead of
    /// recomputing them inside the update transaction.
    fn lazy_incremental(&self) -> bool {
        false
    }

    /// The cache mode of the layer's table. Correctness never depends on it.
    fn cache_mode(&self) -> CacheMode {
        CacheMode::WithCache
    }

    /// The table key a trigger maps to.
    fn convert_trigger(&self, trigger: &Self::Trigger) -> Self::Key;

    /// The trigger a table key maps to.
    fn key_to_trigger(&self, key: &Self::Key) -> Self::Trigger;

    /// The descriptor naming the fact a trigger recomputes.
    fn trigger_to_dependency(&self, trigger: &Self::Trigger) -> DependencyDescriptor;

    /// Select, from a dependency triggered beneath this layer, the trigger it
    /// maps to in this layer, if any.
    fn filter_upstream_dependency(
        &self,
        descriptor: &DependencyDescriptor,
    ) -> Option<Self::Trigger>;

    /// Compute the value for a trigger from the upstream read view.
    ///
    /// `dependency` is the handle upstream reads are attributed to, so a
    /// future invalidation of an upstream key automatically invalidates this
    /// derived value. Total for every well-formed trigger; an `Err` is a
    /// fatal producer failure.
    fn produce_value(
        &self,
        previous: &<Self::Previous as Environment>::ReadOnly,
        trigger: &Self::Trigger,
        dependency: Option<DependencyHandle>,
    ) -> Result<Self::Value, EngineError>;
}

struct LayerBody<S: LayerSpec> {
    spec: S,
    previous: S::Previous,
    table: Table<S::Key, S::Value>,
}

/// One derived layer: a previous environment, a fact table, and the rule that
/// fills it.
///
/// Cheap to clone; the layer body is shared behind `Arc`.
pub struct EnvironmentLayer<S: LayerSpec> {
    inner: Arc<LayerBody<S>>,
}

impl<S: LayerSpec> Clone for EnvironmentLayer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: LayerSpec> EnvironmentLayer<S> {
    /// Create a layer over the given previous environment.
    pub fn new(spec: S, previous: S::Previous) -> Self {
        let table = Table::new(spec.cache_mode());
        Self {
            inner: Arc::new(LayerBody {
                spec,
                previous,
                table,
            }),
        }
    }

    /// The layer's rule.
    pub fn spec(&self) -> &S {
        &self.inner.spec
    }

    /// The environment beneath this layer.
    pub fn previous(&self) -> &S::Previous {
        &self.inner.previous
    }

    /// Look up a key, computing and memoizing its value on a miss.
    ///
    /// When `dependency` is given, it is recorded as a consumer of the key.
    /// Missing keys never fail: the producer is total for well-formed keys.
    pub fn get(
        &self,
        dependency: Option<DependencyHandle>,
        key: &S::Key,
    ) -> Result<S::Value, EngineError> {
        if let Some(value) = self.inner.table.get(dependency, key) {
            return Ok(value);
        }
        let trigger = self.inner.spec.key_to_trigger(key);
        let descriptor = self.inner.spec.trigger_to_dependency(&trigger);
        self.inner.previous.tracer().on_produce(&descriptor);
        let registered = dependency::register(descriptor);
        let value = self.inner.spec.produce_value(
            &self.inner.previous.read_only(),
            &trigger,
            Some(registered),
        )?;
        self.inner.table.add(key.clone(), value.clone());
        if let Some(dependency) = dependency {
            self.inner.table.record_dependent(key, dependency);
        }
        Ok(value)
    }

    /// Update this layer from the chained result of the layers beneath.
    ///
    /// Builds the trigger map by filtering every triggered set in the chain
    /// (first handle wins per trigger), invalidates the corresponding keys in
    /// one transaction, and recomputes them in parallel unless the layer is
    /// lazy-incremental.
    pub fn update(
        &self,
        scheduler: &Scheduler,
        upstream_update_result: Arc<UpdateResult>,
    ) -> Result<Arc<UpdateResult>, EngineError> {
        let spec = &self.inner.spec;
        let tracer = self.inner.previous.tracer();

        let mut trigger_map: IndexMap<S::Trigger, DependencyHandle> = IndexMap::new();
        for triggered in upstream_update_result.all_triggered_dependencies() {
            for handle in triggered.iter() {
                let descriptor = dependency::describe(handle);
                if let Some(trigger) = spec.filter_upstream_dependency(&descriptor) {
                    trigger_map.entry(trigger).or_insert(handle);
                }
            }
        }
        tracer.on_update_start(S::NAME, trigger_map.len());

        let keys: Vec<S::Key> = trigger_map
            .keys()
            .map(|trigger| spec.convert_trigger(trigger))
            .collect();

        let mut transaction = self.inner.table.transaction();
        let commit = if spec.lazy_incremental() {
            transaction.stage_pessimistic(keys);
            transaction.execute(|| Ok::<(), EngineError>(()))?
        } else {
            transaction.stage(keys);
            let work: Vec<(S::Trigger, DependencyHandle)> = trigger_map
                .iter()
                .map(|(trigger, handle)| (trigger.clone(), *handle))
                .collect();
            let previous = self.inner.previous.read_only();
            let table = &self.inner.table;
            let tracer = &tracer;
            transaction.execute(|| {
                let (result, _collected) = scheduler.collected_map_reduce(
                    Policy::fixed_chunk_count(1, 100, 5),
                    &work,
                    Ok(()),
                    |collector, chunk| {
                        for (trigger, registered) in chunk {
                            collector.record(*registered);
                            tracer.on_produce(&spec.trigger_to_dependency(trigger));
                            let value = spec.produce_value(&previous, trigger, Some(*registered))?;
                            table.add(spec.convert_trigger(trigger), value);
                        }
                        Ok(())
                    },
                    |left: Result<(), EngineError>, right| left.and(right),
                );
                result
            })?
        };
        tracer.on_update_end(S::NAME, &commit);

        Ok(UpdateResult::layered(commit.triggered, upstream_update_result))
    }

    /// Remove the stored value for a key, keeping its recorded dependents.
    pub fn evict(&self, key: &S::Key) {
        let _ = self.inner.table.remove(key);
    }

    /// The number of stored values.
    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    /// Returns true if no value is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.table.is_empty()
    }

    /// Drop the secondary cache of this layer's table and every one beneath.
    pub fn invalidate_caches(&self) {
        self.inner.table.clear_cache();
        self.inner.previous.invalidate_caches();
    }

    /// Live entries in this layer's table and every one beneath.
    pub fn heap_entry_count(&self) -> usize {
        self.inner.table.len() + self.inner.previous.heap_entry_count()
    }

    /// Update the stack beneath this layer, then this layer.
    pub fn update_stack(
        &self,
        scheduler: &Scheduler,
        artifact_paths: &[PathBuf],
    ) -> Result<Arc<UpdateResult>, EngineError> {
        let upstream = self
            .inner
            .previous
            .update_this_and_all_preceding_environments(scheduler, artifact_paths)?;
        self.update(scheduler, upstream)
    }

    /// Persist the stack beneath this layer, then this layer's manifest.
    pub fn store_stack(&self, directory: &Path) -> Result<(), EngineError> {
        self.inner.previous.store(directory)?;
        persist::store_manifest(directory, S::NAME, self.inner.table.len())
    }
}

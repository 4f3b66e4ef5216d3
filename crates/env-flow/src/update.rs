//! Per-layer update results and the bottom-up chain they form.

use std::collections::BTreeSet;
use std::sync::Arc;

use shale::HandleSet;

use crate::names::{ModuleName, Name};
use crate::source::ModuleUpdate;

/// The bottom layer's account of a source update batch.
#[derive(Debug, Clone)]
pub struct SourceUpdate {
    /// Modules whose parse tree changed and which therefore require
    /// postprocessing.
    pub invalidated_modules: Vec<ModuleName>,
    /// Per-module classification of the batch.
    pub module_updates: Vec<ModuleUpdate>,
    /// Defines newly introduced by the parse.
    pub define_additions: BTreeSet<Name>,
}

impl SourceUpdate {
    /// An update batch that changed nothing.
    pub fn empty() -> Self {
        SourceUpdate {
            invalidated_modules: Vec::new(),
            module_updates: Vec::new(),
            define_additions: BTreeSet::new(),
        }
    }
}

/// One layer's record of an update: the dependencies it invalidated, chained
/// to the result of the layer beneath.
///
/// Results are single-use values produced by one update and consumed by the
/// next layer up or by the recheck driver.
#[derive(Debug)]
pub struct UpdateResult {
    triggered_dependencies: HandleSet,
    upstream: Option<Arc<UpdateResult>>,
    source_update: Option<SourceUpdate>,
}

impl UpdateResult {
    /// The bottom of a chain: the parser layer's result.
    pub fn root(triggered_dependencies: HandleSet, source_update: SourceUpdate) -> Arc<Self> {
        Arc::new(UpdateResult {
            triggered_dependencies,
            upstream: None,
            source_update: Some(source_update),
        })
    }

    /// A derived layer's result, chained onto the one beneath.
    pub fn layered(triggered_dependencies: HandleSet, upstream: Arc<UpdateResult>) -> Arc<Self> {
        Arc::new(UpdateResult {
            triggered_dependencies,
            upstream: Some(upstream),
            source_update: None,
        })
    }

    /// The dependencies this layer's update invalidated.
    pub fn triggered_dependencies(&self) -> &HandleSet {
        &self.triggered_dependencies
    }

    /// The result of the layer beneath, if this is not the bottom.
    pub fn upstream(&self) -> Option<&Arc<UpdateResult>> {
        self.upstream.as_ref()
    }

    /// Every layer's triggered set, bottom-first, one entry per layer.
    pub fn all_triggered_dependencies(&self) -> Vec<&HandleSet> {
        let mut sets = match &self.upstream {
            Some(upstream) => upstream.all_triggered_dependencies(),
            None => Vec::new(),
        };
        sets.push(&self.triggered_dependencies);
        sets
    }

    /// The terminal source update produced by the parser layer.
    pub fn source_update(&self) -> &SourceUpdate {
        match (&self.upstream, &self.source_update) {
            (Some(upstream), _) => upstream.source_update(),
            (None, Some(source_update)) => source_update,
            (None, None) => unreachable!("an update chain always terminates at a source update"),
        }
    }

    /// The modules the parser layer invalidated.
    pub fn invalidated_modules(&self) -> &[ModuleName] {
        &self.source_update().invalidated_modules
    }

    /// The defines newly introduced by the parse.
    pub fn define_additions(&self) -> &BTreeSet<Name> {
        &self.source_update().define_additions
    }
}

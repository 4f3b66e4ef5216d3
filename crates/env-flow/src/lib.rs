//! Env-Flow: an incremental analysis engine for whole-program checking.
//!
//! Built on top of [`shale`], this crate manages a stack of derived,
//! memoized environments, each mapping program entities (modules, classes,
//! functions) to computed facts (parsed trees, resolved globals, class
//! hierarchies, outward types, check results). On source edits it recomputes
//! only the facts that really changed, propagating invalidation through
//! fine-grained fact-to-fact dependencies, then re-runs inference on the
//! smallest correct set of defines.
//!
//! # Key pieces
//!
//! - **Dependency registry**: every derived fact is named by an interned
//!   [`DependencyDescriptor`]; reads performed while computing a fact are
//!   attributed to its handle, so invalidation traverses the reverse graph
//!   without explicit forward edges.
//! - **[`EnvironmentLayer`]**: one derived layer, built from a [`LayerSpec`]
//!   rule: lazy `get` with memoization, and a batch `update` that filters the
//!   dependencies triggered beneath it into a trigger map, invalidates the
//!   matching keys transactionally, and recomputes them in parallel. Values
//!   that recompute equal cut the cascade off.
//! - **The stack**: parser → unannotated globals → class hierarchy →
//!   resolved globals → annotated globals → type environment, each layer
//!   seeing only the read view of the one beneath.
//! - **[`recheck`]**: the driver. One bottom-up update, the function-trigger
//!   extraction, eager re-inference through [`populate_for_definitions`],
//!   postprocessing, and error-table reconciliation.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use env_flow::{recheck, Configuration, ErrorTable, Scheduler};
//! use env_flow::testing::{environment_for_testing, MemoryCodebase};
//!
//! let codebase = Arc::new(MemoryCodebase::new());
//! codebase.set_source("m.py", "def f(x: int) -> int: return x");
//!
//! let environment = environment_for_testing(codebase.clone());
//! let scheduler = Scheduler::serial();
//! let mut errors = ErrorTable::new();
//!
//! let (modules, diagnostics) = recheck(
//!     &Configuration::default(),
//!     &scheduler,
//!     &environment,
//!     &mut errors,
//!     &["m.py".into()],
//! )?;
//! ```

mod annotated_globals;
mod ast_environment;
mod class_hierarchy;
mod configuration;
pub mod dependency;
mod diagnostics;
mod error;
mod layer;
mod names;
pub mod persist;
mod recheck;
mod resolved_globals;
mod scheduler;
mod source;
pub mod testing;
mod tracer;
mod type_environment;
mod types;
mod unannotated_globals;
mod update;

pub use annotated_globals::{
    AnnotatedGlobalEnvironment, AnnotatedGlobalLayer, AnnotatedGlobalReadView, TypeOfGlobal,
};
pub use ast_environment::{AstEnvironment, AstReadView};
pub use class_hierarchy::{
    ClassHierarchyEnvironment, ClassHierarchyLayer, ClassHierarchyReadView, ClassSummary,
};
pub use configuration::Configuration;
pub use dependency::DependencyDescriptor;
pub use diagnostics::{Diagnostic, ErrorTable};
pub use error::EngineError;
pub use layer::{Environment, EnvironmentLayer, LayerSpec};
pub use names::{qualify_in_module, ModuleName, Name};
pub use recheck::recheck;
pub use resolved_globals::{
    ResolvedGlobal, ResolvedGlobalEnvironment, ResolvedGlobalLayer, ResolvedGlobalReadView,
};
pub use scheduler::{HandleCollector, Policy, Scheduler};
pub use source::{Ast, ClassDef, Define, GlobalVariable, ModuleUpdate, Parameter, SourceCodeApi};
pub use tracer::{EngineTracer, NoopTracer, RecordingTracer, TraceEvent};
pub use type_environment::{
    populate_for_definitions, CheckResult, DefineCheck, Inference, Postprocessing, TypeCheckLayer,
    TypeEnvironment, TypeEnvironmentReadView,
};
pub use types::TypeExpr;
pub use unannotated_globals::{
    UnannotatedGlobal, UnannotatedGlobalEnvironment, UnannotatedGlobalLayer,
    UnannotatedGlobalReadView,
};
pub use update::{SourceUpdate, UpdateResult};

// Re-export the substrate types that appear in this crate's public API.
pub use shale::{CacheMode, Commit, DependencyHandle, HandleSet};

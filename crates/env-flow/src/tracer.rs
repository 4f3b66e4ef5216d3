//! Tracer trait for observing engine execution.
//!
//! The engine's observability surface is a trait with empty default methods,
//! so instrumentation is zero-cost unless a tracer is installed. The
//! [`RecordingTracer`] collects events for tests and tooling.

use parking_lot::Mutex;
use shale::Commit;

use crate::dependency::DependencyDescriptor;

/// Observer of engine execution.
///
/// Implementations must be `Send + Sync`; value production callbacks fire from
/// worker threads.
pub trait EngineTracer: Send + Sync + 'static {
    /// Called when a layer begins an update with the given number of triggers.
    #[inline]
    fn on_update_start(&self, _layer: &'static str, _triggers: usize) {}

    /// Called when a layer commits an update.
    #[inline]
    fn on_update_end(&self, _layer: &'static str, _commit: &Commit) {}

    /// Called when a fact is produced (computed, not read from the table).
    #[inline]
    fn on_produce(&self, _descriptor: &DependencyDescriptor) {}

    /// Called when a recheck begins with the given number of changed paths.
    #[inline]
    fn on_recheck_start(&self, _paths: usize) {}

    /// Called when a recheck finishes.
    #[inline]
    fn on_recheck_end(&self, _modules: usize, _diagnostics: usize) {}
}

/// Zero-cost tracer that discards all events. The default.
pub struct NoopTracer;

impl EngineTracer for NoopTracer {}

/// An engine event recorded by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A layer began an update.
    UpdateStart {
        /// Layer name.
        layer: &'static str,
        /// Number of triggers in the layer's work list.
        triggers: usize,
    },
    /// A layer committed an update.
    UpdateEnd {
        /// Layer name.
        layer: &'static str,
        /// Keys whose recomputed value differed.
        changed_keys: usize,
        /// Keys whose recomputed value was equal (cut-off applied).
        unchanged_keys: usize,
        /// Dependents triggered by the commit.
        triggered: usize,
    },
    /// A fact was produced.
    Produced(DependencyDescriptor),
    /// A recheck began.
    RecheckStart {
        /// Number of changed artifact paths.
        paths: usize,
    },
    /// A recheck finished.
    RecheckEnd {
        /// Modules postprocessed.
        modules: usize,
        /// Diagnostics produced.
        diagnostics: usize,
    },
}

/// Tracer that records every event for later inspection.
#[derive(Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingTracer {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Default::default()
    }

    /// All events recorded so far, in order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Take and clear all recorded events.
    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// The descriptors of every fact produced since the last `take`.
    pub fn produced(&self) -> Vec<DependencyDescriptor> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Produced(descriptor) => Some(descriptor.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EngineTracer for RecordingTracer {
    fn on_update_start(&self, layer: &'static str, triggers: usize) {
        self.events
            .lock()
            .push(TraceEvent::UpdateStart { layer, triggers });
    }

    fn on_update_end(&self, layer: &'static str, commit: &Commit) {
        self.events.lock().push(TraceEvent::UpdateEnd {
            layer,
            changed_keys: commit.changed_keys,
            unchanged_keys: commit.unchanged_keys,
            triggered: commit.triggered.len(),
        });
    }

    fn on_produce(&self, descriptor: &DependencyDescriptor) {
        self.events
            .lock()
            .push(TraceEvent::Produced(descriptor.clone()));
    }

    fn on_recheck_start(&self, paths: usize) {
        self.events.lock().push(TraceEvent::RecheckStart { paths });
    }

    fn on_recheck_end(&self, modules: usize, diagnostics: usize) {
        self.events.lock().push(TraceEvent::RecheckEnd {
            modules,
            diagnostics,
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::names::ModuleName;

    use super::*;

    #[test]
    fn test_recording_tracer_collects_in_order() {
        let tracer = RecordingTracer::new();
        tracer.on_recheck_start(2);
        tracer.on_produce(&DependencyDescriptor::AstParse(ModuleName::new("m")));
        tracer.on_recheck_end(1, 0);

        let events = tracer.take();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], TraceEvent::RecheckStart { paths: 2 });
        assert!(tracer.events().is_empty());
    }

    #[test]
    fn test_tracer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopTracer>();
        assert_send_sync::<RecordingTracer>();
    }
}

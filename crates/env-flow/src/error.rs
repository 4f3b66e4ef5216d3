//! Engine error types.

use std::fmt;
use std::path::PathBuf;

/// Fatal engine errors.
///
/// The engine recovers nothing locally: every failure of the memoization
/// machinery is a correctness failure and is surfaced to the orchestrator.
/// Ordinary type errors are not engine errors; they flow through the error
/// table as [`Diagnostic`](crate::Diagnostic) payloads.
#[derive(Debug)]
pub enum EngineError {
    /// A value producer failed while computing a single fact. The enclosing
    /// update transaction was aborted and the table restored.
    Producer {
        /// Short description of the fact being produced.
        descriptor: String,
        /// The underlying failure.
        source: anyhow::Error,
    },
    /// An upstream read view returned a value violating a layer's invariant.
    /// This is a programming error.
    InconsistentUpstream {
        /// Description of the violated invariant.
        message: String,
    },
    /// An I/O failure while storing or loading a snapshot. In-memory state is
    /// not corrupted.
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying I/O failure.
        source: std::io::Error,
    },
    /// A snapshot manifest failed to encode or decode.
    Manifest {
        /// The path of the offending manifest.
        path: PathBuf,
        /// The underlying codec failure.
        source: serde_json::Error,
    },
}

impl EngineError {
    /// A producer failure for the given fact description.
    pub fn producer(descriptor: impl fmt::Display, source: anyhow::Error) -> Self {
        EngineError::Producer {
            descriptor: descriptor.to_string(),
            source,
        }
    }

    /// An upstream-invariant violation with a descriptive diagnostic.
    pub fn inconsistent_upstream(message: impl Into<String>) -> Self {
        EngineError::InconsistentUpstream {
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Producer { descriptor, source } => {
                write!(f, "failed to produce {}: {}", descriptor, source)
            }
            EngineError::InconsistentUpstream { message } => {
                write!(f, "inconsistent upstream environment: {}", message)
            }
            EngineError::Io { path, source } => {
                write!(f, "snapshot i/o failed at {}: {}", path.display(), source)
            }
            EngineError::Manifest { path, source } => {
                write!(f, "invalid manifest at {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Producer { source, .. } => Some(source.as_ref()),
            EngineError::InconsistentUpstream { .. } => None,
            EngineError::Io { source, .. } => Some(source),
            EngineError::Manifest { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_descriptor() {
        let error = EngineError::producer("ast(m)", anyhow::anyhow!("unexpected token"));
        assert_eq!(
            error.to_string(),
            "failed to produce ast(m): unexpected token"
        );
    }
}

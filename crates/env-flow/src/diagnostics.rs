//! User-facing diagnostics and the error table they are reconciled into.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::names::{ModuleName, Name};

/// An ordinary type error. Diagnostics are payloads, not engine errors: they
/// flow through the error table and never abort an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The module the diagnostic belongs to.
    pub module: ModuleName,
    /// The define the diagnostic was raised in, if any.
    pub owner: Option<Name>,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// A diagnostic raised inside a define.
    pub fn new(module: ModuleName, owner: Name, message: impl Into<String>) -> Self {
        Diagnostic {
            module,
            owner: Some(owner),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{}: {}: {}", self.module, owner, self.message),
            None => write!(f, "{}: {}", self.module, self.message),
        }
    }
}

/// Module-keyed store of the diagnostics produced by the last postprocessing
/// run. Mutated only by the recheck driver.
#[derive(Debug, Default)]
pub struct ErrorTable {
    entries: IndexMap<ModuleName, Vec<Diagnostic>>,
}

impl ErrorTable {
    /// An empty table.
    pub fn new() -> Self {
        Default::default()
    }

    /// The diagnostics currently recorded for a module.
    pub fn get(&self, module: &ModuleName) -> &[Diagnostic] {
        self.entries
            .get(module)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The modules with at least one recorded diagnostic.
    pub fn modules(&self) -> Vec<ModuleName> {
        self.entries
            .iter()
            .filter(|(_, diagnostics)| !diagnostics.is_empty())
            .map(|(module, _)| module.clone())
            .collect()
    }

    /// Drop every diagnostic recorded for a module.
    pub fn drop_module(&mut self, module: &ModuleName) {
        self.entries.shift_remove(module);
    }

    /// Append a diagnostic under its own module key.
    pub fn append(&mut self, diagnostic: Diagnostic) {
        self.entries
            .entry(diagnostic.module.clone())
            .or_default()
            .push(diagnostic);
    }

    /// Total number of recorded diagnostics.
    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns true if no diagnostics are recorded.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_drop() {
        let mut table = ErrorTable::new();
        let module = ModuleName::new("m");
        table.append(Diagnostic::new(
            module.clone(),
            Name::new("m.f"),
            "undefined name `g`",
        ));
        assert_eq!(table.get(&module).len(), 1);
        assert_eq!(table.modules(), vec![module.clone()]);

        table.drop_module(&module);
        assert!(table.is_empty());
        assert!(table.get(&module).is_empty());
    }
}

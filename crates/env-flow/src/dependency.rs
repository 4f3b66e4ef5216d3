//! Dependency descriptors and the process-wide registry that interns them.

use once_cell::sync::Lazy;
use shale::{DependencyHandle, KeyRegistry};

use crate::names::{ModuleName, Name};

/// A globally interned identifier naming a single derived fact whose
/// recomputation may be triggered.
///
/// Each variant belongs to one environment layer; a layer recognizes its own
/// kind when filtering the dependencies triggered beneath it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyDescriptor {
    /// The parsed AST of a module.
    AstParse(ModuleName),
    /// The raw, unannotated definition of a module-level entity.
    UnannotatedGlobal(Name),
    /// The ancestor closure of a class.
    ClassSummary(Name),
    /// The resolved form of a module-level entity.
    ResolvedGlobal(Name),
    /// The outward-facing type of a module-level entity.
    TypeOfGlobal(Name),
    /// The type-check result of a single define.
    TypeCheckDefine(Name),
}

static REGISTRY: Lazy<KeyRegistry<DependencyDescriptor>> = Lazy::new(KeyRegistry::new);

/// Intern a descriptor in the process-wide registry.
///
/// Idempotent and safe for concurrent calls: equal descriptors always yield
/// equal handles within one process lifetime.
pub fn register(descriptor: DependencyDescriptor) -> DependencyHandle {
    REGISTRY.register(descriptor)
}

/// Look up the descriptor a handle stands for. Total for registered handles.
pub fn describe(handle: DependencyHandle) -> DependencyDescriptor {
    REGISTRY.get_key(handle)
}

/// The number of descriptors registered so far in this process.
pub fn registered_count() -> usize {
    REGISTRY.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_round_trips() {
        let descriptor = DependencyDescriptor::TypeCheckDefine(Name::new("m.f"));
        let handle = register(descriptor.clone());
        assert_eq!(register(descriptor.clone()), handle);
        assert_eq!(describe(handle), descriptor);
    }

    #[test]
    fn test_descriptors_are_totally_ordered() {
        let mut descriptors = vec![
            DependencyDescriptor::TypeCheckDefine(Name::new("m.f")),
            DependencyDescriptor::AstParse(ModuleName::new("m")),
            DependencyDescriptor::TypeOfGlobal(Name::new("m.f")),
        ];
        descriptors.sort();
        assert_eq!(
            descriptors[0],
            DependencyDescriptor::AstParse(ModuleName::new("m"))
        );
    }
}

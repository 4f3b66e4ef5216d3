//! The source model: parsed modules and the parser/module-tracker seam.

use std::path::Path;

use crate::names::{ModuleName, Name};

/// A function parameter as written: an identifier with an optional annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// The parameter identifier.
    pub name: String,
    /// The annotation text, if any.
    pub annotation: Option<String>,
}

/// A function, method, or top-level callable: the smallest unit of type
/// re-inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    /// The fully qualified name of the define.
    pub name: Name,
    /// Parameters in declaration order.
    pub parameters: Vec<Parameter>,
    /// The return annotation text, if any.
    pub return_annotation: Option<String>,
    /// The body, kept as opaque text.
    pub body: String,
}

/// A class definition: its qualified name and base list as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    /// The fully qualified name of the class.
    pub name: Name,
    /// Base class names as written, unresolved.
    pub bases: Vec<String>,
}

/// A module-level variable with an optional annotation and an initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    /// The fully qualified name of the variable.
    pub name: Name,
    /// The annotation text, if any.
    pub annotation: Option<String>,
    /// The initializer text.
    pub value: String,
}

/// The parsed form of one module. Structural equality is what the parser
/// layer's invalidation cut-off compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ast {
    /// The module this tree belongs to.
    pub module: ModuleName,
    /// Function defines in source order.
    pub defines: Vec<Define>,
    /// Class definitions in source order.
    pub classes: Vec<ClassDef>,
    /// Module-level variables in source order.
    pub globals: Vec<GlobalVariable>,
}

impl Ast {
    /// An empty tree for a module.
    pub fn empty(module: ModuleName) -> Self {
        Ast {
            module,
            defines: Vec::new(),
            classes: Vec::new(),
            globals: Vec::new(),
        }
    }

    /// Find a define by qualified name.
    pub fn define(&self, name: &Name) -> Option<&Define> {
        self.defines.iter().find(|define| &define.name == name)
    }

    /// Find a class by qualified name.
    pub fn class(&self, name: &Name) -> Option<&ClassDef> {
        self.classes.iter().find(|class| &class.name == name)
    }

    /// Find a module-level variable by qualified name.
    pub fn global(&self, name: &Name) -> Option<&GlobalVariable> {
        self.globals.iter().find(|global| &global.name == name)
    }

    /// The qualified names of every define in the module.
    pub fn define_names(&self) -> impl Iterator<Item = &Name> + '_ {
        self.defines.iter().map(|define| &define.name)
    }
}

/// The parser and module-tracker seam the bottom layer is built on.
///
/// Implementations map artifact paths to modules, serve current source text,
/// and parse it. Parsing is pure: equal source yields a structurally equal
/// [`Ast`].
pub trait SourceCodeApi: Send + Sync + 'static {
    /// The module an artifact path belongs to, if it is a source artifact.
    ///
    /// This is a pure mapping on the path; it answers for deleted artifacts
    /// too.
    fn module_for_artifact(&self, path: &Path) -> Option<ModuleName>;

    /// Every module currently backed by a source artifact.
    fn tracked_modules(&self) -> Vec<ModuleName>;

    /// The current source text of a module, or `None` if it is not tracked.
    fn source_for_module(&self, module: &ModuleName) -> Option<String>;

    /// Parse source text into a module tree.
    fn parse(&self, module: &ModuleName, source: &str) -> Result<Ast, anyhow::Error>;
}

/// How one module changed in an update batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleUpdate {
    /// The module became tracked.
    New(ModuleName),
    /// The module's tree changed.
    Changed(ModuleName),
    /// The module is no longer tracked.
    Deleted(ModuleName),
}

impl ModuleUpdate {
    /// The module this update concerns.
    pub fn module(&self) -> &ModuleName {
        match self {
            ModuleUpdate::New(module)
            | ModuleUpdate::Changed(module)
            | ModuleUpdate::Deleted(module) => module,
        }
    }

    /// Returns true for a deletion.
    pub fn is_deletion(&self) -> bool {
        matches!(self, ModuleUpdate::Deleted(_))
    }
}

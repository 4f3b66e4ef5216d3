//! Module and qualified-name identifiers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The dotted name of a source module.
///
/// Clone is cheap; the text is shared behind `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleName(Arc<str>);

impl ModuleName {
    /// Create a module name from its dotted text.
    pub fn new(name: impl AsRef<str>) -> Self {
        ModuleName(Arc::from(name.as_ref()))
    }

    /// The dotted text of the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        ModuleName::new(name)
    }
}

impl Serialize for ModuleName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModuleName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(ModuleName::new(String::deserialize(deserializer)?))
    }
}

/// The fully qualified, dotted name of a program entity: a function, class,
/// method, or module-level variable.
///
/// The last segment is the entity's own name; everything before it is the
/// qualifier it lives in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(Arc<str>);

impl Name {
    /// Create a qualified name from its dotted text.
    pub fn new(name: impl AsRef<str>) -> Self {
        Name(Arc::from(name.as_ref()))
    }

    /// Qualify an identifier within a module.
    pub fn from_parts(module: &ModuleName, identifier: &str) -> Self {
        Name(Arc::from(format!("{}.{}", module, identifier)))
    }

    /// The dotted text of the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The module this name lives in: everything before the last segment.
    ///
    /// A single-segment name qualifies to itself, read as a module-level entity
    /// of an identically named module.
    pub fn qualifier(&self) -> ModuleName {
        match self.0.rfind('.') {
            Some(split) => ModuleName::new(&self.0[..split]),
            None => ModuleName::new(self.0.as_ref()),
        }
    }

    /// The last segment: the entity's own identifier.
    pub fn identifier(&self) -> &str {
        match self.0.rfind('.') {
            Some(split) => &self.0[split + 1..],
            None => &self.0,
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Name::new(name)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Name::new(String::deserialize(deserializer)?))
    }
}

/// Resolve a textual reference within a module: dotted text is already
/// qualified, bare text names an entity of the module itself.
pub fn qualify_in_module(module: &ModuleName, text: &str) -> Name {
    if text.contains('.') {
        Name::new(text)
    } else {
        Name::from_parts(module, text)
    }
}

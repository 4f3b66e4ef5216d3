//! In-memory source seams and a reference inference pass.
//!
//! These implementations back the engine's own test suites and give library
//! users a complete working stack to start from: an in-memory codebase with a
//! line-oriented toy grammar, an inference pass that checks annotations and
//! `return` expressions, and a postprocessing pass that collects per-define
//! diagnostics module by module.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::RwLock;
use shale::DependencyHandle;

use crate::annotated_globals::{AnnotatedGlobalEnvironment, AnnotatedGlobalReadView, TypeOfGlobal};
use crate::ast_environment::AstEnvironment;
use crate::class_hierarchy::{ClassHierarchyEnvironment, ClassSummary};
use crate::configuration::Configuration;
use crate::diagnostics::Diagnostic;
use crate::error::EngineError;
use crate::names::{qualify_in_module, ModuleName, Name};
use crate::resolved_globals::ResolvedGlobalEnvironment;
use crate::scheduler::{Policy, Scheduler};
use crate::source::{Ast, ClassDef, Define, GlobalVariable, Parameter, SourceCodeApi};
use crate::tracer::{EngineTracer, NoopTracer};
use crate::type_environment::{
    CheckResult, DefineCheck, Inference, Postprocessing, TypeEnvironment, TypeEnvironmentReadView,
};
use crate::types::TypeExpr;
use crate::unannotated_globals::UnannotatedGlobalEnvironment;

/// An in-memory codebase: a path-to-text map with a line-oriented grammar.
///
/// Paths map to modules by their stem, with separators turning into dots:
/// `pkg/m.py` is module `pkg.m`. The grammar recognizes three line forms:
///
/// ```text
/// def f(x: int, y) -> int: return x
/// class C(Base): ...
/// limit: int = 100
/// ```
///
/// Unrecognized lines are ignored; a malformed `def` line is a parse failure.
#[derive(Default)]
pub struct MemoryCodebase {
    sources: RwLock<BTreeMap<PathBuf, String>>,
}

impl MemoryCodebase {
    /// An empty codebase.
    pub fn new() -> Self {
        Default::default()
    }

    /// Insert or replace the source text behind a path.
    pub fn set_source(&self, path: impl Into<PathBuf>, source: impl Into<String>) {
        let _ = self.sources.write().insert(path.into(), source.into());
    }

    /// Delete the source behind a path.
    pub fn remove_source(&self, path: impl AsRef<Path>) {
        let _ = self.sources.write().remove(path.as_ref());
    }

    fn module_of_path(path: &Path) -> Option<ModuleName> {
        let stem = path.with_extension("");
        let segments: Vec<String> = stem
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return None;
        }
        Some(ModuleName::new(segments.join(".")))
    }
}

impl SourceCodeApi for MemoryCodebase {
    fn module_for_artifact(&self, path: &Path) -> Option<ModuleName> {
        Self::module_of_path(path)
    }

    fn tracked_modules(&self) -> Vec<ModuleName> {
        self.sources
            .read()
            .keys()
            .filter_map(|path| Self::module_of_path(path))
            .collect()
    }

    fn source_for_module(&self, module: &ModuleName) -> Option<String> {
        self.sources
            .read()
            .iter()
            .find(|(path, _)| Self::module_of_path(path).as_ref() == Some(module))
            .map(|(_, source)| source.clone())
    }

    fn parse(&self, module: &ModuleName, source: &str) -> Result<Ast, anyhow::Error> {
        let mut tree = Ast::empty(module.clone());
        for (index, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("def ") {
                tree.defines.push(parse_define(module, rest).map_err(|error| {
                    anyhow!("line {}: {}", index + 1, error)
                })?);
            } else if let Some(rest) = line.strip_prefix("class ") {
                tree.classes.push(parse_class(module, rest).map_err(|error| {
                    anyhow!("line {}: {}", index + 1, error)
                })?);
            } else if let Some((target, value)) = line.split_once('=') {
                let (name, annotation) = match target.split_once(':') {
                    Some((name, annotation)) => {
                        (name.trim(), Some(annotation.trim().to_string()))
                    }
                    None => (target.trim(), None),
                };
                if !name.is_empty() && is_identifier(name) {
                    tree.globals.push(GlobalVariable {
                        name: Name::from_parts(module, name),
                        annotation,
                        value: value.trim().to_string(),
                    });
                }
            }
        }
        Ok(tree)
    }
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_')
}

fn parse_define(module: &ModuleName, rest: &str) -> Result<Define, anyhow::Error> {
    let open = rest.find('(').ok_or_else(|| anyhow!("define has no parameter list"))?;
    let close = rest[open..]
        .find(')')
        .map(|offset| open + offset)
        .ok_or_else(|| anyhow!("unterminated parameter list"))?;
    let name = rest[..open].trim();
    if !is_identifier(name) {
        return Err(anyhow!("invalid define name {:?}", name));
    }

    let mut parameters = Vec::new();
    for parameter in rest[open + 1..close].split(',') {
        let parameter = parameter.trim();
        if parameter.is_empty() {
            continue;
        }
        let (name, annotation) = match parameter.split_once(':') {
            Some((name, annotation)) => (name.trim(), Some(annotation.trim().to_string())),
            None => (parameter, None),
        };
        parameters.push(Parameter {
            name: name.to_string(),
            annotation,
        });
    }

    let tail = &rest[close + 1..];
    let colon = tail.find(':').ok_or_else(|| anyhow!("define has no body"))?;
    let return_annotation = tail[..colon]
        .trim()
        .strip_prefix("->")
        .map(|annotation| annotation.trim().to_string());
    let body = tail[colon + 1..].trim().to_string();

    Ok(Define {
        name: Name::from_parts(module, name),
        parameters,
        return_annotation,
        body,
    })
}

fn parse_class(module: &ModuleName, rest: &str) -> Result<ClassDef, anyhow::Error> {
    let header = rest.split(':').next().unwrap_or(rest).trim();
    let (name, bases) = match header.split_once('(') {
        Some((name, bases)) => {
            let bases = bases
                .strip_suffix(')')
                .ok_or_else(|| anyhow!("unterminated base list"))?;
            (
                name.trim(),
                bases
                    .split(',')
                    .map(str::trim)
                    .filter(|base| !base.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        }
        None => (header, Vec::new()),
    };
    if !is_identifier(name) {
        return Err(anyhow!("invalid class name {:?}", name));
    }
    Ok(ClassDef {
        name: Name::from_parts(module, name),
        bases,
    })
}

/// Reference inference: checks annotation well-formedness, referenced-name
/// existence, and return-type agreement for `return <expression>` bodies.
pub struct SimpleInference;

fn resolve_annotation(
    globals: &AnnotatedGlobalReadView,
    dependency: Option<DependencyHandle>,
    module: &ModuleName,
    text: &str,
) -> Result<TypeExpr, EngineError> {
    if let Some(builtin) = TypeExpr::builtin(text) {
        return Ok(builtin);
    }
    let candidate = qualify_in_module(module, text);
    Ok(match globals.get_class_summary(dependency, &candidate)? {
        ClassSummary::Present { .. } => TypeExpr::Instance(candidate),
        ClassSummary::Absent => TypeExpr::Unknown,
    })
}

fn is_reference(text: &str) -> bool {
    !text.is_empty()
        && text.chars().all(|character| {
            character.is_ascii_alphanumeric() || character == '_' || character == '.'
        })
        && !text.chars().next().is_some_and(|first| first.is_ascii_digit())
}

fn infer_expression(
    globals: &AnnotatedGlobalReadView,
    dependency: Option<DependencyHandle>,
    module: &ModuleName,
    owner: &Name,
    parameters: &[(String, TypeExpr)],
    text: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<TypeExpr, EngineError> {
    if let Some(literal) = TypeExpr::of_literal(text) {
        return Ok(literal);
    }
    // Parameter references shadow globals.
    if let Some((_, parameter_type)) = parameters.iter().find(|(name, _)| name == text) {
        return Ok(parameter_type.clone());
    }
    if let (Some(open), true) = (text.find('('), text.ends_with(')')) {
        let callee_text = text[..open].trim();
        if !is_reference(callee_text) {
            return Ok(TypeExpr::Unknown);
        }
        let callee = qualify_in_module(module, callee_text);
        return Ok(match globals.get_type_of_global(dependency, &callee)? {
            TypeOfGlobal::Defined(TypeExpr::Callable { returns, .. }) => *returns,
            TypeOfGlobal::Defined(TypeExpr::ClassObject(class)) => TypeExpr::Instance(class),
            TypeOfGlobal::Defined(other) => {
                diagnostics.push(Diagnostic::new(
                    module.clone(),
                    owner.clone(),
                    format!("`{}` is not callable (has type {})", callee, other),
                ));
                TypeExpr::Unknown
            }
            TypeOfGlobal::Absent => {
                diagnostics.push(Diagnostic::new(
                    module.clone(),
                    owner.clone(),
                    format!("undefined name `{}`", callee),
                ));
                TypeExpr::Unknown
            }
        });
    }
    if !is_reference(text) {
        return Ok(TypeExpr::Unknown);
    }
    let target = qualify_in_module(module, text);
    Ok(match globals.get_type_of_global(dependency, &target)? {
        TypeOfGlobal::Defined(found) => found,
        TypeOfGlobal::Absent => {
            diagnostics.push(Diagnostic::new(
                module.clone(),
                owner.clone(),
                format!("undefined name `{}`", target),
            ));
            TypeExpr::Unknown
        }
    })
}

impl Inference for SimpleInference {
    fn check_define(
        &self,
        globals: &AnnotatedGlobalReadView,
        define: &Define,
        dependency: Option<DependencyHandle>,
    ) -> Result<DefineCheck, EngineError> {
        let module = define.name.qualifier();
        let mut diagnostics = Vec::new();

        let mut parameters = Vec::with_capacity(define.parameters.len());
        for parameter in &define.parameters {
            let resolved = match &parameter.annotation {
                Some(annotation) => {
                    let resolved = resolve_annotation(globals, dependency, &module, annotation)?;
                    if resolved == TypeExpr::Unknown {
                        diagnostics.push(Diagnostic::new(
                            module.clone(),
                            define.name.clone(),
                            format!("annotation `{}` is not defined", annotation),
                        ));
                    }
                    resolved
                }
                None => TypeExpr::Unknown,
            };
            parameters.push((parameter.name.clone(), resolved));
        }

        let declared_return = match &define.return_annotation {
            Some(annotation) => {
                let resolved = resolve_annotation(globals, dependency, &module, annotation)?;
                if resolved == TypeExpr::Unknown {
                    diagnostics.push(Diagnostic::new(
                        module.clone(),
                        define.name.clone(),
                        format!("annotation `{}` is not defined", annotation),
                    ));
                }
                Some(resolved)
            }
            None => None,
        };

        let body = define.body.trim();
        let mut inferred = TypeExpr::Primitive("None");
        if let Some(expression) = body.strip_prefix("return") {
            let expression = expression.trim();
            if !expression.is_empty() {
                inferred = infer_expression(
                    globals,
                    dependency,
                    &module,
                    &define.name,
                    &parameters,
                    expression,
                    &mut diagnostics,
                )?;
            }
        }

        if let Some(declared) = &declared_return {
            if declared.is_known() && inferred.is_known() && *declared != inferred {
                diagnostics.push(Diagnostic::new(
                    module.clone(),
                    define.name.clone(),
                    format!(
                        "incompatible return type: expected {}, got {}",
                        declared, inferred
                    ),
                ));
            }
        }

        Ok(DefineCheck {
            define: define.name.clone(),
            return_type: declared_return.unwrap_or(inferred),
            diagnostics,
        })
    }
}

/// Reference postprocessing: the diagnostics of every define in each module,
/// in source order.
pub struct SimplePostprocessing;

impl Postprocessing for SimplePostprocessing {
    fn run(
        &self,
        scheduler: &Scheduler,
        _configuration: &Configuration,
        environment: &TypeEnvironmentReadView,
        modules: &[ModuleName],
    ) -> Result<Vec<Diagnostic>, EngineError> {
        scheduler.map_reduce(
            Policy::fixed_chunk_count(1, 100, 5),
            modules,
            Ok(Vec::new()),
            |chunk| {
                let mut diagnostics = Vec::new();
                for module in chunk {
                    let Some(tree) = environment.ast().get_ast(None, module)? else {
                        continue;
                    };
                    for define in &tree.defines {
                        if let CheckResult::Checked(check) =
                            environment.get_check_result(None, &define.name)?
                        {
                            diagnostics.extend(check.diagnostics.iter().cloned());
                        }
                    }
                }
                Ok(diagnostics)
            },
            |left: Result<Vec<_>, EngineError>, right| {
                let mut left = left?;
                left.extend(right?);
                Ok(left)
            },
        )
    }
}

/// Build the full six-layer stack over an in-memory codebase.
pub fn build_environment(
    configuration: Arc<Configuration>,
    codebase: Arc<MemoryCodebase>,
    tracer: Arc<dyn EngineTracer>,
) -> TypeEnvironment {
    let ast = AstEnvironment::create(configuration, codebase, tracer);
    let unannotated = UnannotatedGlobalEnvironment::create(ast);
    let hierarchy = ClassHierarchyEnvironment::create(unannotated);
    let resolved = ResolvedGlobalEnvironment::create(hierarchy);
    let annotated = AnnotatedGlobalEnvironment::create(resolved);
    TypeEnvironment::create(
        annotated,
        Arc::new(SimpleInference),
        Arc::new(SimplePostprocessing),
    )
}

/// Build the full stack with a default configuration and no tracer.
pub fn environment_for_testing(codebase: Arc<MemoryCodebase>) -> TypeEnvironment {
    build_environment(
        Arc::new(Configuration::default()),
        codebase,
        Arc::new(NoopTracer),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define_forms() {
        let module = ModuleName::new("m");
        let codebase = MemoryCodebase::new();
        let tree = codebase
            .parse(
                &module,
                "def f(x: int, y) -> int: return x\nclass C(Base): ...\nlimit: int = 100\n",
            )
            .unwrap();

        assert_eq!(tree.defines.len(), 1);
        let define = &tree.defines[0];
        assert_eq!(define.name, Name::new("m.f"));
        assert_eq!(define.parameters.len(), 2);
        assert_eq!(define.parameters[0].annotation.as_deref(), Some("int"));
        assert_eq!(define.parameters[1].annotation, None);
        assert_eq!(define.return_annotation.as_deref(), Some("int"));
        assert_eq!(define.body, "return x");

        assert_eq!(tree.classes[0].bases, vec!["Base".to_string()]);
        assert_eq!(tree.globals[0].annotation.as_deref(), Some("int"));
    }

    #[test]
    fn test_parse_rejects_malformed_define() {
        let module = ModuleName::new("m");
        let codebase = MemoryCodebase::new();
        assert!(codebase.parse(&module, "def broken: return 1").is_err());
    }

    #[test]
    fn test_module_of_path_maps_separators() {
        assert_eq!(
            MemoryCodebase::module_of_path(Path::new("pkg/m.py")),
            Some(ModuleName::new("pkg.m"))
        );
        assert_eq!(
            MemoryCodebase::module_of_path(Path::new("m.py")),
            Some(ModuleName::new("m"))
        );
    }
}

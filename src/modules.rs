//! Loads schema modules and links their relative imports.
//!
//! Resolution is exact: a relative specifier must name an existing file,
//! there is no extension probing and no directory index lookup.

use log::debug;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::Node;

use crate::parser::{named_children, string_value, JsParser, SourceFile};
use crate::schemas::SchemaError;

pub type ModuleId = usize;

/// Target of an import specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRef {
    Local(ModuleId),
    /// A bare specifier such as `zod`
    External(String),
}

#[derive(Debug)]
enum LinkState {
    Linking,
    Linked,
    /// Linked, and every imported name resolves
    Resolved,
    Failed(String),
}

#[derive(Debug)]
pub struct Module {
    pub file: SourceFile,
    imports: HashMap<String, ModuleRef>,
    state: LinkState,
}

impl Module {
    pub fn import(&self, specifier: &str) -> Option<&ModuleRef> {
        self.imports.get(specifier)
    }
}

/// What an exported name refers to
#[derive(Debug, Clone)]
pub enum Export<'t> {
    /// Initializer of an exported declaration, or the `export default` expression
    Expression(Node<'t>),
    /// `export { local as name }`; `local` is looked up from `anchor`
    Local { anchor: Node<'t>, local: String },
    /// `export { name } from '...'` and names reached through `export *`
    Reexport { target: ModuleRef, name: String },
    /// `export * as name from '...'`
    Namespace(ModuleRef),
    /// Functions, classes, destructured or uninitialized bindings
    Opaque,
}

/// Every module reachable from the loaded schema files
#[derive(Default)]
pub struct ModuleGraph {
    parser: JsParser,
    modules: Vec<Module>,
    by_path: HashMap<PathBuf, ModuleId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }

    /// Load `path` and, transitively, every module it imports relatively
    pub fn load(&mut self, path: &Path) -> Result<ModuleId, SchemaError> {
        let path = fs::canonicalize(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(&id) = self.by_path.get(&path) {
            return match &self.modules[id].state {
                LinkState::Failed(reason) => Err(SchemaError::Link {
                    path,
                    reason: reason.clone(),
                }),
                LinkState::Linking | LinkState::Linked | LinkState::Resolved => Ok(id),
            };
        }

        let file = self.parser.parse_file(&path)?;
        let specifiers = module_specifiers(&file);
        let id = self.modules.len();
        self.modules.push(Module {
            file,
            imports: HashMap::new(),
            state: LinkState::Linking,
        });
        self.by_path.insert(path.clone(), id);
        debug!("Linking {:?} ({} specifiers)", path, specifiers.len());

        match self.link(&path, specifiers) {
            Ok(imports) => {
                let module = &mut self.modules[id];
                module.imports = imports;
                module.state = LinkState::Linked;
                Ok(id)
            }
            Err(err) => {
                self.modules[id].state = LinkState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn link(
        &mut self,
        importer: &Path,
        specifiers: Vec<String>,
    ) -> Result<HashMap<String, ModuleRef>, SchemaError> {
        let dir = importer.parent().unwrap_or_else(|| Path::new("."));
        let mut imports = HashMap::new();
        for specifier in specifiers {
            if imports.contains_key(&specifier) {
                continue;
            }
            let target = if is_relative(&specifier) {
                let candidate = dir.join(&specifier);
                if !candidate.is_file() {
                    return Err(SchemaError::ModuleNotFound {
                        specifier,
                        importer: importer.to_path_buf(),
                    });
                }
                ModuleRef::Local(self.load(&candidate)?)
            } else {
                ModuleRef::External(specifier.clone())
            };
            imports.insert(specifier, target);
        }
        Ok(imports)
    }

    /// Check that every name imported or re-exported by the modules reachable
    /// from `id` is exported by its target. A module with an unresolved name
    /// fails, and so does every module importing it.
    pub fn resolve_imports(&mut self, id: ModuleId) -> Result<(), SchemaError> {
        self.resolve_reachable(id, &mut HashSet::new())
    }

    fn resolve_reachable(
        &mut self,
        id: ModuleId,
        visited: &mut HashSet<ModuleId>,
    ) -> Result<(), SchemaError> {
        if !visited.insert(id) {
            return Ok(());
        }
        match &self.modules[id].state {
            LinkState::Resolved => return Ok(()),
            LinkState::Failed(reason) => {
                return Err(SchemaError::Link {
                    path: self.modules[id].file.path.clone(),
                    reason: reason.clone(),
                })
            }
            LinkState::Linking | LinkState::Linked => {}
        }

        let mut dependencies: Vec<ModuleId> = self.modules[id]
            .imports
            .values()
            .filter_map(|target| match target {
                ModuleRef::Local(target) => Some(*target),
                ModuleRef::External(_) => None,
            })
            .collect();
        dependencies.sort_unstable();
        dependencies.dedup();

        let mut result = Ok(());
        for dependency in dependencies {
            result = self.resolve_reachable(dependency, visited);
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            if let Some((target, name)) = self.unresolved_import(id) {
                result = Err(SchemaError::MissingExport {
                    path: self.modules[target].file.path.clone(),
                    name,
                });
            }
        }

        self.modules[id].state = match &result {
            Ok(()) => LinkState::Resolved,
            Err(err) => LinkState::Failed(err.to_string()),
        };
        result
    }

    /// First imported or re-exported name its target module does not export
    fn unresolved_import(&self, id: ModuleId) -> Option<(ModuleId, String)> {
        let module = self.module(id);
        let file = &module.file;
        for statement in named_children(file.root()) {
            if !matches!(statement.kind(), "import_statement" | "export_statement") {
                continue;
            }
            let target = statement
                .child_by_field_name("source")
                .and_then(|s| string_value(file, s))
                .and_then(|s| module.import(&s).cloned());
            let Some(ModuleRef::Local(target)) = target else {
                continue;
            };
            for name in requested_names(file, statement) {
                if self.find_export(target, &name).is_none() {
                    return Some((target, name));
                }
            }
        }
        None
    }

    /// Find the export called `name`, following `export *` chains
    pub fn find_export(&self, id: ModuleId, name: &str) -> Option<Export<'_>> {
        self.find_export_in(id, name, &mut HashSet::new())
    }

    fn find_export_in(
        &self,
        id: ModuleId,
        name: &str,
        visited: &mut HashSet<ModuleId>,
    ) -> Option<Export<'_>> {
        if !visited.insert(id) {
            return None;
        }
        let module = self.module(id);
        let file = &module.file;
        let mut star_targets = Vec::new();

        for statement in named_children(file.root()) {
            if statement.kind() != "export_statement" {
                continue;
            }
            let source = statement
                .child_by_field_name("source")
                .and_then(|s| string_value(file, s))
                .and_then(|s| module.import(&s).cloned());

            if is_default_export(statement) {
                if name == "default" {
                    return Some(match statement.child_by_field_name("value") {
                        Some(value) => Export::Expression(value),
                        None => Export::Opaque,
                    });
                }
                continue;
            }

            if let Some(declaration) = statement.child_by_field_name("declaration") {
                if let Some(export) = declared_export(file, declaration, name) {
                    return Some(export);
                }
                continue;
            }

            let mut clause_found = false;
            for part in named_children(statement) {
                match part.kind() {
                    "export_clause" => {
                        clause_found = true;
                        for specifier in named_children(part) {
                            let Some(local) = specifier.child_by_field_name("name") else {
                                continue;
                            };
                            let local = export_name(file, local);
                            let exported = specifier
                                .child_by_field_name("alias")
                                .map(|alias| export_name(file, alias))
                                .unwrap_or_else(|| local.clone());
                            if exported != name {
                                continue;
                            }
                            return Some(match &source {
                                Some(target) => Export::Reexport {
                                    target: target.clone(),
                                    name: local,
                                },
                                None => Export::Local {
                                    anchor: specifier,
                                    local,
                                },
                            });
                        }
                    }
                    "namespace_export" => {
                        clause_found = true;
                        let exported = named_children(part)
                            .into_iter()
                            .next()
                            .map(|n| export_name(file, n));
                        if exported.as_deref() == Some(name) {
                            return source.map(Export::Namespace);
                        }
                    }
                    _ => {}
                }
            }
            if !clause_found {
                if let Some(target) = source {
                    star_targets.push(target);
                }
            }
        }

        // `export *` never re-exports `default`
        if name == "default" {
            return None;
        }
        for target in star_targets {
            match target {
                ModuleRef::Local(target_id) => {
                    if self.find_export_in(target_id, name, visited).is_some() {
                        return Some(Export::Reexport {
                            target: ModuleRef::Local(target_id),
                            name: name.to_string(),
                        });
                    }
                }
                ModuleRef::External(_) => {}
            }
        }
        None
    }

    /// Exported names, sorted, as a module namespace lists them
    pub fn export_names(&self, id: ModuleId) -> Vec<String> {
        let mut names = BTreeSet::new();
        self.collect_export_names(id, &mut names, &mut HashSet::new(), true);
        names.into_iter().collect()
    }

    fn collect_export_names(
        &self,
        id: ModuleId,
        names: &mut BTreeSet<String>,
        visited: &mut HashSet<ModuleId>,
        include_default: bool,
    ) {
        if !visited.insert(id) {
            return;
        }
        let module = self.module(id);
        let file = &module.file;
        for statement in named_children(file.root()) {
            if statement.kind() != "export_statement" {
                continue;
            }
            if is_default_export(statement) {
                if include_default {
                    names.insert("default".to_string());
                }
                continue;
            }
            if let Some(declaration) = statement.child_by_field_name("declaration") {
                names.extend(declared_names(file, declaration));
                continue;
            }
            let mut clause_found = false;
            for part in named_children(statement) {
                match part.kind() {
                    "export_clause" => {
                        clause_found = true;
                        for specifier in named_children(part) {
                            let exported = specifier
                                .child_by_field_name("alias")
                                .or_else(|| specifier.child_by_field_name("name"));
                            if let Some(exported) = exported {
                                names.insert(export_name(file, exported));
                            }
                        }
                    }
                    "namespace_export" => {
                        clause_found = true;
                        if let Some(exported) = named_children(part).into_iter().next() {
                            names.insert(export_name(file, exported));
                        }
                    }
                    _ => {}
                }
            }
            if clause_found {
                continue;
            }
            let target = statement
                .child_by_field_name("source")
                .and_then(|s| string_value(file, s))
                .and_then(|s| module.import(&s).cloned());
            if let Some(ModuleRef::Local(target_id)) = target {
                self.collect_export_names(target_id, names, visited, false);
            }
        }
    }
}

/// Specifiers of every static import and re-export, in source order
fn module_specifiers(file: &SourceFile) -> Vec<String> {
    named_children(file.root())
        .into_iter()
        .filter(|statement| matches!(statement.kind(), "import_statement" | "export_statement"))
        .filter_map(|statement| statement.child_by_field_name("source"))
        .filter_map(|source| string_value(file, source))
        .collect()
}

/// Names an import or re-export statement asks its source module for
fn requested_names(file: &SourceFile, statement: Node<'_>) -> Vec<String> {
    let mut names = Vec::new();
    for part in named_children(statement) {
        match part.kind() {
            "import_clause" => {
                for clause in named_children(part) {
                    match clause.kind() {
                        "identifier" => names.push("default".to_string()),
                        "named_imports" => names.extend(
                            named_children(clause)
                                .into_iter()
                                .filter_map(|specifier| specifier.child_by_field_name("name"))
                                .map(|name| export_name(file, name)),
                        ),
                        _ => {}
                    }
                }
            }
            "export_clause" => names.extend(
                named_children(part)
                    .into_iter()
                    .filter_map(|specifier| specifier.child_by_field_name("name"))
                    .map(|name| export_name(file, name)),
            ),
            _ => {}
        }
    }
    names
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

fn is_default_export(statement: Node<'_>) -> bool {
    let mut cursor = statement.walk();
    let found = statement
        .children(&mut cursor)
        .any(|child| child.kind() == "default");
    found
}

/// Exported names may be written as string literals (`export { a as "b" }`)
fn export_name(file: &SourceFile, node: Node<'_>) -> String {
    string_value(file, node).unwrap_or_else(|| file.text(node).to_string())
}

fn declared_export<'t>(file: &SourceFile, declaration: Node<'t>, name: &str) -> Option<Export<'t>> {
    match declaration.kind() {
        "lexical_declaration" | "variable_declaration" => {
            for declarator in named_children(declaration) {
                let Some(pattern) = declarator.child_by_field_name("name") else {
                    continue;
                };
                if pattern.kind() == "identifier" {
                    if file.text(pattern) == name {
                        return Some(match declarator.child_by_field_name("value") {
                            Some(value) => Export::Expression(value),
                            None => Export::Opaque,
                        });
                    }
                } else if crate::scope::pattern_binds(file, pattern, name) {
                    return Some(Export::Opaque);
                }
            }
            None
        }
        _ => declaration
            .child_by_field_name("name")
            .filter(|declared| file.text(*declared) == name)
            .map(|_| Export::Opaque),
    }
}

fn declared_names(file: &SourceFile, declaration: Node<'_>) -> Vec<String> {
    match declaration.kind() {
        "lexical_declaration" | "variable_declaration" => named_children(declaration)
            .into_iter()
            .filter_map(|declarator| declarator.child_by_field_name("name"))
            .flat_map(|pattern| pattern_names(file, pattern))
            .collect(),
        _ => declaration
            .child_by_field_name("name")
            .map(|declared| vec![file.text(declared).to_string()])
            .unwrap_or_default(),
    }
}

fn pattern_names(file: &SourceFile, pattern: Node<'_>) -> Vec<String> {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            vec![file.text(pattern).to_string()]
        }
        "assignment_pattern" | "object_assignment_pattern" => pattern
            .child_by_field_name("left")
            .map(|left| pattern_names(file, left))
            .unwrap_or_default(),
        "pair_pattern" => pattern
            .child_by_field_name("value")
            .map(|value| pattern_names(file, value))
            .unwrap_or_default(),
        "object_pattern" | "array_pattern" | "rest_pattern" => named_children(pattern)
            .into_iter()
            .flat_map(|child| pattern_names(file, child))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, source: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, source).unwrap();
        path
    }

    #[test]
    fn test_links_relative_imports_once() {
        let dir = tempdir().unwrap();
        write(dir.path(), "utils.js", "export const Id = 1;\n");
        write(dir.path(), "a.js", "import { Id } from './utils.js';\nexport const A = Id;\n");
        let b = write(
            dir.path(),
            "b.js",
            "import { Id } from './utils.js';\nimport { A } from './a.js';\nimport { z } from 'zod';\nexport const B = A;\n",
        );

        let mut graph = ModuleGraph::new();
        let id = graph.load(&b).unwrap();
        assert_eq!(graph.modules.len(), 3);
        assert_eq!(
            graph.module(id).import("zod"),
            Some(&ModuleRef::External("zod".to_string()))
        );
    }

    #[test]
    fn test_missing_relative_import_fails_every_importer() {
        let dir = tempdir().unwrap();
        let broken = write(dir.path(), "broken.js", "import { X } from './missing';\nexport const Y = X;\n");
        let user = write(dir.path(), "user.js", "export * from './broken.js';\n");

        let mut graph = ModuleGraph::new();
        let err = graph.load(&broken).unwrap_err();
        assert!(matches!(err, SchemaError::ModuleNotFound { ref specifier, .. } if specifier == "./missing"));
        assert!(graph.load(&user).is_err());
        assert!(graph.load(&broken).is_err());
    }

    #[test]
    fn test_import_cycles_link() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.js", "import { B } from './b.js';\nexport const A = 1;\n");
        let b = write(dir.path(), "b.js", "import { A } from './a.js';\nexport const B = 2;\n");
        let mut graph = ModuleGraph::new();
        assert!(graph.load(&b).is_ok());
    }

    #[test]
    fn test_unresolved_named_import_fails_module_and_importers() {
        let dir = tempdir().unwrap();
        let base = write(dir.path(), "base.js", "export const Id = 1;\nexport default 2;\n");
        let broken = write(
            dir.path(),
            "broken.js",
            "import { Nope } from './base.js';\nexport const B = 1;\n",
        );
        let user = write(dir.path(), "user.js", "import { B } from './broken.js';\nexport const C = B;\n");

        let mut graph = ModuleGraph::new();
        let id = graph.load(&broken).unwrap();
        let err = graph.resolve_imports(id).unwrap_err();
        assert!(matches!(err, SchemaError::MissingExport { ref name, .. } if name == "Nope"));

        let id = graph.load(&user).unwrap();
        assert!(matches!(graph.resolve_imports(id), Err(SchemaError::Link { .. })));

        let id = graph.load(&base).unwrap();
        assert!(graph.resolve_imports(id).is_ok());
    }

    #[test]
    fn test_resolves_default_and_reexported_names() {
        let dir = tempdir().unwrap();
        write(dir.path(), "base.js", "export const Id = 1;\nexport default 2;\n");
        write(dir.path(), "barrel.js", "export * from './base.js';\nexport { default as Base } from './base.js';\n");
        let good = write(
            dir.path(),
            "good.js",
            "import Base, { Id as Key } from './base.js';\nimport * as all from './barrel.js';\nexport { Id } from './barrel.js';\n",
        );
        let bad = write(dir.path(), "bad.js", "export { Missing as M } from './barrel.js';\n");
        let anonymous = write(dir.path(), "anonymous.js", "import Default from './good.js';\n");

        let mut graph = ModuleGraph::new();
        let id = graph.load(&good).unwrap();
        assert!(graph.resolve_imports(id).is_ok());
        let id = graph.load(&bad).unwrap();
        assert!(matches!(graph.resolve_imports(id), Err(SchemaError::MissingExport { ref name, .. }) if name == "Missing"));
        let id = graph.load(&anonymous).unwrap();
        assert!(matches!(graph.resolve_imports(id), Err(SchemaError::MissingExport { ref name, .. }) if name == "default"));
    }

    #[test]
    fn test_export_names_and_lookup() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "shared.js",
            "export const Shared = 1;\nexport default 2;\n",
        );
        let main = write(
            dir.path(),
            "main.js",
            "const local = 3;\nexport { local as Renamed };\nexport * from './shared.js';\nexport * as ns from './shared.js';\nexport const { a, b: [c] } = obj;\nexport function helper() {}\nexport default local;\n",
        );
        let mut graph = ModuleGraph::new();
        let id = graph.load(&main).unwrap();

        assert_eq!(
            graph.export_names(id),
            vec!["Renamed", "Shared", "a", "c", "default", "helper", "ns"]
        );
        assert!(matches!(graph.find_export(id, "Renamed"), Some(Export::Local { ref local, .. }) if local == "local"));
        assert!(matches!(graph.find_export(id, "Shared"), Some(Export::Reexport { ref name, .. }) if name == "Shared"));
        assert!(matches!(graph.find_export(id, "ns"), Some(Export::Namespace(_))));
        assert!(matches!(graph.find_export(id, "helper"), Some(Export::Opaque)));
        assert!(matches!(graph.find_export(id, "c"), Some(Export::Opaque)));
        assert!(matches!(graph.find_export(id, "default"), Some(Export::Expression(_))));
        assert!(graph.find_export(id, "missing").is_none());
    }
}
